//! DevTools WebSocket transport.
//!
//! A [`CdpClient`] owns one socket: either the browser endpoint, shared by
//! every render task to create and dispose contexts, or a single page
//! target. Outgoing calls are numbered; a spawned dispatcher matches replies
//! back to their callers and queues everything else as events.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::BrowserError;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Reply = Result<Value, RemoteError>;
type Waiters = Arc<Mutex<HashMap<u64, oneshot::Sender<Reply>>>>;

/// Per-call timeout unless overridden with [`CdpClient::with_call_timeout`].
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Events buffered between [`CdpClient::await_event`] calls. Once full, newer
/// events are dropped until a waiter drains the queue.
pub const EVENT_QUEUE: usize = 256;

/// Notification pushed by the browser, e.g. `Page.loadEventFired`.
#[derive(Debug, Clone, PartialEq)]
pub struct CdpEvent {
    pub method: String,
    pub params: Value,
}

/// `error` member of a failed reply.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Serialize)]
struct Call<'a> {
    id: u64,
    method: &'a str,
    params: &'a Value,
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Reply { id: u64, reply: Reply },
    Event(CdpEvent),
}

impl Inbound {
    /// Classify a frame: anything carrying a numeric `id` is a reply, a
    /// frame with only `method` is an event, the rest is ignored.
    pub fn decode(frame: &Value) -> Option<Self> {
        if let Some(id) = frame.get("id") {
            let id = id.as_u64()?;
            let reply = match frame.get("error") {
                Some(err) => Err(serde_json::from_value(err.clone()).unwrap_or_else(|_| {
                    RemoteError {
                        code: 0,
                        message: err.to_string(),
                        data: None,
                    }
                })),
                None => Ok(frame.get("result").cloned().unwrap_or(Value::Null)),
            };
            return Some(Inbound::Reply { id, reply });
        }
        let method = frame.get("method")?.as_str()?.to_string();
        let params = frame.get("params").cloned().unwrap_or(Value::Null);
        Some(Inbound::Event(CdpEvent { method, params }))
    }
}

pub struct CdpClient {
    url: String,
    ids: AtomicU64,
    waiters: Waiters,
    sink: Mutex<SplitSink<Socket, Message>>,
    events: Mutex<mpsc::Receiver<CdpEvent>>,
    call_timeout: Duration,
    dispatcher: tokio::task::JoinHandle<()>,
}

impl CdpClient {
    /// Open `ws://host:port/devtools/{browser|page}/<id>`.
    pub async fn connect(ws_url: &str) -> Result<Self, BrowserError> {
        let (socket, _) = tokio_tungstenite::connect_async(ws_url)
            .await
            .map_err(|e| BrowserError::ConnectionFailed {
                url: ws_url.to_string(),
                reason: e.to_string(),
            })?;
        tracing::debug!(url = ws_url, "DevTools socket open");

        let (sink, stream) = socket.split();
        let waiters: Waiters = Arc::default();
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE);
        let dispatcher = tokio::spawn(dispatch(stream, Arc::clone(&waiters), event_tx));

        Ok(Self {
            url: ws_url.to_string(),
            ids: AtomicU64::new(1),
            waiters,
            sink: Mutex::new(sink),
            events: Mutex::new(event_rx),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            dispatcher,
        })
    }

    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Invoke `method` and return its `result`.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, BrowserError> {
        self.call_within(method, params, self.call_timeout).await
    }

    pub async fn call_within(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, BrowserError> {
        let id = self.ids.fetch_add(1, Ordering::Relaxed);
        let frame = serde_json::to_string(&Call {
            id,
            method,
            params: &params,
        })
        .map_err(|e| BrowserError::Protocol {
            detail: format!("cannot encode {method}: {e}"),
        })?;

        // The waiter must exist before the frame leaves, or a fast reply is lost.
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().await.insert(id, tx);
        tracing::trace!(id, method, "call");

        if let Err(e) = self.sink.lock().await.send(Message::Text(frame.into())).await {
            self.waiters.lock().await.remove(&id);
            return Err(BrowserError::Protocol {
                detail: format!("cannot send {method}: {e}"),
            });
        }

        let reply = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => return Err(BrowserError::Disconnected),
            Err(_) => {
                self.waiters.lock().await.remove(&id);
                return Err(BrowserError::Timeout {
                    method: method.to_string(),
                    duration: timeout,
                });
            }
        };
        reply.map_err(|e| BrowserError::CdpError {
            code: e.code,
            message: e.message,
            data: e.data,
        })
    }

    /// `<domain>.enable`
    pub async fn enable(&self, domain: &str) -> Result<(), BrowserError> {
        self.call(&format!("{domain}.enable"), Value::Object(Default::default()))
            .await
            .map(drop)
    }

    /// Wait for the next event named `method`. Other events queued before it
    /// are dropped.
    pub async fn await_event(&self, method: &str, timeout: Duration) -> Result<CdpEvent, BrowserError> {
        let deadline = Instant::now() + timeout;
        let mut events = self.events.lock().await;
        loop {
            match tokio::time::timeout_at(deadline, events.recv()).await {
                Err(_) => return Err(BrowserError::PageLoadTimeout { duration: timeout }),
                Ok(None) => return Err(BrowserError::Disconnected),
                Ok(Some(event)) if event.method == method => return Ok(event),
                Ok(Some(event)) => tracing::trace!(event = %event.method, "skipped"),
            }
        }
    }

    /// Send a close frame. Outstanding calls fail with `Disconnected` once the
    /// browser acknowledges.
    pub async fn close(&self) {
        if let Err(e) = self.sink.lock().await.send(Message::Close(None)).await {
            tracing::debug!(url = %self.url, error = %e, "close frame not sent");
        }
    }
}

impl Drop for CdpClient {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}

async fn dispatch(
    mut stream: SplitStream<Socket>,
    waiters: Waiters,
    events: mpsc::Sender<CdpEvent>,
) {
    while let Some(message) = stream.next().await {
        let frame: Value = match message {
            Ok(Message::Text(text)) => match serde_json::from_str(text.as_str()) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(error = %e, "dropping malformed DevTools frame");
                    continue;
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(error = %e, "DevTools socket failed");
                break;
            }
        };

        match Inbound::decode(&frame) {
            Some(Inbound::Reply { id, reply }) => {
                if let Some(waiter) = waiters.lock().await.remove(&id) {
                    let _ = waiter.send(reply);
                }
            }
            Some(Inbound::Event(event)) => forward(&events, event),
            None => {}
        }
    }
    // Dropping the senders wakes every caller with `Disconnected`.
    waiters.lock().await.clear();
}

/// Queue an event without blocking the dispatcher, which must keep reading
/// replies even when nobody is waiting for events.
fn forward(events: &mpsc::Sender<CdpEvent>, event: CdpEvent) {
    match events.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(event)) => {
            tracing::trace!(event = %event.method, "event queue full, dropping")
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_result_reply() {
        let frame = json!({"id": 1, "result": {"browserContextId": "CTX1"}});
        match Inbound::decode(&frame) {
            Some(Inbound::Reply { id: 1, reply: Ok(v) }) => assert_eq!(v["browserContextId"], "CTX1"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_decode_error_reply() {
        let frame = json!({
            "id": 2,
            "error": {"code": -32000, "message": "Failed to find browser context", "data": "CTX9"}
        });
        let Some(Inbound::Reply { reply: Err(e), .. }) = Inbound::decode(&frame) else {
            panic!("expected error reply");
        };
        assert_eq!(e.code, -32000);
        assert_eq!(e.data.as_deref(), Some("CTX9"));
    }

    #[test]
    fn test_reply_without_result_is_null() {
        let frame = json!({"id": 3});
        assert_eq!(
            Inbound::decode(&frame),
            Some(Inbound::Reply { id: 3, reply: Ok(Value::Null) })
        );
    }

    #[test]
    fn test_odd_error_shape_is_kept_as_message() {
        let frame = json!({"id": 4, "error": "boom"});
        let Some(Inbound::Reply { reply: Err(e), .. }) = Inbound::decode(&frame) else {
            panic!("expected error reply");
        };
        assert!(e.message.contains("boom"));
    }

    #[test]
    fn test_decode_event() {
        let frame = json!({"method": "Page.loadEventFired", "params": {"timestamp": 1.5}});
        let Some(Inbound::Event(event)) = Inbound::decode(&frame) else {
            panic!("expected event");
        };
        assert_eq!(event.method, "Page.loadEventFired");
        assert_eq!(event.params["timestamp"], 1.5);

        let bare = Inbound::decode(&json!({"method": "Page.frameStoppedLoading"}));
        assert!(matches!(bare, Some(Inbound::Event(CdpEvent { params: Value::Null, .. }))));
    }

    #[test]
    fn test_unrecognized_frames_are_ignored() {
        assert!(Inbound::decode(&json!({"params": {}})).is_none());
        assert!(Inbound::decode(&json!({"id": "x", "result": {}})).is_none());
    }

    fn event(method: &str) -> CdpEvent {
        CdpEvent {
            method: method.to_string(),
            params: Value::Null,
        }
    }

    #[test]
    fn test_full_event_queue_drops_newest() {
        let (tx, mut rx) = mpsc::channel(2);
        forward(&tx, event("Page.frameNavigated"));
        forward(&tx, event("Page.domContentEventFired"));
        forward(&tx, event("Page.loadEventFired"));

        assert_eq!(rx.try_recv().unwrap().method, "Page.frameNavigated");
        assert_eq!(rx.try_recv().unwrap().method, "Page.domContentEventFired");
        assert!(rx.try_recv().is_err());

        forward(&tx, event("Page.loadEventFired"));
        assert_eq!(rx.try_recv().unwrap().method, "Page.loadEventFired");
    }

    #[test]
    fn test_forward_after_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        forward(&tx, event("Page.loadEventFired"));
    }

    #[test]
    fn test_call_frame_shape() {
        let params = json!({"disposeOnDetach": true});
        let frame = serde_json::to_value(Call {
            id: 7,
            method: "Target.createBrowserContext",
            params: &params,
        })
        .unwrap();
        assert_eq!(
            frame,
            json!({"id": 7, "method": "Target.createBrowserContext", "params": {"disposeOnDetach": true}})
        );
    }
}
