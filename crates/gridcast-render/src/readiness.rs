//! Render completion detection.
//!
//! Templates signal completion by setting
//! `document.documentElement.dataset.renderState` to `ready` (or `error`).
//! Templates that predate the signal are recognized by their populated
//! markers instead. A page with neither the signal nor any marker host after
//! load is not the expected template and fails without waiting out the
//! window.

use std::future::Future;
use std::time::Duration;

use serde_json::Value;

use gridcast_browser::BrowserError;
use gridcast_types::GridcastError;

use crate::templates::TemplateKind;

/// Result of one readiness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyState {
    Ready,
    Pending,
    /// The template reported a rendering error.
    Failed(String),
    /// Document loaded, but no signal and no marker host exists.
    Absent,
}

/// JavaScript expression evaluated in the page to classify readiness.
pub fn ready_check_script(template: TemplateKind) -> String {
    let markers = selector_list(template.ready_markers());
    let hosts = selector_list(template.marker_hosts());
    format!(
        r#"(() => {{
  const root = document.documentElement;
  const signal = root && root.dataset ? root.dataset.renderState : undefined;
  if (signal === "ready") return {{ state: "ready" }};
  if (signal === "error") return {{ state: "failed", reason: root.dataset.renderError || "template reported an error" }};
  const any = (list) => list.some((s) => document.querySelector(s) !== null);
  if (any({markers})) return {{ state: "ready" }};
  if (signal === undefined && document.readyState === "complete" && !any({hosts})) return {{ state: "absent" }};
  return {{ state: "pending" }};
}})()"#
    )
}

fn selector_list(selectors: &[&str]) -> String {
    serde_json::to_string(selectors).unwrap_or_else(|_| "[]".to_string())
}

/// Interpret the value returned by [`ready_check_script`].
pub fn parse_ready_state(value: &Value) -> ReadyState {
    match value.get("state").and_then(|s| s.as_str()) {
        Some("ready") => ReadyState::Ready,
        Some("failed") => ReadyState::Failed(
            value
                .get("reason")
                .and_then(|r| r.as_str())
                .unwrap_or("template reported an error")
                .to_string(),
        ),
        Some("absent") => ReadyState::Absent,
        _ => ReadyState::Pending,
    }
}

/// Poll `check` every `interval` until the template is ready or `timeout`
/// elapses. Returns the time waited.
///
/// Each check is bounded by the same deadline, so a page that stops
/// answering still fails as a render timeout. A JavaScript exception from
/// the check counts as pending, since the document may be mid-replacement;
/// transport errors are returned as-is.
pub async fn wait_until_ready<F, Fut>(
    template: TemplateKind,
    mut check: F,
    timeout: Duration,
    interval: Duration,
) -> Result<Duration, GridcastError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<ReadyState, BrowserError>>,
{
    let started = tokio::time::Instant::now();
    let deadline = started + timeout;
    loop {
        let Ok(checked) = tokio::time::timeout_at(deadline, check()).await else {
            return Err(GridcastError::RenderTimeout {
                template: template.to_string(),
                waited: started.elapsed(),
                reason: "page did not answer the readiness check".to_string(),
            });
        };
        let state = match checked {
            Ok(state) => state,
            Err(BrowserError::JsException { message }) => {
                tracing::debug!(template = %template, error = %message, "readiness check threw, retrying");
                ReadyState::Pending
            }
            Err(e) => return Err(e.into()),
        };

        let waited = started.elapsed();
        match state {
            ReadyState::Ready => return Ok(waited),
            ReadyState::Failed(reason) => {
                return Err(GridcastError::RenderTimeout {
                    template: template.to_string(),
                    waited,
                    reason,
                })
            }
            ReadyState::Absent => {
                return Err(GridcastError::RenderTimeout {
                    template: template.to_string(),
                    waited,
                    reason: "no completion signal or marker element in document".to_string(),
                })
            }
            ReadyState::Pending => {}
        }

        let now = tokio::time::Instant::now();
        if now >= deadline {
            return Err(GridcastError::RenderTimeout {
                template: template.to_string(),
                waited,
                reason: "completion signal did not appear".to_string(),
            });
        }
        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}
