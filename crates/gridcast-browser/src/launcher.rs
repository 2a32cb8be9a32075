//! Browser process lifecycle and the shared handle used by render tasks.
//!
//! A [`BrowserHandle`] is acquired once, either by launching a local
//! Chrome/Chromium with remote debugging enabled or by connecting to an
//! already-running one, and cloned into every task. Each task opens its own
//! isolated browser context through the handle and closes it when done; the
//! process itself lives until [`BrowserHandle::shutdown`].

use std::net::TcpListener;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use url::Url;

use gridcast_types::BrowserConfig;

use crate::cdp::CdpClient;
use crate::error::BrowserError;

/// An isolated browsing context with a single page target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserContext {
    pub context_id: String,
    pub target_id: String,
    /// DevTools WebSocket URL of the page target.
    pub page_ws_url: String,
}

struct LaunchedProcess {
    child: Child,
    profile_dir: PathBuf,
}

struct Inner {
    client: CdpClient,
    process: Mutex<Option<LaunchedProcess>>,
}

/// Reference-counted handle to one browser process.
#[derive(Clone)]
pub struct BrowserHandle {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for BrowserHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserHandle")
            .field("endpoint", &self.inner.client.url())
            .finish()
    }
}

impl BrowserHandle {
    /// Connect to `config.cdp_ws_url` when set, otherwise launch a browser.
    pub async fn acquire(config: &BrowserConfig) -> Result<Self, BrowserError> {
        match config.cdp_ws_url.as_deref().filter(|u| !u.trim().is_empty()) {
            Some(ws_url) => Self::connect(ws_url).await,
            None => Self::launch(config).await,
        }
    }

    /// Attach to an existing browser-level DevTools endpoint.
    pub async fn connect(ws_url: &str) -> Result<Self, BrowserError> {
        Url::parse(ws_url).map_err(|e| BrowserError::ConnectionFailed {
            url: ws_url.to_string(),
            reason: format!("invalid DevTools URL: {e}"),
        })?;
        let client = CdpClient::connect(ws_url).await?;
        tracing::info!(endpoint = ws_url, "connected to running browser");
        Ok(Self {
            inner: Arc::new(Inner {
                client,
                process: Mutex::new(None),
            }),
        })
    }

    /// Launch a headless browser on an ephemeral debugging port.
    pub async fn launch(config: &BrowserConfig) -> Result<Self, BrowserError> {
        let port = pick_ephemeral_port()?;
        let profile_dir =
            std::env::temp_dir().join(format!("gridcast-profile-{}-{port}", std::process::id()));
        std::fs::create_dir_all(&profile_dir).map_err(|e| BrowserError::LaunchFailed {
            reason: format!("failed to create profile dir {}: {e}", profile_dir.display()),
        })?;

        let args = launch_args(port, &profile_dir, config);

        let mut last_error = None;
        let mut child = None;
        for candidate in browser_binary_candidates(config.binary_path.as_deref()) {
            let mut cmd = Command::new(&candidate);
            cmd.args(&args)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true);
            match cmd.spawn() {
                Ok(proc) => {
                    tracing::debug!(binary = %candidate, port, "spawned browser");
                    child = Some(proc);
                    break;
                }
                Err(e) => last_error = Some(format!("{candidate}: {e}")),
            }
        }
        let mut child = child.ok_or_else(|| BrowserError::LaunchFailed {
            reason: last_error.unwrap_or_else(|| "no candidates available".to_string()),
        })?;

        let timeout = Duration::from_millis(config.launch_timeout_ms);
        let ws_url = match wait_for_devtools(port, timeout).await {
            Ok(ws) => ws,
            Err(e) => {
                let _ = child.kill().await;
                let _ = std::fs::remove_dir_all(&profile_dir);
                return Err(e);
            }
        };

        let client = match CdpClient::connect(&ws_url).await {
            Ok(client) => client,
            Err(e) => {
                let _ = child.kill().await;
                let _ = std::fs::remove_dir_all(&profile_dir);
                return Err(e);
            }
        };
        tracing::info!(endpoint = %ws_url, "browser launched");

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                process: Mutex::new(Some(LaunchedProcess { child, profile_dir })),
            }),
        })
    }

    /// Browser-level DevTools endpoint.
    pub fn endpoint(&self) -> &str {
        self.inner.client.url()
    }

    /// Create a fresh browser context holding one blank page.
    pub async fn open_context(&self) -> Result<BrowserContext, BrowserError> {
        let client = &self.inner.client;
        let created = client
            .call("Target.createBrowserContext", serde_json::json!({}))
            .await?;
        let context_id = string_field(&created, "browserContextId", "Target.createBrowserContext")?;

        let target = client
            .call(
                "Target.createTarget",
                serde_json::json!({ "url": "about:blank", "browserContextId": context_id }),
            )
            .await;
        let target_id = match target.and_then(|t| string_field(&t, "targetId", "Target.createTarget")) {
            Ok(id) => id,
            Err(e) => {
                self.dispose_context(&context_id).await;
                return Err(e);
            }
        };

        let page_ws_url = page_ws_url(client.url(), &target_id)?;
        Ok(BrowserContext {
            context_id,
            target_id,
            page_ws_url,
        })
    }

    /// Close the page target and dispose its context. Failures are logged;
    /// the browser process stays up.
    pub async fn close_context(&self, context: &BrowserContext) {
        if let Err(e) = self
            .inner
            .client
            .call(
                "Target.closeTarget",
                serde_json::json!({ "targetId": context.target_id }),
            )
            .await
        {
            tracing::debug!(target = %context.target_id, error = %e, "closeTarget failed");
        }
        self.dispose_context(&context.context_id).await;
    }

    async fn dispose_context(&self, context_id: &str) {
        if let Err(e) = self
            .inner
            .client
            .call(
                "Target.disposeBrowserContext",
                serde_json::json!({ "browserContextId": context_id }),
            )
            .await
        {
            tracing::warn!(context = context_id, error = %e, "failed to dispose browser context");
        }
    }

    /// Close the browser (when launched by us) and the DevTools connection.
    pub async fn shutdown(&self) {
        let mut process = self.inner.process.lock().await;
        if let Some(mut launched) = process.take() {
            let _ = self
                .inner
                .client
                .call_within(
                    "Browser.close",
                    serde_json::json!({}),
                    Duration::from_secs(2),
                )
                .await;
            if let Err(e) = launched.child.kill().await {
                tracing::debug!(error = %e, "browser already exited");
            }
            let _ = std::fs::remove_dir_all(&launched.profile_dir);
            tracing::info!("browser stopped");
        } else {
            self.inner.client.close().await;
        }
    }
}

/// Command-line arguments for a launched browser.
pub fn launch_args(port: u16, profile_dir: &std::path::Path, config: &BrowserConfig) -> Vec<String> {
    let mut args = vec![
        format!("--remote-debugging-port={port}"),
        "--remote-debugging-address=127.0.0.1".to_string(),
        format!("--user-data-dir={}", profile_dir.display()),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--hide-scrollbars".to_string(),
        "--font-render-hinting=none".to_string(),
    ];
    if config.headless {
        args.push("--headless=new".to_string());
        args.push("--disable-gpu".to_string());
    }
    for extra in &config.extra_args {
        if !extra.trim().is_empty() {
            args.push(extra.to_string());
        }
    }
    args.push("about:blank".to_string());
    args
}

/// Binaries to try, in order: configured path, then well-known locations.
pub fn browser_binary_candidates(configured: Option<&str>) -> Vec<String> {
    let mut candidates = Vec::new();
    if let Some(path) = configured {
        if !path.trim().is_empty() {
            candidates.push(path.to_string());
        }
    }
    candidates.extend(
        [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    candidates.extend(
        ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser", "chrome"]
            .iter()
            .map(|s| s.to_string()),
    );
    candidates
}

fn pick_ephemeral_port() -> Result<u16, BrowserError> {
    let listener = TcpListener::bind("127.0.0.1:0").map_err(|e| BrowserError::LaunchFailed {
        reason: format!("port bind failed: {e}"),
    })?;
    let port = listener
        .local_addr()
        .map_err(|e| BrowserError::LaunchFailed {
            reason: format!("port lookup failed: {e}"),
        })?
        .port();
    Ok(port)
}

/// Poll `/json/version` until the browser publishes its WebSocket URL.
async fn wait_for_devtools(port: u16, timeout: Duration) -> Result<String, BrowserError> {
    let deadline = tokio::time::Instant::now() + timeout;
    let url = format!("http://127.0.0.1:{port}/json/version");
    while tokio::time::Instant::now() < deadline {
        if let Ok(resp) = reqwest::get(&url).await {
            if let Ok(value) = resp.json::<serde_json::Value>().await {
                if let Some(ws) = value.get("webSocketDebuggerUrl").and_then(|v| v.as_str()) {
                    return Ok(ws.to_string());
                }
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    Err(BrowserError::LaunchFailed {
        reason: format!("timed out waiting for DevTools endpoint on {url}"),
    })
}

/// Derive a page target's WebSocket URL from the browser endpoint.
pub fn page_ws_url(browser_ws_url: &str, target_id: &str) -> Result<String, BrowserError> {
    let mut url = Url::parse(browser_ws_url).map_err(|e| BrowserError::Protocol {
        detail: format!("invalid browser endpoint {browser_ws_url}: {e}"),
    })?;
    url.set_path(&format!("/devtools/page/{target_id}"));
    url.set_query(None);
    Ok(url.to_string())
}

fn string_field(value: &serde_json::Value, field: &str, method: &str) -> Result<String, BrowserError> {
    value
        .get(field)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| BrowserError::Protocol {
            detail: format!("{method} did not return {field}"),
        })
}
