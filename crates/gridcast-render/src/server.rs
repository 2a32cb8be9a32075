//! Loopback static file server for templates and their assets.
//!
//! Serves files under a root directory on an ephemeral `127.0.0.1` port.
//! Request paths are percent-decoded by the router and mapped onto the
//! root; any read failure (missing file, directory, traversal attempt) is a
//! plain 404. No listings, no caching headers.

use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use gridcast_types::GridcastError;

/// A running static server. Stop it with [`StaticServer::stop`].
#[derive(Debug)]
pub struct StaticServer {
    addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl StaticServer {
    /// Bind an ephemeral loopback port and start serving `root`.
    pub async fn start(root: impl Into<PathBuf>) -> Result<Self, GridcastError> {
        let root = Arc::new(root.into());
        let app = Router::new()
            .route("/{*path}", get(serve_file))
            .fallback(not_found)
            .with_state(Arc::clone(&root));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| GridcastError::Io {
                context: "failed to bind static server".to_string(),
                source: e,
            })?;
        let addr = listener.local_addr().map_err(|e| GridcastError::Io {
            context: "failed to read static server address".to_string(),
            source: e,
        })?;

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.wait_for(|&v| v).await;
                })
                .await;
            if let Err(e) = served {
                tracing::error!(error = %e, "static server stopped with error");
            }
        });

        info!(addr = %addr, root = %root.display(), "static server listening");
        Ok(Self {
            addr,
            shutdown,
            task,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// `http://127.0.0.1:<port>`
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Absolute URL for a root-relative path such as `templates/matrix.html`.
    pub fn url_for(&self, relative: &str) -> String {
        format!("{}/{}", self.base_url(), relative.trim_start_matches('/'))
    }

    /// Signal shutdown and wait for in-flight requests to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
        debug!(addr = %self.addr, "static server stopped");
    }
}

async fn serve_file(
    State(root): State<Arc<PathBuf>>,
    axum::extract::Path(path): axum::extract::Path<String>,
) -> Response {
    let Some(file) = resolve_path(&root, &path) else {
        return not_found().await.into_response();
    };
    match tokio::fs::read(&file).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, content_type_for(&file))], bytes).into_response(),
        Err(e) => {
            debug!(path = %file.display(), error = %e, "static read failed");
            not_found().await.into_response()
        }
    }
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "not found")
}

/// Map a decoded request path onto `root`, refusing anything that could
/// escape it.
pub fn resolve_path(root: &Path, request_path: &str) -> Option<PathBuf> {
    let mut resolved = root.to_path_buf();
    for component in Path::new(request_path).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir | Component::RootDir => {}
            Component::ParentDir | Component::Prefix(_) => return None,
        }
    }
    if resolved == root {
        return None;
    }
    Some(resolved)
}

/// Content type inferred from the file extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("js" | "mjs") => "application/javascript; charset=utf-8",
        Some("json") => "application/json; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}
