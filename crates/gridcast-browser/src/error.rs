//! Browser driver errors.

use std::time::Duration;

use thiserror::Error;

use gridcast_types::GridcastError;

#[derive(Debug, Error)]
pub enum BrowserError {
    /// None of the candidate binaries started, or DevTools never came up.
    #[error("failed to launch browser: {reason}")]
    LaunchFailed { reason: String },

    #[error("failed to connect to DevTools at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    /// The socket closed with calls still outstanding.
    #[error("DevTools connection closed")]
    Disconnected,

    /// The browser answered a call with an `error` member.
    #[error("CDP error {code}: {message}")]
    CdpError {
        code: i64,
        message: String,
        data: Option<String>,
    },

    #[error("CDP call '{method}' got no reply within {duration:?}")]
    Timeout { method: String, duration: Duration },

    /// Unexpected reply shape or a frame that could not be sent.
    #[error("CDP protocol error: {detail}")]
    Protocol { detail: String },

    #[error("no element matches {selector}")]
    ElementNotFound { selector: String },

    #[error("element {selector} cannot be measured: {reason}")]
    ElementNotMeasurable { selector: String, reason: String },

    #[error("navigation failed: {reason}")]
    NavigationFailed { reason: String },

    /// The evaluated expression threw.
    #[error("JavaScript exception: {message}")]
    JsException { message: String },

    #[error("page did not finish loading within {duration:?}")]
    PageLoadTimeout { duration: Duration },
}

impl From<BrowserError> for GridcastError {
    fn from(err: BrowserError) -> Self {
        match err {
            BrowserError::ElementNotFound { selector } => GridcastError::Measurement {
                selector,
                reason: "element not present".to_string(),
            },
            BrowserError::ElementNotMeasurable { selector, reason } => {
                GridcastError::Measurement { selector, reason }
            }
            other => GridcastError::Browser(other.to_string()),
        }
    }
}
