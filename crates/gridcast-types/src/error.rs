//! Error types shared across all gridcast crates.

use std::time::Duration;

/// Errors that can occur while extracting schedule data or rendering it.
///
/// Extraction-path variants are recovered at the region boundary and turned
/// into a persisted error status; render-path variants are recovered at the
/// task boundary and counted by the scheduler.
#[derive(Debug, thiserror::Error)]
pub enum GridcastError {
    /// A marker, input file, or template is absent.
    #[error("not found: {what}")]
    NotFound { what: String },

    /// The first non-whitespace character after a marker is not an opener.
    #[error("syntax error at byte {offset}: expected '{{' or '[' after marker, found {found:?}")]
    Syntax { offset: usize, found: Option<char> },

    /// End of input was reached before the literal's delimiters balanced.
    #[error("unbalanced literal starting at byte {start}: braces {braces}, brackets {brackets} at end of input")]
    Unbalanced {
        start: usize,
        braces: i64,
        brackets: i64,
    },

    /// Neither the strict nor the permissive decoder accepted the literal.
    #[error("parse error: strict: {strict}; permissive: {permissive}")]
    Parse { strict: String, permissive: String },

    /// No completion signal appeared within the wait window.
    #[error("render timed out for {template} after {waited:?}: {reason}")]
    RenderTimeout {
        template: String,
        waited: Duration,
        reason: String,
    },

    /// The capture container could not be measured.
    #[error("cannot measure {selector}: {reason}")]
    Measurement { selector: String, reason: String },

    /// Filesystem or network failure.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Invalid or unreadable configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Browser transport or protocol failure.
    #[error("browser error: {0}")]
    Browser(String),
}

impl GridcastError {
    /// Numeric code persisted in `lastUpdateStatus.code`.
    pub fn status_code(&self) -> i64 {
        match self {
            GridcastError::NotFound { .. } => 404,
            GridcastError::Syntax { .. }
            | GridcastError::Unbalanced { .. }
            | GridcastError::Parse { .. } => 422,
            GridcastError::RenderTimeout { .. } => 504,
            _ => 500,
        }
    }

    /// Short machine-readable name of the variant, used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            GridcastError::NotFound { .. } => "NotFoundError",
            GridcastError::Syntax { .. } => "SyntaxError",
            GridcastError::Unbalanced { .. } => "UnbalancedError",
            GridcastError::Parse { .. } => "ParseError",
            GridcastError::RenderTimeout { .. } => "RenderTimeoutError",
            GridcastError::Measurement { .. } => "MeasurementError",
            GridcastError::Io { .. } => "IOError",
            GridcastError::Config(_) => "ConfigError",
            GridcastError::Browser(_) => "BrowserError",
        }
    }

    /// Wrap an I/O error on `path`, mapping `NotFound` to [`GridcastError::NotFound`].
    pub fn from_io(path: &std::path::Path, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            GridcastError::NotFound {
                what: path.display().to_string(),
            }
        } else {
            GridcastError::Io {
                context: format!("failed to access {}", path.display()),
                source,
            }
        }
    }
}
