//! Update status state machine for persisted records.
//!
//! A record starts [`StatusKind::Idle`] and moves to `Parsed` or `Error` on
//! every extraction attempt. The attempt counter is threaded through each
//! transition explicitly and never decreases.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of the most recent extraction attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Idle,
    Parsed,
    Error,
}

impl StatusKind {
    /// The lowercase name used in records and CLI output.
    pub fn as_str(self) -> &'static str {
        match self {
            StatusKind::Idle => "idle",
            StatusKind::Parsed => "parsed",
            StatusKind::Error => "error",
        }
    }
}

impl std::fmt::Display for StatusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Monotonic extraction attempt counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attempt(pub u64);

impl Attempt {
    /// The counter value for the attempt following this one.
    pub fn next(self) -> Attempt {
        Attempt(self.0.saturating_add(1))
    }
}

impl std::fmt::Display for Attempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of an extraction attempt, fed into [`UpdateStatus::transition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    Parsed,
    Failed { code: i64, message: String },
}

/// The `lastUpdateStatus` object stored in every record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateStatus {
    pub status: StatusKind,
    pub ok: bool,
    pub code: Option<i64>,
    pub message: Option<String>,
    pub at: Option<DateTime<Utc>>,
    pub attempt: Attempt,
}

impl Default for UpdateStatus {
    fn default() -> Self {
        Self::idle()
    }
}

impl UpdateStatus {
    /// Initial status of a record that has never been extracted.
    pub fn idle() -> Self {
        Self {
            status: StatusKind::Idle,
            ok: false,
            code: None,
            message: None,
            at: None,
            attempt: Attempt::default(),
        }
    }

    /// Apply an extraction outcome, producing the next status.
    ///
    /// Every transition increments the attempt counter regardless of outcome.
    pub fn transition(&self, event: StatusEvent, at: DateTime<Utc>) -> UpdateStatus {
        let attempt = self.attempt.next();
        match event {
            StatusEvent::Parsed => UpdateStatus {
                status: StatusKind::Parsed,
                ok: true,
                code: Some(200),
                message: None,
                at: Some(at),
                attempt,
            },
            StatusEvent::Failed { code, message } => UpdateStatus {
                status: StatusKind::Error,
                ok: false,
                code: Some(code),
                message: Some(message),
                at: Some(at),
                attempt,
            },
        }
    }
}
