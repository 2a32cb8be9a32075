//! The persisted per-region record.
//!
//! One JSON document per region combining the raw schedule payloads (`fact`,
//! `preset`) with ingestion bookkeeping. Field names are camelCase on disk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::status::UpdateStatus;
use crate::GridcastError;

/// Current on-disk schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Maximum number of status events kept in `statusHistory`.
pub const HISTORY_LIMIT: usize = 20;

/// Which decoder accepted an extracted literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseMode {
    Strict,
    Permissive,
}

impl std::fmt::Display for ParseMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseMode::Strict => write!(f, "strict"),
            ParseMode::Permissive => write!(f, "permissive"),
        }
    }
}

/// Decoder diagnostics for the last successful parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseModes {
    pub fact: ParseMode,
    pub preset: Option<ParseMode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMeta {
    pub schema_version: u32,
    /// SHA-256 over the extracted literal text of `fact` followed by `preset`.
    pub content_hash: Option<String>,
    /// Whether the latest attempt stored a new `contentHash`. Always false
    /// after a failed attempt.
    #[serde(default)]
    pub changed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<ParseModes>,
}

impl Default for RecordMeta {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            content_hash: None,
            changed: false,
            parse_mode: None,
        }
    }
}

/// Persisted state for one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub region_id: String,
    pub last_updated: Option<DateTime<Utc>>,
    pub fact: Option<Value>,
    pub preset: Option<Value>,
    #[serde(default)]
    pub last_update_status: UpdateStatus,
    #[serde(default)]
    pub status_history: Vec<UpdateStatus>,
    #[serde(default)]
    pub meta: RecordMeta,
}

impl Record {
    /// The baseline record used when no prior record exists.
    pub fn prototype(region_id: impl Into<String>) -> Self {
        Self {
            region_id: region_id.into(),
            last_updated: None,
            fact: None,
            preset: None,
            last_update_status: UpdateStatus::idle(),
            status_history: Vec::new(),
            meta: RecordMeta::default(),
        }
    }

    /// Build a prototype from a user-supplied JSON document.
    ///
    /// Top-level keys in `custom` override the built-in prototype; missing
    /// keys keep their defaults. `regionId` is always replaced by `region_id`.
    pub fn prototype_from_json(custom: &Value, region_id: &str) -> Result<Self, GridcastError> {
        let mut base = serde_json::to_value(Self::prototype(region_id))
            .map_err(|e| GridcastError::Config(format!("failed to encode prototype: {e}")))?;
        if let (Some(base_obj), Some(custom_obj)) = (base.as_object_mut(), custom.as_object()) {
            for (key, value) in custom_obj {
                base_obj.insert(key.clone(), value.clone());
            }
            base_obj.insert("regionId".to_string(), Value::String(region_id.to_string()));
        } else {
            return Err(GridcastError::Config(
                "record prototype must be a JSON object".to_string(),
            ));
        }
        serde_json::from_value(base)
            .map_err(|e| GridcastError::Config(format!("invalid record prototype: {e}")))
    }

    /// Replace `lastUpdateStatus` and append it to the bounded history.
    pub fn push_status(&mut self, status: UpdateStatus) {
        self.status_history.push(status.clone());
        if self.status_history.len() > HISTORY_LIMIT {
            let excess = self.status_history.len() - HISTORY_LIMIT;
            self.status_history.drain(..excess);
        }
        self.last_update_status = status;
    }

    /// Whether the record carries data the render path can use.
    pub fn is_renderable(&self) -> bool {
        self.fact.as_ref().is_some_and(|f| !f.is_null())
    }
}
