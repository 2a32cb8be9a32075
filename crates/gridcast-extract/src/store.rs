//! Persistent per-region record store.
//!
//! Records live at `<dir>/<stem>.json`. Writes go to a temporary sibling and
//! are renamed into place, so a concurrent reader sees either the old record
//! or the new one, never a partial write. A failed extraction only replaces
//! `lastUpdateStatus`; previously stored payloads are kept.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};

use gridcast_types::{GridcastError, ParseModes, Record, StatusEvent};

/// Payloads decoded from one successful extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPayload {
    pub fact: Value,
    pub preset: Option<Value>,
    /// Exact extracted literal text of `fact`.
    pub fact_text: String,
    /// Exact extracted literal text of `preset`, if the marker was present.
    pub preset_text: Option<String>,
    pub modes: ParseModes,
}

/// Hex SHA-256 over the fact literal followed by the preset literal (or "").
pub fn content_hash(fact_text: &str, preset_text: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(fact_text.as_bytes());
    hasher.update(preset_text.unwrap_or("").as_bytes());
    hex::encode(hasher.finalize())
}

/// Build the record for a successful parse.
///
/// `previous` is the existing record (or the prototype); only its status,
/// history and content hash are consulted.
pub fn build_success(
    region_id: &str,
    payload: ParsedPayload,
    previous: &Record,
    now: DateTime<Utc>,
) -> Record {
    let hash = content_hash(&payload.fact_text, payload.preset_text.as_deref());
    let changed = previous.meta.content_hash.as_deref() != Some(hash.as_str());

    let mut record = previous.clone();
    record.region_id = region_id.to_string();
    record.fact = Some(payload.fact);
    record.preset = payload.preset;
    record.last_updated = Some(now);
    record.meta.content_hash = Some(hash);
    record.meta.changed = changed;
    record.meta.parse_mode = Some(payload.modes);
    record.meta.schema_version = gridcast_types::SCHEMA_VERSION;

    let status = previous
        .last_update_status
        .transition(StatusEvent::Parsed, now);
    record.push_status(status);
    record
}

/// Build the record for a failed extraction.
///
/// Starts from `base` (the existing record, or the prototype) and replaces
/// the status; `fact`, `preset`, `lastUpdated` and the content hash are
/// untouched. `meta.changed` is cleared, since nothing new was stored.
pub fn build_error(
    base: Record,
    region_id: &str,
    code: i64,
    message: impl Into<String>,
    now: DateTime<Utc>,
) -> Record {
    let mut record = base;
    if record.region_id.is_empty() {
        record.region_id = region_id.to_string();
    }
    record.meta.changed = false;
    let status = record.last_update_status.transition(
        StatusEvent::Failed {
            code,
            message: message.into(),
        },
        now,
    );
    record.push_status(status);
    record
}

/// Write `record` to `path` atomically (write tmp, then rename).
pub fn persist(path: &Path, record: &Record) -> Result<(), GridcastError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| GridcastError::Io {
            context: format!("failed to create record dir {}", parent.display()),
            source: e,
        })?;
    }

    let json = serde_json::to_string_pretty(record)
        .map_err(|e| GridcastError::Config(format!("failed to serialize record: {e}")))?;

    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, json.as_bytes()).map_err(|e| GridcastError::Io {
        context: format!("failed to write {}", tmp_path.display()),
        source: e,
    })?;
    std::fs::rename(&tmp_path, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp_path);
        GridcastError::Io {
            context: format!("failed to rename record into {}", path.display()),
            source: e,
        }
    })
}

/// Load a record, treating a missing or unreadable file as absent.
pub fn load_existing(path: &Path) -> Option<Record> {
    let content = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring corrupt record");
            None
        }
    }
}

/// Directory of region records plus the prototype used for new regions.
#[derive(Debug, Clone)]
pub struct RecordStore {
    dir: PathBuf,
    prototype: Option<Value>,
}

impl RecordStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            prototype: None,
        }
    }

    /// Use a custom prototype document for regions without a record.
    #[must_use]
    pub fn with_prototype(mut self, prototype: Value) -> Self {
        self.prototype = Some(prototype);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for a source file stem.
    pub fn record_path(&self, stem: &str) -> PathBuf {
        self.dir.join(format!("{stem}.json"))
    }

    /// The baseline record for a region with no prior record.
    pub fn prototype(&self, region_id: &str) -> Record {
        match &self.prototype {
            Some(custom) => match Record::prototype_from_json(custom, region_id) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(error = %e, "falling back to built-in record prototype");
                    Record::prototype(region_id)
                }
            },
            None => Record::prototype(region_id),
        }
    }

    /// Every readable record in the store, sorted by file name.
    pub fn list(&self) -> Result<Vec<(PathBuf, Record)>, GridcastError> {
        let entries =
            std::fs::read_dir(&self.dir).map_err(|e| GridcastError::from_io(&self.dir, e))?;
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();

        Ok(paths
            .into_iter()
            .filter_map(|p| load_existing(&p).map(|r| (p, r)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridcast_types::{Attempt, ParseMode, StatusKind};
    use serde_json::json;

    fn payload(fact_text: &str, preset_text: Option<&str>) -> ParsedPayload {
        ParsedPayload {
            fact: serde_json::from_str(fact_text).unwrap(),
            preset: preset_text.map(|t| serde_json::from_str(t).unwrap()),
            fact_text: fact_text.to_string(),
            preset_text: preset_text.map(str::to_string),
            modes: ParseModes {
                fact: ParseMode::Strict,
                preset: preset_text.map(|_| ParseMode::Strict),
            },
        }
    }

    #[test]
    fn test_content_hash_concatenates_texts() {
        assert_eq!(
            content_hash("{\"a\":1}", None),
            content_hash("{\"a\":1}", Some(""))
        );
        assert_eq!(content_hash("ab", Some("c")), content_hash("a", Some("bc")));
        assert_ne!(content_hash("{\"a\":1}", None), content_hash("{\"a\": 1}", None));
        assert_eq!(content_hash("", None).len(), 64);
    }

    #[test]
    fn test_build_success_fields() {
        let prev = Record::prototype("kyiv");
        let now = Utc::now();
        let rec = build_success("kyiv", payload("{\"a\":1}", None), &prev, now);
        assert_eq!(rec.fact, Some(json!({"a": 1})));
        assert!(rec.preset.is_none());
        assert_eq!(rec.last_update_status.status, StatusKind::Parsed);
        assert_eq!(rec.last_update_status.code, Some(200));
        assert_eq!(rec.last_update_status.attempt, Attempt(1));
        assert_eq!(rec.last_updated, Some(now));
        assert!(rec.meta.changed);
        assert_eq!(
            rec.meta.content_hash.as_deref(),
            Some(content_hash("{\"a\":1}", None).as_str())
        );
    }

    #[test]
    fn test_unchanged_content_is_not_flagged() {
        let now = Utc::now();
        let first = build_success("r", payload("[1]", Some("{}")), &Record::prototype("r"), now);
        let second = build_success("r", payload("[1]", Some("{}")), &first, now);
        assert!(!second.meta.changed);
        assert_eq!(second.last_update_status.attempt, Attempt(2));
    }

    #[test]
    fn test_error_keeps_payloads() {
        let now = Utc::now();
        let ok = build_success(
            "r",
            payload("{\"a\":1}", Some("{\"GPV1.1\":{}}")),
            &Record::prototype("r"),
            now,
        );
        let failed = build_error(ok.clone(), "r", 422, "bad literal", now);
        assert_eq!(failed.fact, ok.fact);
        assert_eq!(failed.preset, ok.preset);
        assert_eq!(failed.last_updated, ok.last_updated);
        assert!(ok.meta.changed);
        assert!(!failed.meta.changed);
        assert_eq!(failed.meta.content_hash, ok.meta.content_hash);
        assert_eq!(failed.meta.parse_mode, ok.meta.parse_mode);
        assert_eq!(failed.last_update_status.status, StatusKind::Error);
        assert!(!failed.last_update_status.ok);
        assert_eq!(failed.last_update_status.code, Some(422));
        assert_eq!(failed.last_update_status.attempt, Attempt(2));
        assert_eq!(failed.status_history.len(), 2);
    }

    #[test]
    fn test_error_on_fresh_region_uses_prototype() {
        let rec = build_error(Record::prototype("new"), "new", 404, "missing", Utc::now());
        assert_eq!(rec.region_id, "new");
        assert!(rec.fact.is_none());
        assert_eq!(rec.last_update_status.attempt, Attempt(1));
    }

    #[test]
    fn test_persist_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path().join("records"));
        let path = store.record_path("kyiv");
        let rec = build_success("kyiv", payload("{\"a\":1}", None), &Record::prototype("kyiv"), Utc::now());
        persist(&path, &rec).unwrap();

        assert!(!path.with_extension("json.tmp").exists());
        assert_eq!(load_existing(&path), Some(rec));
    }

    #[test]
    fn test_corrupt_record_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(load_existing(&path).is_none());
        assert!(load_existing(&dir.path().join("missing.json")).is_none());
    }

    #[test]
    fn test_list_skips_unreadable_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::new(dir.path());
        persist(&store.record_path("b"), &Record::prototype("b")).unwrap();
        persist(&store.record_path("a"), &Record::prototype("a")).unwrap();
        std::fs::write(dir.path().join("c.json"), "garbage").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "{}").unwrap();

        let ids: Vec<String> = store
            .list()
            .unwrap()
            .into_iter()
            .map(|(_, r)| r.region_id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_custom_prototype() {
        let store = RecordStore::new("unused").with_prototype(json!({"preset": {"GPV1.1": []}}));
        let rec = store.prototype("zp");
        assert_eq!(rec.region_id, "zp");
        assert_eq!(rec.preset, Some(json!({"GPV1.1": []})));

        let broken = RecordStore::new("unused").with_prototype(json!("nope"));
        assert_eq!(broken.prototype("zp"), Record::prototype("zp"));
    }
}
