//! Per-region extraction pipeline.
//!
//! HTML source → balanced scan → dual-mode decode → interval normalization →
//! record store. Any failure in the data path is captured into the region's
//! persisted status instead of being returned, so one bad input never blocks
//! the others.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde_json::Value;

use gridcast_types::{
    parse_timezone, Attempt, ExtractConfig, GridcastError, GroupPattern, ParseModes, Record,
    StatusKind,
};

use crate::balanced::{extract_balanced, ScanMode};
use crate::literal::parse_literal;
use crate::normalize::normalize_intervals;
use crate::store::{build_error, build_success, load_existing, persist, ParsedPayload, RecordStore};

/// Resolved extraction settings.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub fact_marker: String,
    pub preset_marker: String,
    pub timezone: Tz,
    pub groups: GroupPattern,
    pub scan_mode: ScanMode,
}

impl ExtractOptions {
    pub fn from_config(config: &ExtractConfig) -> Result<Self, GridcastError> {
        Ok(Self {
            fact_marker: config.fact_marker.clone(),
            preset_marker: config.preset_marker.clone(),
            timezone: parse_timezone(&config.timezone)?,
            groups: GroupPattern::new(&config.group_prefix)?,
            scan_mode: if config.string_aware_scan {
                ScanMode::StringAware
            } else {
                ScanMode::Lexical
            },
        })
    }
}

/// Summary of one region's extraction, after the record was persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractOutcome {
    pub region_id: String,
    pub record_path: PathBuf,
    pub status: StatusKind,
    pub attempt: Attempt,
    pub code: Option<i64>,
    pub message: Option<String>,
    pub changed: bool,
    /// Number of interval entries that gained offset-qualified timestamps.
    pub normalized: usize,
}

impl ExtractOutcome {
    fn from_record(record: &Record, record_path: PathBuf, normalized: usize) -> Self {
        let status = &record.last_update_status;
        Self {
            region_id: record.region_id.clone(),
            record_path,
            status: status.status,
            attempt: status.attempt,
            code: status.code,
            message: status.message.clone(),
            changed: status.status == StatusKind::Parsed && record.meta.changed,
            normalized,
        }
    }

    pub fn is_parsed(&self) -> bool {
        self.status == StatusKind::Parsed
    }
}

/// Read and decode one HTML source.
pub fn parse_source(
    html: &str,
    opts: &ExtractOptions,
) -> Result<(ParsedPayload, usize), GridcastError> {
    let fact_span = extract_balanced(html, &opts.fact_marker, opts.scan_mode)?;
    let fact = parse_literal(fact_span.text)?;

    let preset_span = match extract_balanced(html, &opts.preset_marker, opts.scan_mode) {
        Ok(span) => Some(span),
        Err(GridcastError::NotFound { .. }) => None,
        Err(e) => return Err(e),
    };
    let preset = preset_span.map(|s| parse_literal(s.text)).transpose()?;

    let mut fact_value = fact.value;
    let mut normalized = normalize_intervals(&mut fact_value, &opts.groups, opts.timezone);
    let preset_value = preset.as_ref().map(|p| {
        let mut value = p.value.clone();
        normalized += normalize_intervals(&mut value, &opts.groups, opts.timezone);
        value
    });

    Ok((
        ParsedPayload {
            fact: fact_value,
            preset: preset_value,
            fact_text: fact_span.text.to_string(),
            preset_text: preset_span.map(|s| s.text.to_string()),
            modes: ParseModes {
                fact: fact.mode,
                preset: preset.map(|p| p.mode),
            },
        },
        normalized,
    ))
}

/// Source file stem, used as the record filename and fallback region id.
pub fn source_stem(html_path: &Path) -> String {
    html_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "region".to_string())
}

/// Region id carried by the data itself (`regionId` or `region`), if any.
pub fn embedded_region_id(fact: &Value) -> Option<String> {
    let raw = ["regionId", "region"]
        .iter()
        .find_map(|k| fact.get(*k).and_then(Value::as_str))?;
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches('_').is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Extract one HTML source into its region record.
///
/// Returns `Err` only if the record itself could not be written; every
/// data-path failure is persisted as an error status and reported through
/// the returned outcome.
pub fn extract_region(
    html_path: &Path,
    store: &RecordStore,
    opts: &ExtractOptions,
    now: DateTime<Utc>,
) -> Result<ExtractOutcome, GridcastError> {
    let stem = source_stem(html_path);
    let record_path = store.record_path(&stem);
    let existing = load_existing(&record_path);
    let kept_id = existing
        .as_ref()
        .map(|r| r.region_id.clone())
        .filter(|id| !id.is_empty());

    let parsed = std::fs::read_to_string(html_path)
        .map_err(|e| GridcastError::from_io(html_path, e))
        .and_then(|html| parse_source(&html, opts));

    let (record, normalized) = match parsed {
        Ok((payload, normalized)) => {
            let region_id = kept_id
                .or_else(|| embedded_region_id(&payload.fact))
                .unwrap_or_else(|| stem.clone());
            let previous = existing.unwrap_or_else(|| store.prototype(&region_id));
            let record = build_success(&region_id, payload, &previous, now);
            tracing::info!(
                region = %record.region_id,
                attempt = %record.last_update_status.attempt,
                changed = record.meta.changed,
                normalized,
                "schedule parsed"
            );
            (record, normalized)
        }
        Err(e) => {
            let region_id = kept_id.unwrap_or_else(|| stem.clone());
            let base = existing.unwrap_or_else(|| store.prototype(&region_id));
            let record = build_error(base, &region_id, e.status_code(), e.to_string(), now);
            tracing::warn!(
                region = %record.region_id,
                attempt = %record.last_update_status.attempt,
                kind = e.kind(),
                error = %e,
                "schedule extraction failed"
            );
            (record, 0)
        }
    };

    persist(&record_path, &record)?;
    Ok(ExtractOutcome::from_record(&record, record_path, normalized))
}

/// Best-effort error write for a region whose extraction crashed.
pub fn record_crash(
    html_path: &Path,
    store: &RecordStore,
    message: &str,
    now: DateTime<Utc>,
) -> Result<ExtractOutcome, GridcastError> {
    let stem = source_stem(html_path);
    let record_path = store.record_path(&stem);
    let base = load_existing(&record_path).unwrap_or_else(|| store.prototype(&stem));
    let region_id = base.region_id.clone();
    let record = build_error(base, &region_id, 500, format!("internal error: {message}"), now);
    persist(&record_path, &record)?;
    Ok(ExtractOutcome::from_record(&record, record_path, 0))
}

/// Expand an input path into the HTML sources to extract.
///
/// A file is returned as-is; a directory yields its `*.html`/`*.htm` files
/// in sorted order.
pub fn collect_sources(input: &Path) -> Result<Vec<PathBuf>, GridcastError> {
    let meta = std::fs::metadata(input).map_err(|e| GridcastError::from_io(input, e))?;
    if meta.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    let entries = std::fs::read_dir(input).map_err(|e| GridcastError::from_io(input, e))?;
    let mut sources: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("html") || e.eq_ignore_ascii_case("htm"))
        })
        .collect();
    sources.sort();
    Ok(sources)
}
