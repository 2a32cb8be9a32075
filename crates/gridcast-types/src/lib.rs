//! Core types shared across all gridcast crates.
//!
//! Defines the persisted region record, its update-status state machine,
//! outage group identifiers, render selectors, configuration, and the error
//! taxonomy used by the extraction and render paths.

pub mod config;
pub mod error;
pub mod group;
pub mod record;
pub mod selector;
pub mod status;

pub use config::{
    parse_timezone, BrowserConfig, ExtractConfig, GridcastConfig, RenderConfig, CONFIG_FILENAME,
};
pub use error::GridcastError;
pub use group::{GroupPattern, OutageGroup};
pub use record::{ParseMode, ParseModes, Record, RecordMeta, HISTORY_LIMIT, SCHEMA_VERSION};
pub use selector::{Day, Theme};
pub use status::{Attempt, StatusEvent, StatusKind, UpdateStatus};
