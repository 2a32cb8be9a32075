//! Schedule extraction and persistence for gridcast.
//!
//! Locates script-literal assignments in third-party HTML, decodes them,
//! attaches offset-qualified timestamps to group intervals, and keeps one
//! crash-safe JSON record per region with attempt bookkeeping and a content
//! fingerprint.

pub mod balanced;
pub mod literal;
pub mod normalize;
pub mod pipeline;
pub mod store;

pub use balanced::{extract_balanced, LiteralSpan, ScanMode};
pub use literal::{parse_literal, Decoded};
pub use normalize::{normalize_intervals, normalize_pair, zoned_timestamp};
pub use pipeline::{
    collect_sources, extract_region, record_crash, ExtractOptions, ExtractOutcome,
};
pub use store::{
    build_error, build_success, content_hash, load_existing, persist, ParsedPayload, RecordStore,
};
