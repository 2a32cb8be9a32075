//! Shared helpers for integration tests.
//!
//! Each integration test file compiles common/ as its own module, so not
//! every helper is used in every file.
#![allow(dead_code)]

use std::path::{Path, PathBuf};

use gridcast_extract::{ExtractOptions, RecordStore};
use gridcast_types::ExtractConfig;

/// Workspace root (the parent of `tests/`).
pub fn workspace_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .expect("tests/ should have a parent")
        .to_path_buf()
}

/// Extraction options with the default markers and Kyiv time.
pub fn default_opts() -> ExtractOptions {
    ExtractOptions::from_config(&ExtractConfig::default()).expect("default extract config is valid")
}

/// An HTML page embedding the given literals the way the source sites do.
pub fn schedule_page(fact: &str, preset: Option<&str>) -> String {
    let mut script = format!("DisconSchedule.fact = {fact};\n");
    if let Some(preset) = preset {
        script.push_str(&format!("      DisconSchedule.preset = {preset};\n"));
    }
    format!(
        "<!doctype html>\n<html>\n  <head><title>Schedule</title></head>\n  <body>\n    <div id=\"app\"></div>\n    <script>\n      {script}    </script>\n  </body>\n</html>\n"
    )
}

/// Write `<dir>/<stem>.html` and return its path.
pub fn write_page(dir: &Path, stem: &str, html: &str) -> PathBuf {
    std::fs::create_dir_all(dir).expect("create page dir");
    let path = dir.join(format!("{stem}.html"));
    std::fs::write(&path, html).expect("write page");
    path
}

/// Record store rooted at `<dir>/data`.
pub fn store_in(dir: &Path) -> RecordStore {
    RecordStore::new(dir.join("data"))
}

/// A realistic fact literal with two groups and intervals for one day.
pub const KYIV_FACT: &str = r#"{"regionId":"kyiv","update":"05.01.2024 07:45","data":{"1704405600":{"GPV1.1":[{"date":"2024-01-05","start":"8:00","end":"10:00"}],"GPV1.2":[{"date":"2024-01-05","from":"18:00","to":"24:00"}]}}}"#;

/// A preset literal that only the permissive decoder accepts.
pub const KYIV_PRESET: &str = "{ 'GPV1.1': { name: 'Group 1.1', }, 'GPV2.1': { name: 'Group 2.1' }, }";

/// Minimal templates tree that satisfies the template catalog.
pub fn write_minimal_templates(root: &Path) {
    let dir = root.join("templates");
    std::fs::create_dir_all(&dir).expect("create templates dir");
    for name in ["matrix.html", "daily.html", "summary.html", "overview.html"] {
        std::fs::write(dir.join(name), "<!doctype html><div id=\"capture\"></div>")
            .expect("write template");
    }
}
