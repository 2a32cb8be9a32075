//! Integration tests for turning extracted records into render tasks.

mod common;

use std::path::Path;

use chrono::Utc;

use gridcast_extract::extract_region;
use gridcast_render::{load_eligible_records, plan_tasks, record_groups, verify_templates, TemplateKind};
use gridcast_types::{Day, GroupPattern, Theme};

use common::{default_opts, schedule_page, store_in, workspace_root, write_page, KYIV_FACT, KYIV_PRESET};

#[test]
fn test_extracted_records_expand_into_tasks() {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = store_in(dir.path());
    let opts = default_opts();
    let pages = dir.path().join("pages");

    let kyiv = write_page(&pages, "kyiv", &schedule_page(KYIV_FACT, Some(KYIV_PRESET)));
    let broken = write_page(&pages, "broken", "<html>nothing here</html>");
    extract_region(&kyiv, &store, &opts, Utc::now()).expect("extract kyiv");
    extract_region(&broken, &store, &opts, Utc::now()).expect("extract broken");

    // The broken region has an error record with no fact: not eligible.
    let records = load_eligible_records(store.dir()).expect("load records");
    assert_eq!(records.len(), 1);

    let pattern = GroupPattern::new("GPV").expect("pattern");
    let groups: Vec<String> = record_groups(&records[0], &pattern)
        .into_iter()
        .map(|g| g.id)
        .collect();
    assert_eq!(groups, vec!["GPV1.1", "GPV1.2", "GPV2.1"]);

    let out = Path::new("/tmp/gridcast-out");
    let tasks = plan_tasks(records[0].clone(), &pattern, Theme::Light, out);
    assert_eq!(tasks.len(), 4 * groups.len() + 2);

    let mut files: Vec<String> = tasks
        .iter()
        .map(|t| {
            t.output_path
                .strip_prefix(out.join("kyiv"))
                .expect("output under region dir")
                .display()
                .to_string()
        })
        .collect();
    files.sort();
    assert_eq!(files.len(), 14);
    assert!(files.contains(&"gpv-2-1-summary.png".to_string()));
    assert!(files.contains(&"gpv-1-2-today.png".to_string()));
    assert!(files.contains(&"overview-today.png".to_string()));
    assert!(files.contains(&"overview-tomorrow.png".to_string()));

    let daily: Vec<Option<Day>> = tasks
        .iter()
        .filter(|t| t.template == TemplateKind::Tomorrow)
        .map(|t| t.day)
        .collect();
    assert!(daily.iter().all(|d| *d == Some(Day::Tomorrow)));
}

#[test]
fn test_output_paths_are_unique() {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = store_in(dir.path());
    let page = write_page(dir.path(), "kyiv", &schedule_page(KYIV_FACT, Some(KYIV_PRESET)));
    extract_region(&page, &store, &default_opts(), Utc::now()).expect("extract");

    let records = load_eligible_records(store.dir()).expect("load");
    let pattern = GroupPattern::new("GPV").expect("pattern");
    let tasks = plan_tasks(records[0].clone(), &pattern, Theme::Dark, Path::new("out"));
    let mut paths: Vec<_> = tasks.iter().map(|t| t.output_path.clone()).collect();
    paths.sort();
    paths.dedup();
    assert_eq!(paths.len(), tasks.len());
}

#[test]
fn test_shipped_templates_are_complete() {
    verify_templates(&workspace_root()).expect("templates/ should contain every template file");
}
