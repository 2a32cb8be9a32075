//! Rendering against a real Chromium.
//!
//! Ignored by default. Run with a browser on PATH (or GRIDCAST_BROWSER_BIN
//! set, or GRIDCAST_CDP_WS pointing at a running instance):
//!   cargo test --test test_browser_render -- --ignored

mod common;

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;

use gridcast_extract::extract_region;
use gridcast_render::{load_eligible_records, plan_tasks, RenderSession, TemplateKind};
use gridcast_types::{GridcastConfig, GroupPattern, Theme};

use common::{
    default_opts, schedule_page, store_in, workspace_root, write_minimal_templates, write_page,
    KYIV_FACT, KYIV_PRESET,
};

const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

fn test_config() -> GridcastConfig {
    let mut config = GridcastConfig::default();
    config.apply_env(|key| std::env::var(key).ok());
    config.render.ready_timeout_ms = 5_000;
    config.render.concurrency = 2;
    config
}

fn kyiv_record(dir: &Path) -> Arc<gridcast_types::Record> {
    let store = store_in(dir);
    let page = write_page(dir, "kyiv", &schedule_page(KYIV_FACT, Some(KYIV_PRESET)));
    extract_region(&page, &store, &default_opts(), Utc::now()).expect("extract");
    load_eligible_records(store.dir())
        .expect("load")
        .into_iter()
        .next()
        .expect("kyiv record")
}

#[tokio::test(flavor = "multi_thread")]
#[ignore] // Requires a Chromium binary
async fn test_renders_every_template_for_a_region() {
    let dir = tempfile::tempdir().expect("temp dir");
    let record = kyiv_record(dir.path());
    let out = dir.path().join("out");
    let config = test_config();

    let pattern = GroupPattern::new(&config.extract.group_prefix).expect("pattern");
    let tasks = plan_tasks(record, &pattern, Theme::Light, &out);
    let expected = tasks.len();

    let session = RenderSession::start(&workspace_root(), &config)
        .await
        .expect("start session");
    let summary = session.run(tasks, config.render.concurrency).await;
    session.finish().await;

    assert!(summary.is_success(), "failures: {:?}", summary.failures);
    assert_eq!(summary.succeeded, expected);
    for path in &summary.outputs {
        let bytes = std::fs::read(path).expect("read image");
        assert!(bytes.starts_with(PNG_MAGIC), "{} is not a PNG", path.display());
    }
    assert!(out.join("kyiv").join("overview-today.png").is_file());
    assert!(out.join("kyiv").join("gpv-1-1-week.png").is_file());
}

#[tokio::test(flavor = "multi_thread")]
#[ignore] // Requires a Chromium binary
async fn test_template_without_completion_signal_fails_alone() {
    let dir = tempfile::tempdir().expect("temp dir");
    let record = kyiv_record(dir.path());
    let out = dir.path().join("out");

    // Copy the real templates, then replace the summary template with one
    // that never signals completion.
    let root = dir.path().join("site");
    write_minimal_templates(&root);
    for name in ["matrix.html", "daily.html", "overview.html", "common.js", "style.css"] {
        std::fs::copy(
            workspace_root().join("templates").join(name),
            root.join("templates").join(name),
        )
        .expect("copy template");
    }

    let config = test_config();
    let pattern = GroupPattern::new(&config.extract.group_prefix).expect("pattern");
    let tasks = plan_tasks(record, &pattern, Theme::Dark, &out);
    let summaries = tasks
        .iter()
        .filter(|t| t.template == TemplateKind::Summary)
        .count();
    let total = tasks.len();

    let session = RenderSession::start(&root, &config).await.expect("start session");
    let summary = session.run(tasks, config.render.concurrency).await;
    session.finish().await;

    assert_eq!(summary.failed, summaries);
    assert_eq!(summary.succeeded, total - summaries);
    assert!(summary
        .failures
        .iter()
        .all(|f| f.kind == "RenderTimeoutError" && f.label.contains("summary")));
    assert!(!out.join("kyiv").join("gpv-1-1-summary.png").exists());
}
