//! End-to-end smoke tests that invoke the `gridcast` binary.
//!
//! Uses `assert_cmd` and runs every command from a temp directory so no
//! `gridcast.toml` from the developer's checkout is picked up.
//!
//! The `gridcast` binary is built on first use:
//!   cargo build -p gridcast-cli && cargo test --test test_smoke

mod common;

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Once;

use common::{schedule_page, workspace_root, write_page, KYIV_FACT, KYIV_PRESET};

static BUILD_ONCE: Once = Once::new();

/// Ensure the gridcast binary is built, then return its path.
fn gridcast_bin() -> PathBuf {
    let workspace_root = workspace_root();

    BUILD_ONCE.call_once(|| {
        let status = std::process::Command::new("cargo")
            .args(["build", "-p", "gridcast-cli"])
            .current_dir(&workspace_root)
            .status()
            .expect("failed to invoke cargo build");
        assert!(status.success(), "cargo build -p gridcast-cli failed");
    });

    let bin = workspace_root.join("target").join("debug").join("gridcast");
    assert!(bin.exists(), "gridcast binary not found at {}", bin.display());
    bin
}

/// Get a Command for the `gridcast` binary running inside `cwd`.
fn gridcast_cmd(cwd: &Path) -> Command {
    let mut cmd = Command::new(gridcast_bin());
    cmd.current_dir(cwd);
    cmd.env_remove("GRIDCAST_BROWSER_BIN");
    cmd.env_remove("GRIDCAST_CDP_WS");
    cmd
}

#[test]
fn smoke_extract_missing_input_fails() {
    let tmpdir = tempfile::tempdir().expect("temp dir");
    gridcast_cmd(tmpdir.path())
        .args(["extract", "--input", "does-not-exist.html"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does-not-exist.html"));
}

#[test]
fn smoke_extract_directory_writes_records() {
    let tmpdir = tempfile::tempdir().expect("temp dir");
    let pages = tmpdir.path().join("pages");
    write_page(&pages, "kyiv", &schedule_page(KYIV_FACT, Some(KYIV_PRESET)));
    write_page(&pages, "lutsk", "<html>maintenance</html>");

    // A failing region still exits zero.
    gridcast_cmd(tmpdir.path())
        .args(["extract", "--input", "pages", "--out", "data"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("1 parsed, 1 failed")
                .and(predicate::str::contains("kyiv")),
        );

    assert!(tmpdir.path().join("data").join("kyiv.json").is_file());
    assert!(tmpdir.path().join("data").join("lutsk.json").is_file());

    gridcast_cmd(tmpdir.path())
        .args(["status", "--data", "data"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("parsed")
                .and(predicate::str::contains("code 404"))
                .and(predicate::str::contains("lutsk")),
        );
}

#[test]
fn smoke_render_without_records_is_a_no_op() {
    let tmpdir = tempfile::tempdir().expect("temp dir");
    std::fs::create_dir_all(tmpdir.path().join("data")).expect("mkdir");

    gridcast_cmd(tmpdir.path())
        .args(["render", "--data", "data", "--out", "out"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No eligible records"));
    assert!(!tmpdir.path().join("out").exists());
}

#[test]
fn smoke_render_without_templates_fails() {
    let tmpdir = tempfile::tempdir().expect("temp dir");
    let page = write_page(tmpdir.path(), "kyiv", &schedule_page(KYIV_FACT, None));

    gridcast_cmd(tmpdir.path())
        .args(["extract", "--input"])
        .arg(&page)
        .args(["--out", "data"])
        .assert()
        .success();

    // The root has no templates/ directory.
    gridcast_cmd(tmpdir.path())
        .args(["render", "--data", "data", "--out", "out", "--root", "."])
        .assert()
        .failure()
        .stderr(predicate::str::contains("template"));
}

#[test]
fn smoke_render_one_rejects_group_template_without_group() {
    let tmpdir = tempfile::tempdir().expect("temp dir");
    let page = write_page(tmpdir.path(), "kyiv", &schedule_page(KYIV_FACT, None));
    gridcast_cmd(tmpdir.path())
        .args(["extract", "--input"])
        .arg(&page)
        .args(["--out", "data"])
        .assert()
        .success();

    gridcast_cmd(tmpdir.path())
        .args([
            "render-one",
            "--record",
            "data/kyiv.json",
            "--template",
            "week",
            "--out",
            "week.png",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--group"));
}

#[test]
fn smoke_help_lists_commands() {
    let tmpdir = tempfile::tempdir().expect("temp dir");
    gridcast_cmd(tmpdir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("extract")
                .and(predicate::str::contains("render"))
                .and(predicate::str::contains("status")),
        );
}
