use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;

use gridcast_extract::{collect_sources, extract_region, record_crash, ExtractOptions, RecordStore};

use crate::commands::load_config;

/// Run the `gridcast extract` command.
///
/// Exits non-zero only when the input itself is missing. Per-region
/// failures are persisted into the region's record and reported here, and a
/// panic in the data path is converted into a best-effort error record.
pub fn run(
    input: &Path,
    out: &Path,
    config_path: Option<&Path>,
    prototype_path: Option<&Path>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let opts = ExtractOptions::from_config(&config.extract).context("invalid extract settings")?;

    let sources = collect_sources(input)
        .with_context(|| format!("cannot read input {}", input.display()))?;
    if sources.is_empty() {
        println!("No HTML sources found in {}", input.display());
        return Ok(());
    }

    let mut store = RecordStore::new(out);
    if let Some(path) = prototype_path {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read prototype {}", path.display()))?;
        let value: serde_json::Value = serde_json::from_str(&text)
            .with_context(|| format!("prototype {} is not valid JSON", path.display()))?;
        store = store.with_prototype(value);
    }

    let mut parsed = 0usize;
    let mut failed = 0usize;
    for source in &sources {
        let attempt = panic::catch_unwind(AssertUnwindSafe(|| {
            extract_region(source, &store, &opts, Utc::now())
        }));
        let result = match attempt {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(source = %source.display(), panic = %message, "extraction crashed");
                record_crash(source, &store, &message, Utc::now())
            }
        };

        match result {
            Ok(outcome) if outcome.is_parsed() => {
                parsed += 1;
                println!(
                    "  {:<20} parsed   attempt {:<4} {}{}",
                    outcome.region_id,
                    outcome.attempt.0,
                    if outcome.changed { "changed" } else { "unchanged" },
                    if outcome.normalized > 0 {
                        format!(", {} interval(s) normalized", outcome.normalized)
                    } else {
                        String::new()
                    }
                );
            }
            Ok(outcome) => {
                failed += 1;
                println!(
                    "  {:<20} error    attempt {:<4} [{}] {}",
                    outcome.region_id,
                    outcome.attempt.0,
                    outcome.code.map(|c| c.to_string()).unwrap_or_default(),
                    outcome.message.unwrap_or_default()
                );
            }
            Err(e) => {
                failed += 1;
                eprintln!("  {}: record not written: {e}", source.display());
            }
        }
    }

    println!(
        "Extracted {} source(s) into {}: {parsed} parsed, {failed} failed",
        sources.len(),
        out.display()
    );
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message() {
        let payload = panic::catch_unwind(|| panic!("bad {}", 1)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "bad 1");

        let payload = panic::catch_unwind(|| panic!("static")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "static");

        let payload = panic::catch_unwind(|| std::panic::panic_any(7u8)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[test]
    fn test_extract_directory_persists_every_region() {
        let dir = tempfile::tempdir().unwrap();
        let pages = dir.path().join("pages");
        std::fs::create_dir_all(&pages).unwrap();
        std::fs::write(
            pages.join("kyiv.html"),
            r#"<script>DisconSchedule.fact = {"data":{}}; DisconSchedule.preset = {"GPV1.1":[]};</script>"#,
        )
        .unwrap();
        std::fs::write(pages.join("broken.html"), "<html>no schedule</html>").unwrap();

        let out = dir.path().join("data");
        let config = dir.path().join("gridcast.toml");
        std::fs::write(&config, "").unwrap();
        run(&pages, &out, Some(&config), None).unwrap();

        assert!(out.join("kyiv.json").is_file());
        assert!(out.join("broken.json").is_file());
    }

    #[test]
    fn test_missing_input_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("gridcast.toml");
        std::fs::write(&config, "").unwrap();
        let err = run(
            &dir.path().join("missing.html"),
            &dir.path().join("data"),
            Some(&config),
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("cannot read input"));
    }
}
