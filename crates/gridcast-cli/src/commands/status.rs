use std::path::Path;

use anyhow::{Context, Result};

use gridcast_extract::RecordStore;
use gridcast_types::Record;

/// Run the `gridcast status` command.
///
/// Prints one line per readable record: region, status, attempt, code, last
/// successful update and a prefix of the content hash.
pub fn run(data: &Path) -> Result<()> {
    let store = RecordStore::new(data);
    let records = store
        .list()
        .with_context(|| format!("cannot read records from {}", data.display()))?;

    println!("Gridcast Status: {}", data.display());
    println!("{}", "-".repeat(40));
    if records.is_empty() {
        println!("  No records found.");
        return Ok(());
    }

    for (_, record) in &records {
        println!("{}", status_line(record));
    }
    Ok(())
}

fn status_line(record: &Record) -> String {
    let status = &record.last_update_status;
    let last_updated = record
        .last_updated
        .map(|t| t.format("%Y-%m-%d %H:%M:%SZ").to_string())
        .unwrap_or_else(|| "never".to_string());
    let hash = record
        .meta
        .content_hash
        .as_deref()
        .map(|h| h.chars().take(12).collect::<String>())
        .unwrap_or_else(|| "-".to_string());
    let code = status
        .code
        .map(|c| c.to_string())
        .unwrap_or_else(|| "-".to_string());
    let mut line = format!(
        "  {:<20} {:<7} attempt {:<4} code {:<4} updated {:<20} hash {}",
        record.region_id,
        status.status.as_str(),
        status.attempt.0,
        code,
        last_updated,
        hash
    );
    if let Some(message) = status.message.as_deref().filter(|_| !status.ok) {
        line.push_str(&format!("\n      {message}"));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use gridcast_types::{Attempt, StatusKind};

    #[test]
    fn test_status_line_for_fresh_record() {
        let line = status_line(&Record::prototype("kyiv"));
        assert!(line.contains("kyiv"));
        assert!(line.contains("idle"));
        assert!(line.contains("never"));
    }

    #[test]
    fn test_status_line_for_error_record() {
        let mut record = Record::prototype("odesa");
        record.last_updated = Some(chrono::Utc.with_ymd_and_hms(2024, 1, 5, 8, 0, 0).unwrap());
        record.meta.content_hash = Some("abcdef0123456789".into());
        record.last_update_status.status = StatusKind::Error;
        record.last_update_status.ok = false;
        record.last_update_status.code = Some(422);
        record.last_update_status.attempt = Attempt(7);
        record.last_update_status.message = Some("unbalanced literal".into());

        let line = status_line(&record);
        assert!(line.contains("error"));
        assert!(line.contains("attempt 7"));
        assert!(line.contains("code 422"));
        assert!(line.contains("2024-01-05 08:00:00Z"));
        assert!(line.contains("hash abcdef012345"));
        assert!(line.contains("unbalanced literal"));
    }

    #[test]
    fn test_missing_dir_is_an_error() {
        assert!(run(Path::new("/nonexistent/gridcast")).is_err());
    }
}
