//! Render task planning.
//!
//! Each eligible record expands into four per-group tasks for every outage
//! group it mentions plus two aggregate tasks, `4 * groups + 2` in total.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use gridcast_types::{Day, GridcastError, GroupPattern, OutageGroup, Record, Theme};

use crate::templates::TemplateKind;

/// One screenshot to produce. Consumed exactly once by the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTask {
    pub template: TemplateKind,
    pub region: String,
    pub group: Option<OutageGroup>,
    pub day: Option<Day>,
    pub theme: Theme,
    pub output_path: PathBuf,
    /// Record snapshot taken at scheduling time.
    pub record: Arc<Record>,
}

impl RenderTask {
    pub fn new(
        template: TemplateKind,
        record: Arc<Record>,
        group: Option<OutageGroup>,
        theme: Theme,
        out_dir: &Path,
    ) -> Self {
        let region = record.region_id.clone();
        let output_path = out_dir
            .join(&region)
            .join(template.output_filename(group.as_ref()));
        Self {
            template,
            region,
            group,
            day: template.day(),
            theme,
            output_path,
            record,
        }
    }

    /// Short label for logs: `region/template[/group]`.
    pub fn label(&self) -> String {
        match &self.group {
            Some(group) => format!("{}/{}/{}", self.region, self.template, group),
            None => format!("{}/{}", self.region, self.template),
        }
    }

    /// Page-global state installed before template scripts run.
    pub fn injection_script(&self) -> Result<String, GridcastError> {
        let serialize_err =
            |e: serde_json::Error| GridcastError::Config(format!("failed to serialize page state: {e}"));
        let record = serde_json::to_value(&*self.record).map_err(serialize_err)?;
        let state = serde_json::json!({
            "record": record,
            "group": self.group.as_ref().map(|g| g.id.as_str()),
            "day": self.day.map(Day::as_str),
            "theme": self.theme.as_str(),
        });
        let json = serde_json::to_string(&state).map_err(serialize_err)?;
        Ok(format!(
            "Object.defineProperty(window, '__GRIDCAST__', {{ value: Object.freeze({json}), configurable: false }});"
        ))
    }
}

/// Outage groups referenced by a record's `preset` and `fact`.
pub fn record_groups(record: &Record, pattern: &GroupPattern) -> Vec<OutageGroup> {
    pattern.collect(record.preset.iter().chain(record.fact.iter()))
}

/// Expand one record into its render tasks.
pub fn plan_tasks(
    record: Arc<Record>,
    pattern: &GroupPattern,
    theme: Theme,
    out_dir: &Path,
) -> Vec<RenderTask> {
    let groups = record_groups(&record, pattern);
    let mut tasks = Vec::with_capacity(groups.len() * TemplateKind::PER_GROUP.len() + 2);
    for group in groups {
        for template in TemplateKind::PER_GROUP {
            tasks.push(RenderTask::new(
                template,
                Arc::clone(&record),
                Some(group.clone()),
                theme,
                out_dir,
            ));
        }
    }
    for template in TemplateKind::AGGREGATE {
        tasks.push(RenderTask::new(template, Arc::clone(&record), None, theme, out_dir));
    }
    tasks
}

/// Records in `dir` that can be rendered (`fact` present), sorted by file
/// name. Unreadable or non-record files are skipped with a warning.
pub fn load_eligible_records(dir: &Path) -> Result<Vec<Arc<Record>>, GridcastError> {
    let entries = std::fs::read_dir(dir).map_err(|e| GridcastError::from_io(dir, e))?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut records = Vec::new();
    for path in paths {
        match load_record(&path) {
            Ok(record) if record.is_renderable() => records.push(Arc::new(record)),
            Ok(_) => tracing::debug!(path = %path.display(), "skipping record without fact"),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable record"),
        }
    }
    Ok(records)
}

/// Read a single record file.
pub fn load_record(path: &Path) -> Result<Record, GridcastError> {
    let content = std::fs::read_to_string(path).map_err(|e| GridcastError::from_io(path, e))?;
    serde_json::from_str(&content)
        .map_err(|e| GridcastError::Config(format!("{} is not a record: {e}", path.display())))
}
