use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use gridcast_render::{load_record, RenderSession, RenderTask, TemplateKind};
use gridcast_types::{Day, GroupPattern, Theme};

use crate::commands::render::{apply_overrides, print_summary};
use crate::commands::{load_config, runtime};

#[derive(Debug)]
pub struct RenderOneArgs {
    pub record: PathBuf,
    pub template: String,
    pub group: Option<String>,
    pub day: Option<Day>,
    pub out: PathBuf,
    pub root: PathBuf,
    pub config: Option<PathBuf>,
    pub scale: Option<f64>,
    pub theme: Option<Theme>,
}

/// Build the single task described by the arguments.
pub fn build_task(args: &RenderOneArgs, pattern: &GroupPattern, theme: Theme) -> Result<RenderTask> {
    let template: TemplateKind = args.template.parse().map_err(anyhow::Error::msg)?;
    let record = load_record(&args.record)
        .with_context(|| format!("cannot load record {}", args.record.display()))?;
    if record.fact.is_none() {
        bail!("record {} has no schedule to render", args.record.display());
    }

    let group = match (&args.group, template.is_aggregate()) {
        (Some(id), false) => Some(
            pattern
                .parse(id)
                .ok_or_else(|| anyhow::anyhow!("{id:?} is not an outage group id"))?,
        ),
        (None, false) => bail!("template {template} needs --group"),
        (_, true) => None,
    };

    let out_dir = args.out.parent().unwrap_or_else(|| std::path::Path::new(""));
    let mut task = RenderTask::new(template, Arc::new(record), group, theme, out_dir);
    task.output_path = args.out.clone();
    if let Some(day) = args.day {
        task.day = Some(day);
    }
    Ok(task)
}

/// Run the `gridcast render-one` command.
pub fn run(args: RenderOneArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    apply_overrides(&mut config, Some(1), args.scale, args.theme)?;
    let pattern = GroupPattern::new(&config.extract.group_prefix)?;
    let task = build_task(&args, &pattern, config.render.theme)?;

    let rt = runtime()?;
    let summary = rt.block_on(async {
        let session = RenderSession::start(&args.root, &config)
            .await
            .context("failed to start render session")?;
        let summary = session.run(vec![task], 1).await;
        session.finish().await;
        anyhow::Ok(summary)
    })?;

    print_summary(&summary);
    if !summary.is_success() {
        std::process::exit(1);
    }
    println!("Wrote {}", args.out.display());
    Ok(())
}
