use std::path::PathBuf;

use anyhow::{Context, Result};

use gridcast_render::{load_eligible_records, plan_tasks, RenderSession, RenderSummary};
use gridcast_types::{GridcastConfig, GroupPattern, Theme};

use crate::commands::{load_config, runtime};

#[derive(Debug)]
pub struct RenderArgs {
    pub data: PathBuf,
    pub out: PathBuf,
    pub root: PathBuf,
    pub config: Option<PathBuf>,
    pub concurrency: Option<usize>,
    pub scale: Option<f64>,
    pub theme: Option<Theme>,
    pub region: Option<String>,
}

/// Apply command-line overrides on top of the file/env configuration.
pub fn apply_overrides(
    config: &mut GridcastConfig,
    concurrency: Option<usize>,
    scale: Option<f64>,
    theme: Option<Theme>,
) -> Result<()> {
    if let Some(concurrency) = concurrency {
        config.render.concurrency = concurrency;
    }
    if let Some(scale) = scale {
        config.render.scale = scale;
    }
    if let Some(theme) = theme {
        config.render.theme = theme;
    }
    config.validate().context("invalid render settings")?;
    Ok(())
}

/// Run the `gridcast render` command.
///
/// Exits 0 when every task succeeded or there was nothing to render, and 1
/// when templates are missing or any task failed.
pub fn run(args: RenderArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    apply_overrides(&mut config, args.concurrency, args.scale, args.theme)?;

    let mut records = load_eligible_records(&args.data)
        .with_context(|| format!("cannot read records from {}", args.data.display()))?;
    if let Some(region) = &args.region {
        records.retain(|r| &r.region_id == region);
    }
    if records.is_empty() {
        println!("No eligible records in {}", args.data.display());
        return Ok(());
    }

    let pattern = GroupPattern::new(&config.extract.group_prefix)?;
    let tasks: Vec<_> = records
        .iter()
        .flat_map(|record| {
            plan_tasks(
                std::sync::Arc::clone(record),
                &pattern,
                config.render.theme,
                &args.out,
            )
        })
        .collect();
    println!(
        "Rendering {} task(s) for {} region(s) at scale {}",
        tasks.len(),
        records.len(),
        config.render.effective_scale()
    );

    let rt = runtime()?;
    let summary = rt.block_on(async {
        let session = RenderSession::start(&args.root, &config)
            .await
            .context("failed to start render session")?;
        let summary = session.run(tasks, config.render.concurrency).await;
        session.finish().await;
        anyhow::Ok(summary)
    })?;

    print_summary(&summary);
    if !summary.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

pub fn print_summary(summary: &RenderSummary) {
    println!(
        "Rendered {}/{} image(s) in {:.1}s",
        summary.succeeded,
        summary.total(),
        summary.elapsed.as_secs_f64()
    );
    for failure in &summary.failures {
        eprintln!("  FAILED {} [{}]: {}", failure.label, failure.kind, failure.message);
    }
}
