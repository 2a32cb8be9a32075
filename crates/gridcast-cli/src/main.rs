mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use gridcast_types::{Day, Theme};

/// Gridcast -- outage schedule extraction and rendering.
#[derive(Parser, Debug)]
#[command(name = "gridcast", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract embedded schedules from HTML into region records
    Extract {
        /// HTML file, or a directory of *.html files
        #[arg(long)]
        input: PathBuf,

        /// Directory the region records are written to
        #[arg(long, default_value = "data")]
        out: PathBuf,

        /// Config file (defaults to ./gridcast.toml when present)
        #[arg(long)]
        config: Option<PathBuf>,

        /// JSON document used as the baseline for regions without a record
        #[arg(long)]
        prototype: Option<PathBuf>,
    },

    /// Render every eligible record into PNG images
    Render {
        /// Directory of region records
        #[arg(long, default_value = "data")]
        data: PathBuf,

        /// Output directory; images go to <out>/<regionId>/
        #[arg(long, default_value = "out")]
        out: PathBuf,

        /// Directory served to the browser; must contain templates/
        #[arg(long, default_value = ".")]
        root: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,

        /// Maximum number of simultaneously open browser contexts
        #[arg(long)]
        concurrency: Option<usize>,

        /// Device pixel ratio (clamped to [1, render.max_scale])
        #[arg(long)]
        scale: Option<f64>,

        #[arg(long)]
        theme: Option<Theme>,

        /// Only render this region
        #[arg(long)]
        region: Option<String>,
    },

    /// Render a single template for one record
    RenderOne {
        /// Region record file
        #[arg(long)]
        record: PathBuf,

        /// Template name (week, today, tomorrow, summary, overview-today, overview-tomorrow)
        #[arg(long)]
        template: String,

        /// Outage group id, required for per-group templates (e.g. GPV1.2)
        #[arg(long)]
        group: Option<String>,

        /// Override the template's day selector
        #[arg(long)]
        day: Option<Day>,

        /// Output PNG path
        #[arg(long)]
        out: PathBuf,

        #[arg(long, default_value = ".")]
        root: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        scale: Option<f64>,

        #[arg(long)]
        theme: Option<Theme>,
    },

    /// Show the update status of every record in a directory
    Status {
        #[arg(long, default_value = "data")]
        data: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing with env filter (e.g., RUST_LOG=debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Extract {
            input,
            out,
            config,
            prototype,
        } => commands::extract::run(&input, &out, config.as_deref(), prototype.as_deref()),
        Commands::Render {
            data,
            out,
            root,
            config,
            concurrency,
            scale,
            theme,
            region,
        } => commands::render::run(commands::render::RenderArgs {
            data,
            out,
            root,
            config,
            concurrency,
            scale,
            theme,
            region,
        }),
        Commands::RenderOne {
            record,
            template,
            group,
            day,
            out,
            root,
            config,
            scale,
            theme,
        } => commands::render_one::run(commands::render_one::RenderOneArgs {
            record,
            template,
            group,
            day,
            out,
            root,
            config,
            scale,
            theme,
        }),
        Commands::Status { data } => commands::status::run(&data),
    }
}
