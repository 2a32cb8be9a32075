pub mod extract;
pub mod render;
pub mod render_one;
pub mod status;

use std::path::Path;

use anyhow::{Context, Result};

use gridcast_types::GridcastConfig;

/// Resolve the effective configuration for a command.
pub fn load_config(explicit: Option<&Path>) -> Result<GridcastConfig> {
    GridcastConfig::resolve(explicit).context("failed to load configuration")
}

/// Runtime for commands that drive async work.
pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")
}
