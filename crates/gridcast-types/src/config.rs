//! Configuration loaded from `gridcast.toml`.
//!
//! Every section and field is optional in the file; missing values fall back
//! to the defaults below. Precedence (later wins): built-in defaults, the
//! TOML file, `GRIDCAST_*` environment variables, CLI flags (applied by the
//! caller).

use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::selector::Theme;
use crate::GridcastError;

/// Default config filename looked up in the working directory.
pub const CONFIG_FILENAME: &str = "gridcast.toml";

/// Config files larger than this are rejected.
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Environment variable naming the browser binary to launch.
pub const ENV_BROWSER_BIN: &str = "GRIDCAST_BROWSER_BIN";

/// Environment variable naming a running browser's DevTools WebSocket URL.
pub const ENV_CDP_WS: &str = "GRIDCAST_CDP_WS";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridcastConfig {
    pub extract: ExtractConfig,
    pub render: RenderConfig,
    pub browser: BrowserConfig,
}

/// Settings for the extraction path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Marker preceding the `fact` literal.
    pub fact_marker: String,
    /// Marker preceding the optional `preset` literal.
    pub preset_marker: String,
    /// IANA zone the schedule's wall-clock times are expressed in.
    pub timezone: String,
    /// Prefix of outage group identifiers.
    pub group_prefix: String,
    /// Skip delimiters inside quoted strings while scanning literals.
    pub string_aware_scan: bool,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            fact_marker: "DisconSchedule.fact".to_string(),
            preset_marker: "DisconSchedule.preset".to_string(),
            timezone: "Europe/Kyiv".to_string(),
            group_prefix: "GPV".to_string(),
            string_aware_scan: false,
        }
    }
}

/// Settings for the render path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Maximum number of tasks holding an open browsing context.
    pub concurrency: usize,
    /// Device pixel ratio for screenshots.
    pub scale: f64,
    /// Upper bound applied to `scale`.
    pub max_scale: f64,
    pub locale: String,
    pub timezone: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub ready_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub theme: Theme,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            scale: 2.0,
            max_scale: 4.0,
            locale: "uk-UA".to_string(),
            timezone: "Europe/Kyiv".to_string(),
            viewport_width: 1280,
            viewport_height: 900,
            ready_timeout_ms: 15_000,
            poll_interval_ms: 100,
            theme: Theme::Light,
        }
    }
}

impl RenderConfig {
    /// `scale` clamped into `[1, max_scale]`.
    pub fn effective_scale(&self) -> f64 {
        let max = if self.max_scale.is_finite() && self.max_scale >= 1.0 {
            self.max_scale
        } else {
            1.0
        };
        if self.scale.is_finite() {
            self.scale.clamp(1.0, max)
        } else {
            1.0
        }
    }
}

/// Settings for the headless browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Explicit browser binary; tried before the built-in candidates.
    pub binary_path: Option<String>,
    /// Connect to an already-running browser instead of launching one.
    pub cdp_ws_url: Option<String>,
    pub headless: bool,
    pub extra_args: Vec<String>,
    pub launch_timeout_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            binary_path: None,
            cdp_ws_url: None,
            headless: true,
            extra_args: Vec::new(),
            launch_timeout_ms: 10_000,
        }
    }
}

impl GridcastConfig {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self, GridcastError> {
        let meta = std::fs::metadata(path).map_err(|e| GridcastError::from_io(path, e))?;
        if meta.len() > MAX_CONFIG_FILE_SIZE {
            return Err(GridcastError::Config(format!(
                "{} is {} bytes, larger than the {MAX_CONFIG_FILE_SIZE} byte limit",
                path.display(),
                meta.len()
            )));
        }
        let content = std::fs::read_to_string(path).map_err(|e| GridcastError::from_io(path, e))?;
        Self::from_toml(&content)
            .map_err(|e| GridcastError::Config(format!("{}: {e}", path.display())))
    }

    /// Parse and validate TOML content.
    pub fn from_toml(content: &str) -> Result<Self, GridcastError> {
        let config: GridcastConfig =
            toml::from_str(content).map_err(|e| GridcastError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the effective config: an explicit path must exist, otherwise
    /// `./gridcast.toml` is used when present, otherwise defaults.
    /// Environment overrides are applied last.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, GridcastError> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => {
                let local = PathBuf::from(CONFIG_FILENAME);
                if local.is_file() {
                    tracing::debug!(path = %local.display(), "loading workspace config");
                    Self::load(&local)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply `GRIDCAST_*` overrides using the supplied lookup.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(bin) = lookup(ENV_BROWSER_BIN).filter(|v| !v.trim().is_empty()) {
            self.browser.binary_path = Some(bin);
        }
        if let Some(ws) = lookup(ENV_CDP_WS).filter(|v| !v.trim().is_empty()) {
            self.browser.cdp_ws_url = Some(ws);
        }
    }

    pub fn validate(&self) -> Result<(), GridcastError> {
        if self.render.concurrency == 0 {
            return Err(GridcastError::Config(
                "render.concurrency must be at least 1".to_string(),
            ));
        }
        if self.extract.fact_marker.trim().is_empty() {
            return Err(GridcastError::Config(
                "extract.fact_marker must not be empty".to_string(),
            ));
        }
        if self.extract.group_prefix.trim().is_empty() {
            return Err(GridcastError::Config(
                "extract.group_prefix must not be empty".to_string(),
            ));
        }
        parse_timezone(&self.extract.timezone)?;
        parse_timezone(&self.render.timezone)?;
        Ok(())
    }
}

/// Parse an IANA timezone name.
pub fn parse_timezone(name: &str) -> Result<Tz, GridcastError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| GridcastError::Config(format!("unknown timezone {name:?}")))
}
