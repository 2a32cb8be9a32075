//! Render driver: runs one [`RenderTask`] through its lifecycle.
//!
//! `Created -> ContextOpened -> Navigated -> AwaitingReady -> Captured -> Closed`,
//! with `Failed` reachable from any non-terminal state. Every task gets its
//! own browser context, which is disposed whether the task succeeds or not.

use std::path::Path;
use std::time::{Duration, Instant};

use gridcast_browser::{BrowserContext, BrowserHandle, Clip, Emulation, PageSession};
use gridcast_types::{GridcastError, RenderConfig};

use crate::readiness::{parse_ready_state, ready_check_script, wait_until_ready};
use crate::task::RenderTask;

/// Lifecycle of a single render task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    Created,
    ContextOpened,
    Navigated,
    AwaitingReady,
    Captured,
    Closed,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Closed | TaskState::Failed)
    }

    /// Whether `self -> to` is a legal transition.
    pub fn allows(self, to: TaskState) -> bool {
        use TaskState::*;
        match (self, to) {
            (from, Failed) => !from.is_terminal(),
            (Created, ContextOpened)
            | (ContextOpened, Navigated)
            | (Navigated, AwaitingReady)
            | (AwaitingReady, Captured)
            | (Captured, Closed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskState::Created => "created",
            TaskState::ContextOpened => "context-opened",
            TaskState::Navigated => "navigated",
            TaskState::AwaitingReady => "awaiting-ready",
            TaskState::Captured => "captured",
            TaskState::Closed => "closed",
            TaskState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Tracks a task's state and logs each transition.
#[derive(Debug)]
struct StateTracker<'a> {
    label: &'a str,
    state: TaskState,
    /// Last state reached before failing.
    reached: TaskState,
}

impl<'a> StateTracker<'a> {
    fn new(label: &'a str) -> Self {
        Self {
            label,
            state: TaskState::Created,
            reached: TaskState::Created,
        }
    }

    fn advance(&mut self, to: TaskState) {
        if !self.state.allows(to) {
            tracing::warn!(task = self.label, from = %self.state, to = %to, "unexpected task transition");
        }
        tracing::trace!(task = self.label, from = %self.state, to = %to, "task transition");
        if to != TaskState::Failed {
            self.reached = to;
        }
        self.state = to;
    }
}

/// Settings shared by every task in a run.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    /// Static server base URL.
    pub base_url: String,
    pub emulation: Emulation,
    pub ready_timeout: Duration,
    pub poll_interval: Duration,
    /// Timeout for individual DevTools commands and page load.
    pub command_timeout: Duration,
}

impl RenderSettings {
    pub fn from_config(config: &RenderConfig, base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            emulation: Emulation {
                width: config.viewport_width,
                height: config.viewport_height,
                scale: config.effective_scale(),
                locale: config.locale.clone(),
                timezone: config.timezone.clone(),
            },
            ready_timeout: Duration::from_millis(config.ready_timeout_ms),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(10)),
            command_timeout: Duration::from_millis(config.ready_timeout_ms.max(30_000)),
        }
    }
}

/// Final result of one task.
#[derive(Debug)]
pub struct TaskOutcome {
    pub label: String,
    pub output_path: std::path::PathBuf,
    pub state: TaskState,
    /// Furthest state reached; equals `state` on success.
    pub reached: TaskState,
    pub clip: Option<Clip>,
    pub error: Option<GridcastError>,
    pub elapsed: Duration,
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        self.state == TaskState::Closed
    }
}

/// Run a task to completion. Never panics on browser failures; the error is
/// carried in the outcome.
pub async fn run_task(
    browser: &BrowserHandle,
    settings: &RenderSettings,
    task: RenderTask,
) -> TaskOutcome {
    let started = Instant::now();
    let label = task.label();
    let mut tracker = StateTracker::new(&label);

    let result = match browser.open_context().await {
        Ok(context) => {
            tracker.advance(TaskState::ContextOpened);
            let driven = drive(&context, settings, &task, &mut tracker).await;
            browser.close_context(&context).await;
            driven
        }
        Err(e) => Err(e.into()),
    };

    let (clip, error) = match result {
        Ok(clip) => {
            tracker.advance(TaskState::Closed);
            tracing::info!(
                task = %label,
                path = %task.output_path.display(),
                width = clip.width,
                height = clip.height,
                "rendered"
            );
            (Some(clip), None)
        }
        Err(e) => {
            let failed_in = tracker.reached;
            tracker.advance(TaskState::Failed);
            tracing::warn!(task = %label, state = %failed_in, kind = e.kind(), error = %e, "render failed");
            (None, Some(e))
        }
    };

    TaskOutcome {
        state: tracker.state,
        reached: tracker.reached,
        label: label.clone(),
        output_path: task.output_path,
        clip,
        error,
        elapsed: started.elapsed(),
    }
}

async fn drive(
    context: &BrowserContext,
    settings: &RenderSettings,
    task: &RenderTask,
    tracker: &mut StateTracker<'_>,
) -> Result<Clip, GridcastError> {
    let page = PageSession::attach(&context.page_ws_url, settings.command_timeout).await?;
    page.emulate(&settings.emulation).await?;
    page.add_init_script(&task.injection_script()?).await?;

    let url = task.template.url(&settings.base_url, task.theme, task.day)?;
    tracing::debug!(task = tracker.label, url = %url, "navigating");
    page.navigate(&url, settings.command_timeout).await?;
    tracker.advance(TaskState::Navigated);

    tracker.advance(TaskState::AwaitingReady);
    let script = ready_check_script(task.template);
    let (check_page, check_src) = (&page, script.as_str());
    let waited = wait_until_ready(
        task.template,
        move || async move {
            check_page
                .evaluate(check_src)
                .await
                .map(|v| parse_ready_state(&v))
        },
        settings.ready_timeout,
        settings.poll_interval,
    )
    .await?;
    tracing::debug!(task = tracker.label, waited_ms = waited.as_millis() as u64, "template ready");

    let selector = task.template.container_selector();
    let bbox = page.element_box(selector).await?;
    let clip = Clip::from(bbox);
    let png = page.screenshot_clip(clip).await?;
    write_image(&task.output_path, &png).await?;
    tracker.advance(TaskState::Captured);

    page.client().close().await;
    Ok(clip)
}

/// Write `bytes` next to `path` and rename into place.
async fn write_image(path: &Path, bytes: &[u8]) -> Result<(), GridcastError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| GridcastError::Io {
                context: format!("failed to create output dir {}", parent.display()),
                source: e,
            })?;
    }
    let tmp = path.with_extension("png.tmp");
    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|e| GridcastError::Io {
            context: format!("failed to write {}", tmp.display()),
            source: e,
        })?;
    tokio::fs::rename(&tmp, path).await.map_err(|e| GridcastError::Io {
        context: format!("failed to move image into {}", path.display()),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_transitions() {
        use TaskState::*;
        let path = [Created, ContextOpened, Navigated, AwaitingReady, Captured, Closed];
        for pair in path.windows(2) {
            assert!(pair[0].allows(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
        assert!(!Created.allows(Navigated));
        assert!(!AwaitingReady.allows(Closed));
        assert!(!Closed.allows(Created));
    }

    #[test]
    fn test_failed_is_absorbing() {
        use TaskState::*;
        for from in [Created, ContextOpened, Navigated, AwaitingReady, Captured] {
            assert!(from.allows(Failed));
        }
        assert!(!Failed.allows(Failed));
        assert!(!Closed.allows(Failed));
        assert!(Failed.is_terminal());
    }

    #[test]
    fn test_tracker_remembers_last_good_state() {
        let mut tracker = StateTracker::new("kyiv/week/GPV1.1");
        tracker.advance(TaskState::ContextOpened);
        tracker.advance(TaskState::Navigated);
        tracker.advance(TaskState::AwaitingReady);
        tracker.advance(TaskState::Failed);
        assert_eq!(tracker.state, TaskState::Failed);
        assert_eq!(tracker.reached, TaskState::AwaitingReady);
    }

    #[test]
    fn test_settings_from_config() {
        let config = RenderConfig {
            scale: 9.0,
            ready_timeout_ms: 500,
            poll_interval_ms: 0,
            ..RenderConfig::default()
        };
        let settings = RenderSettings::from_config(&config, "http://127.0.0.1:1");
        assert_eq!(settings.emulation.scale, config.max_scale);
        assert_eq!(settings.emulation.locale, "uk-UA");
        assert_eq!(settings.emulation.timezone, "Europe/Kyiv");
        assert_eq!(settings.ready_timeout, Duration::from_millis(500));
        assert_eq!(settings.poll_interval, Duration::from_millis(10));
        assert_eq!(settings.command_timeout, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_write_image_creates_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kyiv").join("overview-today.png");
        write_image(&path, b"\x89PNG").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"\x89PNG");
        assert!(!path.with_extension("png.tmp").exists());
    }
}
