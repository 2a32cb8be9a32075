//! Bounded-concurrency execution of render tasks.
//!
//! All tasks are spawned up front; a semaphore caps how many hold an open
//! browser context at once. Failures are counted, never propagated, so one
//! bad template cannot stop its siblings.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

use gridcast_browser::BrowserHandle;

use crate::job::{run_task, RenderSettings, TaskOutcome};
use crate::task::RenderTask;

/// A failed task, for the end-of-run report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    pub label: String,
    pub kind: &'static str,
    pub message: String,
}

/// Aggregate of a render run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub outputs: Vec<PathBuf>,
    pub failures: Vec<TaskFailure>,
    pub elapsed: Duration,
}

impl RenderSummary {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Fold one task outcome into the summary.
    pub fn record(&mut self, outcome: TaskOutcome) {
        match outcome.error {
            None if outcome.is_success() => {
                self.succeeded += 1;
                self.outputs.push(outcome.output_path);
            }
            None => {
                self.failed += 1;
                self.failures.push(TaskFailure {
                    label: outcome.label,
                    kind: "RenderError",
                    message: format!("task ended in state {}", outcome.state),
                });
            }
            Some(e) => {
                self.failed += 1;
                self.failures.push(TaskFailure {
                    label: outcome.label,
                    kind: e.kind(),
                    message: e.to_string(),
                });
            }
        }
    }

    /// A task that panicked or was cancelled.
    fn record_aborted(&mut self, message: String) {
        self.failed += 1;
        self.failures.push(TaskFailure {
            label: "<aborted>".to_string(),
            kind: "TaskPanic",
            message,
        });
    }
}

/// Run `worker` over `items` with at most `concurrency` futures in flight.
///
/// Each worker future is created eagerly but only polled once it holds a
/// permit. Results arrive in completion order.
pub async fn run_bounded<I, F, Fut>(
    items: Vec<I>,
    concurrency: usize,
    worker: F,
) -> Vec<Result<Fut::Output, JoinError>>
where
    F: Fn(I) -> Fut,
    Fut: Future + Send + 'static,
    Fut::Output: Send + 'static,
{
    let limit = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut set = JoinSet::new();
    for item in items {
        let limit = Arc::clone(&limit);
        let work = worker(item);
        set.spawn(async move {
            // The semaphore is never closed, so a permit is always granted.
            let _permit = limit.acquire_owned().await.ok();
            work.await
        });
    }

    let mut results = Vec::new();
    while let Some(joined) = set.join_next().await {
        results.push(joined);
    }
    results
}

/// Run `tasks` with at most `concurrency` open browser contexts and wait
/// for all of them.
pub async fn run_tasks(
    browser: &BrowserHandle,
    settings: Arc<RenderSettings>,
    tasks: Vec<RenderTask>,
    concurrency: usize,
) -> RenderSummary {
    let started = std::time::Instant::now();
    tracing::info!(tasks = tasks.len(), concurrency, "starting render run");

    let results = run_bounded(tasks, concurrency, |task| {
        let browser = browser.clone();
        let settings = Arc::clone(&settings);
        async move { run_task(&browser, &settings, task).await }
    })
    .await;

    let mut summary = RenderSummary::default();
    for joined in results {
        match joined {
            Ok(outcome) => summary.record(outcome),
            Err(e) => {
                tracing::error!(error = %e, "render task aborted");
                summary.record_aborted(e.to_string());
            }
        }
    }
    summary.outputs.sort();
    summary.failures.sort_by(|a, b| a.label.cmp(&b.label));
    summary.elapsed = started.elapsed();

    tracing::info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "render run finished"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::TaskState;
    use gridcast_types::GridcastError;

    fn outcome(label: &str, error: Option<GridcastError>) -> TaskOutcome {
        let state = if error.is_some() {
            TaskState::Failed
        } else {
            TaskState::Closed
        };
        TaskOutcome {
            label: label.to_string(),
            output_path: PathBuf::from(format!("out/{label}.png")),
            state,
            reached: TaskState::AwaitingReady,
            clip: None,
            error,
            elapsed: Duration::ZERO,
        }
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = RenderSummary::default();
        summary.record(outcome("kyiv/week/GPV1.1", None));
        summary.record(outcome(
            "kyiv/today/GPV1.1",
            Some(GridcastError::RenderTimeout {
                template: "today".into(),
                waited: Duration::from_secs(15),
                reason: "completion signal did not appear".into(),
            }),
        ));
        summary.record(outcome("kyiv/overview-today", None));

        assert_eq!(summary.total(), 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert!(!summary.is_success());
        assert_eq!(summary.failures[0].kind, "RenderTimeoutError");
        assert_eq!(summary.outputs.len(), 2);
    }

    #[test]
    fn test_empty_summary_is_success() {
        let summary = RenderSummary::default();
        assert!(summary.is_success());
        assert_eq!(summary.total(), 0);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_run_bounded_respects_ceiling() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let results = run_bounded((0..10).collect(), 4, |i: u64| {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10 * (i % 3 + 1))).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                i
            }
        })
        .await;

        assert_eq!(results.len(), 10);
        assert_eq!(peak.load(Ordering::SeqCst), 4);
        let mut values: Vec<u64> = results.into_iter().map(|r| r.unwrap()).collect();
        values.sort();
        assert_eq!(values, (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_run_bounded_isolates_panics() {
        let results = run_bounded(vec![1, 2, 3], 2, |i: i32| async move {
            if i == 2 {
                panic!("boom");
            }
            i
        })
        .await;
        assert_eq!(results.iter().filter(|r| r.is_err()).count(), 1);
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 2);
    }

    #[test]
    fn test_aborted_task_counts_as_failure() {
        let mut summary = RenderSummary::default();
        summary.record_aborted("task panicked".into());
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures[0].kind, "TaskPanic");
    }
}
