//! Render orchestration for gridcast.
//!
//! Serves the template tree over loopback HTTP, expands records into render
//! tasks, and drives each task through a headless browser with a bounded
//! number of open contexts.

pub mod job;
pub mod readiness;
pub mod scheduler;
pub mod server;
pub mod session;
pub mod task;
pub mod templates;

pub use job::{run_task, RenderSettings, TaskOutcome, TaskState};
pub use readiness::ReadyState;
pub use scheduler::{run_bounded, run_tasks, RenderSummary, TaskFailure};
pub use server::StaticServer;
pub use session::RenderSession;
pub use task::{load_eligible_records, load_record, plan_tasks, record_groups, RenderTask};
pub use templates::{verify_templates, TemplateKind};
