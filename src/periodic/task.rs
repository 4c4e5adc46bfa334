use super::context::TaskContext;
use chrono::NaiveTime;
use std::time::Duration;

/// Default ordering for tasks that don't override [`PeriodicTask::order`].
pub const DEFAULT_TASK_ORDER: i32 = 100;

/// Errors a task can report from a single unit of work.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Execution failed: {0}")]
    Failed(String),
    #[error("Task was cancelled")]
    Cancelled,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Trait for periodic background tasks.
///
/// A task only describes one unit of work and when it is allowed to run.
/// Overlap prevention, run state and stopping are handled by the orchestrator.
pub trait PeriodicTask: Send + Sync {
    /// Display name. Blank or missing names fall back to [`PeriodicTask::type_name`].
    fn name(&self) -> Option<String> {
        None
    }

    /// Name of the implementing type.
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Relative start ordering. Negative values mark startup-critical tasks.
    fn order(&self) -> i32 {
        DEFAULT_TASK_ORDER
    }

    fn is_disabled(&self) -> bool {
        false
    }

    /// The task is enabled only from this time of day (if set).
    fn start_time(&self) -> Option<NaiveTime> {
        None
    }

    /// The task is enabled only until this time of day (if set).
    fn end_time(&self) -> Option<NaiveTime> {
        None
    }

    /// Minimal delay between the start of one run and the start of the next.
    fn exec_delay(&self) -> Option<Duration> {
        None
    }

    /// Process one item.
    ///
    /// Return `Ok(true)` while there is more work for the current run and
    /// `Ok(false)` once it is done. Long-running implementations should check
    /// `ctx.is_cancelled()` between steps and bail out with
    /// [`TaskError::Cancelled`].
    fn process_item(&self, ctx: &TaskContext) -> Result<bool, TaskError>;
}

/// Resolve the display name for a task.
pub fn resolve_task_name(task: &dyn PeriodicTask) -> String {
    match task.name() {
        Some(name) if !name.trim().is_empty() => name,
        _ => task.type_name().to_string(),
    }
}
