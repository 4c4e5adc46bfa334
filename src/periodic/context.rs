use tokio_util::sync::CancellationToken;

/// Context provided to tasks while they run.
///
/// Carries the cancellation token of the current run so that long-running
/// work can stop cooperatively.
#[derive(Clone)]
pub struct TaskContext {
    /// Token cancelled when a stop is requested for this run.
    pub cancellation_token: CancellationToken,

    /// Display name of the task being run.
    pub task_name: String,

    /// Zero-based index of the current iteration within the run.
    pub iteration: u64,
}

impl TaskContext {
    pub fn new(cancellation_token: CancellationToken, task_name: impl Into<String>) -> Self {
        Self {
            cancellation_token,
            task_name: task_name.into(),
            iteration: 0,
        }
    }

    /// Check if a stop has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}
