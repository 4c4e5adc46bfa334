use std::error::Error;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;

/// Logging callback used by the orchestrator and the tasks it runs.
///
/// Implementations must be safe to call concurrently from task threads.
pub trait TaskLogger: Send + Sync {
    fn log(&self, category: &str, message: &str, error: Option<&(dyn Error + 'static)>);
}

impl<F> TaskLogger for F
where
    F: Fn(&str, &str, Option<&(dyn Error + 'static)>) + Send + Sync,
{
    fn log(&self, category: &str, message: &str, error: Option<&(dyn Error + 'static)>) {
        self(category, message, error)
    }
}

/// Logger that forwards everything to `tracing`.
///
/// Entries without an error are emitted at INFO, entries with one at ERROR.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl TaskLogger for TracingLogger {
    fn log(&self, category: &str, message: &str, error: Option<&(dyn Error + 'static)>) {
        match error {
            None => tracing::info!(category = %category, "{}", message),
            Some(e) => tracing::error!(category = %category, error = %e, "{}", message),
        }
    }
}

/// A captured log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub category: String,
    pub message: String,
    pub error: Option<String>,
}

/// Logger that keeps entries in memory.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Whether any entry's message contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.entries().iter().any(|e| e.message.contains(needle))
    }

    /// Entries that carry an error.
    pub fn errors(&self) -> Vec<LogEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.error.is_some())
            .collect()
    }
}

impl TaskLogger for MemoryLogger {
    fn log(&self, category: &str, message: &str, error: Option<&(dyn Error + 'static)>) {
        let entry = LogEntry {
            category: category.to_string(),
            message: message.to_string(),
            error: error.map(|e| e.to_string()),
        };
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry);
    }
}

/// Invoke a logger, swallowing any panic it raises.
pub(crate) fn log_safely(
    logger: &dyn TaskLogger,
    category: &str,
    message: &str,
    error: Option<&(dyn Error + 'static)>,
) {
    if catch_unwind(AssertUnwindSafe(|| logger.log(category, message, error))).is_err() {
        tracing::warn!(category = %category, "Task logger panicked while logging: {}", message);
    }
}

/// Category used for task log lines.
///
/// Prefixed with `Task [<name>] - ` unless the category or the message
/// already mention the task.
pub(crate) fn task_category(task_name: &str, category: &str, message: &str) -> String {
    if category.contains(task_name) || message.contains(task_name) {
        category.to_string()
    } else {
        format!("Task [{}] - {}", task_name, category)
    }
}
