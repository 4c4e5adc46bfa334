//! Built-in periodic task implementations.

pub mod heartbeat;
pub mod stale_file_cleanup;

pub use heartbeat::HeartbeatTask;
pub use stale_file_cleanup::StaleFileCleanupTask;

use crate::config::TasksSettings;
use crate::periodic::{PeriodicTask, StaticTaskProvider};
use std::sync::Arc;

/// Instantiate the built-in tasks enabled by `settings`.
pub fn build_tasks(settings: &TasksSettings) -> Vec<Arc<dyn PeriodicTask>> {
    let mut tasks: Vec<Arc<dyn PeriodicTask>> =
        vec![Arc::new(HeartbeatTask::from_settings(&settings.heartbeat))];

    if let Some(cleanup) = &settings.stale_file_cleanup {
        tasks.push(Arc::new(StaleFileCleanupTask::from_settings(cleanup)));
    }

    tasks
}

/// Provider over the built-in tasks enabled by `settings`.
pub fn builtin_provider(settings: &TasksSettings) -> StaticTaskProvider {
    StaticTaskProvider::new(build_tasks(settings))
}
