use super::clock::{Clock, SystemClock};
use super::logger::{log_safely, TaskLogger};
use super::runner::{panic_message, ManagedTask, StopOutcome, TaskPanicked};
use super::task::PeriodicTask;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::debug;

const START_CATEGORY: &str = "Tasks start";
const STOP_CATEGORY: &str = "Tasks stop";
const LOAD_CATEGORY: &str = "Service Tasks Load";

/// Errors raised while discovering tasks.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("Task discovery unavailable: {0}")]
    Unavailable(String),
}

/// Supplies the set of task instances the orchestrator manages.
pub trait TaskProvider: Send + Sync {
    fn discover(&self) -> Result<Vec<Arc<dyn PeriodicTask>>, DiscoveryError>;
}

/// Provider over a fixed list of tasks.
#[derive(Default, Clone)]
pub struct StaticTaskProvider {
    tasks: Vec<Arc<dyn PeriodicTask>>,
}

impl StaticTaskProvider {
    pub fn new(tasks: Vec<Arc<dyn PeriodicTask>>) -> Self {
        Self { tasks }
    }

    pub fn with_task(mut self, task: Arc<dyn PeriodicTask>) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl TaskProvider for StaticTaskProvider {
    fn discover(&self) -> Result<Vec<Arc<dyn PeriodicTask>>, DiscoveryError> {
        Ok(self.tasks.clone())
    }
}

/// Result of stopping every registered task.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StopSummary {
    /// Tasks whose running loop exited.
    pub stopped: usize,
    /// Tasks that were not running.
    pub idle: usize,
    /// Tasks that did not stop within the stop timeout.
    pub timed_out: usize,
    /// Tasks whose stop request panicked.
    pub failed: usize,
}

/// Controls the registered periodic tasks: builds the registry once,
/// dispatches runs and stops them on shutdown.
pub struct Orchestrator {
    provider: Arc<dyn TaskProvider>,
    clock: Arc<dyn Clock>,
    stop_timeout: Option<Duration>,
    registry: OnceLock<Vec<Arc<ManagedTask>>>,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn TaskProvider>) -> Self {
        Self {
            provider,
            clock: Arc::new(SystemClock),
            stop_timeout: None,
            registry: OnceLock::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Upper bound on how long each task's stop may block. `None` waits forever.
    pub fn with_stop_timeout(mut self, stop_timeout: Option<Duration>) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    pub fn is_registry_built(&self) -> bool {
        self.registry.get().is_some()
    }

    /// Registered tasks in dispatch order. Empty until the first `start_tasks`.
    pub fn tasks(&self) -> &[Arc<ManagedTask>] {
        self.registry.get().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn task(&self, name: &str) -> Option<&Arc<ManagedTask>> {
        self.tasks().iter().find(|t| t.name() == name)
    }

    /// Launch a run for every enabled task that needs one.
    ///
    /// On startup only tasks with a negative order are considered. Never
    /// blocks on the launched runs and never propagates errors; returns the
    /// number of runs launched.
    pub fn start_tasks(&self, logger: Arc<dyn TaskLogger>, is_startup: bool) -> usize {
        match catch_unwind(AssertUnwindSafe(|| self.dispatch(&logger, is_startup))) {
            Ok(launched) => launched,
            Err(payload) => {
                let err = TaskPanicked(panic_message(payload.as_ref()));
                log_safely(
                    logger.as_ref(),
                    START_CATEGORY,
                    "Error when starting tasks:",
                    Some(&err),
                );
                0
            }
        }
    }

    /// Ask every registered task to stop, waiting for running loops to exit.
    ///
    /// Each task is stopped inside its own failure boundary, so a panicking
    /// or wedged task doesn't keep the others from being stopped.
    pub fn stop_tasks(&self, logger: &dyn TaskLogger) -> StopSummary {
        let mut summary = StopSummary::default();
        let Some(registry) = self.registry.get() else {
            return summary;
        };

        for task in registry {
            let result = catch_unwind(AssertUnwindSafe(|| {
                task.stop_process(logger, self.stop_timeout)
            }));
            match result {
                Ok(StopOutcome::Stopped) => summary.stopped += 1,
                Ok(StopOutcome::NotRunning) => summary.idle += 1,
                Ok(StopOutcome::TimedOut) => summary.timed_out += 1,
                Err(payload) => {
                    summary.failed += 1;
                    let err = TaskPanicked(panic_message(payload.as_ref()));
                    log_safely(
                        logger,
                        STOP_CATEGORY,
                        &format!("Error when stopping task {}:", task.name()),
                        Some(&err),
                    );
                }
            }
        }

        debug!("Stop summary: {:?}", summary);
        summary
    }

    fn dispatch(&self, logger: &Arc<dyn TaskLogger>, is_startup: bool) -> usize {
        let registry = self.registry(logger.as_ref());

        let candidates: Vec<&Arc<ManagedTask>> = registry
            .iter()
            .filter(|t| t.is_enabled())
            .filter(|t| !is_startup || t.order() < 0)
            .collect();

        if candidates.is_empty() {
            debug!("No enabled tasks to dispatch (startup: {})", is_startup);
            return 0;
        }

        log_safely(
            logger.as_ref(),
            START_CATEGORY,
            &format!("Starting {} tasks.", candidates.len()),
            None,
        );

        let launched = candidates
            .into_iter()
            .filter(|t| t.start_process(Arc::clone(logger)))
            .count();

        log_safely(
            logger.as_ref(),
            START_CATEGORY,
            &format!("{} tasks started.", launched),
            None,
        );
        launched
    }

    /// The registry, built on first use.
    ///
    /// A failed discovery leaves the registry empty for the life of the
    /// orchestrator; it is not retried.
    fn registry(&self, logger: &dyn TaskLogger) -> &[Arc<ManagedTask>] {
        self.registry.get_or_init(|| self.build_registry(logger))
    }

    fn build_registry(&self, logger: &dyn TaskLogger) -> Vec<Arc<ManagedTask>> {
        let discovered = catch_unwind(AssertUnwindSafe(|| {
            self.provider.discover().map(|tasks| self.register(tasks))
        }));

        match discovered {
            Ok(Ok(registry)) => {
                debug!("Registered {} periodic tasks", registry.len());
                registry
            }
            Ok(Err(e)) => {
                log_safely(logger, LOAD_CATEGORY, "Error when trying to load tasks", Some(&e));
                Vec::new()
            }
            Err(payload) => {
                let err = TaskPanicked(panic_message(payload.as_ref()));
                log_safely(logger, LOAD_CATEGORY, "Error when trying to load tasks", Some(&err));
                Vec::new()
            }
        }
    }

    fn register(&self, tasks: Vec<Arc<dyn PeriodicTask>>) -> Vec<Arc<ManagedTask>> {
        let mut unique: Vec<Arc<dyn PeriodicTask>> = Vec::with_capacity(tasks.len());
        for task in tasks {
            let duplicate = unique
                .iter()
                .any(|t| Arc::as_ptr(t) as *const () == Arc::as_ptr(&task) as *const ());
            if !duplicate {
                unique.push(task);
            }
        }

        let mut registry: Vec<Arc<ManagedTask>> = unique
            .into_iter()
            .map(|task| Arc::new(ManagedTask::new(task, Arc::clone(&self.clock))))
            .collect();
        // Stable, so equal orders keep discovery order.
        registry.sort_by_key(|t| t.order());
        registry
    }
}
