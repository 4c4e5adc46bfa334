//! Run state, execution loop and stop protocol for a single registered task.

use super::clock::Clock;
use super::context::TaskContext;
use super::gate::{self, TaskWindow};
use super::logger::{log_safely, task_category, TaskLogger};
use super::task::{resolve_task_name, PeriodicTask, TaskError};
use crate::server::metrics;
use chrono::{DateTime, Local};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Scheduling state of a task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunState {
    /// Start time of the most recent run.
    pub last_exec: Option<DateTime<Local>>,
    /// True from run start until the execution loop exits.
    pub is_processing: bool,
    /// True once a stop has been requested.
    pub is_stopping: bool,
    /// Number of runs launched so far.
    pub run_count: u64,
}

/// How a stop request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The task was idle, nothing to wait for.
    NotRunning,
    /// The running execution loop exited.
    Stopped,
    /// The stop budget elapsed before the execution loop exited.
    TimedOut,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Stopped,
    Failed,
    Panicked,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Completed => "completed",
            RunOutcome::Stopped => "stopped",
            RunOutcome::Failed => "failed",
            RunOutcome::Panicked => "panicked",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("task panicked: {0}")]
pub struct TaskPanicked(pub String);

#[derive(Debug, thiserror::Error)]
#[error("timed out after {0:?} waiting for the task to stop")]
pub struct StopTimedOut(pub Duration);

#[derive(Debug, thiserror::Error)]
#[error("failed to spawn task thread: {0}")]
struct SpawnFailed(#[source] std::io::Error);

/// Completion signal of one run. Set once, when the execution loop exits.
#[derive(Debug, Default)]
pub(crate) struct Completion {
    done: Mutex<bool>,
    cond: Condvar,
}

impl Completion {
    fn signal(&self) {
        let mut done = self.done.lock().unwrap_or_else(|e| e.into_inner());
        *done = true;
        self.cond.notify_all();
    }

    /// Wait for the signal. Returns false if `timeout` elapsed first.
    fn wait(&self, timeout: Option<Duration>) -> bool {
        let done = self.done.lock().unwrap_or_else(|e| e.into_inner());
        match timeout {
            None => *self
                .cond
                .wait_while(done, |done| !*done)
                .unwrap_or_else(|e| e.into_inner()),
            Some(timeout) => {
                let (done, _) = self
                    .cond
                    .wait_timeout_while(done, timeout, |done| !*done)
                    .unwrap_or_else(|e| e.into_inner());
                *done
            }
        }
    }
}

struct Inner {
    state: RunState,
    finished: Option<Arc<Completion>>,
    cancel: CancellationToken,
}

/// A registered task together with its run state.
pub struct ManagedTask {
    task: Arc<dyn PeriodicTask>,
    name: String,
    order: i32,
    clock: Arc<dyn Clock>,
    inner: Arc<Mutex<Inner>>,
}

impl ManagedTask {
    pub fn new(task: Arc<dyn PeriodicTask>, clock: Arc<dyn Clock>) -> Self {
        let name = resolve_task_name(task.as_ref());
        let order = task.order();
        Self {
            task,
            name,
            order,
            clock,
            inner: Arc::new(Mutex::new(Inner {
                state: RunState::default(),
                finished: None,
                cancel: CancellationToken::new(),
            })),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn order(&self) -> i32 {
        self.order
    }

    /// Snapshot of the current run state.
    pub fn state(&self) -> RunState {
        lock(&self.inner).state.clone()
    }

    pub fn is_processing(&self) -> bool {
        lock(&self.inner).state.is_processing
    }

    pub fn is_stopping(&self) -> bool {
        lock(&self.inner).state.is_stopping
    }

    pub fn is_enabled(&self) -> bool {
        gate::is_enabled(&TaskWindow::of(self.task.as_ref()), self.clock.now())
    }

    pub fn needs_execution(&self) -> bool {
        let exec_delay = self.task.exec_delay();
        let now = self.clock.now();
        gate::needs_execution(&lock(&self.inner).state, exec_delay, now)
    }

    /// Launch a run on a dedicated thread if the task needs one.
    ///
    /// Returns true if a run was launched.
    pub fn start_process(&self, logger: Arc<dyn TaskLogger>) -> bool {
        let exec_delay = self.task.exec_delay();
        let now = self.clock.now();

        let (completion, cancel) = {
            let mut inner = lock(&self.inner);
            if !gate::needs_execution(&inner.state, exec_delay, now) {
                return false;
            }
            inner.state.is_processing = true;
            inner.state.is_stopping = false;
            inner.state.last_exec = Some(now);
            inner.state.run_count += 1;

            let completion = Arc::new(Completion::default());
            inner.finished = Some(Arc::clone(&completion));
            inner.cancel = CancellationToken::new();
            (completion, inner.cancel.clone())
        };

        let run = ExecutionLoop {
            task: Arc::clone(&self.task),
            name: self.name.clone(),
            clock: Arc::clone(&self.clock),
            inner: Arc::clone(&self.inner),
            logger: Arc::clone(&logger),
            cancel,
        };
        let guard = RunGuard {
            inner: Arc::clone(&self.inner),
            completion,
        };

        let spawned = thread::Builder::new()
            .name(thread_name(&self.name))
            .spawn(move || {
                let _guard = guard;
                run.run();
            });

        match spawned {
            Ok(_) => true,
            Err(e) => {
                // The closure (and its guard) was dropped, so the state is already rolled back.
                let err = SpawnFailed(e);
                let message = "Could not start task thread";
                log_safely(
                    logger.as_ref(),
                    &task_category(&self.name, "Execution", message),
                    message,
                    Some(&err),
                );
                false
            }
        }
    }

    /// Request a cooperative stop.
    ///
    /// Blocks until the running execution loop exits, or until `timeout`
    /// elapses when one is given. Returns immediately if the task was idle.
    pub fn stop_process(&self, logger: &dyn TaskLogger, timeout: Option<Duration>) -> StopOutcome {
        let (was_processing, finished) = {
            let mut inner = lock(&self.inner);
            inner.state.is_stopping = true;
            inner.cancel.cancel();
            (inner.state.is_processing, inner.finished.clone())
        };

        let finished = match finished {
            Some(finished) if was_processing => finished,
            _ => return StopOutcome::NotRunning,
        };

        self.log_stop(
            logger,
            &format!("Stopping task {} processing.", self.name),
            None,
        );

        if finished.wait(timeout) {
            self.log_stop(logger, &format!("{} stopped.", self.name), None);
            StopOutcome::Stopped
        } else {
            let err = StopTimedOut(timeout.unwrap_or_default());
            self.log_stop(
                logger,
                &format!("{} did not stop in time.", self.name),
                Some(&err),
            );
            StopOutcome::TimedOut
        }
    }

    fn log_stop(
        &self,
        logger: &dyn TaskLogger,
        message: &str,
        error: Option<&(dyn std::error::Error + 'static)>,
    ) {
        let category = task_category(&self.name, "Stop", message);
        log_safely(logger, &category, message, error);
    }
}

impl std::fmt::Debug for ManagedTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedTask")
            .field("name", &self.name)
            .field("order", &self.order)
            .field("state", &self.state())
            .finish()
    }
}

/// Clears the processing flag and fires the completion signal however the
/// execution loop exits, including when the thread never started.
struct RunGuard {
    inner: Arc<Mutex<Inner>>,
    completion: Arc<Completion>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        {
            let mut inner = lock(&self.inner);
            let current = inner
                .finished
                .as_ref()
                .is_some_and(|f| Arc::ptr_eq(f, &self.completion));
            if current {
                inner.state.is_processing = false;
            }
        }
        self.completion.signal();
    }
}

struct ExecutionLoop {
    task: Arc<dyn PeriodicTask>,
    name: String,
    clock: Arc<dyn Clock>,
    inner: Arc<Mutex<Inner>>,
    logger: Arc<dyn TaskLogger>,
    cancel: CancellationToken,
}

impl ExecutionLoop {
    fn run(self) {
        let span = tracing::info_span!("task_run", task = %self.name);
        let _entered = span.enter();

        let started = Instant::now();
        metrics::set_task_running(&self.name, true);
        self.log(&format!("Execution started @ {}", self.time_of_day()), None);

        let outcome = self.iterate();

        // The guard clears is_processing and fires the completion signal once this returns.
        let elapsed = started.elapsed();
        metrics::record_task_run(&self.name, outcome.as_str(), elapsed);
        metrics::set_task_running(&self.name, false);
        self.log(&format!("Execution ended @ {}", self.time_of_day()), None);
        debug!("Run of {} ended as {} after {:?}", self.name, outcome.as_str(), elapsed);
    }

    fn iterate(&self) -> RunOutcome {
        let mut iteration = 0u64;
        loop {
            if lock(&self.inner).state.is_stopping {
                return RunOutcome::Stopped;
            }

            self.log(
                &format!("Execute iteration started @ {}", self.time_of_day()),
                None,
            );
            let ctx = TaskContext {
                cancellation_token: self.cancel.clone(),
                task_name: self.name.clone(),
                iteration,
            };
            let result = catch_unwind(AssertUnwindSafe(|| self.task.process_item(&ctx)));
            metrics::record_task_iteration(&self.name);
            iteration += 1;

            match result {
                Ok(Ok(true)) => continue,
                Ok(Ok(false)) => return RunOutcome::Completed,
                Ok(Err(TaskError::Cancelled)) => {
                    self.log(
                        &format!("Execution cancelled @ {}", self.time_of_day()),
                        None,
                    );
                    return RunOutcome::Stopped;
                }
                Ok(Err(e)) => {
                    self.log(
                        &format!("Execute error @ {}", self.time_of_day()),
                        Some(&e),
                    );
                    return RunOutcome::Failed;
                }
                Err(payload) => {
                    let err = TaskPanicked(panic_message(payload.as_ref()));
                    self.log(
                        &format!("Execute error @ {}", self.time_of_day()),
                        Some(&err),
                    );
                    return RunOutcome::Panicked;
                }
            }
        }
    }

    fn log(&self, message: &str, error: Option<&(dyn std::error::Error + 'static)>) {
        log_safely(self.logger.as_ref(), &self.name, message, error);
    }

    fn time_of_day(&self) -> String {
        self.clock.now().format("%H:%M:%S%.3f").to_string()
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(|e| e.into_inner())
}

fn thread_name(task_name: &str) -> String {
    format!("task-{}", task_name.replace('\0', ""))
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
