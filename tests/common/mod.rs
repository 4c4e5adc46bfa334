//! Common test infrastructure
//!
//! Test tasks and providers shared by the integration tests.

#![allow(dead_code)]

use chrono::NaiveTime;
use periodic_task_host::periodic::{
    DiscoveryError, PeriodicTask, StaticTaskProvider, TaskContext, TaskError, TaskProvider,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// What a [`RecordingTask`] does with each item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Process this many items, then end the run.
    Items(usize),
    /// Keep asking for more work until cancelled.
    UntilCancelled,
    /// Fail on the first item.
    Fail,
}

/// Task that records how often it ran.
pub struct RecordingTask {
    pub name: String,
    pub order: i32,
    pub disabled: bool,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub exec_delay: Option<Duration>,
    pub behavior: Behavior,
    pub runs: AtomicUsize,
    pub items: AtomicUsize,
}

impl RecordingTask {
    pub fn new(name: &str, order: i32) -> Self {
        Self {
            name: name.to_string(),
            order,
            disabled: false,
            start_time: None,
            end_time: None,
            exec_delay: None,
            behavior: Behavior::Items(1),
            runs: AtomicUsize::new(0),
            items: AtomicUsize::new(0),
        }
    }

    pub fn behavior(mut self, behavior: Behavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    pub fn window(mut self, start: Option<NaiveTime>, end: Option<NaiveTime>) -> Self {
        self.start_time = start;
        self.end_time = end;
        self
    }

    pub fn exec_delay(mut self, delay: Duration) -> Self {
        self.exec_delay = Some(delay);
        self
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn items(&self) -> usize {
        self.items.load(Ordering::SeqCst)
    }
}

impl PeriodicTask for RecordingTask {
    fn name(&self) -> Option<String> {
        Some(self.name.clone())
    }

    fn order(&self) -> i32 {
        self.order
    }

    fn is_disabled(&self) -> bool {
        self.disabled
    }

    fn start_time(&self) -> Option<NaiveTime> {
        self.start_time
    }

    fn end_time(&self) -> Option<NaiveTime> {
        self.end_time
    }

    fn exec_delay(&self) -> Option<Duration> {
        self.exec_delay
    }

    fn process_item(&self, ctx: &TaskContext) -> Result<bool, TaskError> {
        if ctx.iteration == 0 {
            self.runs.fetch_add(1, Ordering::SeqCst);
        }
        let item = self.items.fetch_add(1, Ordering::SeqCst) + 1;

        match self.behavior {
            Behavior::Items(n) => Ok((ctx.iteration as usize) + 1 < n),
            Behavior::UntilCancelled => {
                thread::sleep(Duration::from_millis(5));
                if ctx.is_cancelled() {
                    return Err(TaskError::Cancelled);
                }
                Ok(true)
            }
            Behavior::Fail => Err(TaskError::Failed(format!("item {} broke", item))),
        }
    }
}

/// Task that ignores cancellation and blocks until released.
pub struct WedgedTask {
    pub name: String,
    pub order: i32,
    started: Mutex<Option<mpsc::Sender<()>>>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl WedgedTask {
    /// Returns the task, a receiver fired when it starts and a sender that releases it.
    pub fn new(name: &str, order: i32) -> (Self, mpsc::Receiver<()>, mpsc::Sender<()>) {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let task = Self {
            name: name.to_string(),
            order,
            started: Mutex::new(Some(started_tx)),
            release: Mutex::new(release_rx),
        };
        (task, started_rx, release_tx)
    }
}

impl PeriodicTask for WedgedTask {
    fn name(&self) -> Option<String> {
        Some(self.name.clone())
    }

    fn order(&self) -> i32 {
        self.order
    }

    fn process_item(&self, _ctx: &TaskContext) -> Result<bool, TaskError> {
        if let Some(tx) = self.started.lock().unwrap().take() {
            let _ = tx.send(());
        }
        let _ = self.release.lock().unwrap().recv();
        Ok(false)
    }
}

/// Provider that counts discovery calls.
pub struct CountingProvider {
    inner: StaticTaskProvider,
    pub calls: AtomicUsize,
}

impl CountingProvider {
    pub fn new(tasks: Vec<Arc<dyn PeriodicTask>>) -> Self {
        Self {
            inner: StaticTaskProvider::new(tasks),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TaskProvider for CountingProvider {
    fn discover(&self) -> Result<Vec<Arc<dyn PeriodicTask>>, DiscoveryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.discover()
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Async flavour of [`wait_until`].
pub async fn wait_until_async(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

pub const WAIT: Duration = Duration::from_secs(5);
