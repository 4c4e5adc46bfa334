//! Heartbeat task.
//!
//! Logs that the host is alive, how long it has been up and how many beats
//! it has emitted. Runs a single item per run.

use crate::config::{HeartbeatTaskSettings, ScheduleSettings};
use crate::periodic::{PeriodicTask, TaskContext, TaskError};
use chrono::NaiveTime;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::info;

pub struct HeartbeatTask {
    schedule: ScheduleSettings,
    started_at: Instant,
    beats: AtomicU64,
}

impl HeartbeatTask {
    pub fn from_settings(settings: &HeartbeatTaskSettings) -> Self {
        Self {
            schedule: settings.schedule.clone(),
            started_at: Instant::now(),
            beats: AtomicU64::new(0),
        }
    }

    pub fn beats(&self) -> u64 {
        self.beats.load(Ordering::SeqCst)
    }
}

impl PeriodicTask for HeartbeatTask {
    fn name(&self) -> Option<String> {
        Some("Heartbeat".to_string())
    }

    fn order(&self) -> i32 {
        self.schedule.order
    }

    fn is_disabled(&self) -> bool {
        self.schedule.disabled
    }

    fn start_time(&self) -> Option<NaiveTime> {
        self.schedule.start_time
    }

    fn end_time(&self) -> Option<NaiveTime> {
        self.schedule.end_time
    }

    fn exec_delay(&self) -> Option<Duration> {
        self.schedule.exec_delay
    }

    fn process_item(&self, _ctx: &TaskContext) -> Result<bool, TaskError> {
        let beat = self.beats.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            "Heartbeat #{}: host up for {}s",
            beat,
            self.started_at.elapsed().as_secs()
        );
        Ok(false)
    }
}
