//! Scheduling decisions: is a task enabled right now, and does it need a run.

use super::runner::RunState;
use super::task::PeriodicTask;
use chrono::{DateTime, Local, NaiveTime, Timelike};
use std::time::Duration;

/// Scheduling metadata that decides whether a task is enabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskWindow {
    pub disabled: bool,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
}

impl TaskWindow {
    pub fn of(task: &dyn PeriodicTask) -> Self {
        Self {
            disabled: task.is_disabled(),
            start_time: task.start_time(),
            end_time: task.end_time(),
        }
    }
}

/// Whether a task is enabled at `now`.
///
/// Window bounds are compared against the time of day at whole-second
/// resolution. Windows never wrap midnight, so a window whose start is after
/// its end is never enabled.
pub fn is_enabled(window: &TaskWindow, now: DateTime<Local>) -> bool {
    if window.disabled {
        return false;
    }

    let time_of_day = now.time().with_nanosecond(0).unwrap_or_else(|| now.time());

    if let Some(start) = window.start_time {
        if time_of_day < start {
            return false;
        }
    }

    if let Some(end) = window.end_time {
        if time_of_day > end {
            return false;
        }
    }

    true
}

/// Whether a new run should be launched at `now`.
pub fn needs_execution(state: &RunState, exec_delay: Option<Duration>, now: DateTime<Local>) -> bool {
    if state.is_processing || state.is_stopping {
        return false;
    }

    match (state.last_exec, exec_delay) {
        (Some(last_exec), Some(delay)) => {
            let Ok(delay) = chrono::Duration::from_std(delay) else {
                return false;
            };
            match last_exec.checked_add_signed(delay) {
                Some(next_allowed) => now >= next_allowed,
                None => false,
            }
        }
        _ => true,
    }
}
