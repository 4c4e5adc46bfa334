//! Stale file cleanup task.
//!
//! Deletes files that haven't been modified within the retention period from
//! a configured directory. The first item of a run scans the directory, each
//! following item removes one file, so a stop request is honoured between
//! deletions.

use crate::config::{ScheduleSettings, StaleFileCleanupTaskSettings};
use crate::periodic::{PeriodicTask, TaskContext, TaskError};
use chrono::NaiveTime;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

pub struct StaleFileCleanupTask {
    schedule: ScheduleSettings,
    directory: PathBuf,
    retention: Duration,
    max_files_per_run: usize,
    /// Files found by the scan of the current run, not yet removed.
    pending: Mutex<Vec<PathBuf>>,
    removed: AtomicU64,
}

impl StaleFileCleanupTask {
    pub fn from_settings(settings: &StaleFileCleanupTaskSettings) -> Self {
        Self {
            schedule: settings.schedule.clone(),
            directory: settings.directory.clone(),
            retention: Duration::from_secs(settings.retention_days.saturating_mul(SECS_PER_DAY)),
            max_files_per_run: settings.max_files_per_run,
            pending: Mutex::new(Vec::new()),
            removed: AtomicU64::new(0),
        }
    }

    /// Total number of files removed since the task was created.
    pub fn removed_count(&self) -> u64 {
        self.removed.load(Ordering::SeqCst)
    }

    fn scan(&self, ctx: &TaskContext) -> Result<Vec<PathBuf>, TaskError> {
        if !self.directory.is_dir() {
            warn!(
                "Cleanup directory {:?} does not exist, nothing to do",
                self.directory
            );
            return Ok(Vec::new());
        }

        let now = SystemTime::now();
        let mut stale = Vec::new();
        if self.max_files_per_run == 0 {
            return Ok(stale);
        }

        for entry in WalkDir::new(&self.directory).min_depth(1) {
            if ctx.is_cancelled() {
                return Err(TaskError::Cancelled);
            }
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry under {:?}: {}", self.directory, e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if stale.len() >= self.max_files_per_run {
                break;
            }
            if is_stale(entry.path(), now, self.retention) {
                stale.push(entry.into_path());
            }
        }

        Ok(stale)
    }
}

fn is_stale(path: &Path, now: SystemTime, retention: Duration) -> bool {
    let modified = match path.metadata().and_then(|m| m.modified()) {
        Ok(modified) => modified,
        Err(e) => {
            debug!("Cannot read modification time of {:?}: {}", path, e);
            return false;
        }
    };
    let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
    age >= retention
}

impl PeriodicTask for StaleFileCleanupTask {
    fn name(&self) -> Option<String> {
        Some("Stale File Cleanup".to_string())
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

    fn process_item(&self, ctx: &TaskContext) -> Result<bool, TaskError> {
        if ctx.is_cancelled() {
            return Err(TaskError::Cancelled);
        }

        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());

        if ctx.iteration == 0 {
            *pending = self.scan(ctx)?;
            if pending.is_empty() {
                info!("No stale files under {:?}", self.directory);
                return Ok(false);
            }
            info!(
                "Found {} files under {:?} older than {} days",
                pending.len(),
                self.directory,
                self.retention.as_secs() / SECS_PER_DAY
            );
            return Ok(true);
        }

        let Some(path) = pending.pop() else {
            return Ok(false);
        };

        match std::fs::remove_file(&path) {
            Ok(()) => {
                self.removed.fetch_add(1, Ordering::SeqCst);
                debug!("Removed stale file {:?}", path);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Stale file {:?} already gone", path);
            }
            Err(e) => return Err(TaskError::Io(e)),
        }

        Ok(!pending.is_empty())
    }
}
