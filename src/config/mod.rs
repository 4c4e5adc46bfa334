mod file_config;

pub use file_config::{
    FileConfig, HeartbeatTaskConfig, ScheduleConfig, StaleFileCleanupTaskConfig, TasksConfig,
};

use anyhow::{bail, Context, Result};
use chrono::NaiveTime;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 120;
pub const DEFAULT_STARTUP_DELAY_SECS: u64 = 10;
pub const DEFAULT_STOP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_METRICS_PORT: u16 = 9092;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub tick_interval_secs: u64,
    pub startup_delay_secs: u64,
    pub stop_timeout_secs: u64,
    pub metrics_port: u16,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: DEFAULT_TICK_INTERVAL_SECS,
            startup_delay_secs: DEFAULT_STARTUP_DELAY_SECS,
            stop_timeout_secs: DEFAULT_STOP_TIMEOUT_SECS,
            metrics_port: DEFAULT_METRICS_PORT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub tick_interval: Duration,
    pub startup_delay: Duration,
    /// `None` waits for running tasks without a bound.
    pub stop_timeout: Option<Duration>,
    /// `None` disables the metrics endpoint.
    pub metrics_port: Option<u16>,

    pub tasks: TasksSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        // Sub-second ticks fall back to the default interval
        let tick_interval_secs = file.tick_interval_secs.unwrap_or(cli.tick_interval_secs);
        let tick_interval_secs = if tick_interval_secs < 1 {
            DEFAULT_TICK_INTERVAL_SECS
        } else {
            tick_interval_secs
        };

        let startup_delay_secs = file.startup_delay_secs.unwrap_or(cli.startup_delay_secs);

        let stop_timeout = match file.stop_timeout_secs.unwrap_or(cli.stop_timeout_secs) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        let metrics_port = match file.metrics_port.unwrap_or(cli.metrics_port) {
            0 => None,
            port => Some(port),
        };

        let tasks_file = file.tasks.unwrap_or_default();

        let hb_file = tasks_file.heartbeat.unwrap_or_default();
        let hb_defaults = HeartbeatTaskSettings::default();
        let heartbeat = HeartbeatTaskSettings {
            schedule: resolve_schedule(&hb_file.schedule, &hb_defaults.schedule)
                .context("Invalid [tasks.heartbeat] section")?,
        };

        // Stale file cleanup only runs when a directory is configured
        let stale_file_cleanup = match tasks_file.stale_file_cleanup {
            Some(sfc_file) => {
                let Some(directory) = sfc_file.directory.clone() else {
                    bail!("[tasks.stale_file_cleanup] requires a directory");
                };
                let sfc_defaults = StaleFileCleanupTaskSettings::with_directory(directory);
                let retention_days = sfc_file
                    .retention_days
                    .unwrap_or(sfc_defaults.retention_days);
                if retention_days.checked_mul(24 * 60 * 60).is_none() {
                    bail!(
                        "[tasks.stale_file_cleanup] retention_days {} is too large",
                        retention_days
                    );
                }
                Some(StaleFileCleanupTaskSettings {
                    schedule: resolve_schedule(&sfc_file.schedule, &sfc_defaults.schedule)
                        .context("Invalid [tasks.stale_file_cleanup] section")?,
                    retention_days,
                    max_files_per_run: sfc_file
                        .max_files_per_run
                        .unwrap_or(sfc_defaults.max_files_per_run),
                    directory: sfc_defaults.directory,
                })
            }
            None => None,
        };

        Ok(Self {
            tick_interval: Duration::from_secs(tick_interval_secs),
            startup_delay: Duration::from_secs(startup_delay_secs),
            stop_timeout,
            metrics_port,
            tasks: TasksSettings {
                heartbeat,
                stale_file_cleanup,
            },
        })
    }
}

/// Scheduling metadata for a configured task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleSettings {
    pub disabled: bool,
    pub order: i32,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub exec_delay: Option<Duration>,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            disabled: false,
            order: crate::periodic::DEFAULT_TASK_ORDER,
            start_time: None,
            end_time: None,
            exec_delay: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TasksSettings {
    pub heartbeat: HeartbeatTaskSettings,
    pub stale_file_cleanup: Option<StaleFileCleanupTaskSettings>,
}

/// Settings for the heartbeat task
#[derive(Debug, Clone)]
pub struct HeartbeatTaskSettings {
    pub schedule: ScheduleSettings,
}

impl Default for HeartbeatTaskSettings {
    fn default() -> Self {
        Self {
            schedule: ScheduleSettings {
                // Startup-critical so the first beat is logged right after boot
                order: -1,
                exec_delay: Some(Duration::from_secs(10 * 60)),
                ..Default::default()
            },
        }
    }
}

/// Settings for the stale file cleanup task
#[derive(Debug, Clone)]
pub struct StaleFileCleanupTaskSettings {
    pub schedule: ScheduleSettings,
    pub directory: PathBuf,
    pub retention_days: u64,
    pub max_files_per_run: usize,
}

impl StaleFileCleanupTaskSettings {
    pub fn with_directory(directory: impl Into<PathBuf>) -> Self {
        Self {
            schedule: ScheduleSettings {
                exec_delay: Some(Duration::from_secs(60 * 60)),
                ..Default::default()
            },
            directory: directory.into(),
            retention_days: 7,
            max_files_per_run: 1000,
        }
    }
}

fn resolve_schedule(file: &ScheduleConfig, defaults: &ScheduleSettings) -> Result<ScheduleSettings> {
    let start_time = match &file.start_time {
        Some(s) => Some(parse_time_of_day(s)?),
        None => defaults.start_time,
    };
    let end_time = match &file.end_time {
        Some(s) => Some(parse_time_of_day(s)?),
        None => defaults.end_time,
    };

    Ok(ScheduleSettings {
        disabled: file.disabled.unwrap_or(defaults.disabled),
        order: file.order.unwrap_or(defaults.order),
        start_time,
        end_time,
        exec_delay: match file.exec_delay_secs {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.exec_delay,
        },
    })
}

/// Parses a time of day written as "HH:MM:SS" or "HH:MM".
pub fn parse_time_of_day(s: &str) -> Result<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .with_context(|| format!("Invalid time of day {:?}, expected HH:MM or HH:MM:SS", s))
}
