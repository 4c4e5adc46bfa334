use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Host settings (can override CLI)
    pub tick_interval_secs: Option<u64>,
    pub startup_delay_secs: Option<u64>,
    pub stop_timeout_secs: Option<u64>,
    pub metrics_port: Option<u16>,

    // Per-task configs
    pub tasks: Option<TasksConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct TasksConfig {
    pub heartbeat: Option<HeartbeatTaskConfig>,
    pub stale_file_cleanup: Option<StaleFileCleanupTaskConfig>,
}

/// Scheduling overrides shared by every task section.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ScheduleConfig {
    pub disabled: Option<bool>,
    pub order: Option<i32>,
    /// Time of day, "HH:MM" or "HH:MM:SS"
    pub start_time: Option<String>,
    /// Time of day, "HH:MM" or "HH:MM:SS"
    pub end_time: Option<String>,
    pub exec_delay_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct HeartbeatTaskConfig {
    #[serde(flatten)]
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct StaleFileCleanupTaskConfig {
    #[serde(flatten)]
    pub schedule: ScheduleConfig,
    pub directory: Option<String>,
    pub retention_days: Option<u64>,
    pub max_files_per_run: Option<usize>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::parse(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}
