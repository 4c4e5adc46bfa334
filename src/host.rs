//! Host loop driving an [`Orchestrator`]: a startup dispatch after the
//! startup delay, a regular dispatch on every tick, and a graceful stop on
//! shutdown.

use crate::config::AppConfig;
use crate::periodic::{Orchestrator, StopSummary, TaskLogger};
use chrono::Local;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostSettings {
    pub tick_interval: Duration,
    pub startup_delay: Duration,
}

impl From<&AppConfig> for HostSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            tick_interval: config.tick_interval,
            startup_delay: config.startup_delay,
        }
    }
}

/// Run until `shutdown` is cancelled, then stop every task and return the
/// stop summary.
pub async fn run_host(
    orchestrator: Arc<Orchestrator>,
    logger: Arc<dyn TaskLogger>,
    settings: HostSettings,
    shutdown: CancellationToken,
) -> StopSummary {
    info!(
        "Task host starting (startup delay {:?}, tick interval {:?})",
        settings.startup_delay, settings.tick_interval
    );

    tokio::select! {
        _ = tokio::time::sleep(settings.startup_delay) => {}
        _ = shutdown.cancelled() => {
            info!("Shutdown requested before the first dispatch");
            return stop(orchestrator, logger).await;
        }
    }

    let mut ticker = tokio::time::interval_at(
        Instant::now() + settings.tick_interval,
        settings.tick_interval,
    );
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    dispatch(&orchestrator, &logger, true);

    loop {
        tokio::select! {
            _ = ticker.tick() => dispatch(&orchestrator, &logger, false),
            _ = shutdown.cancelled() => break,
        }
    }

    stop(orchestrator, logger).await
}

fn dispatch(orchestrator: &Orchestrator, logger: &Arc<dyn TaskLogger>, is_startup: bool) {
    let launched = orchestrator.start_tasks(Arc::clone(logger), is_startup);
    debug!("Dispatch (startup: {}) launched {} runs", is_startup, launched);
}

async fn stop(orchestrator: Arc<Orchestrator>, logger: Arc<dyn TaskLogger>) -> StopSummary {
    logger.log(
        "Service Stopping",
        &format!("Task host stop requested at {}", Local::now().to_rfc3339()),
        None,
    );

    // Stopping blocks on the task threads
    let stopping_logger = Arc::clone(&logger);
    let result =
        tokio::task::spawn_blocking(move || orchestrator.stop_tasks(stopping_logger.as_ref()))
            .await;

    let summary = match result {
        Ok(summary) => summary,
        Err(e) => {
            logger.log("OnStop", "Error when stopping tasks", Some(&e));
            StopSummary::default()
        }
    };

    logger.log(
        "Service Stopped",
        &format!(
            "Task host stopped at {} ({} stopped, {} idle, {} timed out, {} failed)",
            Local::now().to_rfc3339(),
            summary.stopped,
            summary.idle,
            summary.timed_out,
            summary.failed
        ),
        None,
    );
    summary
}
