use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all task host metrics
const PREFIX: &str = "periodic_task";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref TASK_RUNS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_runs_total"), "Total number of task runs by outcome"),
        &["task", "outcome"]
    ).expect("Failed to create task_runs_total metric");

    pub static ref TASK_RUN_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_run_duration_seconds"),
            "Task run duration in seconds"
        )
        .buckets(vec![0.01, 0.1, 0.5, 1.0, 5.0, 30.0, 60.0, 300.0, 1800.0, 3600.0]),
        &["task"]
    ).expect("Failed to create task_run_duration_seconds metric");

    pub static ref TASK_RUNNING: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_running"), "Whether a task is currently running (1) or not (0)"),
        &["task"]
    ).expect("Failed to create task_running metric");

    pub static ref TASK_ITERATIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_iterations_total"), "Total number of processed items"),
        &["task"]
    ).expect("Failed to create task_iterations_total metric");
}

/// Register all metrics with the Prometheus registry
pub fn init_metrics() {
    // Ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(TASK_RUNS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(TASK_RUN_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(TASK_RUNNING.clone()));
    let _ = REGISTRY.register(Box::new(TASK_ITERATIONS_TOTAL.clone()));
}

/// Record a finished task run
pub fn record_task_run(task: &str, outcome: &str, duration: Duration) {
    TASK_RUNS_TOTAL.with_label_values(&[task, outcome]).inc();

    TASK_RUN_DURATION_SECONDS
        .with_label_values(&[task])
        .observe(duration.as_secs_f64());
}

pub fn set_task_running(task: &str, running: bool) {
    TASK_RUNNING
        .with_label_values(&[task])
        .set(if running { 1.0 } else { 0.0 });
}

pub fn record_task_iteration(task: &str) {
    TASK_ITERATIONS_TOTAL.with_label_values(&[task]).inc();
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}
