use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use periodic_task_host::config;
use periodic_task_host::periodic::{Orchestrator, TaskLogger, TracingLogger};
use periodic_task_host::server::{self, metrics};
use periodic_task_host::{run_host, tasks, HostSettings};

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, msg));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Seconds between two scheduling ticks. Values below 1 use the default.
    #[clap(long, default_value_t = config::DEFAULT_TICK_INTERVAL_SECS)]
    pub tick_interval_secs: u64,

    /// Seconds to wait after boot before the startup dispatch.
    #[clap(long, default_value_t = config::DEFAULT_STARTUP_DELAY_SECS)]
    pub startup_delay_secs: u64,

    /// Seconds to wait for each running task on shutdown. 0 waits forever.
    #[clap(long, default_value_t = config::DEFAULT_STOP_TIMEOUT_SECS)]
    pub stop_timeout_secs: u64,

    /// The port for the metrics server (Prometheus scraping). 0 disables it.
    #[clap(long, default_value_t = config::DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            tick_interval_secs: args.tick_interval_secs,
            startup_delay_secs: args.startup_delay_secs,
            stop_timeout_secs: args.stop_timeout_secs,
            metrics_port: args.metrics_port,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()?;

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI)
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;

    info!("Configuration loaded:");
    info!("  tick_interval: {:?}", app_config.tick_interval);
    info!("  startup_delay: {:?}", app_config.startup_delay);
    info!("  stop_timeout: {:?}", app_config.stop_timeout);

    info!("Initializing metrics...");
    metrics::init_metrics();

    let shutdown_token = CancellationToken::new();

    if let Some(port) = app_config.metrics_port {
        let metrics_shutdown = shutdown_token.child_token();
        tokio::spawn(async move {
            if let Err(e) = server::run_metrics_server(port, metrics_shutdown).await {
                error!("Metrics server failed: {:#}", e);
            }
        });
    }

    let provider = tasks::builtin_provider(&app_config.tasks);
    info!("{} built-in tasks configured", provider.len());

    let orchestrator = Arc::new(
        Orchestrator::new(Arc::new(provider)).with_stop_timeout(app_config.stop_timeout),
    );
    let logger: Arc<dyn TaskLogger> = Arc::new(TracingLogger);

    let host = tokio::spawn(run_host(
        orchestrator,
        logger,
        HostSettings::from(&app_config),
        shutdown_token.clone(),
    ));

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, initiating graceful shutdown");
    shutdown_token.cancel();

    let summary = host.await?;
    if summary.timed_out > 0 || summary.failed > 0 {
        error!(
            "{} tasks did not stop in time, {} failed to stop",
            summary.timed_out, summary.failed
        );
    }
    info!("Task host stopped");
    Ok(())
}
