//! nodegraph daemon: keeps the local node-network view in sync with the
//! upstream provider and prunes it on a schedule.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use nodegraph_services::periodic::STOP_TIMEOUT;
use nodegraph_services::{
    init_logging, CleanupOutcome, PeriodicTask, ServiceManager, ServiceMetrics, ServicesConfig,
    ShutdownController, SyncOutcome,
};
use nodegraph_store_lmdb::LmdbDatastore;
use nodegraph_upstream::HttpNodeSource;

/// How often the metrics snapshot is logged when metrics are enabled.
const METRICS_LOG_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "nodegraph-daemon", about = "Lightning node-network sync daemon")]
struct Cli {
    /// Base URL of the upstream node-data provider.
    #[arg(long, env = "NODEGRAPH_UPSTREAM_URL")]
    upstream_url: Option<String>,

    /// Bearer token for the upstream provider.
    #[arg(long, env = "NODEGRAPH_UPSTREAM_API_KEY", hide_env_values = true)]
    upstream_api_key: Option<String>,

    /// Data directory for the LMDB environment.
    #[arg(long, env = "NODEGRAPH_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Seconds between sync cycles.
    #[arg(long, env = "NODEGRAPH_SYNC_INTERVAL")]
    sync_interval: Option<u64>,

    /// Seconds between retention cycles.
    #[arg(long, env = "NODEGRAPH_CLEANUP_INTERVAL")]
    cleanup_interval: Option<u64>,

    /// Log metrics snapshots periodically.
    #[arg(long, env = "NODEGRAPH_ENABLE_METRICS")]
    metrics: bool,

    /// Log format: "human" or "json".
    #[arg(long, env = "NODEGRAPH_LOG_FORMAT")]
    log_format: Option<String>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "NODEGRAPH_LOG_LEVEL")]
    log_level: Option<String>,

    /// Path to a TOML configuration file. File settings are the base;
    /// CLI flags and env vars override them.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Run the periodic services until SIGINT/SIGTERM.
    Run,
    /// Run one sync cycle and exit.
    SyncOnce,
    /// Run one retention cycle and exit.
    CleanupOnce,
    /// Print the effective configuration as TOML and exit.
    ShowConfig,
}

impl Cli {
    fn resolve_config(&self) -> anyhow::Result<ServicesConfig> {
        let base = match &self.config {
            Some(path) => {
                let path = path.to_str().context("config path is not valid UTF-8")?;
                ServicesConfig::from_toml_file(path)
                    .with_context(|| format!("failed to load config file {path}"))?
            }
            None => ServicesConfig::default(),
        };

        let config = ServicesConfig {
            upstream_url: self.upstream_url.clone().unwrap_or(base.upstream_url),
            upstream_api_key: self.upstream_api_key.clone().or(base.upstream_api_key),
            data_dir: self.data_dir.clone().unwrap_or(base.data_dir),
            sync_interval_secs: self.sync_interval.unwrap_or(base.sync_interval_secs),
            cleanup_interval_secs: self.cleanup_interval.unwrap_or(base.cleanup_interval_secs),
            enable_metrics: self.metrics || base.enable_metrics,
            log_format: self.log_format.clone().unwrap_or(base.log_format),
            log_level: self.log_level.clone().unwrap_or(base.log_level),
            ..base
        };
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.resolve_config()?;

    if let Command::ShowConfig = cli.command {
        println!("{}", config.to_toml_string()?);
        return Ok(());
    }

    init_logging(config.log_format()?, &config.log_level)?;
    if let Some(path) = &cli.config {
        tracing::info!("loaded config from {}", path.display());
    }

    let datastore = Arc::new(
        LmdbDatastore::open(&config.data_dir, config.map_size_bytes()).with_context(|| {
            format!("failed to open datastore at {}", config.data_dir.display())
        })?,
    );
    let mut source = HttpNodeSource::with_timeout(
        config.upstream_url.clone(),
        Duration::from_secs(config.upstream_timeout_secs),
    )?;
    if let Some(key) = &config.upstream_api_key {
        source = source.with_api_key(key.clone());
    }

    let manager = ServiceManager::new(datastore.clone(), Arc::new(source), &config)?;

    match cli.command {
        Command::Run => run(&manager, &config).await?,
        Command::SyncOnce => match manager.sync().perform_full_sync().await? {
            SyncOutcome::Completed(report) => tracing::info!(
                nodes = report.nodes_upserted,
                peers = report.peers_inserted,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "sync finished"
            ),
            SyncOutcome::Skipped => tracing::warn!("sync skipped"),
        },
        Command::CleanupOnce => match manager.retention().perform_cleanup().await? {
            CleanupOutcome::Completed(report) => {
                tracing::info!(deleted = report.total(), "cleanup finished")
            }
            CleanupOutcome::Skipped => tracing::warn!("cleanup skipped"),
        },
        // Printed before startup.
        Command::ShowConfig => {}
    }

    if let Err(e) = datastore.environment().force_sync() {
        tracing::warn!("LMDB force_sync failed: {e}");
    } else {
        tracing::info!("LMDB flushed to disk");
    }
    tracing::info!("nodegraph daemon exited cleanly");
    Ok(())
}

async fn run(manager: &ServiceManager, config: &ServicesConfig) -> anyhow::Result<()> {
    tracing::info!(
        upstream = %config.upstream_url,
        data_dir = %config.data_dir.display(),
        sync_interval_secs = config.sync_interval_secs,
        cleanup_interval_secs = config.cleanup_interval_secs,
        "starting nodegraph services"
    );
    manager.initialize_services().await?;

    let metrics_task = if config.enable_metrics {
        Some(spawn_metrics_logger(Arc::clone(manager.metrics()))?)
    } else {
        None
    };

    let shutdown = ShutdownController::new();
    shutdown.wait_for_signal().await;

    tracing::info!("shutdown signal received, stopping services");
    if let Some(task) = metrics_task {
        task.stop(STOP_TIMEOUT).await?;
    }
    manager.shutdown_services().await?;
    Ok(())
}

fn spawn_metrics_logger(metrics: Arc<ServiceMetrics>) -> anyhow::Result<PeriodicTask> {
    let task = PeriodicTask::spawn("metrics", METRICS_LOG_INTERVAL, false, move || {
        let metrics = Arc::clone(&metrics);
        async move {
            match metrics.encode() {
                Ok(text) => tracing::info!(target: "nodegraph::metrics", "\n{text}"),
                Err(e) => tracing::warn!("failed to encode metrics: {e}"),
            }
        }
    })?;
    Ok(task)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flags_override_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nodegraph.toml");
        std::fs::write(
            &path,
            "upstream_url = \"https://file.example\"\nsync_interval_secs = 120\n",
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "nodegraph-daemon",
            "--config",
            path.to_str().unwrap(),
            "--sync-interval",
            "60",
            "run",
        ])
        .unwrap();
        let config = cli.resolve_config().unwrap();

        assert_eq!(config.upstream_url, "https://file.example");
        assert_eq!(config.sync_interval_secs, 60);
        assert_eq!(config.cleanup_interval_secs, 86_400);
    }

    #[test]
    fn invalid_override_is_rejected() {
        let cli =
            Cli::try_parse_from(["nodegraph-daemon", "--cleanup-interval", "0", "sync-once"])
                .unwrap();
        assert!(cli.resolve_config().is_err());
    }
}
