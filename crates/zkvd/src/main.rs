//! zkvd: zkvault daemon
//!
//! Usage:
//!   zkvd [--config /etc/zkv/zkv.toml] [--log info] [--log-format json|text]
//!
//! Serves the HTTP API on `daemon.listen` and, when configured, Prometheus
//! metrics plus liveness/readiness probes on `daemon.metrics_addr`.

mod api;
mod daemon;
mod error;
mod metrics;
mod state;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "zkvd", version, about = "zkvault daemon")]
struct Cli {
    /// Path to zkv.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "ZKV_CONFIG",
        default_value = "/etc/zkv/zkv.toml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides daemon.log_level
    #[arg(long, env = "ZKV_LOG")]
    log: Option<String>,

    /// Log format (json, text); overrides daemon.log_format
    #[arg(long, env = "ZKV_LOG_FORMAT")]
    log_format: Option<LogFormat>,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config is read before logging so its level/format can apply; a missing
    // file is reported once the subscriber exists.
    let (config, missing) = load_config(&cli.config).await?;

    let level = cli
        .log
        .clone()
        .unwrap_or_else(|| config.daemon.log_level.clone());
    let format = cli.log_format.clone().unwrap_or_else(|| {
        match config.daemon.log_format.as_str() {
            "text" => LogFormat::Text,
            _ => LogFormat::Json,
        }
    });
    init_logging(&level, &format);

    if missing {
        tracing::warn!(
            "config file not found: {}  (using defaults)",
            cli.config.display()
        );
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "zkvd starting"
    );

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid config {}: {e}", cli.config.display()))?;

    daemon::run(config).await
}

/// Returns the parsed config and whether the file was absent.
async fn load_config(path: &Path) -> Result<(zkv_core::config::ZkvConfig, bool)> {
    if path.exists() {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow::anyhow!("reading config {}: {e}", path.display()))?;
        let config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("parsing config {}: {e}", path.display()))?;
        Ok((config, false))
    } else {
        Ok((zkv_core::config::ZkvConfig::default(), true))
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
        }
    }
}
