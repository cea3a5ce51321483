//! Sentinel: watches a fixed set of HTTP services and tells the operator when one goes down.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod config;
mod error;
mod models;
mod notifier;
mod prober;
mod scheduler;
mod supervisor;
#[cfg(test)]
mod testutil;

use crate::api::AppState;
use crate::config::{SupervisorConfig, DEFAULT_CONFIG_PATH, DEFAULT_LOG_FILTER};
use crate::notifier::Notifier;
use crate::prober::Prober;
use crate::scheduler::Scheduler;
use crate::supervisor::Supervisor;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Service-health supervisor with Telegram alerts
#[derive(Parser, Debug)]
#[command(name = "sentinel", version, about)]
struct Args {
    /// Path to the JSON configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log filter (e.g. "sentinel=debug,tower_http=info")
    #[arg(short, long)]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn init_tracing(args: &Args) {
    // CLI > RUST_LOG > default
    let filter = args
        .log_level
        .clone()
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

    let registry = tracing_subscriber::registry().with(EnvFilter::new(filter));
    match args.log_format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args);

    let config = SupervisorConfig::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;

    for target in &config.targets {
        info!(name = %target.name, url = %target.url, "target configured");
    }
    if config.targets.is_empty() {
        tracing::warn!("no targets configured, sweeps will be empty");
    }

    let prober = Prober::new(config.probe_timeout()).context("Failed to build probe client")?;
    let notifier = Notifier::from_config(&config.telegram).context("Failed to build notifier")?;
    let supervisor = Arc::new(
        Supervisor::new(config.targets.clone(), prober, notifier)
            .with_policies(config.alert_policy, config.overlap_policy),
    );

    let addr: SocketAddr = format!("{}:{}", config.host, config.api_port)
        .parse()
        .with_context(|| format!("Invalid host or api_port: {}:{}", config.host, config.api_port))?;

    info!(
        alert_policy = ?config.alert_policy,
        overlap_policy = ?config.overlap_policy,
        "{} starting",
        config.service_name
    );

    let scheduler = Arc::new(Scheduler::new(Arc::clone(&supervisor), &config));
    let ticker = Arc::clone(&scheduler).start().await;
    info!(state = ?scheduler.state(), "scheduler ready");

    api::start_server(addr, AppState::new(supervisor, &config.service_name)).await?;

    if let Some(ticker) = ticker {
        ticker.abort();
    }
    info!("Shutdown complete");
    Ok(())
}
