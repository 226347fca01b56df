use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use windowgate::config::GateConfig;
use windowgate::load::{self, LoadPlan};
use windowgate::ratelimit::{AdmissionGate, SlidingWindowLimiter};
use windowgate::telemetry;

/// Drive concurrent load through a sliding-window admission gate.
#[derive(Debug, Parser)]
#[command(name = "windowgate", version, about)]
struct Cli {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the bucket duration in seconds
    #[arg(long)]
    bucket_secs: Option<u64>,

    /// Override the window duration in seconds
    #[arg(long)]
    window_secs: Option<u64>,

    /// Override the requests admitted per window
    #[arg(long)]
    max_threshold: Option<u64>,

    /// Number of concurrent clients
    #[arg(long, default_value_t = 4)]
    clients: usize,

    /// Requests issued by each client
    #[arg(long, default_value_t = 10)]
    requests: usize,

    /// Sleep for the retry hint after a rejection and try again
    #[arg(long)]
    honor_retry_after: bool,

    /// Retries per request when honouring retry hints
    #[arg(long, default_value_t = 3)]
    max_retries: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = GateConfig::load(cli.config.as_deref())?;
    if let Some(bucket_secs) = cli.bucket_secs {
        config.limiter.bucket_secs = bucket_secs;
    }
    if let Some(window_secs) = cli.window_secs {
        config.limiter.window_secs = window_secs;
    }
    if let Some(max_threshold) = cli.max_threshold {
        config.limiter.max_threshold = max_threshold;
    }

    let _log_guard = telemetry::init(&config.logging)?;

    info!("Starting Windowgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let limiter = match SlidingWindowLimiter::starting_at(config.limiter.settings(), load::now()) {
        Ok(limiter) => Arc::new(limiter),
        Err(e) => {
            error!(error = %e, "Invalid limiter configuration");
            return Err(e.into());
        }
    };
    let gate = AdmissionGate::new(limiter);

    let plan = LoadPlan {
        clients: cli.clients,
        requests_per_client: cli.requests,
        honor_retry_after: cli.honor_retry_after,
        max_retries: cli.max_retries,
    };

    tokio::select! {
        report = load::run(gate, plan) => {
            info!(
                admitted = report.admitted,
                rejected = report.rejected,
                retries = report.retries,
                "Load run complete"
            );
        }
        _ = shutdown_signal() => {
            info!("Load run interrupted");
        }
    }

    info!("Windowgate stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
