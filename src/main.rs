//! Relaywatch Binary Entry Point
//!
//! Watches the configured endpoints until interrupted, logging a state
//! snapshot every interval. Core functionality is provided by the
//! `relaywatch` library crate.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use relaywatch::{
    config::{AppConfig, EndpointConfig, parse_duration},
    watch::{Address, RemoteWatcher, WatchContext},
};
use tokio::time::{Instant, MissedTickBehavior};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Relaywatch - Remote Endpoint Availability Watcher
#[derive(Parser, Debug)]
#[command(name = "relaywatch", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (defaults apply when omitted)
    #[arg(short, long, env = "RELAYWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Watch interval, e.g. `5s` (overrides config file)
    #[arg(long, env = "RELAYWATCH_INTERVAL", value_parser = parse_duration)]
    interval: Option<Duration>,

    /// Probe timeout, e.g. `500ms` (overrides config file)
    #[arg(long, env = "RELAYWATCH_PROBE_TIMEOUT", value_parser = parse_duration)]
    probe_timeout: Option<Duration>,

    /// Additional endpoint to watch as `host:port`; may be repeated
    #[arg(short, long = "endpoint", value_name = "HOST:PORT")]
    endpoints: Vec<Address>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,relaywatch=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Relaywatch - Remote Endpoint Availability Watcher");

    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(ref path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            AppConfig::load(path)?
        }
        None => {
            tracing::info!("No configuration file given, using defaults");
            AppConfig::default()
        }
    };

    // CLI > ENV > config file
    if let Some(interval) = cli.interval {
        config.watch.interval = interval;
    }
    if let Some(timeout) = cli.probe_timeout {
        config.watch.probe_timeout = timeout;
    }
    config.endpoints.endpoints.extend(
        cli.endpoints
            .iter()
            .map(|address| EndpointConfig::new(address.host(), address.port())),
    );
    config.validate()?;

    let addresses = config.addresses();
    if addresses.is_empty() {
        return Err("no endpoints configured; pass --endpoint HOST:PORT or list them in the config file".into());
    }

    tracing::info!(
        "Interval: {:?}, probe timeout: {:?}, probe: {:?}",
        config.watch.interval,
        config.watch.probe_timeout,
        config.probe.kind,
    );

    let context = WatchContext::setup(config.context_settings())?;
    let watcher =
        RemoteWatcher::new(&context, config.build_probe()).with_interval(config.watch.interval);

    for address in addresses {
        tracing::info!("Watching endpoint: {}", address);
        watcher.add_watcher(address);
    }
    watcher.start()?;

    tracing::info!("Press Ctrl+C to shutdown");
    context
        .handle()
        .block_on(report_until_signal(&watcher, watcher.interval()));

    tracing::info!("Stopping watcher...");
    watcher.stop();
    drop(watcher);

    tracing::info!("Shutting down watch context...");
    context.shutdown();

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Log a snapshot every `period` until Ctrl+C or SIGTERM.
async fn report_until_signal(watcher: &RemoteWatcher, period: Duration) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::pin!(ctrl_c, terminate);

    let mut report = tokio::time::interval_at(Instant::now() + period, period);
    report.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("Received Ctrl+C signal");
                break;
            }
            _ = &mut terminate => {
                tracing::info!("Received terminate signal");
                break;
            }
            _ = report.tick() => log_snapshot(watcher),
        }
    }
}

fn log_snapshot(watcher: &RemoteWatcher) {
    let snapshot = watcher.snapshot();
    let available = snapshot.iter().filter(|(_, state)| state.available).count();

    let entries: Vec<_> = snapshot
        .iter()
        .map(|(address, state)| serde_json::json!({ "endpoint": address.to_string(), "state": state }))
        .collect();

    match serde_json::to_string(&entries) {
        Ok(json) => tracing::info!(
            available,
            total = snapshot.len(),
            snapshot = %json,
            "Endpoint snapshot"
        ),
        Err(e) => tracing::warn!("Failed to serialize snapshot: {}", e),
    }
}
