//! SlimLink Player - headless SlimProto player endpoint.
//!
//! Connects to a SlimProto music server and follows its commands with a
//! simulated audio engine. Useful for exercising a server and for running
//! the protocol engine as a background daemon.

mod config;
mod engine;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use slimlink_core::{
    start_client, BroadcastEvent, ConnectionEvent, HostCollaborators, LoggingEventEmitter,
};
use tokio::signal;
use tokio::sync::{broadcast, mpsc};

use crate::config::PlayerConfig;
use crate::engine::{forward_signals, SimulatedEngine};

/// SlimLink Player - headless SlimProto player.
#[derive(Parser, Debug)]
#[command(name = "slimlink-player")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "SLIMLINK_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Server host (overrides config file).
    #[arg(short, long)]
    server: Option<String>,

    /// Player name (overrides config file).
    #[arg(short, long)]
    name: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("SlimLink Player v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        PlayerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(server) = args.server {
        config.server = server;
    }
    if let Some(name) = args.name {
        config.player_name = name;
    }

    log::info!(
        "Configuration: server={}:{}, http_port={}, name={}",
        config.server,
        config.slimproto_port,
        config.http_port,
        config.player_name
    );

    let client_config = config
        .to_client_config()
        .context("Invalid player identity")?;
    let (signal_tx, signal_rx) = mpsc::unbounded_channel();
    let engine = SimulatedEngine::new(config.simulated_track_length(), signal_tx);
    let host = HostCollaborators::new(Arc::new(engine));
    let client = start_client(client_config, host).context("Failed to start client")?;
    tokio::spawn(forward_signals(signal_rx, client.handle().clone()));

    client
        .events()
        .set_external_emitter(Arc::new(LoggingEventEmitter));
    tokio::spawn(log_connectivity(client.subscribe()));

    client
        .handle()
        .connect()
        .await
        .context("Failed to request connection")?;

    // Wait for shutdown signal
    shutdown_signal().await;

    log::info!("Shutdown signal received, cleaning up...");
    client.shutdown().await.context("Failed to shut down")?;

    log::info!("Shutdown complete");
    Ok(())
}

/// Logs connectivity changes, the headless stand-in for a status indicator.
async fn log_connectivity(mut rx: broadcast::Receiver<BroadcastEvent>) {
    loop {
        match rx.recv().await {
            Ok(BroadcastEvent::Connection(event)) => match event {
                ConnectionEvent::StateChanged { state, reason, .. } => match reason {
                    Some(reason) => log::info!("Connection {} ({:?})", state, reason),
                    None => log::info!("Connection {}", state),
                },
                ConnectionEvent::ReconnectScheduled {
                    attempt, delay_ms, ..
                } => log::info!("Reconnect attempt {} in {} ms", attempt, delay_ms),
                ConnectionEvent::ReconnectGaveUp { attempts, .. } => {
                    log::error!("Server unreachable after {} attempts", attempts)
                }
                ConnectionEvent::HeartbeatTimeout { silent_for_ms, .. } => {
                    log::warn!("Server silent for {} ms", silent_for_ms)
                }
            },
            Ok(BroadcastEvent::Playback(_)) => {}
            Err(broadcast::error::RecvError::Lagged(n)) => {
                log::warn!("Event subscriber lagged, {} events skipped", n);
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
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
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
