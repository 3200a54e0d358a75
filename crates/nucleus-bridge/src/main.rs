mod config;
mod endpoint;
mod engine;
mod transport;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::config::{Args, BridgeConfig};
use crate::engine::{BridgeState, EnginePhase};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Config before tracing: the log filter comes from the config file.
    let config_found = args.config.exists();
    let config: BridgeConfig = if config_found {
        let config_str = tokio::fs::read_to_string(&args.config).await?;
        toml::from_str(&config_str)?
    } else {
        BridgeConfig::default()
    };

    let verbosity = args.verbosity.unwrap_or(config.bridge.verbosity);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(config::filter_for_verbosity(verbosity))
            }),
        )
        .init();

    if !config_found {
        info!(path = %args.config.display(), "No config file found, using defaults");
    }

    config::validate_ports(&config.network.ports).map_err(|e| anyhow::anyhow!(e))?;

    info!(
        port_name = %config.bridge.port_name,
        group = ipmidi_protocol::MULTICAST_GROUP,
        ports = ?config.network.ports,
        interface = %config.network.interface,
        translate_to_cc = config.bridge.translate_to_cc,
        "Nucleus bridge starting"
    );

    let state = Arc::new(BridgeState::new(config.clone()));

    // Open the socket pair for every configured ipMIDI port up front, so a
    // bad binding fails the whole startup rather than a lone pump.
    let mut receivers = Vec::new();
    let mut senders = Vec::new();
    for &port in &config.network.ports {
        let (receiver, sender) = transport::open(port, config.network.interface)?;
        receivers.push(receiver);
        senders.push(sender);
    }

    let (events_tx, events_rx) = mpsc::unbounded_channel();

    let daw = endpoint::open(&config.bridge.port_name, events_tx.clone())?;

    // Spawn one device pump per port
    let mut pump_handles = Vec::new();
    for receiver in receivers {
        let state = Arc::clone(&state);
        let daw = Arc::clone(&daw);
        pump_handles.push(tokio::spawn(async move {
            if let Err(e) = engine::device_to_daw(state, receiver, daw).await {
                error!("Device pump error: {}", e);
            }
        }));
    }

    // Spawn the single DAW pump
    let daw_pump_handle = {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = engine::daw_to_device(state, events_rx, senders).await {
                error!("DAW pump error: {}", e);
            }
        })
    };

    // Spawn the MCU handshake (waits for the Running phase before sending)
    let handshake_handle = if config.handshake.enabled {
        let state = Arc::clone(&state);
        let events_tx = events_tx.clone();
        Some(tokio::spawn(engine::run_handshake(state, events_tx)))
    } else {
        info!("MCU handshake disabled");
        None
    };

    state.set_phase(EnginePhase::Running);
    info!("Bridge running");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    state.set_phase(EnginePhase::Stopping);

    if let Some(handle) = handshake_handle {
        handle.abort();
    }
    daw_pump_handle.abort();
    for handle in pump_handles {
        handle.abort();
    }

    state.set_phase(EnginePhase::Stopped);
    info!(
        from_device = state.from_device.load(Ordering::Relaxed),
        to_device = state.to_device.load(Ordering::Relaxed),
        suppressed_to_daw = state.suppressed_to_daw.load(Ordering::Relaxed),
        suppressed_to_device = state.suppressed_to_device.load(Ordering::Relaxed),
        "Final traffic counters"
    );

    Ok(())
}
