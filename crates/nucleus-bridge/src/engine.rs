//! Forwarding engine: shared bridge state, the two pump directions, and the
//! startup handshake task.
//!
//! Each configured ipMIDI port gets its own device pump; a single DAW pump
//! drains the endpoint channel and fans out to every port. The pumps share
//! one [`EchoSuppressor`] so a move forwarded in one direction absorbs its
//! own reflection coming back in the other.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, trace, warn};

use ipmidi_protocol::echo::{Direction, EchoSuppressor};
use ipmidi_protocol::event::{IpMidiPacket, MidiEvent};
use ipmidi_protocol::handshake::{self, startup_sequence, HANDSHAKE_VERSION};
use ipmidi_protocol::mcu;

use crate::config::BridgeConfig;
use crate::endpoint::DawEndpoint;
use crate::transport::{IpMidiReceiver, IpMidiSender};

// ── Lifecycle ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// State shared by every pump task. Counters are totals over the process
/// lifetime and get reported once at shutdown.
pub struct BridgeState {
    pub config: BridgeConfig,
    pub suppressor: EchoSuppressor,
    phase: watch::Sender<EnginePhase>,
    pub from_device: AtomicU64,
    pub to_device: AtomicU64,
    pub suppressed_to_daw: AtomicU64,
    pub suppressed_to_device: AtomicU64,
}

impl BridgeState {
    pub fn new(config: BridgeConfig) -> Self {
        let window = Duration::from_millis(config.echo.window_ms);
        let (phase, _) = watch::channel(EnginePhase::Starting);
        Self {
            config,
            suppressor: EchoSuppressor::new(window),
            phase,
            from_device: AtomicU64::new(0),
            to_device: AtomicU64::new(0),
            suppressed_to_daw: AtomicU64::new(0),
            suppressed_to_device: AtomicU64::new(0),
        }
    }

    pub fn set_phase(&self, phase: EnginePhase) {
        debug!(?phase, "engine phase");
        self.phase.send_replace(phase);
    }

    pub fn phase(&self) -> watch::Receiver<EnginePhase> {
        self.phase.subscribe()
    }
}

// ── Per-event forwarding steps ──────────────────────────────────────────

/// Forward one decoded datagram to the DAW. Returns how many events were
/// actually delivered after suppression.
pub fn forward_packet_to_daw(
    state: &BridgeState,
    packet: IpMidiPacket,
    daw: &dyn DawEndpoint,
) -> usize {
    let mut delivered = 0;
    for event in packet.events {
        state.from_device.fetch_add(1, Ordering::Relaxed);

        if state.suppressor.should_suppress(Direction::ToDaw, &event) {
            state.suppressed_to_daw.fetch_add(1, Ordering::Relaxed);
            continue;
        }

        let out = if state.config.bridge.translate_to_cc {
            mcu::fader_to_cc(&event).unwrap_or(event)
        } else {
            event
        };

        if let Err(err) = daw.send(&out) {
            error!(port = packet.port, %err, "failed to deliver event to DAW");
            continue;
        }
        state.suppressor.mark_sent(Direction::ToDaw, &out);

        match out {
            MidiEvent::Clock | MidiEvent::ActiveSensing => {
                trace!(port = packet.port, event = ?out, "device -> daw");
            }
            _ => debug!(port = packet.port, event = ?out, "device -> daw"),
        }
        delivered += 1;
    }
    delivered
}

/// Run one DAW-originated event through suppression and translation.
/// Returns the event to put on the wire, or `None` if it was an echo.
/// The fingerprint is recorded before the caller sends, so a reflection
/// can never arrive ahead of it.
pub fn prepare_device_send(state: &BridgeState, event: MidiEvent) -> Option<MidiEvent> {
    state.to_device.fetch_add(1, Ordering::Relaxed);

    if state.suppressor.should_suppress(Direction::ToDevice, &event) {
        state.suppressed_to_device.fetch_add(1, Ordering::Relaxed);
        return None;
    }

    let out = if state.config.bridge.translate_to_cc {
        mcu::cc_to_fader(&event).unwrap_or(event)
    } else {
        event
    };

    state.suppressor.mark_sent(Direction::ToDevice, &out);

    match out {
        MidiEvent::Clock | MidiEvent::ActiveSensing => trace!(event = ?out, "daw -> device"),
        _ => debug!(event = ?out, "daw -> device"),
    }

    Some(out)
}

// ── Pump tasks ──────────────────────────────────────────────────────────

/// Device→DAW pump for one ipMIDI port. Never returns in steady state;
/// transient receive and decode failures are logged and skipped.
pub async fn device_to_daw(
    state: Arc<BridgeState>,
    receiver: IpMidiReceiver,
    daw: Arc<dyn DawEndpoint>,
) -> anyhow::Result<()> {
    info!(
        port = receiver.port(),
        udp = ipmidi_protocol::udp_port(receiver.port()),
        "device pump listening"
    );

    let mut buf = vec![0u8; 65536];
    loop {
        let len = match receiver.recv(&mut buf).await {
            Ok(len) => len,
            Err(err) => {
                error!(port = receiver.port(), %err, "ipMIDI receive failed");
                tokio::time::sleep(Duration::from_millis(10)).await;
                continue;
            }
        };

        let packet = match receiver.decode(&buf[..len]) {
            Ok(packet) => packet,
            Err(err) => {
                warn!(port = receiver.port(), len, %err, "dropped malformed datagram");
                continue;
            }
        };

        forward_packet_to_daw(&state, packet, daw.as_ref());
    }
}

/// DAW→Device pump. Drains the endpoint channel and fans each surviving
/// event out to every configured port. Returns when the endpoint closes
/// its sender, which only happens at shutdown.
pub async fn daw_to_device(
    state: Arc<BridgeState>,
    mut events_rx: mpsc::UnboundedReceiver<MidiEvent>,
    senders: Vec<IpMidiSender>,
) -> anyhow::Result<()> {
    let ports: Vec<u8> = senders.iter().map(|s| s.port()).collect();
    info!(?ports, "DAW pump running");

    let mut send_buf = Vec::with_capacity(512);
    while let Some(event) = events_rx.recv().await {
        let Some(out) = prepare_device_send(&state, event) else {
            continue;
        };

        for sender in &senders {
            if let Err(err) = sender.send(std::slice::from_ref(&out), &mut send_buf).await {
                error!(port = sender.port(), %err, "ipMIDI send failed");
            }
        }
    }

    info!("DAW pump stopped: endpoint channel closed");
    Ok(())
}

/// One-shot handshake task. Waits until the engine reports `Running`, then
/// pushes each step into the endpoint channel so the sequence rides the
/// normal DAW→Device path and gets marked like user traffic.
pub async fn run_handshake(state: Arc<BridgeState>, events_tx: mpsc::UnboundedSender<MidiEvent>) {
    let mut phase = state.phase();
    loop {
        if *phase.borrow() == EnginePhase::Running {
            break;
        }
        if phase.changed().await.is_err() {
            return;
        }
    }

    info!(version = HANDSHAKE_VERSION, "starting MCU handshake");
    handshake::run(startup_sequence(), |event| events_tx.send(event)).await;
}
