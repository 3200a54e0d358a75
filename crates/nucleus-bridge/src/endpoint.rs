//! Virtual MIDI endpoint the DAW connects to.
//!
//! Creates a virtual input/output port pair via the OS MIDI service (ALSA on
//! Linux, CoreMIDI on macOS). The output side carries device traffic into the
//! DAW; the input side receives whatever the DAW sends back and forwards it,
//! already decoded, into the bridge's outbound channel.

use std::sync::{Arc, Mutex};

use midir::os::unix::{VirtualInput, VirtualOutput};
use midir::{Ignore, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

use ipmidi_protocol::event::{decode_stream, MidiEvent};

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("failed to create virtual port '{name}': {reason}")]
    Create { name: String, reason: String },
    #[error("failed to send to virtual port: {0}")]
    Send(#[from] midir::SendError),
}

fn create_error(name: &str, reason: impl std::fmt::Display) -> EndpointError {
    EndpointError::Create {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

/// Where DAW-bound events go. The production implementation is [`VirtualPort`];
/// tests substitute a recorder.
pub trait DawEndpoint: Send + Sync {
    fn send(&self, event: &MidiEvent) -> Result<(), EndpointError>;
    fn name(&self) -> &str;
}

struct OutputState {
    conn: MidiOutputConnection,
    buf: Vec<u8>,
}

/// A live virtual port pair. The output connection is serialized behind a
/// mutex because every receive pump sends through the same endpoint.
pub struct VirtualPort {
    name: String,
    output: Mutex<OutputState>,
    // Held so the input port stays registered; the callback owns the channel.
    _input: Mutex<MidiInputConnection<()>>,
}

/// Create the virtual port pair under `name`.
///
/// Events the DAW writes to the input side are decoded and pushed into
/// `events_tx` from the MIDI service's callback thread. Malformed writes are
/// logged and dropped without tearing the port down.
pub fn open(
    name: &str,
    events_tx: mpsc::UnboundedSender<MidiEvent>,
) -> Result<Arc<dyn DawEndpoint>, EndpointError> {
    let output = MidiOutput::new(name).map_err(|e| create_error(name, e))?;
    let conn = output
        .create_virtual(name)
        .map_err(|e| create_error(name, e))?;

    let mut input = MidiInput::new(name).map_err(|e| create_error(name, e))?;
    input.ignore(Ignore::None);

    let port_name = name.to_string();
    let input_conn = input
        .create_virtual(
            name,
            move |_timestamp, bytes, _| forward_incoming(bytes, &events_tx, &port_name),
            (),
        )
        .map_err(|e| create_error(name, e))?;

    info!(name, "virtual MIDI port pair created");

    Ok(Arc::new(VirtualPort {
        name: name.to_string(),
        output: Mutex::new(OutputState {
            conn,
            buf: Vec::with_capacity(512),
        }),
        _input: Mutex::new(input_conn),
    }))
}

/// Decode a raw message from the DAW and queue each event for the device.
/// Runs on the MIDI service's callback thread, so no await and no panics.
fn forward_incoming(bytes: &[u8], events_tx: &mpsc::UnboundedSender<MidiEvent>, port: &str) {
    match decode_stream(bytes) {
        Ok(events) => {
            for event in events {
                if events_tx.send(event).is_err() {
                    // Pump is gone; the bridge is shutting down.
                    return;
                }
            }
        }
        Err(err) => {
            warn!(port, %err, "dropped malformed message from virtual port");
        }
    }
}

impl DawEndpoint for VirtualPort {
    fn send(&self, event: &MidiEvent) -> Result<(), EndpointError> {
        let mut out = self.output.lock().unwrap();
        let OutputState { conn, buf } = &mut *out;
        buf.clear();
        event.encode_to(buf);
        conn.send(buf)?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
