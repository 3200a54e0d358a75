//! Startup synchronization burst. An MCU device is expected to announce
//! itself to the host; a DAW that attached mid-session has missed that, so
//! the bridge replays a device query and briefly "touches" every fader to
//! make the control-surface integration re-read positions.

use std::time::Duration;

use tracing::{debug, warn};

use crate::event::MidiEvent;
use crate::mcu;

/// Revision tag for the step table, so captures from other firmware can
/// replace it wholesale.
pub const HANDSHAKE_VERSION: &str = "mcu-sync-v1";

/// Settle time after the device query, before touching faders.
const QUERY_SETTLE: Duration = Duration::from_millis(100);

/// Gap between consecutive touch messages.
const TOUCH_GAP: Duration = Duration::from_millis(25);

/// One outbound event plus the pause that follows it.
#[derive(Debug, Clone)]
pub struct HandshakeStep {
    pub event: MidiEvent,
    pub delay: Duration,
}

/// The fixed step list: device query, then a touch press/release pair per
/// fader, channels 0..=8.
pub fn startup_sequence() -> Vec<HandshakeStep> {
    let mut steps = Vec::with_capacity(1 + 2 * mcu::FADER_CHANNELS as usize);
    steps.push(HandshakeStep {
        event: mcu::device_query(),
        delay: QUERY_SETTLE,
    });
    for fader in 0..mcu::FADER_CHANNELS {
        steps.push(HandshakeStep {
            event: mcu::fader_touch(fader, true),
            delay: TOUCH_GAP,
        });
        steps.push(HandshakeStep {
            event: mcu::fader_touch(fader, false),
            delay: TOUCH_GAP,
        });
    }
    steps
}

/// Execute the steps in order, invoking `send` per event and sleeping each
/// step's delay. Runs once; a failed send is logged and the remaining steps
/// still go out.
pub async fn run<F, E>(steps: Vec<HandshakeStep>, mut send: F)
where
    F: FnMut(MidiEvent) -> Result<(), E>,
    E: std::fmt::Display,
{
    debug!(version = HANDSHAKE_VERSION, steps = steps.len(), "running MCU handshake");
    for (index, step) in steps.into_iter().enumerate() {
        if let Err(e) = send(step.event) {
            warn!(step = index, error = %e, "handshake send failed");
        }
        tokio::time::sleep(step.delay).await;
    }
    debug!("MCU handshake complete");
}
