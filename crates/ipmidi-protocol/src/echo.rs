use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::event::{EchoFingerprint, MidiEvent};

/// Which way an event is travelling through the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    ToDaw,
    ToDevice,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::ToDaw => Direction::ToDevice,
            Direction::ToDevice => Direction::ToDaw,
        }
    }
}

/// Breaks the mirroring feedback loop: a message forwarded toward one side
/// is often reflected straight back by that side, and re-forwarding the
/// reflection would bounce it forever.
///
/// `mark_sent` records the fingerprint of everything the bridge forwards;
/// `should_suppress` asks whether an inbound event is the reflection of a
/// recent send in the opposite direction. A match consumes the fingerprint,
/// so one send absorbs exactly one echo and a legitimate identical event
/// right behind it passes through. Entries expire after `window`; expired
/// entries are swept out lazily on lookup.
///
/// Both operations take the table lock, so a lookup and a mark can never
/// interleave mid-decision across the two pumps.
pub struct EchoSuppressor {
    window: Duration,
    inner: Mutex<HashMap<(Direction, EchoFingerprint), Instant>>,
}

impl EchoSuppressor {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Record that `event` was just forwarded in `direction`. Events without
    /// a fingerprint (SysEx, realtime) are not tracked.
    pub fn mark_sent(&self, direction: Direction, event: &MidiEvent) {
        let Some(fp) = event.fingerprint() else { return };
        let mut table = self.inner.lock().unwrap();
        table.insert((direction, fp), Instant::now());
    }

    /// True iff `event`, observed travelling in `direction`, matches an
    /// unexpired fingerprint recorded for the opposite direction. Consumes
    /// the fingerprint on a match.
    pub fn should_suppress(&self, direction: Direction, event: &MidiEvent) -> bool {
        let Some(fp) = event.fingerprint() else { return false };
        let now = Instant::now();
        let mut table = self.inner.lock().unwrap();
        table.retain(|_, sent_at| now.duration_since(*sent_at) < self.window);
        let hit = table.remove(&(direction.opposite(), fp)).is_some();
        if hit {
            trace!(?direction, ?event, "suppressed echo");
        }
        hit
    }
}
