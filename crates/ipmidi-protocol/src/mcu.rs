//! Mackie Control Universal byte-level vocabulary, as observed from the
//! console. There is no public MCU specification; these values come from
//! captured traffic and match what other MCU hosts emit.

use crate::event::MidiEvent;

/// Mackie SysEx prefix: manufacturer 00 00 66, model 0x14 (MCU).
pub const MACKIE_HEADER: [u8; 4] = [0x00, 0x00, 0x66, 0x14];

/// Eight channel faders plus the master fader.
pub const FADER_CHANNELS: u8 = 9;

/// Fader touch notes run 0x68..=0x70 on channel 0, one per fader.
pub const FADER_TOUCH_NOTE_BASE: u8 = 0x68;

pub const TOUCH_PRESS_VELOCITY: u8 = 0x7F;

/// The host-to-device query; the device answers with its serial/version
/// announce, which MCU integrations treat as a fresh connection.
pub fn device_query() -> MidiEvent {
    let mut payload = MACKIE_HEADER.to_vec();
    payload.push(0x00);
    MidiEvent::SysEx(payload)
}

/// Touch press/release for one fader (0-based, 8 = master). Releases are
/// note-offs so they match the device's velocity-0 reflections after decode
/// normalization.
pub fn fader_touch(fader: u8, pressed: bool) -> MidiEvent {
    let note = FADER_TOUCH_NOTE_BASE + fader;
    if pressed {
        MidiEvent::NoteOn { channel: 0, note, velocity: TOUCH_PRESS_VELOCITY }
    } else {
        MidiEvent::NoteOff { channel: 0, note, velocity: 0 }
    }
}

// -- Fader <-> CC translation --
// For DAWs without a Mackie Control integration (e.g. Ableton instant
// mapping): fader pitch bends become CC 1..=9 on channel 0 and back.

/// CC number of the first fader; fader N maps to CC N + 1.
pub const FADER_CC_BASE: u8 = 1;

pub fn fader_to_cc(event: &MidiEvent) -> Option<MidiEvent> {
    match *event {
        MidiEvent::PitchBend { channel, value } if channel < FADER_CHANNELS => {
            Some(MidiEvent::ControlChange {
                channel: 0,
                controller: FADER_CC_BASE + channel,
                value: ((value as u32 * 127) / 16383) as u8,
            })
        }
        _ => None,
    }
}

pub fn cc_to_fader(event: &MidiEvent) -> Option<MidiEvent> {
    match *event {
        MidiEvent::ControlChange { controller, value, .. }
            if (FADER_CC_BASE..FADER_CC_BASE + FADER_CHANNELS).contains(&controller) =>
        {
            Some(MidiEvent::PitchBend {
                channel: controller - FADER_CC_BASE,
                // 16383 / 127 is exactly 129, so 7-bit values scale losslessly.
                value: value as u16 * 129,
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_query_bytes() {
        let MidiEvent::SysEx(payload) = device_query() else {
            panic!("query must be SysEx");
        };
        assert_eq!(payload, vec![0x00, 0x00, 0x66, 0x14, 0x00]);
    }

    #[test]
    fn test_fader_touch_notes_cover_all_faders() {
        let first = fader_touch(0, true);
        let last = fader_touch(8, true);
        assert_eq!(first, MidiEvent::NoteOn { channel: 0, note: 0x68, velocity: 0x7F });
        assert_eq!(last, MidiEvent::NoteOn { channel: 0, note: 0x70, velocity: 0x7F });
    }

    #[test]
    fn test_fader_release_is_note_off() {
        assert_eq!(
            fader_touch(3, false),
            MidiEvent::NoteOff { channel: 0, note: 0x6B, velocity: 0 }
        );
    }

    #[test]
    fn test_fader_to_cc_scaling() {
        let top = fader_to_cc(&MidiEvent::PitchBend { channel: 0, value: 16383 }).unwrap();
        assert_eq!(top, MidiEvent::ControlChange { channel: 0, controller: 1, value: 127 });
        let bottom = fader_to_cc(&MidiEvent::PitchBend { channel: 8, value: 0 }).unwrap();
        assert_eq!(bottom, MidiEvent::ControlChange { channel: 0, controller: 9, value: 0 });
    }

    #[test]
    fn test_cc_to_fader_scaling() {
        let top = cc_to_fader(&MidiEvent::ControlChange { channel: 0, controller: 1, value: 127 });
        assert_eq!(top, Some(MidiEvent::PitchBend { channel: 0, value: 16383 }));
    }

    #[test]
    fn test_non_fader_traffic_is_not_translated() {
        // Pitch bend outside the fader channels, CC outside the fader range.
        assert!(fader_to_cc(&MidiEvent::PitchBend { channel: 9, value: 0 }).is_none());
        assert!(cc_to_fader(&MidiEvent::ControlChange { channel: 0, controller: 0x40, value: 1 }).is_none());
        assert!(fader_to_cc(&MidiEvent::Clock).is_none());
    }
}
