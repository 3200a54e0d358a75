//! Integration tests for the ipmidi-protocol crate.
//!
//! These exercise the public API across module boundaries: wire bytes
//! through the decoder into the echo suppressor, the MCU handshake table
//! through its async runner, and the fader/CC translation paths.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use ipmidi_protocol::echo::{Direction, EchoSuppressor};
use ipmidi_protocol::event::{decode_stream, encode_stream, MidiEvent};
use ipmidi_protocol::handshake::{self, HandshakeStep};
use ipmidi_protocol::{mcu, udp_port, UDP_PORT_BASE};

// ---------------------------------------------------------------------------
// 1. Wire bytes through decode into echo suppression
// ---------------------------------------------------------------------------

#[test]
fn reflected_fader_move_is_suppressed_once_at_byte_level() {
    let suppressor = EchoSuppressor::new(Duration::from_secs(10));

    // DAW sends a centered fader on channel 0; the bridge encodes and marks.
    let outbound = MidiEvent::PitchBend { channel: 0, value: 8192 };
    let mut wire = Vec::new();
    encode_stream(&[outbound.clone()], &mut wire);
    assert_eq!(wire, vec![0xE0, 0x00, 0x40]);
    suppressor.mark_sent(Direction::ToDevice, &outbound);

    // The device reflects the move (value drifted during settling).
    let reflected = decode_stream(&[0xE0, 0x12, 0x40]).expect("valid datagram");
    assert_eq!(reflected.len(), 1);
    assert!(suppressor.should_suppress(Direction::ToDaw, &reflected[0]));

    // A second, user-originated move right after passes through.
    let user_move = decode_stream(&[0xE0, 0x00, 0x41]).expect("valid datagram");
    assert!(!suppressor.should_suppress(Direction::ToDaw, &user_move[0]));
}

#[test]
fn multi_message_datagram_suppresses_only_the_echoed_event() {
    let suppressor = EchoSuppressor::new(Duration::from_secs(10));
    suppressor.mark_sent(
        Direction::ToDevice,
        &MidiEvent::NoteOn { channel: 0, note: 0x68, velocity: 0x7F },
    );

    // One datagram: the echoed touch note plus an unrelated fader move.
    let events = decode_stream(&[0x90, 0x68, 0x7F, 0xE2, 0x00, 0x20]).expect("valid datagram");
    let forwarded: Vec<_> = events
        .into_iter()
        .filter(|e| !suppressor.should_suppress(Direction::ToDaw, e))
        .collect();

    assert_eq!(forwarded, vec![MidiEvent::PitchBend { channel: 2, value: 0x1000 }]);
}

#[test]
fn malformed_datagram_fails_decode_but_next_one_parses() {
    assert!(decode_stream(&[0xE0, 0x00]).is_err());
    let next = decode_stream(&[0xE0, 0x00, 0x40]).expect("valid datagram after a bad one");
    assert_eq!(next, vec![MidiEvent::PitchBend { channel: 0, value: 8192 }]);
}

// ---------------------------------------------------------------------------
// 2. MCU handshake table and runner
// ---------------------------------------------------------------------------

#[tokio::test]
async fn handshake_sends_full_table_in_order() {
    let sent: Arc<Mutex<Vec<MidiEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&sent);

    handshake::run(handshake::startup_sequence(), move |event| {
        sink.lock().unwrap().push(event);
        Ok::<(), std::io::Error>(())
    })
    .await;

    let sent = sent.lock().unwrap();
    let expected: Vec<MidiEvent> = handshake::startup_sequence()
        .into_iter()
        .map(|step| step.event)
        .collect();
    assert_eq!(*sent, expected);
    assert_eq!(sent[0], mcu::device_query());
    assert_eq!(sent.len(), 19);
}

#[tokio::test]
async fn handshake_continues_past_a_failed_send() {
    let steps = vec![
        HandshakeStep { event: mcu::fader_touch(0, true), delay: Duration::ZERO },
        HandshakeStep { event: mcu::fader_touch(0, false), delay: Duration::ZERO },
        HandshakeStep { event: mcu::fader_touch(1, true), delay: Duration::ZERO },
    ];

    let attempts = Arc::new(Mutex::new(0usize));
    let counter = Arc::clone(&attempts);

    handshake::run(steps, move |_| {
        let mut n = counter.lock().unwrap();
        *n += 1;
        if *n == 1 {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "port gone"))
        } else {
            Ok(())
        }
    })
    .await;

    assert_eq!(*attempts.lock().unwrap(), 3);
}

#[test]
fn handshake_traffic_is_suppressible_like_user_traffic() {
    // Every handshake step except the query must carry a fingerprint, so the
    // device's reflections of the touch burst get absorbed.
    for (index, step) in handshake::startup_sequence().into_iter().enumerate() {
        if index == 0 {
            assert!(step.event.fingerprint().is_none(), "query is SysEx, never tracked");
        } else {
            assert!(step.event.fingerprint().is_some(), "step {index} must be trackable");
        }
    }
}

// ---------------------------------------------------------------------------
// 3. Fader/CC translation round path
// ---------------------------------------------------------------------------

#[test]
fn translated_fader_survives_daw_round_trip() {
    let from_device = MidiEvent::PitchBend { channel: 4, value: 16383 };
    let to_daw = mcu::fader_to_cc(&from_device).expect("fader channel translates");
    assert_eq!(to_daw, MidiEvent::ControlChange { channel: 0, controller: 5, value: 127 });

    let back = mcu::cc_to_fader(&to_daw).expect("fader CC translates back");
    assert_eq!(back, from_device);
}

// ---------------------------------------------------------------------------
// 4. Port numbering
// ---------------------------------------------------------------------------

#[test]
fn ipmidi_ports_map_to_consecutive_udp_ports() {
    assert_eq!(udp_port(1), UDP_PORT_BASE);
    assert_eq!(udp_port(2), 21929);
    assert_eq!(udp_port(3), 21930);
}
