use thiserror::Error;

// -- Events --

/// One decoded MIDI message, as carried over ipMIDI or through the virtual
/// port. Pitch bend values are the raw 14-bit wire value (0..=16383, center
/// 8192). SysEx payloads exclude the 0xF0/0xF7 framing bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiEvent {
    NoteOff { channel: u8, note: u8, velocity: u8 },
    NoteOn { channel: u8, note: u8, velocity: u8 },
    PolyAftertouch { channel: u8, note: u8, pressure: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    ChannelAftertouch { channel: u8, pressure: u8 },
    PitchBend { channel: u8, value: u16 },
    SysEx(Vec<u8>),
    Clock,
    Start,
    Continue,
    Stop,
    ActiveSensing,
    Reset,
}

/// One decoded ipMIDI datagram: the events it carried and the ipMIDI port it
/// belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpMidiPacket {
    pub port: u8,
    pub events: Vec<MidiEvent>,
}

impl IpMidiPacket {
    pub fn udp_port(&self) -> u16 {
        crate::udp_port(self.port)
    }
}

// -- Wire decode/encode --

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// A message ran past the end of the datagram.
    #[error("truncated {kind} message at offset {offset}")]
    Truncated { kind: &'static str, offset: usize },
    /// A data byte appeared where a status byte was expected.
    #[error("stray data byte {byte:#04x} at offset {offset}")]
    StrayData { byte: u8, offset: usize },
    /// A status byte interrupted the data bytes of a channel-voice message.
    #[error("status byte {byte:#04x} inside {kind} message at offset {offset}")]
    InterruptedMessage {
        kind: &'static str,
        byte: u8,
        offset: usize,
    },
    /// System exclusive payload with no terminating 0xF7.
    #[error("unterminated system exclusive message at offset {offset}")]
    UnterminatedSysEx { offset: usize },
    /// 0xF4, 0xF5, 0xF9, 0xFD, or an 0xF7 outside a SysEx message.
    #[error("undefined or out-of-place status byte {byte:#04x} at offset {offset}")]
    UndefinedStatus { byte: u8, offset: usize },
}

const fn voice_data_len(status: u8) -> usize {
    match status & 0xF0 {
        0xC0 | 0xD0 => 1,
        _ => 2,
    }
}

fn voice_kind_name(status: u8) -> &'static str {
    match status & 0xF0 {
        0x80 => "note-off",
        0x90 => "note-on",
        0xA0 => "poly-aftertouch",
        0xB0 => "control-change",
        0xC0 => "program-change",
        0xD0 => "channel-aftertouch",
        _ => "pitch-bend",
    }
}

/// Decode the raw MIDI byte stream of one ipMIDI datagram. ipMIDI senders
/// never split a message across datagrams, so a partial message here is a
/// framing error, not a resumable state.
///
/// A note-on with velocity 0 decodes as a note-off. System-common messages
/// the bridge does not model (MTC quarter frame, song position, song select,
/// tune request) are skipped over with their correct data lengths.
pub fn decode_stream(data: &[u8]) -> Result<Vec<MidiEvent>, DecodeError> {
    let mut events = Vec::new();
    let mut i = 0;

    while i < data.len() {
        let status = data[i];
        match status {
            0x00..=0x7F => {
                return Err(DecodeError::StrayData { byte: status, offset: i });
            }
            0x80..=0xEF => {
                let kind = voice_kind_name(status);
                let len = voice_data_len(status);
                if i + 1 + len > data.len() {
                    return Err(DecodeError::Truncated { kind, offset: i });
                }
                let d = &data[i + 1..i + 1 + len];
                if let Some(pos) = d.iter().position(|b| b & 0x80 != 0) {
                    return Err(DecodeError::InterruptedMessage {
                        kind,
                        byte: d[pos],
                        offset: i + 1 + pos,
                    });
                }
                let channel = status & 0x0F;
                events.push(match status & 0xF0 {
                    0x80 => MidiEvent::NoteOff { channel, note: d[0], velocity: d[1] },
                    0x90 => {
                        if d[1] == 0 {
                            // Note-on with velocity 0 is a release.
                            MidiEvent::NoteOff { channel, note: d[0], velocity: 0 }
                        } else {
                            MidiEvent::NoteOn { channel, note: d[0], velocity: d[1] }
                        }
                    }
                    0xA0 => MidiEvent::PolyAftertouch { channel, note: d[0], pressure: d[1] },
                    0xB0 => MidiEvent::ControlChange { channel, controller: d[0], value: d[1] },
                    0xC0 => MidiEvent::ProgramChange { channel, program: d[0] },
                    0xD0 => MidiEvent::ChannelAftertouch { channel, pressure: d[0] },
                    _ => MidiEvent::PitchBend {
                        channel,
                        value: d[0] as u16 | ((d[1] as u16) << 7),
                    },
                });
                i += 1 + len;
            }
            0xF0 => match data[i + 1..].iter().position(|&b| b == 0xF7) {
                Some(rel) => {
                    events.push(MidiEvent::SysEx(data[i + 1..i + 1 + rel].to_vec()));
                    i += rel + 2;
                }
                None => return Err(DecodeError::UnterminatedSysEx { offset: i }),
            },
            0xF1 | 0xF3 => {
                let kind = if status == 0xF1 { "mtc-quarter-frame" } else { "song-select" };
                if i + 2 > data.len() {
                    return Err(DecodeError::Truncated { kind, offset: i });
                }
                i += 2;
            }
            0xF2 => {
                if i + 3 > data.len() {
                    return Err(DecodeError::Truncated { kind: "song-position", offset: i });
                }
                i += 3;
            }
            0xF6 => i += 1,
            0xF8 => {
                events.push(MidiEvent::Clock);
                i += 1;
            }
            0xFA => {
                events.push(MidiEvent::Start);
                i += 1;
            }
            0xFB => {
                events.push(MidiEvent::Continue);
                i += 1;
            }
            0xFC => {
                events.push(MidiEvent::Stop);
                i += 1;
            }
            0xFE => {
                events.push(MidiEvent::ActiveSensing);
                i += 1;
            }
            0xFF => {
                events.push(MidiEvent::Reset);
                i += 1;
            }
            _ => return Err(DecodeError::UndefinedStatus { byte: status, offset: i }),
        }
    }

    Ok(events)
}

/// Encode events back to a raw MIDI byte stream (one datagram payload).
pub fn encode_stream(events: &[MidiEvent], buf: &mut Vec<u8>) {
    buf.clear();
    for event in events {
        event.encode_to(buf);
    }
}

impl MidiEvent {
    pub fn encode_to(&self, buf: &mut Vec<u8>) {
        match *self {
            MidiEvent::NoteOff { channel, note, velocity } => {
                buf.extend_from_slice(&[0x80 | channel, note, velocity]);
            }
            MidiEvent::NoteOn { channel, note, velocity } => {
                buf.extend_from_slice(&[0x90 | channel, note, velocity]);
            }
            MidiEvent::PolyAftertouch { channel, note, pressure } => {
                buf.extend_from_slice(&[0xA0 | channel, note, pressure]);
            }
            MidiEvent::ControlChange { channel, controller, value } => {
                buf.extend_from_slice(&[0xB0 | channel, controller, value]);
            }
            MidiEvent::ProgramChange { channel, program } => {
                buf.extend_from_slice(&[0xC0 | channel, program]);
            }
            MidiEvent::ChannelAftertouch { channel, pressure } => {
                buf.extend_from_slice(&[0xD0 | channel, pressure]);
            }
            MidiEvent::PitchBend { channel, value } => {
                buf.extend_from_slice(&[
                    0xE0 | channel,
                    (value & 0x7F) as u8,
                    ((value >> 7) & 0x7F) as u8,
                ]);
            }
            MidiEvent::SysEx(ref payload) => {
                buf.push(0xF0);
                buf.extend_from_slice(payload);
                buf.push(0xF7);
            }
            MidiEvent::Clock => buf.push(0xF8),
            MidiEvent::Start => buf.push(0xFA),
            MidiEvent::Continue => buf.push(0xFB),
            MidiEvent::Stop => buf.push(0xFC),
            MidiEvent::ActiveSensing => buf.push(0xFE),
            MidiEvent::Reset => buf.push(0xFF),
        }
    }
}

// -- Echo fingerprints --

/// Identity key for echo matching: message kind + channel + primary data
/// byte. Continuous-value messages (pitch bend, channel aftertouch) key on
/// the channel alone, because a motorized fader interpolates while settling
/// and reflects values that differ from the one sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EchoFingerprint {
    kind: FingerprintKind,
    channel: u8,
    data: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum FingerprintKind {
    NoteOff,
    NoteOn,
    PolyAftertouch,
    ControlChange,
    ProgramChange,
    ChannelAftertouch,
    PitchBend,
}

impl MidiEvent {
    /// None for SysEx and realtime messages: those are never suppressed.
    pub fn fingerprint(&self) -> Option<EchoFingerprint> {
        let (kind, channel, data) = match *self {
            MidiEvent::NoteOff { channel, note, .. } => (FingerprintKind::NoteOff, channel, note),
            MidiEvent::NoteOn { channel, note, .. } => (FingerprintKind::NoteOn, channel, note),
            MidiEvent::PolyAftertouch { channel, note, .. } => {
                (FingerprintKind::PolyAftertouch, channel, note)
            }
            MidiEvent::ControlChange { channel, controller, .. } => {
                (FingerprintKind::ControlChange, channel, controller)
            }
            MidiEvent::ProgramChange { channel, program } => {
                (FingerprintKind::ProgramChange, channel, program)
            }
            MidiEvent::ChannelAftertouch { channel, .. } => {
                (FingerprintKind::ChannelAftertouch, channel, 0)
            }
            MidiEvent::PitchBend { channel, .. } => (FingerprintKind::PitchBend, channel, 0),
            _ => return None,
        };
        Some(EchoFingerprint { kind, channel, data })
    }
}
