pub mod echo;
pub mod event;
pub mod handshake;
pub mod mcu;

/// Multicast group shared by every ipMIDI port.
pub const MULTICAST_GROUP: &str = "225.0.0.37";

/// UDP port of ipMIDI port 1; port N listens on `UDP_PORT_BASE + N - 1`.
pub const UDP_PORT_BASE: u16 = 21928;

/// ipMIDI ports the bridge serves unless configured otherwise.
pub const DEFAULT_PORTS: [u8; 3] = [1, 2, 3];

/// Name under which the virtual MIDI port pair is published.
pub const DEFAULT_PORT_NAME: &str = "Nucleus 2 Bridge";

/// Echo fingerprint validity window. Empirical; long enough to catch the
/// device's reflection of a sent message, short enough not to eat a fader
/// bounced twice in quick succession.
pub const DEFAULT_ECHO_WINDOW_MS: u64 = 50;

/// UDP port for an ipMIDI port number (numbered from 1).
pub fn udp_port(port: u8) -> u16 {
    UDP_PORT_BASE + (port as u16).saturating_sub(1)
}
