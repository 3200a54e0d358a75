use std::net::Ipv4Addr;
use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;

use ipmidi_protocol::{DEFAULT_ECHO_WINDOW_MS, DEFAULT_PORTS, DEFAULT_PORT_NAME};

#[derive(Parser, Debug)]
#[command(name = "nucleus-bridge", about = "ipMIDI to virtual MIDI bridge")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/bridge.toml")]
    pub config: PathBuf,

    /// Override the configured verbosity (0 = lifecycle, 1 = activity, 2 = byte level)
    #[arg(short, long)]
    pub verbosity: Option<u8>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub bridge: BridgeSection,
    #[serde(default)]
    pub network: NetworkSection,
    #[serde(default)]
    pub echo: EchoSection,
    #[serde(default)]
    pub handshake: HandshakeSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BridgeSection {
    /// Name of the virtual MIDI port pair the workstation sees
    #[serde(default = "default_port_name")]
    pub port_name: String,
    #[serde(default)]
    pub verbosity: u8,
    /// Translate fader pitch bends to CC 1..=9 and back, for DAWs without a
    /// Mackie Control integration
    #[serde(default)]
    pub translate_to_cc: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkSection {
    /// Address of the interface the console is attached to (ipMIDI runs
    /// link-local). 0.0.0.0 joins on the OS default interface.
    #[serde(default = "default_interface")]
    pub interface: Ipv4Addr,
    #[serde(default = "default_ports")]
    pub ports: Vec<u8>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EchoSection {
    #[serde(default = "default_echo_window")]
    pub window_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HandshakeSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            port_name: default_port_name(),
            verbosity: 0,
            translate_to_cc: false,
        }
    }
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            interface: default_interface(),
            ports: default_ports(),
        }
    }
}

impl Default for EchoSection {
    fn default() -> Self {
        Self { window_ms: default_echo_window() }
    }
}

impl Default for HandshakeSection {
    fn default() -> Self {
        Self { enabled: true }
    }
}

// Default value functions
fn default_port_name() -> String { DEFAULT_PORT_NAME.to_string() }
fn default_interface() -> Ipv4Addr { Ipv4Addr::UNSPECIFIED }
fn default_ports() -> Vec<u8> { DEFAULT_PORTS.to_vec() }
fn default_echo_window() -> u64 { DEFAULT_ECHO_WINDOW_MS }
fn default_true() -> bool { true }

/// Default log filter for a verbosity level; RUST_LOG wins when set.
pub fn filter_for_verbosity(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Reject port sets the transport cannot serve.
pub fn validate_ports(ports: &[u8]) -> Result<(), String> {
    if ports.is_empty() {
        return Err("no ipMIDI ports configured".into());
    }
    let mut seen = [false; 4];
    for &port in ports {
        if !(1..=3).contains(&port) {
            return Err(format!("ipMIDI port {port} outside the supported range 1-3"));
        }
        if seen[port as usize] {
            return Err(format!("ipMIDI port {port} listed twice"));
        }
        seen[port as usize] = true;
    }
    Ok(())
}
