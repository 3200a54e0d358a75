//! Multicast transport: one listener/sender socket pair per ipMIDI port.
//! The wire format is raw MIDI bytes, one or more complete messages per
//! datagram.

use std::net::{Ipv4Addr, SocketAddrV4};

use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tokio::net::UdpSocket;

use ipmidi_protocol::event::{decode_stream, encode_stream, DecodeError, IpMidiPacket, MidiEvent};
use ipmidi_protocol::{udp_port, MULTICAST_GROUP};

#[derive(Debug, Error)]
pub enum BindError {
    #[error("ipMIDI port {port} (udp {udp}): {source}")]
    Socket {
        port: u8,
        udp: u16,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid multicast group {group}: {source}")]
    Group {
        group: &'static str,
        #[source]
        source: std::net::AddrParseError,
    },
}

#[derive(Debug, Error)]
#[error("ipMIDI port {port} send failed: {source}")]
pub struct SendError {
    pub port: u8,
    #[source]
    pub source: std::io::Error,
}

/// Receiving half: a multicast group member bound to the port's UDP port.
pub struct IpMidiReceiver {
    port: u8,
    socket: UdpSocket,
}

/// Sending half: an ephemeral socket with the multicast interface pinned.
pub struct IpMidiSender {
    port: u8,
    socket: UdpSocket,
    dest: SocketAddrV4,
}

/// Open the socket pair for one ipMIDI port, joined to the group on the
/// given interface (unspecified = OS default).
pub fn open(port: u8, interface: Ipv4Addr) -> Result<(IpMidiReceiver, IpMidiSender), BindError> {
    let group: Ipv4Addr = MULTICAST_GROUP
        .parse()
        .map_err(|source| BindError::Group { group: MULTICAST_GROUP, source })?;
    let udp = udp_port(port);

    let (listener, sender) =
        open_socket_pair(group, udp, interface).map_err(|source| BindError::Socket {
            port,
            udp,
            source,
        })?;

    Ok((
        IpMidiReceiver { port, socket: listener },
        IpMidiSender {
            port,
            socket: sender,
            dest: SocketAddrV4::new(group, udp),
        },
    ))
}

fn open_socket_pair(
    group: Ipv4Addr,
    udp: u16,
    interface: Ipv4Addr,
) -> std::io::Result<(UdpSocket, UdpSocket)> {
    let listener = UdpSocket::from_std(create_multicast_listener(group, udp, interface)?)?;
    let sender = UdpSocket::from_std(create_multicast_sender(interface)?)?;
    Ok((listener, sender))
}

/// Multicast listener socket: address reuse so the bridge can restart (or
/// coexist with a monitor), bound to the ipMIDI UDP port, joined to the
/// group on `interface`.
fn create_multicast_listener(
    group: Ipv4Addr,
    udp: u16,
    interface: Ipv4Addr,
) -> std::io::Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;

    // On macOS/BSD, SO_REUSEPORT is also needed for multiple listeners
    #[cfg(any(target_os = "macos", target_os = "freebsd"))]
    socket.set_reuse_port(true)?;

    let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, udp);
    socket.bind(&addr.into())?;

    socket.join_multicast_v4(&group, &interface)?;

    socket.set_nonblocking(true)?;

    Ok(socket.into())
}

/// Outbound multicast socket: TTL 1 keeps traffic on the LAN, loopback on so
/// an ipMIDI monitor on this host sees what the bridge emits.
fn create_multicast_sender(interface: Ipv4Addr) -> std::io::Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;

    socket.set_multicast_if_v4(&interface)?;
    socket.set_multicast_ttl_v4(1)?;
    socket.set_multicast_loop_v4(true)?;

    let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0);
    socket.bind(&addr.into())?;

    socket.set_nonblocking(true)?;

    Ok(socket.into())
}

impl IpMidiReceiver {
    pub fn port(&self) -> u8 {
        self.port
    }

    /// Await one datagram. The sole suspension point of a device pump.
    pub async fn recv(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        let (len, _addr) = self.socket.recv_from(buf).await?;
        Ok(len)
    }

    pub fn decode(&self, payload: &[u8]) -> Result<IpMidiPacket, DecodeError> {
        decode_datagram(self.port, payload)
    }
}

/// Decode one datagram payload into the events it carries.
pub fn decode_datagram(port: u8, payload: &[u8]) -> Result<IpMidiPacket, DecodeError> {
    decode_stream(payload).map(|events| IpMidiPacket { port, events })
}

impl IpMidiSender {
    pub fn port(&self) -> u8 {
        self.port
    }

    /// Encode `events` into `buf` and emit one datagram to the group.
    pub async fn send(&self, events: &[MidiEvent], buf: &mut Vec<u8>) -> Result<(), SendError> {
        encode_stream(events, buf);
        self.socket
            .send_to(buf, self.dest)
            .await
            .map_err(|source| SendError { port: self.port, source })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_datagram_tags_port() {
        let packet = decode_datagram(2, &[0xE0, 0x00, 0x40]).unwrap();
        assert_eq!(packet.port, 2);
        assert_eq!(packet.udp_port(), 21929);
        assert_eq!(packet.events.len(), 1);
    }

    #[test]
    fn test_decode_datagram_rejects_garbage() {
        assert!(decode_datagram(1, &[0x01, 0x02]).is_err());
    }
}
