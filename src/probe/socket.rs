use socket2::{Domain, Protocol as SocketProtocol, Socket, Type};
use std::io;
use std::time::Duration;

use crate::config::Protocol;

/// Socket with metadata about type (for DGRAM-aware parsing)
#[derive(Debug)]
pub(crate) struct SocketInfo {
    pub socket: Socket,
    /// True if SOCK_DGRAM (no IP header in received packets)
    pub is_dgram: bool,
}

/// Open an ICMP socket for the given protocol family.
///
/// Prefers a RAW socket (full functionality, requires privilege), falling
/// back to an unprivileged DGRAM ICMP socket. On Linux the fallback needs
/// `net.ipv4.ping_group_range` to cover the caller's group. If both fail,
/// the RAW error is returned since that is the one privilege fixes.
pub(crate) fn open_icmp_socket(protocol: Protocol, read_timeout: Duration) -> io::Result<SocketInfo> {
    let raw_err = match create_icmp_socket(protocol, Type::RAW) {
        Ok(socket) => {
            socket.set_read_timeout(Some(read_timeout))?;
            return Ok(SocketInfo {
                socket,
                is_dgram: false,
            });
        }
        Err(e) => e,
    };

    match create_icmp_socket(protocol, Type::DGRAM) {
        Ok(socket) => {
            socket.set_read_timeout(Some(read_timeout))?;
            Ok(SocketInfo {
                socket,
                is_dgram: true,
            })
        }
        Err(_) => Err(raw_err),
    }
}

fn create_icmp_socket(protocol: Protocol, ty: Type) -> io::Result<Socket> {
    let (domain, socket_protocol) = match protocol {
        Protocol::V4 => (Domain::IPV4, SocketProtocol::ICMPV4),
        Protocol::V6 => (Domain::IPV6, SocketProtocol::ICMPV6),
    };

    let socket = Socket::new(domain, ty, Some(socket_protocol))?;
    socket.set_nonblocking(false)?;
    Ok(socket)
}
