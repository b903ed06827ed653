//! The platform transport seam.
//!
//! The engine never touches a socket directly; it sends and receives framed
//! packets through [`Transport`]. The production implementation is
//! [`IcmpTransport`] over a raw (or unprivileged DGRAM) ICMP socket; tests
//! substitute the in-memory pair from [`crate::probe::mock`].

use socket2::SockAddr;
use std::io;
use std::mem::MaybeUninit;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::config::Protocol;
use crate::probe::socket::{SocketInfo, open_icmp_socket};

/// A shared, concurrently usable packet transport.
///
/// `send_to` and `recv_from` must be safe to call concurrently with each
/// other: the receive loop blocks in `recv_from` on its own thread while any
/// number of sessions call `send_to`.
pub trait Transport: Send + Sync + 'static {
    /// Write one framed packet to the given address.
    fn send_to(&self, packet: &[u8], target: IpAddr) -> io::Result<usize>;

    /// Read the next framed packet and its source address.
    ///
    /// Blocks up to the transport's read timeout; an elapsed timeout is
    /// reported as `WouldBlock` or `TimedOut`, which callers treat as
    /// "nothing to read", not as a failure.
    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, IpAddr)>;

    /// Whether inbound frames start with an IP header.
    ///
    /// True only for RAW IPv4 sockets; DGRAM sockets and all IPv6 sockets
    /// deliver the bare ICMP message.
    fn includes_ip_header(&self) -> bool {
        false
    }
}

/// The socket2-backed ICMP transport.
pub struct IcmpTransport {
    info: SocketInfo,
    protocol: Protocol,
}

impl IcmpTransport {
    /// Open an ICMP socket for the given family, preferring RAW and falling
    /// back to unprivileged DGRAM.
    pub fn open(protocol: Protocol, read_timeout: Duration) -> io::Result<Self> {
        let info = open_icmp_socket(protocol, read_timeout)?;
        Ok(Self { info, protocol })
    }
}

impl Transport for IcmpTransport {
    fn send_to(&self, packet: &[u8], target: IpAddr) -> io::Result<usize> {
        let addr = SockAddr::from(SocketAddr::new(target, 0));
        self.info.socket.send_to(packet, &addr)
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, IpAddr)> {
        // socket2 takes MaybeUninit; reusing the caller's initialized buffer
        // is sound since recv only writes into it
        let uninit = unsafe { &mut *(buf as *mut [u8] as *mut [MaybeUninit<u8>]) };
        let (len, addr) = self.info.socket.recv_from(uninit)?;
        let source = addr
            .as_socket()
            .map(|s| s.ip())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "non-IP source address"))?;
        Ok((len, source))
    }

    fn includes_ip_header(&self) -> bool {
        self.protocol == Protocol::V4 && !self.info.is_dgram
    }
}
