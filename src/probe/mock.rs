//! In-memory transport for tests.
//!
//! [`MockTransport::pair`] returns the two ends of a fake network link: the
//! engine side implements [`Transport`], and [`MockRemote`] plays the
//! network, observing outbound frames and injecting inbound ones. Frames
//! carry no IP header, matching DGRAM socket semantics.

use parking_lot::Mutex;
use std::io;
use std::net::IpAddr;
use std::sync::mpsc;
use std::time::Duration;

use crate::probe::Transport;

type Frame = (Vec<u8>, IpAddr);

/// The engine side of an in-memory link.
pub struct MockTransport {
    inbound: Mutex<mpsc::Receiver<Frame>>,
    outbound: mpsc::Sender<Frame>,
    read_timeout: Duration,
}

/// The network side of an in-memory link.
pub struct MockRemote {
    outbound: Mutex<mpsc::Receiver<Frame>>,
    inbound: mpsc::Sender<Frame>,
}

impl MockTransport {
    /// Create a connected transport/remote pair.
    pub fn pair() -> (MockTransport, MockRemote) {
        let (outbound_tx, outbound_rx) = mpsc::channel();
        let (inbound_tx, inbound_rx) = mpsc::channel();

        let transport = MockTransport {
            inbound: Mutex::new(inbound_rx),
            outbound: outbound_tx,
            read_timeout: Duration::from_millis(100),
        };
        let remote = MockRemote {
            outbound: Mutex::new(outbound_rx),
            inbound: inbound_tx,
        };
        (transport, remote)
    }
}

impl Transport for MockTransport {
    fn send_to(&self, packet: &[u8], target: IpAddr) -> io::Result<usize> {
        self.outbound
            .send((packet.to_vec(), target))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "mock remote dropped"))?;
        Ok(packet.len())
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, IpAddr)> {
        let frame = self
            .inbound
            .lock()
            .recv_timeout(self.read_timeout)
            .map_err(|e| match e {
                mpsc::RecvTimeoutError::Timeout => {
                    io::Error::new(io::ErrorKind::TimedOut, "read timeout")
                }
                mpsc::RecvTimeoutError::Disconnected => {
                    io::Error::new(io::ErrorKind::BrokenPipe, "mock remote dropped")
                }
            })?;

        let (packet, source) = frame;
        let len = packet.len().min(buf.len());
        buf[..len].copy_from_slice(&packet[..len]);
        Ok((len, source))
    }
}

impl MockRemote {
    /// Next frame the engine sent, or None if nothing arrives in time.
    pub fn next_request(&self, timeout: Duration) -> Option<Frame> {
        self.outbound.lock().recv_timeout(timeout).ok()
    }

    /// Deliver an inbound frame to the engine, as if `source` sent it.
    pub fn inject(&self, packet: Vec<u8>, source: IpAddr) {
        // Engine may already be shut down; a dropped frame is what a real
        // network would produce too
        let _ = self.inbound.send((packet, source));
    }

    /// Echo a captured request back as the matching reply.
    ///
    /// Flips the ICMP type byte (8 -> 0, 128 -> 129) and leaves everything
    /// else, payload tag included, untouched. The stale checksum is fine:
    /// reply parsing does not verify it.
    pub fn echo(&self, request: &[u8], source: IpAddr) {
        let mut reply = request.to_vec();
        match reply.first() {
            Some(8) => reply[0] = 0,
            Some(128) => reply[0] = 129,
            _ => return,
        }
        self.inject(reply, source);
    }
}
