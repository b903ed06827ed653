//! Payload tag identifying which session and which probe a packet belongs to.
//!
//! Every echo request carries an 8-byte tag at the start of its payload, and
//! the reply echoes it back unchanged. The probe id distinguishes sessions
//! sharing the socket; the sequence id distinguishes probes within a session
//! and doubles as a nonce against stale replies. The codec is deliberately
//! pure so it can be tested in isolation from any socket.

/// Identifies one probe of one session, as embedded in echo payloads.
#[derive(Debug, Clone, Copy, Default, Hash, Eq, PartialEq)]
pub struct Tag {
    /// Unique per concurrently running session.
    pub probe_id: u32,
    /// Unique per probe within a session.
    pub sequence_id: u32,
}

impl Tag {
    /// Encoded size on the wire.
    pub const WIRE_SIZE: usize = 8;

    pub fn new(probe_id: u32, sequence_id: u32) -> Self {
        Self {
            probe_id,
            sequence_id,
        }
    }

    /// Encode as 8 bytes: probe id big-endian, then sequence id big-endian.
    pub fn marshal(&self) -> [u8; Self::WIRE_SIZE] {
        let mut bytes = [0u8; Self::WIRE_SIZE];
        bytes[0..4].copy_from_slice(&self.probe_id.to_be_bytes());
        bytes[4..8].copy_from_slice(&self.sequence_id.to_be_bytes());
        bytes
    }

    /// Decode from the start of a payload.
    ///
    /// Tolerant: bytes beyond the end of the input read as zero, since
    /// intermediate equipment may pad or truncate the payload. Callers
    /// validate the parsed tag against an expected value instead of relying
    /// on a decode error.
    pub fn unmarshal(bytes: &[u8]) -> Self {
        let mut padded = [0u8; Self::WIRE_SIZE];
        let n = bytes.len().min(Self::WIRE_SIZE);
        padded[..n].copy_from_slice(&bytes[..n]);

        Self {
            probe_id: u32::from_be_bytes([padded[0], padded[1], padded[2], padded[3]]),
            sequence_id: u32::from_be_bytes([padded[4], padded[5], padded[6], padded[7]]),
        }
    }
}
