use pnet::packet::MutablePacket;
use pnet::packet::Packet;
use pnet::packet::icmp::echo_reply::EchoReplyPacket;
use pnet::packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet::packet::icmp::{IcmpCode, IcmpPacket, IcmpType, IcmpTypes, checksum};
use pnet::packet::ipv4::Ipv4Packet;

use crate::config::Protocol;
use crate::probe::Tag;

/// ICMP header size (fixed)
pub const ICMP_HEADER_SIZE: usize = 8;

// ICMPv6 type codes (the v4 values come from pnet's IcmpTypes)
const ICMPV6_ECHO_REQUEST: u8 = 128;
const ICMPV6_ECHO_REPLY: u8 = 129;

/// Get process identifier for the ICMP identification field
///
/// Informational only: DGRAM sockets let the kernel rewrite this field, so
/// reply correlation relies on the payload tag instead.
pub fn get_identifier() -> u16 {
    std::process::id() as u16
}

/// Build an ICMP Echo Request carrying `tag` at the start of its payload
///
/// Payload layout:
/// - Bytes 0-3: probe id (big-endian)
/// - Bytes 4-7: sequence id (big-endian)
/// - Bytes 8+: pattern fill
///
/// The header sequence field carries the low 16 bits of the sequence id.
/// The IPv4 checksum is computed here; for ICMPv6 the kernel fills it in.
pub fn build_echo_request(
    protocol: Protocol,
    identifier: u16,
    tag: Tag,
    payload_size: usize,
) -> Vec<u8> {
    let payload_size = payload_size.max(Tag::WIRE_SIZE);
    let packet_size = ICMP_HEADER_SIZE + payload_size;
    let mut buffer = vec![0u8; packet_size];

    let mut packet = MutableEchoRequestPacket::new(&mut buffer).unwrap();

    match protocol {
        Protocol::V4 => packet.set_icmp_type(IcmpTypes::EchoRequest),
        Protocol::V6 => packet.set_icmp_type(IcmpType::new(ICMPV6_ECHO_REQUEST)),
    }
    packet.set_icmp_code(IcmpCode::new(0));
    packet.set_identifier(identifier);
    packet.set_sequence_number((tag.sequence_id & 0xFFFF) as u16);

    // Fill payload: tag first, then pattern
    let payload = packet.payload_mut();
    payload[..Tag::WIRE_SIZE].copy_from_slice(&tag.marshal());
    for (i, byte) in payload[Tag::WIRE_SIZE..].iter_mut().enumerate() {
        *byte = (i & 0xFF) as u8;
    }

    if protocol == Protocol::V4 {
        let cksum = checksum(&IcmpPacket::new(&buffer).unwrap());
        let mut packet = MutableEchoRequestPacket::new(&mut buffer).unwrap();
        packet.set_checksum(cksum);
    }

    buffer
}

/// Parse an inbound frame as an echo reply and extract its payload tag
///
/// When `includes_ip_header` is true the frame starts with an IPv4 header
/// (RAW IPv4 sockets); otherwise it starts at the ICMP header (DGRAM
/// sockets, and all IPv6 sockets, where the kernel strips the IP header).
///
/// Returns None for anything that is not a well-formed echo reply of the
/// given protocol family; malformed frames are the receiver's problem to
/// drop, never to error on.
pub fn parse_echo_reply(buf: &[u8], protocol: Protocol, includes_ip_header: bool) -> Option<Tag> {
    let icmp_data = if includes_ip_header {
        let ip_packet = Ipv4Packet::new(buf)?;
        let ip_header_len = (ip_packet.get_header_length() as usize) * 4;
        if buf.len() < ip_header_len + ICMP_HEADER_SIZE {
            return None;
        }
        &buf[ip_header_len..]
    } else {
        buf
    };

    let reply = EchoReplyPacket::new(icmp_data)?;

    let expected_type = match protocol {
        Protocol::V4 => IcmpTypes::EchoReply,
        Protocol::V6 => IcmpType::new(ICMPV6_ECHO_REPLY),
    };
    if reply.get_icmp_type() != expected_type {
        return None;
    }

    // Tolerant decode handles short payloads, but an empty one carries
    // nothing worth routing
    let payload = reply.payload();
    if payload.is_empty() {
        return None;
    }

    Some(Tag::unmarshal(payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TAG: Tag = Tag {
        probe_id: 0x12345678,
        sequence_id: 0x87654321,
    };

    /// Flip a request frame into the reply the target would send back
    fn as_reply(mut packet: Vec<u8>) -> Vec<u8> {
        match packet[0] {
            8 => packet[0] = 0,
            128 => packet[0] = ICMPV6_ECHO_REPLY,
            other => panic!("not an echo request: type {}", other),
        }
        packet
    }

    #[test]
    fn test_build_echo_request_v4() {
        let packet = build_echo_request(Protocol::V4, 1234, TAG, 56);
        assert_eq!(packet.len(), ICMP_HEADER_SIZE + 56);
        assert_eq!(packet[0], 8); // Echo Request type
        assert_eq!(packet[1], 0); // Code
        // Tag sits at the start of the payload
        assert_eq!(
            &packet[ICMP_HEADER_SIZE..ICMP_HEADER_SIZE + 8],
            &TAG.marshal()
        );
        // Header sequence field mirrors the low 16 bits of the sequence id
        assert_eq!(
            u16::from_be_bytes([packet[6], packet[7]]),
            (TAG.sequence_id & 0xFFFF) as u16
        );
    }

    #[test]
    fn test_build_echo_request_v6() {
        let packet = build_echo_request(Protocol::V6, 1234, TAG, 56);
        assert_eq!(packet[0], ICMPV6_ECHO_REQUEST);
        assert_eq!(packet[1], 0);
        assert_eq!(
            &packet[ICMP_HEADER_SIZE..ICMP_HEADER_SIZE + 8],
            &TAG.marshal()
        );
    }

    #[test]
    fn test_build_pads_tiny_payload() {
        let packet = build_echo_request(Protocol::V4, 1, TAG, 0);
        assert_eq!(packet.len(), ICMP_HEADER_SIZE + Tag::WIRE_SIZE);
    }

    #[test]
    fn test_parse_reply_roundtrip() {
        for protocol in [Protocol::V4, Protocol::V6] {
            let request = build_echo_request(protocol, 42, TAG, 56);
            let reply = as_reply(request);

            let tag = parse_echo_reply(&reply, protocol, false).expect("echo reply parses");
            assert_eq!(tag, TAG);
        }
    }

    #[test]
    fn test_parse_rejects_echo_request() {
        // A looped-back request must not be mistaken for a reply
        let request = build_echo_request(Protocol::V4, 42, TAG, 56);
        assert_eq!(parse_echo_reply(&request, Protocol::V4, false), None);
    }

    #[test]
    fn test_parse_rejects_wrong_family() {
        let reply = as_reply(build_echo_request(Protocol::V6, 42, TAG, 56));
        assert_eq!(parse_echo_reply(&reply, Protocol::V4, false), None);
    }

    #[test]
    fn test_parse_rejects_truncated_frame() {
        assert_eq!(parse_echo_reply(&[0u8; 4], Protocol::V4, false), None);
        assert_eq!(parse_echo_reply(&[], Protocol::V4, true), None);
    }

    #[test]
    fn test_parse_with_ip_header() {
        let reply = as_reply(build_echo_request(Protocol::V4, 42, TAG, 56));

        // Wrap in a minimal 20-byte IPv4 header (version 4, IHL 5)
        let mut frame = vec![0u8; 20 + reply.len()];
        frame[0] = 0x45;
        frame[9] = 1; // protocol = ICMP
        frame[20..].copy_from_slice(&reply);

        let tag = parse_echo_reply(&frame, Protocol::V4, true).expect("parses past IP header");
        assert_eq!(tag, TAG);
    }
}
