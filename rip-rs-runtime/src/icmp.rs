use rip_rs_packets::*;
use std::cmp;
use std::convert::TryFrom;
use std::net::Ipv4Addr;

/// How many bytes of the offending datagram's payload are quoted after its header.
const QUOTED_PAYLOAD_LEN: usize = 8;

const ICMP_TTL: u8 = 64;

/// Helper to generate ICMPv4 error messages
#[derive(Debug, Clone)]
pub struct Icmpv4ErrorGenerator {
    ttl: u8,
    bad_source_addrs: Vec<Ipv4Addr>,
}

impl Icmpv4ErrorGenerator {
    /// Create an ICMPv4 error generator
    ///
    /// # Arguments
    ///
    /// * `bad_source_addrs` - Packets from these IP addresses will generate a None instead of an
    /// an ICMP error. Intended to contain the router's own addresses and the broadcast
    /// address of each attached subnet
    pub fn new(bad_source_addrs: Vec<Ipv4Addr>) -> Icmpv4ErrorGenerator {
        Icmpv4ErrorGenerator {
            ttl: ICMP_TTL,
            bad_source_addrs,
        }
    }

    /// Create an ICMPv4 TTL exceeded error message. Return `None` if an ICMP error message should
    /// not be generated, and the packet should be silently discarded instead
    ///
    /// # Arguments
    ///
    /// * `src_ip` - Source address of the error, the router's address facing the offender
    /// * `packet` - The offending packet, whose header and first 8 payload bytes will be
    /// copied into the returned error packet
    pub fn ttl_exceeded_error(&self, src_ip: Ipv4Addr, packet: &Ipv4Packet) -> Option<Ipv4Packet> {
        self.generic_error(
            src_ip,
            packet,
            ICMP_TIME_EXCEEDED,
            ICMP_TTL_EXCEEDED_IN_TRANSIT,
        )
    }

    /// Create an ICMPv4 destination unreachable message with the given code (net, host or
    /// port unreachable).
    pub fn dest_unreachable_error(
        &self,
        src_ip: Ipv4Addr,
        packet: &Ipv4Packet,
        code: u8,
    ) -> Option<Ipv4Packet> {
        self.generic_error(src_ip, packet, ICMP_DEST_UNREACHABLE, code)
    }

    fn generic_error(
        &self,
        src_ip: Ipv4Addr,
        packet: &Ipv4Packet,
        msg_type: u8,
        msg_code: u8,
    ) -> Option<Ipv4Packet> {
        if !self.should_generate_error(packet) {
            return None;
        }

        let quote_end = cmp::min(
            packet.payload_offset + QUOTED_PAYLOAD_LEN,
            packet.data.len(),
        );
        let mut message = IcmpPacket::empty();
        message
            .set_icmp_type(msg_type)
            .set_code(msg_code)
            .set_payload(&packet.data[packet.layer3_offset..quote_end]);
        message.set_checksum();

        Some(self.wrap(src_ip, packet.src_addr(), message))
    }

    fn wrap(&self, src_ip: Ipv4Addr, dest_ip: Ipv4Addr, message: IcmpPacket) -> Ipv4Packet {
        let mut error_pkt = Ipv4Packet::encap_icmp(message);
        error_pkt.set_ttl(self.ttl);
        error_pkt.set_src_addr(src_ip);
        error_pkt.set_dest_addr(dest_ip);
        error_pkt.set_checksum();
        error_pkt
    }

    // Performs checks based on RFC 1812 4.3.2.7 (When Not to Send ICMP Errors)
    fn should_generate_error(&self, packet: &Ipv4Packet) -> bool {
        // Only the first fragment
        if packet.fragment_offset() != 0 {
            return false;
        }
        // Avoid infinite loops, no errors from errors
        if packet.protocol() == IpProtocol::ICMP {
            match IcmpPacket::try_from(packet.clone()) {
                Ok(icmp_packet) if !icmp_packet.is_error() => {}
                _ => return false,
            }
        }
        // No broadcast, multicast or loopback sources
        let src = packet.src_addr();
        if src.is_broadcast() || src.is_multicast() || src.is_unspecified() || src.is_loopback() {
            return false;
        }
        // Nor datagrams that were sent to a group or the whole link
        let dest = packet.dest_addr();
        if dest.is_broadcast() || dest.is_multicast() {
            return false;
        }
        !self.bad_source_addrs.contains(&src)
    }

    /// Builds the echo reply for an echo request addressed to this router. The reply
    /// comes from the address that was pinged and carries the request's identifier,
    /// sequence number and data. Anything other than an echo request gives None.
    pub fn echo_reply(&self, request: &Ipv4Packet) -> Option<Ipv4Packet> {
        let echo = IcmpPacket::try_from(request.clone()).ok()?;
        if echo.icmp_type() != ICMP_ECHO_REQUEST {
            return None;
        }

        let mut message = IcmpPacket::empty();
        message
            .set_icmp_type(ICMP_ECHO_REPLY)
            .set_code(0)
            .set_identifier(echo.identifier())
            .set_sequence(echo.sequence())
            .set_payload(&echo.payload());
        message.set_checksum();

        Some(self.wrap(request.dest_addr(), request.src_addr(), message))
    }
}
