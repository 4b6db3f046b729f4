use rip_rs_packets::*;
use std::net::Ipv4Addr;

/// A UDP datagram from port 4000 carrying `payload`.
pub fn udp_packet(
    src: Ipv4Addr,
    dest: Ipv4Addr,
    dest_port: u16,
    ttl: u8,
    payload: &[u8],
) -> Ipv4Packet {
    let mut segment = UdpSegment::empty();
    segment
        .set_src_port(4000)
        .set_dest_port(dest_port)
        .set_payload(payload);
    let mut packet = Ipv4Packet::encap_udp(segment);
    packet.set_src_addr(src);
    packet.set_dest_addr(dest);
    packet.set_ttl(ttl);
    packet.set_checksum();
    packet
}

/// An echo request with identifier 0x1234 and `sequence`.
pub fn echo_request(src: Ipv4Addr, dest: Ipv4Addr, ttl: u8, sequence: u16) -> Ipv4Packet {
    let mut message = IcmpPacket::empty();
    message
        .set_icmp_type(ICMP_ECHO_REQUEST)
        .set_code(0)
        .set_identifier(0x1234)
        .set_sequence(sequence)
        .set_payload(b"abcdefghijklmnop");
    message.set_checksum();

    let mut packet = Ipv4Packet::encap_icmp(message);
    packet.set_src_addr(src);
    packet.set_dest_addr(dest);
    packet.set_ttl(ttl);
    packet.set_checksum();
    packet
}

/// Puts `packet` in an Ethernet frame, the way it would arrive on a link.
pub fn frame_for(packet: Ipv4Packet, src_mac: MacAddr, dest_mac: MacAddr) -> EthernetFrame {
    let mut frame = EthernetFrame::encap_ipv4(packet);
    frame.set_src_mac(src_mac);
    frame.set_dest_mac(dest_mac);
    frame
}

pub fn arp_request(sender_mac: MacAddr, sender_ip: Ipv4Addr, target_ip: Ipv4Addr) -> EthernetFrame {
    ArpFrame::request(sender_mac, sender_ip, target_ip).frame()
}

pub fn arp_reply(
    sender_mac: MacAddr,
    sender_ip: Ipv4Addr,
    target_mac: MacAddr,
    target_ip: Ipv4Addr,
) -> EthernetFrame {
    ArpFrame::reply(sender_mac, sender_ip, target_mac, target_ip).frame()
}

/// A RIP message from a neighbor, sent to the RIP multicast group the way routers advertise.
pub fn rip_frame(src_mac: MacAddr, src_ip: Ipv4Addr, message: &RipMessage) -> EthernetFrame {
    rip_frame_from_port(src_mac, src_ip, RIP_PORT, message)
}

/// Same as `rip_frame`, sent from UDP port `src_port`.
pub fn rip_frame_from_port(
    src_mac: MacAddr,
    src_ip: Ipv4Addr,
    src_port: u16,
    message: &RipMessage,
) -> EthernetFrame {
    let mut segment = UdpSegment::empty();
    segment
        .set_src_port(src_port)
        .set_dest_port(RIP_PORT)
        .set_payload(&message.to_bytes());
    let mut packet = Ipv4Packet::encap_udp(segment);
    packet.set_src_addr(src_ip);
    packet.set_dest_addr(RIP_MULTICAST_ADDR);
    packet.set_ttl(1);
    packet.set_checksum();
    frame_for(packet, src_mac, MacAddr::BROADCAST)
}

/// A response advertising `routes` as (destination, mask, metric).
pub fn rip_response(
    src_mac: MacAddr,
    src_ip: Ipv4Addr,
    routes: &[(Ipv4Addr, Ipv4Addr, u32)],
) -> EthernetFrame {
    let entries = routes
        .iter()
        .map(|&(address, mask, metric)| RipEntry::new(address, mask, Ipv4Addr::UNSPECIFIED, metric))
        .collect();
    rip_frame(src_mac, src_ip, &RipMessage::response(entries))
}
