use crate::processor::Processor;
use rip_rs_packets::Ipv4Packet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HopLimit {
    /// TTL decremented and header checksum recomputed.
    Alive(Ipv4Packet),
    /// The packet arrived with a TTL of 0 or 1. It is handed back untouched so the
    /// original header can be quoted in time exceeded.
    Expired(Ipv4Packet),
}

/// Decrements the TTL of an IPv4 packet
#[derive(Default)]
pub struct DecIpv4HopLimit {}

impl DecIpv4HopLimit {
    pub fn new() -> DecIpv4HopLimit {
        DecIpv4HopLimit {}
    }
}

impl Processor for DecIpv4HopLimit {
    type Input = Ipv4Packet;
    type Output = HopLimit;

    fn process(&mut self, mut packet: Self::Input) -> Option<Self::Output> {
        match packet.ttl() {
            0 | 1 => Some(HopLimit::Expired(packet)),
            ttl => {
                packet.set_ttl(ttl - 1);
                packet.set_checksum();
                Some(HopLimit::Alive(packet))
            }
        }
    }
}
