use crate::processor::Processor;
use rip_rs_packets::Ipv4Packet;
use tracing::debug;

/// Swallows IPv4 packets whose header checksum does not match their header.
#[derive(Default)]
pub struct ValidateIpv4Checksum {}

impl ValidateIpv4Checksum {
    pub fn new() -> ValidateIpv4Checksum {
        ValidateIpv4Checksum {}
    }
}

impl Processor for ValidateIpv4Checksum {
    type Input = Ipv4Packet;
    type Output = Ipv4Packet;

    fn process(&mut self, packet: Self::Input) -> Option<Self::Output> {
        if packet.validate_checksum() {
            Some(packet)
        } else {
            debug!(
                src = %packet.src_addr(),
                dest = %packet.dest_addr(),
                "dropping packet with bad header checksum"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_valid_and_drops_corrupt() {
        let mut packet = Ipv4Packet::empty();
        packet.set_ttl(9);
        packet.set_checksum();

        let mut elem = ValidateIpv4Checksum::new();
        assert_eq!(elem.process(packet.clone()), Some(packet.clone()));

        let mut corrupt = packet;
        corrupt.set_ttl(10);
        assert_eq!(elem.process(corrupt), None);
    }
}
