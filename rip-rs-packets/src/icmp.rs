use crate::*;
use std::borrow::Cow;
use std::convert::{TryFrom, TryInto};

pub const ICMP_ECHO_REPLY: u8 = 0;
pub const ICMP_DEST_UNREACHABLE: u8 = 3;
pub const ICMP_ECHO_REQUEST: u8 = 8;
pub const ICMP_TIME_EXCEEDED: u8 = 11;

pub const ICMP_NET_UNREACHABLE: u8 = 0;
pub const ICMP_HOST_UNREACHABLE: u8 = 1;
pub const ICMP_PORT_UNREACHABLE: u8 = 3;
pub const ICMP_TTL_EXCEEDED_IN_TRANSIT: u8 = 0;

/// ICMPv4 message. Bytes 4..8 of the header are the "rest of header" word, which echo
/// messages split into identifier and sequence number and error messages leave unused.
#[derive(Clone, Debug)]
pub struct IcmpPacket {
    pub data: PacketData,
    pub layer2_offset: Option<usize>,
    pub layer3_offset: Option<usize>,
    pub layer4_offset: usize,
    pub payload_offset: usize,
}

impl Packet for IcmpPacket {}

impl IcmpPacket {
    pub fn from_buffer(
        data: PacketData,
        layer2_offset: Option<usize>,
        layer3_offset: Option<usize>,
        layer4_offset: usize,
    ) -> Result<IcmpPacket, &'static str> {
        if data.len() < layer4_offset + 8 {
            return Err("Message too short to contain an ICMP header");
        }

        if let Some(layer3_offset) = layer3_offset {
            if get_ipv4_payload_type(&data, layer3_offset)? != IpProtocol::ICMP {
                return Err("Protocol is incorrect, since it isn't ICMP");
            }
        }

        Ok(IcmpPacket {
            data,
            layer2_offset,
            layer3_offset,
            layer4_offset,
            payload_offset: layer4_offset + 8,
        })
    }

    /// An 8 byte header of zeroes with no layer 3 header nor payload.
    pub fn empty() -> IcmpPacket {
        IcmpPacket {
            data: vec![0; 8],
            layer2_offset: None,
            layer3_offset: None,
            layer4_offset: 0,
            payload_offset: 8,
        }
    }

    pub fn icmp_type(&self) -> u8 {
        self.data[self.layer4_offset]
    }

    pub fn set_icmp_type(&mut self, icmp_type: u8) -> &mut Self {
        self.data[self.layer4_offset] = icmp_type;
        self
    }

    pub fn code(&self) -> u8 {
        self.data[self.layer4_offset + 1]
    }

    pub fn set_code(&mut self, code: u8) -> &mut Self {
        self.data[self.layer4_offset + 1] = code;
        self
    }

    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes(
            self.data[self.layer4_offset + 2..=self.layer4_offset + 3]
                .try_into()
                .unwrap(),
        )
    }

    pub fn identifier(&self) -> u16 {
        u16::from_be_bytes(
            self.data[self.layer4_offset + 4..=self.layer4_offset + 5]
                .try_into()
                .unwrap(),
        )
    }

    pub fn set_identifier(&mut self, identifier: u16) -> &mut Self {
        self.data[self.layer4_offset + 4..=self.layer4_offset + 5]
            .copy_from_slice(&identifier.to_be_bytes());
        self
    }

    pub fn sequence(&self) -> u16 {
        u16::from_be_bytes(
            self.data[self.layer4_offset + 6..=self.layer4_offset + 7]
                .try_into()
                .unwrap(),
        )
    }

    pub fn set_sequence(&mut self, sequence: u16) -> &mut Self {
        self.data[self.layer4_offset + 6..=self.layer4_offset + 7]
            .copy_from_slice(&sequence.to_be_bytes());
        self
    }

    pub fn payload(&self) -> Cow<[u8]> {
        Cow::from(&self.data[self.payload_offset..])
    }

    /// Set payload of the message, does not change checksum.
    pub fn set_payload(&mut self, payload: &[u8]) -> &mut Self {
        self.data.truncate(self.payload_offset);
        self.data.reserve_exact(payload.len());
        self.data.extend(payload);
        self
    }

    pub fn is_error(&self) -> bool {
        match self.icmp_type() {
            ICMP_DEST_UNREACHABLE | ICMP_TIME_EXCEEDED => true,
            // Source quench, redirect and parameter problem
            4 | 5 | 12 => true,
            _ => false,
        }
    }

    /// Checksum over header and payload, with the checksum field summed as zero.
    pub fn calculate_checksum(&self) -> u16 {
        let mut message = self.data[self.layer4_offset..].to_vec();
        message[2] = 0;
        message[3] = 0;
        internet_checksum(&message)
    }

    pub fn validate_checksum(&self) -> bool {
        self.calculate_checksum() == self.checksum()
    }

    pub fn set_checksum(&mut self) -> &mut Self {
        let checksum = self.calculate_checksum();
        self.data[self.layer4_offset + 2..=self.layer4_offset + 3]
            .copy_from_slice(&checksum.to_be_bytes());
        self
    }
}

/// IcmpPackets are considered the same if they have the same data from the ICMP header
/// onward.
impl PartialEq for IcmpPacket {
    fn eq(&self, other: &Self) -> bool {
        self.data[self.layer4_offset..] == other.data[other.layer4_offset..]
    }
}

impl Eq for IcmpPacket {}

impl TryFrom<Ipv4Packet> for IcmpPacket {
    type Error = &'static str;

    fn try_from(packet: Ipv4Packet) -> Result<Self, Self::Error> {
        IcmpPacket::from_buffer(
            packet.data,
            packet.layer2_offset,
            Some(packet.layer3_offset),
            packet.payload_offset,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_request_fields() {
        let mut packet = Ipv4Packet::empty();
        packet.set_protocol(IpProtocol::ICMP);
        packet.set_payload(&[8, 0, 0, 0, 0x12, 0x34, 0, 7, 0xaa, 0xbb]);
        let mut message = IcmpPacket::try_from(packet).unwrap();

        assert_eq!(message.icmp_type(), ICMP_ECHO_REQUEST);
        assert_eq!(message.code(), 0);
        assert_eq!(message.identifier(), 0x1234);
        assert_eq!(message.sequence(), 7);
        assert_eq!(message.payload(), vec![0xaa, 0xbb]);
        assert!(!message.is_error());

        assert!(!message.validate_checksum());
        message.set_checksum();
        assert!(message.validate_checksum());
    }

    #[test]
    fn rejects_udp() {
        let packet = Ipv4Packet::encap_udp(UdpSegment::empty());
        assert!(IcmpPacket::try_from(packet).is_err());
    }

    #[test]
    fn error_types() {
        let mut message = IcmpPacket::empty();
        message.set_icmp_type(ICMP_TIME_EXCEEDED);
        assert!(message.is_error());
        message.set_icmp_type(ICMP_DEST_UNREACHABLE).set_code(ICMP_PORT_UNREACHABLE);
        assert!(message.is_error());
        assert_eq!(message.code(), 3);
    }

    #[test]
    fn checksum_covers_payload() {
        let mut message = IcmpPacket::empty();
        message.set_icmp_type(ICMP_ECHO_REPLY).set_payload(&[1, 2, 3]);
        message.set_checksum();
        assert!(message.validate_checksum());
        message.set_payload(&[1, 2, 4]);
        assert!(!message.validate_checksum());
    }
}
