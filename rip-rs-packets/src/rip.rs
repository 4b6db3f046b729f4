use std::convert::{TryFrom, TryInto};
use std::net::Ipv4Addr;

pub const RIP_PORT: u16 = 520;
pub const RIP_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 9);
pub const RIP_INFINITY: u32 = 16;
pub const RIP_VERSION: u8 = 2;
/// Most route entries one message may carry, keeping it within 512 bytes.
pub const RIP_MAX_ENTRIES: usize = 25;
/// Address family identifier for IP.
pub const RIP_AF_INET: u16 = 2;

const RIP_HEADER_LEN: usize = 4;
const RIP_ENTRY_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RipCommand {
    Request = 1,
    Response = 2,
}

impl TryFrom<u8> for RipCommand {
    type Error = &'static str;

    fn try_from(command: u8) -> Result<Self, Self::Error> {
        match command {
            1 => Ok(RipCommand::Request),
            2 => Ok(RipCommand::Response),
            _ => Err("Unknown RIP command"),
        }
    }
}

/// One route in a RIPv2 message (RFC 2453 section 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RipEntry {
    pub address_family: u16,
    pub route_tag: u16,
    pub address: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub next_hop: Ipv4Addr,
    pub metric: u32,
}

impl RipEntry {
    pub fn new(address: Ipv4Addr, mask: Ipv4Addr, next_hop: Ipv4Addr, metric: u32) -> RipEntry {
        RipEntry {
            address_family: RIP_AF_INET,
            route_tag: 0,
            address,
            mask,
            next_hop,
            metric,
        }
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.address_family.to_be_bytes());
        out.extend_from_slice(&self.route_tag.to_be_bytes());
        out.extend_from_slice(&self.address.octets());
        out.extend_from_slice(&self.mask.octets());
        out.extend_from_slice(&self.next_hop.octets());
        out.extend_from_slice(&self.metric.to_be_bytes());
    }

    fn read(data: &[u8]) -> RipEntry {
        let addr = |start: usize| {
            let octets: [u8; 4] = data[start..start + 4].try_into().unwrap();
            Ipv4Addr::from(octets)
        };
        RipEntry {
            address_family: u16::from_be_bytes([data[0], data[1]]),
            route_tag: u16::from_be_bytes([data[2], data[3]]),
            address: addr(4),
            mask: addr(8),
            next_hop: addr(12),
            metric: u32::from_be_bytes(data[16..20].try_into().unwrap()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RipMessage {
    pub command: RipCommand,
    pub version: u8,
    pub entries: Vec<RipEntry>,
}

impl RipMessage {
    /// A request for the responder's whole table: a single entry with address family
    /// zero and metric infinity.
    pub fn request() -> RipMessage {
        let mut entry = RipEntry::new(
            Ipv4Addr::UNSPECIFIED,
            Ipv4Addr::UNSPECIFIED,
            Ipv4Addr::UNSPECIFIED,
            RIP_INFINITY,
        );
        entry.address_family = 0;
        RipMessage {
            command: RipCommand::Request,
            version: RIP_VERSION,
            entries: vec![entry],
        }
    }

    pub fn response(entries: Vec<RipEntry>) -> RipMessage {
        RipMessage {
            command: RipCommand::Response,
            version: RIP_VERSION,
            entries,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(RIP_HEADER_LEN + RIP_ENTRY_LEN * self.entries.len());
        out.push(self.command as u8);
        out.push(self.version);
        out.extend_from_slice(&[0, 0]);
        for entry in &self.entries {
            entry.write(&mut out);
        }
        out
    }

    /// Decodes a RIP message from a UDP payload. A partial entry at the end is ignored.
    pub fn from_bytes(data: &[u8]) -> Result<RipMessage, &'static str> {
        if data.len() < RIP_HEADER_LEN {
            return Err("Payload too short to contain a RIP header");
        }
        let command = RipCommand::try_from(data[0])?;
        let entries = data[RIP_HEADER_LEN..]
            .chunks_exact(RIP_ENTRY_LEN)
            .map(RipEntry::read)
            .collect();
        Ok(RipMessage {
            command,
            version: data[1],
            entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_layout() {
        let bytes = RipMessage::request().to_bytes();
        assert_eq!(bytes.len(), 24);
        assert_eq!(&bytes[..4], &[1, 2, 0, 0]);
        // Address family zero, metric 16
        assert_eq!(&bytes[4..6], &[0, 0]);
        assert_eq!(&bytes[20..24], &[0, 0, 0, 16]);
    }

    #[test]
    fn decode_response() {
        let data: Vec<u8> = vec![
            2, 2, 0, 0, //
            0, 2, 0, 0, 10, 1, 0, 0, 255, 255, 0, 0, 0, 0, 0, 0, 0, 0, 0, 3, //
            0, 2, 0, 7, 10, 2, 0, 0, 255, 255, 255, 0, 10, 0, 0, 9, 0, 0, 0, 1,
        ];
        let message = RipMessage::from_bytes(&data).unwrap();
        assert_eq!(message.command, RipCommand::Response);
        assert_eq!(message.version, 2);
        assert_eq!(message.entries.len(), 2);
        assert_eq!(message.entries[0].address, Ipv4Addr::new(10, 1, 0, 0));
        assert_eq!(message.entries[0].mask, Ipv4Addr::new(255, 255, 0, 0));
        assert_eq!(message.entries[0].metric, 3);
        assert_eq!(message.entries[1].route_tag, 7);
        assert_eq!(message.entries[1].next_hop, Ipv4Addr::new(10, 0, 0, 9));
        assert_eq!(message.to_bytes(), data);
    }

    #[test]
    fn truncated_trailing_entry_is_ignored() {
        let mut data = RipMessage::response(vec![RipEntry::new(
            Ipv4Addr::new(192, 168, 1, 0),
            Ipv4Addr::new(255, 255, 255, 0),
            Ipv4Addr::UNSPECIFIED,
            1,
        )])
        .to_bytes();
        data.extend_from_slice(&[0, 2, 0, 0, 10, 0]);
        let message = RipMessage::from_bytes(&data).unwrap();
        assert_eq!(message.entries.len(), 1);
    }

    #[test]
    fn rejects_unknown_command_and_short_header() {
        assert!(RipMessage::from_bytes(&[9, 2, 0, 0]).is_err());
        assert!(RipMessage::from_bytes(&[2, 2]).is_err());
    }
}
