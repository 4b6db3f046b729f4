use crossbeam::channel::Sender;
use rip_rs_packets::{EthernetFrame, MacAddr};
use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;
use tracing::warn;

/// One router port: a name, the link address frames leave with, and the IP subnet it
/// sits on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub name: String,
    pub mac: MacAddr,
    pub ip: Ipv4Addr,
    pub mask: Ipv4Addr,
}

impl Interface {
    pub fn new(name: &str, mac: MacAddr, ip: Ipv4Addr, mask: Ipv4Addr) -> Interface {
        Interface {
            name: name.to_string(),
            mac,
            ip,
            mask,
        }
    }

    /// Network address of the attached subnet.
    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.ip) & u32::from(self.mask))
    }

    /// Directed broadcast address of the attached subnet.
    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.ip) | !u32::from(self.mask))
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} {} {}", self.name, self.mac, self.ip, self.mask)
    }
}

/// The fixed set of interfaces the router was started with, in configuration order.
#[derive(Debug, Clone, Default)]
pub struct InterfaceTable {
    interfaces: Vec<Interface>,
}

impl InterfaceTable {
    pub fn new(interfaces: Vec<Interface>) -> InterfaceTable {
        InterfaceTable { interfaces }
    }

    pub fn get(&self, name: &str) -> Option<&Interface> {
        self.interfaces.iter().find(|iface| iface.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// The interface owning `ip`, if the address is one of ours.
    pub fn by_ip(&self, ip: Ipv4Addr) -> Option<&Interface> {
        self.interfaces.iter().find(|iface| iface.ip == ip)
    }

    pub fn is_local_ip(&self, ip: Ipv4Addr) -> bool {
        self.by_ip(ip).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interface> {
        self.interfaces.iter()
    }

    pub fn len(&self) -> usize {
        self.interfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }
}

/// Puts frames on the wire. Returning false means the frame was lost, the router logs
/// it and carries on.
pub trait Transmitter {
    fn transmit(&self, frame: EthernetFrame, iface: &Interface) -> bool;
}

/// Transmitter backed by one crossbeam channel per interface. Whoever holds the
/// receivers owns the actual link.
#[derive(Clone, Default)]
pub struct ChannelTransmitter {
    senders: HashMap<String, Sender<EthernetFrame>>,
}

impl ChannelTransmitter {
    pub fn new() -> ChannelTransmitter {
        ChannelTransmitter {
            senders: HashMap::new(),
        }
    }

    pub fn with_sender(mut self, iface: &str, sender: Sender<EthernetFrame>) -> Self {
        self.senders.insert(iface.to_string(), sender);
        self
    }

    pub fn add_sender(&mut self, iface: &str, sender: Sender<EthernetFrame>) {
        self.senders.insert(iface.to_string(), sender);
    }
}

impl Transmitter for ChannelTransmitter {
    fn transmit(&self, frame: EthernetFrame, iface: &Interface) -> bool {
        match self.senders.get(&iface.name) {
            Some(sender) => match sender.send(frame) {
                Ok(()) => true,
                Err(_) => {
                    warn!(iface = %iface.name, "egress channel disconnected");
                    false
                }
            },
            None => {
                warn!(iface = %iface.name, "no egress channel for interface");
                false
            }
        }
    }
}
