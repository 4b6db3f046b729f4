use rip_rs_packets::MacAddr;
use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpEntry {
    pub mac: MacAddr,
    /// Loaded from the ARP cache file rather than learned from a reply.
    pub is_static: bool,
}

/// IPv4 to link address translations. Entries never expire.
#[derive(Debug, Default, Clone)]
pub struct ArpCache {
    ipv4_mac_translations: HashMap<Ipv4Addr, ArpEntry>,
}

impl ArpCache {
    pub fn new() -> Self {
        ArpCache {
            ipv4_mac_translations: HashMap::new(),
        }
    }

    pub fn lookup(&self, ip: Ipv4Addr) -> Option<MacAddr> {
        self.ipv4_mac_translations.get(&ip).map(|entry| entry.mac)
    }

    pub fn get(&self, ip: Ipv4Addr) -> Option<&ArpEntry> {
        self.ipv4_mac_translations.get(&ip)
    }

    /// Records a translation learned off the wire. Last writer wins, returns the MAC it
    /// replaced.
    pub fn insert(&mut self, mac: MacAddr, ip: Ipv4Addr) -> Option<MacAddr> {
        self.upsert(mac, ip, false)
    }

    pub fn insert_static(&mut self, mac: MacAddr, ip: Ipv4Addr) -> Option<MacAddr> {
        self.upsert(mac, ip, true)
    }

    fn upsert(&mut self, mac: MacAddr, ip: Ipv4Addr, is_static: bool) -> Option<MacAddr> {
        self.ipv4_mac_translations
            .insert(ip, ArpEntry { mac, is_static })
            .map(|old| old.mac)
    }

    pub fn len(&self) -> usize {
        self.ipv4_mac_translations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ipv4_mac_translations.is_empty()
    }
}

impl fmt::Display for ArpCache {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{:<16}{}", "IP", "MAC")?;
        let mut entries: Vec<_> = self.ipv4_mac_translations.iter().collect();
        entries.sort_by_key(|(ip, _)| **ip);
        for (ip, entry) in entries {
            writeln!(f, "{:<16}{}", ip.to_string(), entry.mac)?;
        }
        Ok(())
    }
}
