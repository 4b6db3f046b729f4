use crate::timer::{TimerQueue, TimerToken};
use cidr::{Cidr, Ipv4Cidr};
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Instant;

/// Converts a dotted mask to a prefix length, or None if the one bits are not contiguous.
pub fn prefix_length(mask: Ipv4Addr) -> Option<u8> {
    let bits = u32::from(mask);
    let len = bits.leading_ones();
    if bits.checked_shl(len).unwrap_or(0) == 0 {
        Some(len as u8)
    } else {
        None
    }
}

pub fn prefix_mask(len: u8) -> Ipv4Addr {
    Ipv4Addr::from(u32::MAX.checked_shl(32 - u32::from(len)).unwrap_or(0))
}

/// The canonical network for `destination` under `mask`, host bits cleared.
pub fn network(destination: Ipv4Addr, mask: Ipv4Addr) -> Result<Ipv4Cidr, &'static str> {
    let len = prefix_length(mask).ok_or("Subnet mask is not contiguous")?;
    let address = Ipv4Addr::from(u32::from(destination) & u32::from(mask));
    Ipv4Cidr::new(address, len).map_err(|_| "Invalid network prefix")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    prefix: Ipv4Cidr,
    /// Zero when the destination is directly connected.
    pub gateway: Ipv4Addr,
    pub metric: u32,
    pub interface: String,
    /// None for permanent routes.
    pub expires: Option<Instant>,
    timer: Option<TimerToken>,
}

impl RouteEntry {
    pub fn destination(&self) -> Ipv4Addr {
        self.prefix.first_address()
    }

    pub fn mask(&self) -> Ipv4Addr {
        prefix_mask(self.prefix.network_length())
    }

    pub fn prefix(&self) -> &Ipv4Cidr {
        &self.prefix
    }

    pub fn is_permanent(&self) -> bool {
        self.expires.is_none()
    }

    /// Where frames for `destination` go next: the gateway, or the destination itself
    /// when directly connected.
    pub fn next_hop(&self, destination: Ipv4Addr) -> Ipv4Addr {
        if self.gateway.is_unspecified() {
            destination
        } else {
            self.gateway
        }
    }
}

/// Longest prefix match table. Entries are kept sorted with the longest prefixes first,
/// so the first covering entry is the best one. Timed entries carry a token into the
/// table's timer queue, and only the current token can expire them.
#[derive(Debug, Default)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
    timers: TimerQueue<Ipv4Cidr>,
}

impl RouteTable {
    pub fn new() -> Self {
        RouteTable {
            entries: vec![],
            timers: TimerQueue::new(),
        }
    }

    pub fn lookup(&self, destination: Ipv4Addr) -> Option<&RouteEntry> {
        self.entries
            .iter()
            .find(|entry| entry.prefix.contains(&destination))
    }

    pub fn get(&self, destination: Ipv4Addr, mask: Ipv4Addr) -> Option<&RouteEntry> {
        let prefix = network(destination, mask).ok()?;
        self.entries.iter().find(|entry| entry.prefix == prefix)
    }

    /// Adds the route for `destination & mask`, replacing any route with the same key.
    /// An `expires` deadline arms a timer for the new entry.
    pub fn insert(
        &mut self,
        destination: Ipv4Addr,
        gateway: Ipv4Addr,
        mask: Ipv4Addr,
        interface: &str,
        metric: u32,
        expires: Option<Instant>,
    ) -> Result<(), &'static str> {
        let prefix = network(destination, mask)?;
        let timer = expires.map(|at| self.timers.schedule(at, prefix.clone()));
        let entry = RouteEntry {
            prefix,
            gateway,
            metric,
            interface: interface.to_string(),
            expires,
            timer,
        };

        if let Some(index) = self.position(&entry.prefix) {
            let old = std::mem::replace(&mut self.entries[index], entry);
            if let Some(token) = old.timer {
                self.timers.cancel(token);
            }
            return Ok(());
        }

        let len = entry.prefix.network_length();
        let index = self
            .entries
            .iter()
            .position(|existing| existing.prefix.network_length() < len)
            .unwrap_or_else(|| self.entries.len());
        self.entries.insert(index, entry);
        Ok(())
    }

    /// Pushes the expiry of a timed route out to `expires`, replacing its timer.
    pub fn refresh(&mut self, destination: Ipv4Addr, mask: Ipv4Addr, expires: Instant) -> bool {
        let index = match self.index_of(destination, mask) {
            Some(index) => index,
            None => return false,
        };
        let token = self
            .timers
            .schedule(expires, self.entries[index].prefix.clone());
        let entry = &mut self.entries[index];
        entry.expires = Some(expires);
        if let Some(old) = entry.timer.replace(token) {
            self.timers.cancel(old);
        }
        true
    }

    pub fn remove(&mut self, destination: Ipv4Addr, mask: Ipv4Addr) -> bool {
        match self.index_of(destination, mask) {
            Some(index) => {
                let entry = self.entries.remove(index);
                if let Some(token) = entry.timer {
                    self.timers.cancel(token);
                }
                true
            }
            None => false,
        }
    }

    pub fn update_metric(&mut self, destination: Ipv4Addr, mask: Ipv4Addr, metric: u32) -> bool {
        self.update(destination, mask, |entry| entry.metric = metric)
    }

    pub fn update_gateway(
        &mut self,
        destination: Ipv4Addr,
        mask: Ipv4Addr,
        gateway: Ipv4Addr,
    ) -> bool {
        self.update(destination, mask, |entry| entry.gateway = gateway)
    }

    pub fn update_interface(&mut self, destination: Ipv4Addr, mask: Ipv4Addr, interface: &str) -> bool {
        self.update(destination, mask, |entry| entry.interface = interface.to_string())
    }

    /// Removes every timed route whose current timer is due, returning what was removed.
    pub fn expire(&mut self, now: Instant) -> Vec<RouteEntry> {
        let mut expired = vec![];
        for (token, prefix) in self.timers.pop_due(now) {
            if let Some(index) = self.position(&prefix) {
                if self.entries[index].timer == Some(token) {
                    expired.push(self.entries.remove(index));
                }
            }
        }
        expired
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn update<F: FnOnce(&mut RouteEntry)>(
        &mut self,
        destination: Ipv4Addr,
        mask: Ipv4Addr,
        change: F,
    ) -> bool {
        match self.index_of(destination, mask) {
            Some(index) => {
                change(&mut self.entries[index]);
                true
            }
            None => false,
        }
    }

    fn index_of(&self, destination: Ipv4Addr, mask: Ipv4Addr) -> Option<usize> {
        let prefix = network(destination, mask).ok()?;
        self.position(&prefix)
    }

    fn position(&self, prefix: &Ipv4Cidr) -> Option<usize> {
        self.entries.iter().position(|entry| &entry.prefix == prefix)
    }
}

impl fmt::Display for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.entries.is_empty() {
            return writeln!(f, " WARNING: route table empty");
        }
        writeln!(
            f,
            "{:<16}{:<16}{:<16}{:<8}{}",
            "Destination", "Gateway", "Mask", "Metric", "Iface"
        )?;
        for entry in &self.entries {
            writeln!(
                f,
                "{:<16}{:<16}{:<16}{:<8}{}",
                entry.destination().to_string(),
                entry.gateway.to_string(),
                entry.mask().to_string(),
                entry.metric,
                entry.interface
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const ZERO: Ipv4Addr = Ipv4Addr::UNSPECIFIED;

    fn mask(len: u8) -> Ipv4Addr {
        prefix_mask(len)
    }

    #[test]
    fn masks_and_prefixes() {
        assert_eq!(prefix_length(Ipv4Addr::new(255, 255, 255, 0)), Some(24));
        assert_eq!(prefix_length(Ipv4Addr::new(255, 255, 255, 255)), Some(32));
        assert_eq!(prefix_length(ZERO), Some(0));
        assert_eq!(prefix_length(Ipv4Addr::new(255, 0, 255, 0)), None);
        assert_eq!(prefix_mask(16), Ipv4Addr::new(255, 255, 0, 0));
        assert_eq!(prefix_mask(0), ZERO);
    }

    #[test]
    fn longest_prefix_match() {
        let mut table = RouteTable::new();
        table
            .insert(Ipv4Addr::new(10, 0, 0, 0), ZERO, mask(8), "eth0", 0, None)
            .unwrap();
        table
            .insert(Ipv4Addr::new(10, 1, 0, 0), ZERO, mask(16), "eth1", 0, None)
            .unwrap();
        table
            .insert(ZERO, Ipv4Addr::new(192, 168, 0, 1), mask(0), "eth2", 0, None)
            .unwrap();

        assert_eq!(table.lookup(Ipv4Addr::new(10, 1, 2, 3)).unwrap().interface, "eth1");
        assert_eq!(table.lookup(Ipv4Addr::new(10, 2, 2, 3)).unwrap().interface, "eth0");
        assert_eq!(table.lookup(Ipv4Addr::new(8, 8, 8, 8)).unwrap().interface, "eth2");

        table.remove(ZERO, mask(0));
        assert_eq!(table.lookup(Ipv4Addr::new(8, 8, 8, 8)), None);
    }

    #[test]
    fn one_entry_per_network() {
        let mut table = RouteTable::new();
        table
            .insert(Ipv4Addr::new(10, 0, 0, 7), ZERO, mask(24), "eth0", 3, None)
            .unwrap();
        table
            .insert(Ipv4Addr::new(10, 0, 0, 0), ZERO, mask(24), "eth1", 1, None)
            .unwrap();
        assert_eq!(table.len(), 1);
        let entry = table.get(Ipv4Addr::new(10, 0, 0, 0), mask(24)).unwrap();
        assert_eq!(entry.destination(), Ipv4Addr::new(10, 0, 0, 0));
        assert_eq!(entry.interface, "eth1");
        assert_eq!(entry.metric, 1);
    }

    #[test]
    fn rejects_non_contiguous_mask() {
        let mut table = RouteTable::new();
        assert!(table
            .insert(Ipv4Addr::new(10, 0, 0, 0), ZERO, Ipv4Addr::new(255, 0, 255, 0), "eth0", 0, None)
            .is_err());
        assert!(table.is_empty());
    }

    #[test]
    fn remove_is_idempotent() {
        let mut table = RouteTable::new();
        table
            .insert(Ipv4Addr::new(10, 0, 0, 0), ZERO, mask(24), "eth0", 0, None)
            .unwrap();
        assert!(table.remove(Ipv4Addr::new(10, 0, 0, 0), mask(24)));
        assert!(!table.remove(Ipv4Addr::new(10, 0, 0, 0), mask(24)));
    }

    #[test]
    fn in_place_updates() {
        let mut table = RouteTable::new();
        let dest = Ipv4Addr::new(10, 2, 0, 0);
        table.insert(dest, Ipv4Addr::new(10, 0, 0, 2), mask(16), "eth0", 5, None).unwrap();
        assert!(table.update_metric(dest, mask(16), 3));
        assert!(table.update_gateway(dest, mask(16), Ipv4Addr::new(10, 0, 1, 2)));
        assert!(table.update_interface(dest, mask(16), "eth1"));
        assert!(!table.update_metric(dest, mask(24), 1));

        let entry = table.lookup(Ipv4Addr::new(10, 2, 3, 4)).unwrap();
        assert_eq!(entry.metric, 3);
        assert_eq!(entry.gateway, Ipv4Addr::new(10, 0, 1, 2));
        assert_eq!(entry.interface, "eth1");
        assert_eq!(entry.next_hop(Ipv4Addr::new(10, 2, 3, 4)), Ipv4Addr::new(10, 0, 1, 2));
    }

    #[test]
    fn timed_entries_expire_unless_refreshed() {
        let start = Instant::now();
        let timeout = Duration::from_secs(30);
        let mut table = RouteTable::new();
        let dest = Ipv4Addr::new(10, 2, 0, 0);
        table
            .insert(dest, Ipv4Addr::new(10, 0, 0, 2), mask(16), "eth0", 2, Some(start + timeout))
            .unwrap();
        table
            .insert(Ipv4Addr::new(10, 0, 0, 0), ZERO, mask(24), "eth0", 0, None)
            .unwrap();
        assert_eq!(table.next_deadline(), Some(start + timeout));

        assert!(table.refresh(dest, mask(16), start + Duration::from_secs(20) + timeout));
        assert!(table.expire(start + Duration::from_secs(31)).is_empty());
        assert_eq!(table.len(), 2);

        let expired = table.expire(start + Duration::from_secs(51));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].destination(), dest);
        assert_eq!(table.len(), 1);
        assert!(table.iter().all(|entry| entry.is_permanent()));
        assert_eq!(table.next_deadline(), None);
    }

    #[test]
    fn replacing_an_entry_cancels_its_timer() {
        let start = Instant::now();
        let mut table = RouteTable::new();
        let dest = Ipv4Addr::new(10, 2, 0, 0);
        table
            .insert(dest, Ipv4Addr::new(10, 0, 0, 2), mask(16), "eth0", 2, Some(start))
            .unwrap();
        table.insert(dest, ZERO, mask(16), "eth1", 0, None).unwrap();
        assert!(table.expire(start + Duration::from_secs(60)).is_empty());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn display_lists_every_route() {
        let mut table = RouteTable::new();
        assert!(table.to_string().contains("empty"));
        table
            .insert(Ipv4Addr::new(10, 0, 0, 0), ZERO, mask(24), "eth0", 0, None)
            .unwrap();
        let text = table.to_string();
        assert!(text.contains("10.0.0.0"));
        assert!(text.contains("255.255.255.0"));
        assert!(text.contains("eth0"));
    }
}
