use crate::interface::{Interface, InterfaceTable};
use crate::state::{prefix_length, RouteEntry, RouteTable};
use rip_rs_packets::{
    MacAddr, RipCommand, RipEntry, RipMessage, RIP_AF_INET, RIP_INFINITY, RIP_MAX_ENTRIES,
    RIP_MULTICAST_ADDR,
};
use std::cmp;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// A RIP message the engine wants put on the wire. The router wraps it in UDP, IPv4 and
/// Ethernet headers sourced from `interface`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RipTransmission {
    pub interface: String,
    pub dest_ip: Ipv4Addr,
    pub dest_mac: MacAddr,
    pub message: RipMessage,
}

/// Distance vector route maintenance. The engine never owns the route table, the router
/// lends it for each call so every mutation stays on the router's single thread.
#[derive(Debug)]
pub struct RipEngine {
    advertise_interval: Duration,
    route_timeout: Duration,
    split_horizon: bool,
    next_advertisement: Option<Instant>,
}

impl RipEngine {
    pub fn new(advertise_interval: Duration, route_timeout: Duration, split_horizon: bool) -> Self {
        RipEngine {
            advertise_interval,
            route_timeout,
            split_horizon,
            next_advertisement: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.next_advertisement.is_some()
    }

    /// Installs a permanent route for every attached network, then asks every neighbor
    /// for its table.
    pub fn start(
        &mut self,
        table: &mut RouteTable,
        interfaces: &InterfaceTable,
        now: Instant,
    ) -> Vec<RipTransmission> {
        for iface in interfaces.iter() {
            match table.insert(
                iface.network(),
                Ipv4Addr::UNSPECIFIED,
                iface.mask,
                &iface.name,
                0,
                None,
            ) {
                Ok(()) => debug!(iface = %iface.name, network = %iface.network(), "connected route"),
                Err(reason) => debug!(iface = %iface.name, reason, "no connected route"),
            }
        }
        self.next_advertisement = Some(now + self.advertise_interval);
        info!(interfaces = interfaces.len(), "RIP started");

        interfaces
            .iter()
            .map(|iface| RipTransmission {
                interface: iface.name.clone(),
                dest_ip: RIP_MULTICAST_ADDR,
                dest_mac: MacAddr::BROADCAST,
                message: RipMessage::request(),
            })
            .collect()
    }

    /// Sends the periodic unsolicited responses once the advertisement timer is due.
    pub fn poll(
        &mut self,
        table: &RouteTable,
        interfaces: &InterfaceTable,
        now: Instant,
    ) -> Vec<RipTransmission> {
        match self.next_advertisement {
            Some(at) if at <= now => {}
            _ => return vec![],
        }
        self.next_advertisement = Some(now + self.advertise_interval);
        debug!(routes = table.len(), "periodic RIP advertisement");

        interfaces
            .iter()
            .flat_map(|iface| {
                self.advertisements(table, iface)
                    .into_iter()
                    .map(move |message| RipTransmission {
                        interface: iface.name.clone(),
                        dest_ip: RIP_MULTICAST_ADDR,
                        dest_mac: MacAddr::BROADCAST,
                        message,
                    })
            })
            .collect()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.next_advertisement
    }

    /// Processes one message from a neighbor at `source_ip`/`source_mac` that arrived on
    /// `in_iface`. Requests are answered straight back to the requester, responses
    /// update `table`.
    pub fn handle(
        &mut self,
        table: &mut RouteTable,
        message: &RipMessage,
        source_ip: Ipv4Addr,
        source_mac: MacAddr,
        in_iface: &Interface,
        now: Instant,
    ) -> Vec<RipTransmission> {
        match message.command {
            RipCommand::Request => {
                debug!(from = %source_ip, iface = %in_iface.name, "answering RIP request");
                self.advertisements(table, in_iface)
                    .into_iter()
                    .map(|message| RipTransmission {
                        interface: in_iface.name.clone(),
                        dest_ip: source_ip,
                        dest_mac: source_mac,
                        message,
                    })
                    .collect()
            }
            RipCommand::Response => {
                for entry in &message.entries {
                    self.learn(table, entry, source_ip, in_iface, now);
                }
                vec![]
            }
        }
    }

    fn learn(
        &self,
        table: &mut RouteTable,
        entry: &RipEntry,
        advertiser: Ipv4Addr,
        in_iface: &Interface,
        now: Instant,
    ) {
        if entry.address_family != RIP_AF_INET
            || prefix_length(entry.mask).is_none()
            || entry.metric == 0
            || entry.metric >= RIP_INFINITY
        {
            debug!(
                from = %advertiser,
                address = %entry.address,
                metric = entry.metric,
                "skipping RIP entry"
            );
            return;
        }

        let metric = cmp::min(entry.metric + 1, RIP_INFINITY);
        let expires = now + self.route_timeout;
        let local = table
            .get(entry.address, entry.mask)
            .map(|local| (local.gateway, local.metric, local.is_permanent()));
        let (gateway, current_metric, permanent) = match local {
            Some(local) => local,
            None => {
                if metric < RIP_INFINITY
                    && table
                        .insert(
                            entry.address,
                            advertiser,
                            entry.mask,
                            &in_iface.name,
                            metric,
                            Some(expires),
                        )
                        .is_ok()
                {
                    info!(
                        network = %entry.address,
                        mask = %entry.mask,
                        via = %advertiser,
                        metric,
                        "learned route"
                    );
                }
                return;
            }
        };

        if permanent {
            return;
        }
        if !gateway.is_unspecified() && gateway == advertiser {
            table.refresh(entry.address, entry.mask, expires);
        }
        if metric < current_metric {
            table.update_gateway(entry.address, entry.mask, advertiser);
            table.update_metric(entry.address, entry.mask, metric);
            table.update_interface(entry.address, entry.mask, &in_iface.name);
            table.refresh(entry.address, entry.mask, expires);
            info!(
                network = %entry.address,
                mask = %entry.mask,
                via = %advertiser,
                from = current_metric,
                to = metric,
                "shorter route"
            );
        }
    }

    /// The full table as seen from `out_iface`, split into messages of at most
    /// `RIP_MAX_ENTRIES` entries. An empty table still gives one empty response. Attached
    /// networks go out with metric 1, the cost of the link itself.
    fn advertisements(&self, table: &RouteTable, out_iface: &Interface) -> Vec<RipMessage> {
        let entries: Vec<RipEntry> = table
            .iter()
            .map(|route| {
                RipEntry::new(
                    route.destination(),
                    route.mask(),
                    Ipv4Addr::UNSPECIFIED,
                    self.advertised_metric(route, out_iface),
                )
            })
            .collect();
        if entries.is_empty() {
            return vec![RipMessage::response(vec![])];
        }
        entries
            .chunks(RIP_MAX_ENTRIES)
            .map(|chunk| RipMessage::response(chunk.to_vec()))
            .collect()
    }

    fn advertised_metric(&self, route: &RouteEntry, out_iface: &Interface) -> u32 {
        // Poisoned reverse: routes learned through an interface go back out of it as unreachable
        if self.split_horizon && !route.gateway.is_unspecified() && route.interface == out_iface.name {
            return RIP_INFINITY;
        }
        cmp::min(cmp::max(route.metric, 1), RIP_INFINITY)
    }
}
