use crate::config::{self, ConfigError, RouterConfig};
use crate::icmp::Icmpv4ErrorGenerator;
use crate::interface::{Interface, InterfaceTable, Transmitter};
use crate::processor::{DecIpv4HopLimit, HopLimit, Processor, ValidateIpv4Checksum};
use crate::rip::{RipEngine, RipTransmission};
use crate::state::{ArpCache, PendingResolutions, ResolutionAction, RouteTable};
use crate::timer::{Clock, SystemClock};
use rip_rs_packets::*;
use std::convert::TryFrom;
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

const RIP_TTL: u8 = 64;

/// What a received frame turned out to be.
enum Inbound {
    ArpRequest(ArpFrame),
    ArpReply(ArpFrame),
    Ipv4(Ipv4Packet),
    Other(u16),
}

impl TryFrom<EthernetFrame> for Inbound {
    type Error = &'static str;

    fn try_from(frame: EthernetFrame) -> Result<Self, Self::Error> {
        match frame.ether_type() {
            ARP_ETHER_TYPE => {
                let arp = ArpFrame::try_from(frame)?;
                if !arp.is_ethernet_ipv4() {
                    return Err("ARP frame is not Ethernet to IPv4");
                }
                match arp.op() {
                    Some(ArpOp::Request) => Ok(Inbound::ArpRequest(arp)),
                    Some(ArpOp::Reply) => Ok(Inbound::ArpReply(arp)),
                    None => Err("Unknown ARP opcode"),
                }
            }
            IPV4_ETHER_TYPE => Ok(Inbound::Ipv4(Ipv4Packet::try_from(frame)?)),
            other => Ok(Inbound::Other(other)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum IcmpError {
    TimeExceeded,
    NetUnreachable,
    HostUnreachable,
    PortUnreachable,
}

/// The forwarding engine. A router owns every piece of routing state and is driven from
/// a single task: frames come in through `receive`, time moves on through `poll_timers`,
/// and everything it sends leaves through its `Transmitter`.
pub struct Router<T: Transmitter> {
    interfaces: InterfaceTable,
    transmitter: T,
    config: RouterConfig,
    clock: Box<dyn Clock>,
    route_table: RouteTable,
    arp_cache: ArpCache,
    pending: PendingResolutions,
    rip: RipEngine,
    icmp: Icmpv4ErrorGenerator,
    validate_checksum: ValidateIpv4Checksum,
    dec_hop_limit: DecIpv4HopLimit,
}

impl<T: Transmitter> Router<T> {
    pub fn new(interfaces: InterfaceTable, transmitter: T, config: RouterConfig) -> Self {
        let config = config.with_nonzero_intervals();
        // Never send errors about datagrams claiming to come from us or from a subnet broadcast
        let bad_source_addrs = interfaces
            .iter()
            .flat_map(|iface| vec![iface.ip, iface.broadcast()])
            .collect();
        Router {
            pending: PendingResolutions::new(config.arp_resend_interval, config.arp_max_retries),
            rip: RipEngine::new(
                config.rip_advertise_interval,
                config.rip_route_timeout,
                config.split_horizon,
            ),
            icmp: Icmpv4ErrorGenerator::new(bad_source_addrs),
            interfaces,
            transmitter,
            config,
            clock: Box::new(SystemClock),
            route_table: RouteTable::new(),
            arp_cache: ArpCache::new(),
            validate_checksum: ValidateIpv4Checksum::new(),
            dec_hop_limit: DecIpv4HopLimit::new(),
        }
    }

    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn interfaces(&self) -> &InterfaceTable {
        &self.interfaces
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn transmitter(&self) -> &T {
        &self.transmitter
    }

    pub fn route_table(&self) -> &RouteTable {
        &self.route_table
    }

    pub fn route_table_mut(&mut self) -> &mut RouteTable {
        &mut self.route_table
    }

    pub fn arp_cache(&self) -> &ArpCache {
        &self.arp_cache
    }

    pub fn arp_cache_mut(&mut self) -> &mut ArpCache {
        &mut self.arp_cache
    }

    pub fn pending(&self) -> &PendingResolutions {
        &self.pending
    }

    pub fn is_rip_running(&self) -> bool {
        self.rip.is_running()
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Adds every route in a `destination gateway mask interface` file as a permanent
    /// route.
    pub fn load_route_table(&mut self, path: &Path) -> Result<(), ConfigError> {
        let routes = config::load_route_table(path, &self.interfaces)?;
        for route in routes {
            if let Err(reason) = self.route_table.insert(
                route.destination,
                route.gateway,
                route.mask,
                &route.interface,
                0,
                None,
            ) {
                warn!(destination = %route.destination, reason, "skipping static route");
            }
        }
        info!("loaded static route table\n{}", self.route_table);
        Ok(())
    }

    /// Adds every `ip mac` line of an ARP cache file as a static translation.
    pub fn load_arp_cache(&mut self, path: &Path) -> Result<(), ConfigError> {
        for (ip, mac) in config::load_arp_cache(path)? {
            self.arp_cache.insert_static(mac, ip);
        }
        info!("loaded static ARP cache\n{}", self.arp_cache);
        Ok(())
    }

    /// Installs the attached networks and starts learning routes from neighbors.
    pub fn start_rip(&mut self) {
        let now = self.clock.now();
        let transmissions = self.rip.start(&mut self.route_table, &self.interfaces, now);
        for transmission in transmissions {
            self.send_rip(transmission);
        }
        info!("route table after RIP start\n{}", self.route_table);
    }

    /// Handles one frame received on the interface called `iface`.
    pub fn receive(&mut self, frame: EthernetFrame, iface: &str) {
        let in_iface = match self.interfaces.get(iface) {
            Some(in_iface) => in_iface.clone(),
            None => {
                warn!(iface, "frame received on unknown interface");
                return;
            }
        };

        match Inbound::try_from(frame) {
            Ok(Inbound::ArpRequest(arp)) => self.handle_arp_request(arp, &in_iface),
            Ok(Inbound::ArpReply(arp)) => self.handle_arp_reply(arp, &in_iface),
            Ok(Inbound::Ipv4(packet)) => self.handle_ipv4(packet, &in_iface),
            Ok(Inbound::Other(ether_type)) => {
                debug!(iface, ether_type, "ignoring frame with unhandled ether type")
            }
            Err(reason) => debug!(iface, reason, "dropping malformed frame"),
        }

        // New pending resolutions fire straight away
        self.poll_timers();
    }

    /// Fires every timer that is due: route expiry, ARP resends and RIP advertisements.
    pub fn poll_timers(&mut self) {
        let now = self.clock.now();
        while self.next_deadline().map_or(false, |deadline| deadline <= now) {
            for route in self.route_table.expire(now) {
                info!(
                    destination = %route.destination(),
                    mask = %route.mask(),
                    gateway = %route.gateway,
                    "route expired"
                );
            }

            for action in self.pending.poll(now) {
                match action {
                    ResolutionAction::SendRequest { target, interface } => {
                        self.send_arp_request(target, &interface)
                    }
                    ResolutionAction::GiveUp {
                        target,
                        frame,
                        dropped,
                    } => {
                        warn!(%target, dropped, "ARP resolution failed");
                        match Ipv4Packet::try_from(frame) {
                            Ok(packet) => self.send_icmp_error(&packet, IcmpError::HostUnreachable),
                            Err(reason) => debug!(reason, "queued frame is not IPv4"),
                        }
                    }
                }
            }

            let transmissions = self.rip.poll(&self.route_table, &self.interfaces, now);
            for transmission in transmissions {
                self.send_rip(transmission);
            }
        }
    }

    /// The earliest moment `poll_timers` has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        vec![
            self.route_table.next_deadline(),
            self.pending.next_deadline(),
            self.rip.next_deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    fn handle_arp_request(&mut self, arp: ArpFrame, in_iface: &Interface) {
        let target = arp.target_ipv4();
        let answer = if self.interfaces.is_local_ip(target) {
            true
        } else if self.config.proxy_arp {
            self.route_table
                .lookup(target)
                .map_or(false, |route| route.interface != in_iface.name)
        } else {
            false
        };
        if !answer {
            return;
        }

        debug!(%target, asker = %arp.sender_ipv4(), iface = %in_iface.name, "answering ARP request");
        let reply = ArpFrame::reply(in_iface.mac, target, arp.sender_mac(), arp.sender_ipv4());
        self.transmit(reply.frame(), in_iface);
    }

    fn handle_arp_reply(&mut self, arp: ArpFrame, in_iface: &Interface) {
        let ip = arp.sender_ipv4();
        let mac = arp.sender_mac();
        self.arp_cache.insert(mac, ip);
        debug!(%ip, %mac, "learned ARP translation");

        if let Some(frames) = self.pending.resolve(ip, mac) {
            debug!(%ip, frames = frames.len(), "flushing frames waiting on ARP");
            for frame in frames {
                self.transmit(frame, in_iface);
            }
        }
    }

    fn handle_ipv4(&mut self, packet: Ipv4Packet, in_iface: &Interface) {
        let packet = match self.validate_checksum.process(packet) {
            Some(packet) => packet,
            None => return,
        };

        if self.is_rip(&packet) {
            self.handle_rip(packet, in_iface);
            return;
        }

        let packet = match self.dec_hop_limit.process(packet) {
            Some(HopLimit::Alive(packet)) => packet,
            Some(HopLimit::Expired(packet)) => {
                debug!(src = %packet.src_addr(), dest = %packet.dest_addr(), "TTL expired");
                self.send_icmp_error(&packet, IcmpError::TimeExceeded);
                return;
            }
            None => return,
        };

        let dest = packet.dest_addr();
        if self.interfaces.is_local_ip(dest) {
            self.deliver_local(packet);
            return;
        }
        if dest.is_multicast()
            || dest.is_broadcast()
            || self.interfaces.iter().any(|iface| iface.broadcast() == dest)
        {
            debug!(%dest, "dropping packet to group or broadcast address");
            return;
        }

        self.forward(packet, Some(in_iface));
    }

    fn is_rip(&self, packet: &Ipv4Packet) -> bool {
        if packet.protocol() != IpProtocol::UDP {
            return false;
        }
        let dest = packet.dest_addr();
        if dest != RIP_MULTICAST_ADDR && !dest.is_broadcast() && !self.interfaces.is_local_ip(dest) {
            return false;
        }
        let payload = packet.payload();
        payload.len() >= 4 && u16::from_be_bytes([payload[2], payload[3]]) == RIP_PORT
    }

    fn handle_rip(&mut self, packet: Ipv4Packet, in_iface: &Interface) {
        let source_ip = packet.src_addr();
        if self.interfaces.is_local_ip(source_ip) {
            return;
        }
        if !self.rip.is_running() {
            debug!(from = %source_ip, "RIP not running, ignoring message");
            return;
        }
        let source_mac = link_source(&packet);
        let segment = match UdpSegment::try_from(packet) {
            Ok(segment) => segment,
            Err(reason) => {
                debug!(from = %source_ip, reason, "dropping malformed RIP datagram");
                return;
            }
        };
        let message = match RipMessage::from_bytes(&segment.payload()) {
            Ok(message) => message,
            Err(reason) => {
                debug!(from = %source_ip, reason, "dropping malformed RIP message");
                return;
            }
        };
        // Responses only count when they come from a RIP process on a neighbor
        if message.command == RipCommand::Response && segment.src_port() != RIP_PORT {
            debug!(
                from = %source_ip,
                port = segment.src_port(),
                "ignoring RIP response from non RIP port"
            );
            return;
        }

        let now = self.clock.now();
        let transmissions = self.rip.handle(
            &mut self.route_table,
            &message,
            source_ip,
            source_mac,
            in_iface,
            now,
        );
        for transmission in transmissions {
            self.send_rip(transmission);
        }
    }

    fn deliver_local(&mut self, packet: Ipv4Packet) {
        match packet.protocol() {
            IpProtocol::TCP | IpProtocol::UDP => {
                self.send_icmp_error(&packet, IcmpError::PortUnreachable)
            }
            IpProtocol::ICMP => match self.icmp.echo_reply(&packet) {
                Some(reply) => {
                    debug!(to = %reply.dest_addr(), "echo reply");
                    self.forward(reply, None);
                }
                None => debug!(src = %packet.src_addr(), "ignoring ICMP message to router"),
            },
            IpProtocol::Other(protocol) => {
                debug!(src = %packet.src_addr(), protocol, "dropping packet for router")
            }
        }
    }

    /// Sends `packet` toward its destination. `in_iface` is where it arrived, None for
    /// packets the router originates.
    fn forward(&mut self, packet: Ipv4Packet, in_iface: Option<&Interface>) {
        let dest = packet.dest_addr();
        let route = match self.route_table.lookup(dest) {
            Some(route) => route.clone(),
            None => {
                if in_iface.is_some() {
                    self.send_icmp_error(&packet, IcmpError::NetUnreachable);
                } else {
                    debug!(%dest, "no route for locally generated packet");
                }
                return;
            }
        };

        if let Some(in_iface) = in_iface {
            if route.interface == in_iface.name {
                debug!(%dest, iface = %in_iface.name, "dropping packet that would leave through its ingress");
                return;
            }
        }
        let out_iface = match self.interfaces.get(&route.interface) {
            Some(out_iface) => out_iface.clone(),
            None => {
                warn!(iface = %route.interface, "route points at unknown interface");
                return;
            }
        };

        let mut frame = if packet.layer2_offset.is_some() {
            match EthernetFrame::try_from(packet) {
                Ok(frame) => frame,
                Err(reason) => {
                    debug!(reason, "could not recover ethernet header");
                    return;
                }
            }
        } else {
            EthernetFrame::encap_ipv4(packet)
        };
        frame.set_src_mac(out_iface.mac);

        let next_hop = route.next_hop(dest);
        match self.arp_cache.lookup(next_hop) {
            Some(mac) => {
                frame.set_dest_mac(mac);
                self.transmit(frame, &out_iface);
            }
            None => {
                let now = self.clock.now();
                if self.pending.enqueue(next_hop, &out_iface.name, frame, now) {
                    debug!(%next_hop, iface = %out_iface.name, "resolving next hop");
                }
            }
        }
    }

    fn send_icmp_error(&mut self, packet: &Ipv4Packet, error: IcmpError) {
        let src = packet.src_addr();
        let source_ip = match self
            .route_table
            .lookup(src)
            .and_then(|route| self.interfaces.get(&route.interface))
        {
            Some(out_iface) => out_iface.ip,
            None => {
                debug!(%src, ?error, "no route back to source, not sending ICMP");
                return;
            }
        };

        let message = match error {
            IcmpError::TimeExceeded => self.icmp.ttl_exceeded_error(source_ip, packet),
            IcmpError::NetUnreachable => {
                self.icmp
                    .dest_unreachable_error(source_ip, packet, ICMP_NET_UNREACHABLE)
            }
            IcmpError::HostUnreachable => {
                self.icmp
                    .dest_unreachable_error(source_ip, packet, ICMP_HOST_UNREACHABLE)
            }
            IcmpError::PortUnreachable => {
                self.icmp
                    .dest_unreachable_error(source_ip, packet, ICMP_PORT_UNREACHABLE)
            }
        };

        match message {
            Some(message) => {
                info!(to = %src, ?error, "sending ICMP error");
                self.forward(message, None);
            }
            None => debug!(%src, ?error, "ICMP error suppressed"),
        }
    }

    fn send_arp_request(&mut self, target: Ipv4Addr, interface: &str) {
        let out_iface = match self.interfaces.get(interface) {
            Some(out_iface) => out_iface.clone(),
            None => return,
        };
        debug!(%target, iface = interface, "sending ARP request");
        let request = ArpFrame::request(out_iface.mac, out_iface.ip, target);
        self.transmit(request.frame(), &out_iface);
    }

    fn send_rip(&mut self, transmission: RipTransmission) {
        let out_iface = match self.interfaces.get(&transmission.interface) {
            Some(out_iface) => out_iface.clone(),
            None => return,
        };

        let mut segment = UdpSegment::empty();
        segment
            .set_src_port(RIP_PORT)
            .set_dest_port(RIP_PORT)
            .set_payload(&transmission.message.to_bytes());

        let mut packet = Ipv4Packet::encap_udp(segment);
        packet.set_ttl(RIP_TTL);
        packet.set_src_addr(out_iface.ip);
        packet.set_dest_addr(transmission.dest_ip);
        packet.set_checksum();

        let mut frame = EthernetFrame::encap_ipv4(packet);
        frame.set_src_mac(out_iface.mac);
        frame.set_dest_mac(transmission.dest_mac);
        self.transmit(frame, &out_iface);
    }

    fn transmit(&self, frame: EthernetFrame, iface: &Interface) {
        if !self.transmitter.transmit(frame, iface) {
            warn!(iface = %iface.name, "transmit failed");
        }
    }
}

// Source MAC of the Ethernet header the packet arrived in, broadcast if there was none.
fn link_source(packet: &Ipv4Packet) -> MacAddr {
    match packet.layer2_offset {
        Some(offset) => {
            let mut bytes = [0u8; 6];
            bytes.copy_from_slice(&packet.data[offset + 6..offset + 12]);
            MacAddr::new(bytes)
        }
        None => MacAddr::BROADCAST,
    }
}

#[cfg(test)]
mod tests {
    use crate::config::RouterConfig;
    use crate::utils::test::harness::{RouterHarness, ETH0_MAC, HOST_A, HOST_A_MAC, HOST_B};
    use crate::utils::test::packet_collectors::arp_frames;
    use crate::utils::test::packet_generators::{arp_reply, frame_for, udp_packet};
    use rip_rs_packets::*;
    use std::time::Duration;

    #[test]
    fn zero_intervals_still_let_timers_settle() {
        let config = RouterConfig {
            arp_resend_interval: Duration::from_secs(0),
            rip_advertise_interval: Duration::from_secs(0),
            ..RouterConfig::default()
        };
        let mut harness = RouterHarness::two_port(config);
        harness.add_arp(HOST_A, HOST_A_MAC);
        harness.router_mut().start_rip();
        harness.receive(
            frame_for(udp_packet(HOST_A, HOST_B, 5000, 64, b"x"), HOST_A_MAC, ETH0_MAC),
            "eth0",
        );
        for _ in 0..3 {
            harness.advance(Duration::from_millis(5));
        }

        assert_eq!(arp_frames(&harness.sent("eth1")).len(), 3);
        assert!(harness.router().pending().is_empty());
        assert!(harness.router().next_deadline().is_some());
    }

    #[test]
    fn next_deadline_covers_every_timer() {
        let mut harness = RouterHarness::two_port(RouterConfig::default());
        assert_eq!(harness.router().next_deadline(), None);

        harness.router_mut().start_rip();
        let start = harness.router().now();
        assert_eq!(
            harness.router().next_deadline(),
            Some(start + Duration::from_secs(10))
        );
    }

    #[test]
    fn frames_on_unknown_interfaces_are_ignored() {
        let mut harness = RouterHarness::two_port(RouterConfig::default());
        harness.receive(arp_reply(HOST_A_MAC, HOST_A, MacAddr::BROADCAST, HOST_A), "eth9");
        assert!(harness.router().arp_cache().is_empty());
    }

    #[test]
    fn unhandled_ether_types_are_ignored() {
        let mut harness = RouterHarness::two_port(RouterConfig::default());
        let mut frame = EthernetFrame::empty();
        frame.set_ether_type(0x86dd);
        frame.set_payload(&[0; 40]);
        harness.receive(frame, "eth0");

        // ARP for some other hardware and protocol pair
        let mut short = EthernetFrame::empty();
        short.set_ether_type(ARP_ETHER_TYPE);
        short.set_payload(&[0; 10]);
        harness.receive(short, "eth0");

        assert!(harness.sent("eth0").is_empty());
        assert!(harness.sent("eth1").is_empty());
        assert!(harness.router().arp_cache().is_empty());
    }
}
