use crate::interface::{Interface, InterfaceTable};
use crate::state::prefix_length;
use rip_rs_packets::MacAddr;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Timer and feature settings for one router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    /// Gap between ARP requests for the same unresolved next hop. Must be non-zero.
    pub arp_resend_interval: Duration,
    /// Requests sent before queued frames are answered with host unreachable.
    pub arp_max_retries: u32,
    /// Gap between unsolicited RIP responses. Must be non-zero.
    pub rip_advertise_interval: Duration,
    /// Lifetime of a learned route that is not re-advertised.
    pub rip_route_timeout: Duration,
    /// Answer ARP requests for addresses routed out of another interface.
    pub proxy_arp: bool,
    /// Advertise routes back out of the interface they were learned on as unreachable.
    pub split_horizon: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        RouterConfig {
            arp_resend_interval: Duration::from_secs(1),
            arp_max_retries: 3,
            rip_advertise_interval: Duration::from_secs(10),
            rip_route_timeout: Duration::from_secs(30),
            proxy_arp: false,
            split_horizon: false,
        }
    }
}

/// Shortest timer interval a router will run with.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

impl RouterConfig {
    /// Raises zero intervals to `MIN_INTERVAL`. A zero interval re-arms its timer at the
    /// moment it fires, so the timers would never settle.
    pub fn with_nonzero_intervals(mut self) -> Self {
        if self.arp_resend_interval < MIN_INTERVAL {
            warn!(interval = ?self.arp_resend_interval, "ARP resend interval too short, clamping");
            self.arp_resend_interval = MIN_INTERVAL;
        }
        if self.rip_advertise_interval < MIN_INTERVAL {
            warn!(interval = ?self.rip_advertise_interval, "RIP advertise interval too short, clamping");
            self.rip_advertise_interval = MIN_INTERVAL;
        }
        self
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Io { path: String, source: io::Error },
    #[error("{file}:{line}: {reason}")]
    Parse {
        file: String,
        line: usize,
        reason: String,
    },
    #[error("{file}:{line}: unknown interface {name}")]
    UnknownInterface {
        file: String,
        line: usize,
        name: String,
    },
}

/// One line of a static route table file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticRoute {
    pub destination: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub interface: String,
}

/// Reads `name mac ip mask` lines.
pub fn parse_interfaces<R: BufRead>(reader: R, file: &str) -> Result<InterfaceTable, ConfigError> {
    let mut interfaces: Vec<Interface> = vec![];
    for_each_record(reader, file, |line, fields| {
        let [name, mac, ip, mask] = fields_exact::<4>(file, line, fields, "name mac ip mask")?;
        if interfaces.iter().any(|iface| iface.name == name) {
            return Err(parse_error(file, line, format!("duplicate interface {}", name)));
        }
        interfaces.push(Interface::new(
            name,
            parse_mac(file, line, mac)?,
            parse_ip(file, line, ip)?,
            parse_mask(file, line, mask)?,
        ));
        Ok(())
    })?;
    Ok(InterfaceTable::new(interfaces))
}

/// Reads `destination gateway mask interface` lines. Every interface must be one of
/// `interfaces`.
pub fn parse_route_table<R: BufRead>(
    reader: R,
    file: &str,
    interfaces: &InterfaceTable,
) -> Result<Vec<StaticRoute>, ConfigError> {
    let mut routes = vec![];
    for_each_record(reader, file, |line, fields| {
        let [destination, gateway, mask, name] =
            fields_exact::<4>(file, line, fields, "destination gateway mask interface")?;
        if !interfaces.contains(name) {
            return Err(ConfigError::UnknownInterface {
                file: file.to_string(),
                line,
                name: name.to_string(),
            });
        }
        routes.push(StaticRoute {
            destination: parse_ip(file, line, destination)?,
            gateway: parse_ip(file, line, gateway)?,
            mask: parse_mask(file, line, mask)?,
            interface: name.to_string(),
        });
        Ok(())
    })?;
    Ok(routes)
}

/// Reads `ip mac` lines.
pub fn parse_arp_cache<R: BufRead>(
    reader: R,
    file: &str,
) -> Result<Vec<(Ipv4Addr, MacAddr)>, ConfigError> {
    let mut entries = vec![];
    for_each_record(reader, file, |line, fields| {
        let [ip, mac] = fields_exact::<2>(file, line, fields, "ip mac")?;
        entries.push((parse_ip(file, line, ip)?, parse_mac(file, line, mac)?));
        Ok(())
    })?;
    Ok(entries)
}

pub fn load_interfaces(path: &Path) -> Result<InterfaceTable, ConfigError> {
    parse_interfaces(open(path)?, &path.display().to_string())
}

pub fn load_route_table(
    path: &Path,
    interfaces: &InterfaceTable,
) -> Result<Vec<StaticRoute>, ConfigError> {
    parse_route_table(open(path)?, &path.display().to_string(), interfaces)
}

pub fn load_arp_cache(path: &Path) -> Result<Vec<(Ipv4Addr, MacAddr)>, ConfigError> {
    parse_arp_cache(open(path)?, &path.display().to_string())
}

fn open(path: &Path) -> Result<BufReader<File>, ConfigError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })
}

// Hands every non-blank line, with comments stripped, to `record` as whitespace separated
// fields along with its 1-based line number.
fn for_each_record<R, F>(reader: R, file: &str, mut record: F) -> Result<(), ConfigError>
where
    R: BufRead,
    F: FnMut(usize, &[&str]) -> Result<(), ConfigError>,
{
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| ConfigError::Io {
            path: file.to_string(),
            source,
        })?;
        let content = line.split('#').next().unwrap_or("");
        let fields: Vec<&str> = content.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        record(index + 1, &fields)?;
    }
    Ok(())
}

fn fields_exact<'a, const N: usize>(
    file: &str,
    line: usize,
    fields: &[&'a str],
    layout: &str,
) -> Result<[&'a str; N], ConfigError> {
    let mut out = [""; N];
    if fields.len() != N {
        return Err(parse_error(
            file,
            line,
            format!("expected `{}`, found {} fields", layout, fields.len()),
        ));
    }
    out.copy_from_slice(fields);
    Ok(out)
}

fn parse_error(file: &str, line: usize, reason: String) -> ConfigError {
    ConfigError::Parse {
        file: file.to_string(),
        line,
        reason,
    }
}

fn parse_ip(file: &str, line: usize, field: &str) -> Result<Ipv4Addr, ConfigError> {
    field
        .parse()
        .map_err(|_| parse_error(file, line, format!("invalid IPv4 address {}", field)))
}

fn parse_mask(file: &str, line: usize, field: &str) -> Result<Ipv4Addr, ConfigError> {
    let mask = parse_ip(file, line, field)?;
    if prefix_length(mask).is_none() {
        return Err(parse_error(
            file,
            line,
            format!("subnet mask {} is not contiguous", field),
        ));
    }
    Ok(mask)
}

fn parse_mac(file: &str, line: usize, field: &str) -> Result<MacAddr, ConfigError> {
    field
        .parse()
        .map_err(|reason: &str| parse_error(file, line, format!("{} ({})", reason, field)))
}
