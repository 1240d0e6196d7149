//! # Target Grammar
//!
//! Turns user input into the address list hosts are created from:
//! * a single address (`192.168.1.5`, `::1`)
//! * an IPv4 range (`10.0.0.1-10.0.0.40`, abbreviated `10.0.0.1-40`)
//! * a CIDR block (`192.168.1.0/24`)
//! * `lan`, the subnet of the first ARP-capable interface
//! * a comma separated mix of the above

use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use pnet::ipnetwork::Ipv4Network;
use thiserror::Error;
use tracing::info;

use crate::network::host::Host;
use crate::network::interface::{self, Interface};
use crate::network::range::{self, IpCollection, Ipv4Range};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("invalid target: {0}")]
    Invalid(String),
    #[error("invalid start address in range '{0}'")]
    RangeStart(String),
    #[error("invalid end of range '{0}'")]
    RangeEnd(String),
    #[error("invalid CIDR block '{0}'")]
    Cidr(String),
    #[error("no local interface to derive the LAN range from")]
    NoLan,
    #[error("interface {0} has a non-contiguous netmask")]
    Netmask(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    Lan,
    Host { target_addr: IpAddr },
    Range { ipv4_range: Ipv4Range },
    Multi { targets: Vec<Target> },
}

impl FromStr for Target {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("lan") {
            return Ok(Target::Lan);
        }
        if s.contains(',') {
            return parse_commas(s);
        }
        if let Ok(target_addr) = s.parse::<IpAddr>() {
            return Ok(Target::Host { target_addr });
        }
        if let Some(target) = parse_ip_range(s)? {
            return Ok(target);
        }
        if let Some(target) = parse_cidr_range(s)? {
            return Ok(target);
        }
        Err(TargetError::Invalid(s.to_string()))
    }
}

impl Target {
    /// Resolves the target into a flat, ordered address collection.
    pub fn to_collection(&self) -> Result<IpCollection, TargetError> {
        let mut collection = IpCollection::new();
        self.resolve_into(&mut collection)?;
        Ok(collection)
    }

    fn resolve_into(&self, collection: &mut IpCollection) -> Result<(), TargetError> {
        match self {
            Target::Lan => {
                let iface = interface::local_interfaces().first().ok_or(TargetError::NoLan)?;
                let lan = lan_range(iface)?;
                info!("Using {} for LAN range {}-{}", iface.name, lan.start_addr, lan.end_addr);
                collection.add_range(lan);
            }
            Target::Host { target_addr } => collection.add_single(*target_addr),
            Target::Range { ipv4_range } => collection.add_range(*ipv4_range),
            Target::Multi { targets } => {
                for target in targets {
                    target.resolve_into(collection)?;
                }
            }
        }
        Ok(())
    }
}

/// Usable host addresses of the interface's subnet. Blocks too small to
/// have a network and broadcast address are taken whole.
fn lan_range(iface: &Interface) -> Result<Ipv4Range, TargetError> {
    let network = Ipv4Network::with_netmask(iface.ipv4, iface.netmask)
        .map_err(|_| TargetError::Netmask(iface.name.clone()))?;
    let (start, end) = (u32::from(network.network()), u32::from(network.broadcast()));
    let (start, end) = if end.saturating_sub(start) >= 2 {
        (start + 1, end - 1)
    } else {
        (start, end)
    };
    Ok(Ipv4Range::new(Ipv4Addr::from(start), Ipv4Addr::from(end)))
}

/// Creates one [`Host`] per distinct address of `collection`.
pub fn to_hosts(collection: &IpCollection) -> Vec<Host> {
    collection.addresses().into_iter().map(Host::new).collect()
}

fn parse_commas(s: &str) -> Result<Target, TargetError> {
    let targets = s
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(Target::from_str)
        .collect::<Result<Vec<Target>, _>>()?;
    Ok(Target::Multi { targets })
}

fn parse_ip_range(s: &str) -> Result<Option<Target>, TargetError> {
    let Some((start_str, end_str)) = s.split_once('-') else {
        return Ok(None);
    };
    let start_addr = start_str
        .parse::<Ipv4Addr>()
        .map_err(|_| TargetError::RangeStart(s.to_string()))?;
    let end_addr = parse_range_end_addr(end_str, start_addr)
        .ok_or_else(|| TargetError::RangeEnd(s.to_string()))?;
    Ok(Some(Target::Range {
        ipv4_range: Ipv4Range::new(start_addr, end_addr),
    }))
}

/// Expands `50` into `a.b.c.50` and `2.66` into `a.b.2.66` relative to `start_addr`.
fn parse_range_end_addr(end_str: &str, start_addr: Ipv4Addr) -> Option<Ipv4Addr> {
    if let Ok(full_addr) = end_str.parse::<Ipv4Addr>() {
        return Some(full_addr);
    }
    let partial: Vec<u8> = end_str
        .split('.')
        .map(str::parse::<u8>)
        .collect::<Result<_, _>>()
        .ok()?;
    if partial.is_empty() || partial.len() > 4 {
        return None;
    }
    let mut octets = start_addr.octets();
    octets[4 - partial.len()..].copy_from_slice(&partial);
    Some(Ipv4Addr::from(octets))
}

fn parse_cidr_range(s: &str) -> Result<Option<Target>, TargetError> {
    let Some((ip_str, prefix_str)) = s.split_once('/') else {
        return Ok(None);
    };
    let invalid = || TargetError::Cidr(s.to_string());
    let ip = ip_str.parse::<Ipv4Addr>().map_err(|_| invalid())?;
    let prefix = prefix_str.parse::<u8>().map_err(|_| invalid())?;
    let ipv4_range = range::cidr_range(ip, prefix).map_err(|_| invalid())?;
    Ok(Some(Target::Range { ipv4_range }))
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
