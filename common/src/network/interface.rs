//! # Local Interface Discovery
//!
//! Enumerates the adapters ARP can be spoken on and answers whether a
//! target address lies inside one of their IPv4 ranges.
//!
//! The list is computed once per process on first use and never changes
//! afterwards.

use std::net::Ipv4Addr;
use std::sync::OnceLock;

use pnet::datalink::{self, NetworkInterface};
use pnet::ipnetwork::IpNetwork;
use pnet::util::MacAddr;
use rayon::prelude::*;
use tracing::debug;

/// A local adapter with IPv4 connectivity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub name: String,
    pub mac: MacAddr,
    /// Kernel interface index.
    pub index: u32,
    pub ipv4: Ipv4Addr,
    pub netmask: Ipv4Addr,
    /// Approximated as `broadcast & netmask` when only the broadcast address
    /// is known, so this is the network address rather than a real router.
    pub gateway: Option<Ipv4Addr>,
}

impl Interface {
    pub fn new(name: &str, mac: MacAddr, index: u32, ipv4: Ipv4Addr, netmask: Ipv4Addr) -> Self {
        Self {
            name: name.to_string(),
            mac,
            index,
            ipv4,
            netmask,
            gateway: None,
        }
    }

    pub fn with_gateway(mut self, gateway: Ipv4Addr) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Inclusive `(network, broadcast)` bounds of the adapter's subnet.
    pub fn bounds(&self) -> (u32, u32) {
        let mask = u32::from(self.netmask);
        let network = u32::from(self.gateway.unwrap_or(self.ipv4)) & mask;
        (network, network | !mask)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub(crate) enum ViabilityError {
    /// The interface is operationally down.
    IsDown,
    IsLoopback,
    /// No MAC address, or an all-zero one.
    NoMacAddress,
    /// The interface does not support broadcast (required for ARP).
    NotBroadcast,
    NoIpv4,
}

static INTERFACES: OnceLock<Vec<Interface>> = OnceLock::new();

/// Returns the process-wide interface list, enumerating adapters on first call.
pub fn local_interfaces() -> &'static [Interface] {
    INTERFACES.get_or_init(|| {
        let interfaces = discover_interfaces();
        debug!("Discovered {} ARP-capable interface(s)", interfaces.len());
        interfaces
    })
}

pub fn discover_interfaces() -> Vec<Interface> {
    from_network_interfaces(&datalink::interfaces())
}

/// Converts raw adapters into [`Interface`] records, one per IPv4 network
/// of every viable adapter, keeping enumeration order.
pub fn from_network_interfaces(interfaces: &[NetworkInterface]) -> Vec<Interface> {
    interfaces
        .iter()
        .filter(|interface| is_viable_arp_interface(interface).is_ok())
        .flat_map(|interface| {
            interface.ips.iter().filter_map(move |net| match net {
                IpNetwork::V4(v4) => {
                    let mac = interface.mac?;
                    let gateway = u32::from(v4.broadcast()) & u32::from(v4.mask());
                    Some(
                        Interface::new(&interface.name, mac, interface.index, v4.ip(), v4.mask())
                            .with_gateway(Ipv4Addr::from(gateway)),
                    )
                }
                IpNetwork::V6(_) => None,
            })
        })
        .collect()
}

fn is_viable_arp_interface(interface: &NetworkInterface) -> Result<(), ViabilityError> {
    if !interface.is_up() {
        return Err(ViabilityError::IsDown);
    }
    if interface.is_loopback() {
        return Err(ViabilityError::IsLoopback);
    }
    match interface.mac {
        Some(mac) if mac != MacAddr::zero() => {}
        _ => return Err(ViabilityError::NoMacAddress),
    }
    if !interface.is_broadcast() {
        return Err(ViabilityError::NotBroadcast);
    }
    if !interface.ips.iter().any(IpNetwork::is_ipv4) {
        return Err(ViabilityError::NoIpv4);
    }
    Ok(())
}

/// Whether `ip` falls inside the subnet of `iface`, bounds included.
pub fn is_ip_on_iface(ip: Ipv4Addr, iface: &Interface) -> bool {
    let (low, high) = iface.bounds();
    let ip = u32::from(ip);
    low <= ip && ip <= high
}

/// First interface, in discovery order, whose subnet contains `ip`.
pub fn find_interface(ip: Ipv4Addr, interfaces: &[Interface]) -> Option<&Interface> {
    interfaces.iter().find(|iface| is_ip_on_iface(ip, iface))
}

/// Maps every target to the position of its interface, or `None` when no
/// local subnet contains it. Output order matches `targets`.
pub fn classify_targets(targets: &[Ipv4Addr], interfaces: &[Interface]) -> Vec<Option<usize>> {
    targets
        .par_iter()
        .map(|&ip| interfaces.iter().position(|iface| is_ip_on_iface(ip, iface)))
        .collect()
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
