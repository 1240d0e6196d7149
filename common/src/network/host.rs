//! # Scan Target Records
//!
//! A [`Host`] owns the [`Service`]s requested for it. Scanners mutate the
//! outcome fields (`alive`, `reason`, `banner`) as results arrive; the
//! identity of a record (address, port, protocol) never changes after creation.
//!
//! Every service of a host shares the host's [`Pacing`] clock, which spaces
//! out consecutive packets sent to the same address.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use pnet::util::MacAddr;

/// Outcome of a probe, or the stage it is currently in.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AliveReason {
    #[default]
    NotScanned,
    InProgress,
    /// Connected, waiting for a banner.
    InProgressExtra,
    TimedOut,
    IcmpUnreachable,
    ReplyReceived,
    ScanFailed,
}

impl AliveReason {
    pub fn is_in_progress(self) -> bool {
        matches!(self, Self::InProgress | Self::InProgressExtra)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::TimedOut | Self::IcmpUnreachable | Self::ReplyReceived | Self::ScanFailed
        )
    }

    /// Orders terminal reasons by how much they say about the target.
    fn weight(self) -> u8 {
        match self {
            Self::ReplyReceived => 4,
            Self::IcmpUnreachable => 3,
            Self::TimedOut => 2,
            Self::ScanFailed => 1,
            _ => 0,
        }
    }
}

impl fmt::Display for AliveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NotScanned => "not scanned",
            Self::InProgress => "in progress",
            Self::InProgressExtra => "awaiting banner",
            Self::TimedOut => "timed out",
            Self::IcmpUnreachable => "unreachable",
            Self::ReplyReceived => "reply received",
            Self::ScanFailed => "scan failed",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    Icmpv6,
    /// Link-layer resolution, no transport protocol.
    Arp,
}

impl Protocol {
    /// IANA protocol number. ARP has none and maps to 0.
    pub const fn number(self) -> u8 {
        match self {
            Self::Tcp => 6,
            Self::Udp => 17,
            Self::Icmp => 1,
            Self::Icmpv6 => 58,
            Self::Arp => 0,
        }
    }

    pub const fn from_number(number: u8) -> Option<Self> {
        match number {
            6 => Some(Self::Tcp),
            17 => Some(Self::Udp),
            1 => Some(Self::Icmp),
            58 => Some(Self::Icmpv6),
            0 => Some(Self::Arp),
            _ => None,
        }
    }

    /// The echo protocol matching the address family.
    pub fn ping_for(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Self::Icmp,
            IpAddr::V6(_) => Self::Icmpv6,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Icmp => "icmp",
            Self::Icmpv6 => "icmpv6",
            Self::Arp => "arp",
        };
        f.write_str(text)
    }
}

/// Timestamp of the last packet sent to one host.
///
/// Guarded by a mutex so services of the same host may be driven from
/// different threads.
#[derive(Debug, Default)]
pub struct Pacing {
    last_sent: Mutex<Option<Instant>>,
}

impl Pacing {
    /// Records a send and returns `true` if at least `delay` has passed since
    /// the previous one. Never blocks on the delay itself.
    pub fn try_claim(&self, delay: Duration) -> bool {
        let mut last_sent = self.last_sent.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        match *last_sent {
            Some(prev) if now.saturating_duration_since(prev) < delay => false,
            _ => {
                *last_sent = Some(now);
                true
            }
        }
    }
}

#[derive(Debug)]
pub struct Service {
    addr: IpAddr,
    port: u16,
    protocol: Protocol,
    pub alive: bool,
    pub reason: AliveReason,
    pub banner: Option<Vec<u8>>,
    pacing: Arc<Pacing>,
}

impl Service {
    /// A service with its own pacing clock, not attached to any host.
    pub fn new(addr: IpAddr, port: u16, protocol: Protocol) -> Self {
        Self::with_pacing(addr, port, protocol, Arc::default())
    }

    fn with_pacing(addr: IpAddr, port: u16, protocol: Protocol, pacing: Arc<Pacing>) -> Self {
        Self {
            addr,
            port,
            protocol,
            alive: false,
            reason: AliveReason::NotScanned,
            banner: None,
            pacing,
        }
    }

    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.addr, self.port)
    }

    pub fn pacing(&self) -> &Pacing {
        &self.pacing
    }

    /// Resets the outcome and marks the service as in flight.
    pub fn begin(&mut self) {
        self.alive = false;
        self.reason = AliveReason::InProgress;
        self.banner = None;
    }

    /// Records the single terminal outcome of a scan.
    pub fn finish(&mut self, reason: AliveReason) {
        debug_assert!(reason.is_terminal(), "{reason:?} is not a terminal reason");
        self.alive = reason == AliveReason::ReplyReceived;
        self.reason = reason;
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.protocol {
            Protocol::Tcp | Protocol::Udp => write!(f, "{}/{}", self.socket_addr(), self.protocol),
            _ => write!(f, "{}/{}", self.addr, self.protocol),
        }
    }
}

#[derive(Debug)]
pub struct Host {
    addr: IpAddr,
    pub services: Vec<Service>,
    pub alive: bool,
    pub reason: AliveReason,
    pub mac: Option<MacAddr>,
    pacing: Arc<Pacing>,
}

impl Host {
    pub fn new(addr: IpAddr) -> Self {
        Self {
            addr,
            services: Vec::new(),
            alive: false,
            reason: AliveReason::NotScanned,
            mac: None,
            pacing: Arc::default(),
        }
    }

    pub fn with_service(mut self, port: u16, protocol: Protocol) -> Self {
        self.add_service(port, protocol);
        self
    }

    /// Appends a service sharing this host's pacing clock.
    pub fn add_service(&mut self, port: u16, protocol: Protocol) -> &mut Service {
        let service = Service::with_pacing(self.addr, port, protocol, Arc::clone(&self.pacing));
        self.services.push(service);
        let last = self.services.len() - 1;
        &mut self.services[last]
    }

    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    pub fn pacing(&self) -> &Pacing {
        &self.pacing
    }

    pub fn begin(&mut self) {
        self.alive = false;
        self.reason = AliveReason::InProgress;
    }

    pub fn finish(&mut self, reason: AliveReason) {
        debug_assert!(reason.is_terminal(), "{reason:?} is not a terminal reason");
        self.alive = reason == AliveReason::ReplyReceived;
        self.reason = reason;
    }

    /// Derives the host outcome from its services when the host itself was
    /// never probed directly.
    pub fn settle(&mut self) {
        if self.reason != AliveReason::NotScanned {
            return;
        }
        let best = self
            .services
            .iter()
            .map(|service| service.reason)
            .filter(|reason| reason.is_terminal())
            .max_by_key(|reason| reason.weight());

        if let Some(reason) = best {
            self.alive = self.services.iter().any(|service| service.alive);
            self.reason = reason;
        }
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
