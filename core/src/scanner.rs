//! # Protocol Scanners
//!
//! A [`ServiceScanner`] turns one [`Service`] into the first continuation of
//! its probe. The continuation owns the probe's working state (socket,
//! deadline, stage) and drops it on the step that writes the terminal
//! [`AliveReason`], so no socket outlives its result.
//!
//! ARP is not a per-service protocol and is handled by [`arp::ArpPinger`].

use std::io;

use sondr_common::config::ScanConfig;
use sondr_common::network::host::{AliveReason, Protocol, Service};

use crate::task::{Step, Task};

pub mod arp;
pub mod icmp;
pub mod tcp;
pub mod udp;

pub trait ServiceScanner {
    /// Marks `service` in progress and returns the first step of its probe.
    fn scan<'a>(&'a self, service: &'a mut Service) -> Task<'a>;
}

/// Builds scanners keyed by IANA protocol number.
#[derive(Debug, Clone, Default)]
pub struct ScannerFactory {
    config: ScanConfig,
}

impl ScannerFactory {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// `None` for unknown numbers and for ARP (number 0).
    pub fn create(&self, protocol_number: u8) -> Option<Box<dyn ServiceScanner>> {
        match Protocol::from_number(protocol_number)? {
            Protocol::Tcp => Some(Box::new(tcp::TcpScanner::new(&self.config))),
            Protocol::Udp => Some(Box::new(udp::UdpScanner::new(&self.config))),
            Protocol::Icmp | Protocol::Icmpv6 => Some(Box::new(icmp::IcmpScanner::new(&self.config))),
            Protocol::Arp => None,
        }
    }
}

pub(crate) enum Transition<S> {
    Next(S),
    Finish(AliveReason),
}

/// One protocol state machine bound to the service it scans.
pub(crate) trait Probe<'a>: Sized + 'a {
    type State: 'a;

    fn advance(&mut self, state: Self::State) -> Transition<Self::State>;

    fn service(&mut self) -> &mut Service;
}

/// Runs one transition and either records the outcome or schedules the next.
pub(crate) fn drive<'a, P: Probe<'a>>(mut probe: P, state: P::State) -> Step<'a> {
    match probe.advance(state) {
        Transition::Next(next) => Step::next(move || drive(probe, next)),
        Transition::Finish(reason) => {
            probe.service().finish(reason);
            Step::Done
        }
    }
}

/// Outcome implied by a socket error.
pub(crate) fn reason_for_error(err: &io::Error) -> AliveReason {
    match err.kind() {
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::HostUnreachable
        | io::ErrorKind::NetworkUnreachable => AliveReason::IcmpUnreachable,
        io::ErrorKind::TimedOut => AliveReason::TimedOut,
        _ => AliveReason::ScanFailed,
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
