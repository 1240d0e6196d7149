//! # Scan Orchestration
//!
//! Runs a whole batch of hosts: ARP resolution first for hosts that asked for
//! it, then every socket-level service through one cooperative scheduler.
//! Afterwards each host not probed directly takes its outcome from its
//! services.

use std::collections::BTreeMap;

use sondr_common::config::ScanConfig;
use sondr_common::network::host::{AliveReason, Host, Protocol, Service};
use tracing::{info, warn};

use crate::scanner::arp::ArpPinger;
use crate::scanner::{ScannerFactory, ServiceScanner};
use crate::task::TaskQueueRunner;

/// Upper bound on simultaneously active probes.
pub const MAX_BATCH: usize = 4096;

pub struct Engine {
    factory: ScannerFactory,
    arp: Option<ArpPinger>,
}

impl Engine {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            factory: ScannerFactory::new(config),
            arp: None,
        }
    }

    /// Uses `pinger` for ARP services instead of one over the local interfaces.
    pub fn with_arp(mut self, pinger: ArpPinger) -> Self {
        self.arp = Some(pinger);
        self
    }

    pub fn scan(&self, hosts: &mut [Host]) {
        self.resolve_links(hosts);
        self.probe_services(hosts);
        for host in hosts.iter_mut() {
            host.settle();
        }
    }

    fn resolve_links(&self, hosts: &mut [Host]) {
        let mut arp_hosts: Vec<&mut Host> = hosts
            .iter_mut()
            .filter(|host| host.services.iter().any(|s| s.protocol() == Protocol::Arp))
            .collect();
        if arp_hosts.is_empty() {
            return;
        }
        match &self.arp {
            Some(pinger) => pinger.scan(&mut arp_hosts),
            None => ArpPinger::new(self.factory.config()).scan(&mut arp_hosts),
        }
    }

    fn probe_services(&self, hosts: &mut [Host]) {
        let mut services: Vec<&mut Service> = hosts
            .iter_mut()
            .flat_map(|host| host.services.iter_mut())
            .filter(|service| service.protocol() != Protocol::Arp)
            .collect();
        if services.is_empty() {
            return;
        }
        services.sort_by_key(|service| service.port());

        let mut scanners: BTreeMap<u8, Box<dyn ServiceScanner>> = BTreeMap::new();
        for service in &services {
            let number = service.protocol().number();
            if !scanners.contains_key(&number) {
                match self.factory.create(number) {
                    Some(scanner) => {
                        scanners.insert(number, scanner);
                    }
                    None => warn!("No scanner for protocol {}", service.protocol()),
                }
            }
        }

        let total = services.len();
        let mut runner = TaskQueueRunner::new(total, total.min(MAX_BATCH));
        for service in services {
            match scanners.get(&service.protocol().number()) {
                Some(scanner) => runner.enqueue(scanner.scan(service)),
                None => service.finish(AliveReason::ScanFailed),
            }
        }
        info!("Probing {total} service(s)");
        runner.run();
        info!("Probed {total} service(s), peak of {} in flight", runner.peak_active());
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
