//! # ARP Resolution Scan
//!
//! Unlike the socket scanners this is not a per-service state machine: the
//! replies of every target arrive on one capture handle per interface, so a
//! listener thread collects them while the calling thread transmits the
//! requests. The listener is joined before any host is updated.
//!
//! Targets outside every local subnet are failed without sending a frame.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::{Duration, Instant};

use pnet::util::MacAddr;
use sondr_common::config::ScanConfig;
use sondr_common::network::host::{AliveReason, Host, Protocol, Service};
use sondr_common::network::interface::{self, Interface};
use sondr_protocols::{arp, ethernet};
use tracing::{debug, info, warn};

use crate::network::link::{DatalinkLayer, FrameCapture, FrameSender, LinkLayer};

const PACING_POLL: Duration = Duration::from_millis(1);

pub struct ArpPinger {
    interfaces: Vec<Interface>,
    link: Box<dyn LinkLayer>,
    listen: Duration,
    delay: Duration,
}

impl ArpPinger {
    /// Pinger over the discovered local interfaces and real link-layer channels.
    pub fn new(config: &ScanConfig) -> Self {
        Self::with_link(config, interface::local_interfaces().to_vec(), DatalinkLayer)
    }

    pub fn with_link(config: &ScanConfig, interfaces: Vec<Interface>, link: impl LinkLayer + 'static) -> Self {
        Self {
            interfaces,
            link: Box::new(link),
            listen: config.arp_listen,
            delay: config.delay,
        }
    }

    /// Resolves every host and records the outcome on the host and on its
    /// ARP services.
    pub fn scan(&self, hosts: &mut [&mut Host]) {
        for host in hosts.iter_mut() {
            begin(host);
        }

        let mut by_iface: BTreeMap<usize, Vec<(usize, Ipv4Addr)>> = BTreeMap::new();
        for (host_idx, ip, position) in self.classify(hosts) {
            match position {
                Some(pos) => by_iface.entry(pos).or_default().push((host_idx, ip)),
                None => {
                    debug!("{ip} is not on any local subnet");
                    settle(&mut hosts[host_idx], AliveReason::ScanFailed, None);
                }
            }
        }

        let mut links = Vec::new();
        let mut captures = Vec::new();
        for (pos, group) in by_iface {
            let iface = &self.interfaces[pos];
            match self.link.open(iface) {
                Ok((sender, capture)) => {
                    links.push((iface, sender, group));
                    captures.push(capture);
                }
                Err(e) => {
                    warn!("ARP on {} unavailable: {e}", iface.name);
                    for (host_idx, _) in group {
                        settle(&mut hosts[host_idx], AliveReason::ScanFailed, None);
                    }
                }
            }
        }
        if links.is_empty() {
            return;
        }

        let expected: HashSet<Ipv4Addr> = links
            .iter()
            .flat_map(|(_, _, group)| group.iter().map(|&(_, ip)| ip))
            .collect();
        info!("Resolving {} address(es) over ARP", expected.len());

        let (done_tx, done_rx) = mpsc::channel();
        let (replies, unsent) = thread::scope(|scope| {
            let listener = scope.spawn(|| listen(captures, &expected, self.listen, done_rx));
            let mut unsent = HashSet::new();
            for (iface, sender, group) in &mut links {
                for &(host_idx, ip) in group.iter() {
                    if !self.send_request(iface, sender.as_mut(), &hosts[host_idx], ip) {
                        unsent.insert(host_idx);
                    }
                }
            }
            let _ = done_tx.send(Instant::now());
            let replies = listener.join().unwrap_or_else(|_| {
                warn!("ARP listener panicked, treating every target as silent");
                HashMap::new()
            });
            (replies, unsent)
        });

        for (_, _, group) in links {
            for (host_idx, ip) in group {
                match replies.get(&ip) {
                    Some(&mac) => settle(&mut hosts[host_idx], AliveReason::ReplyReceived, Some(mac)),
                    None if unsent.contains(&host_idx) => {
                        settle(&mut hosts[host_idx], AliveReason::ScanFailed, None)
                    }
                    None => settle(&mut hosts[host_idx], AliveReason::TimedOut, None),
                }
            }
        }
        debug!("ARP scan finished with {} reply(ies)", replies.len());
    }

    /// Host position, IPv4 address and interface position of every IPv4
    /// host. IPv6 hosts are failed here.
    fn classify(&self, hosts: &mut [&mut Host]) -> Vec<(usize, Ipv4Addr, Option<usize>)> {
        let mut targets = Vec::with_capacity(hosts.len());
        for (host_idx, host) in hosts.iter_mut().enumerate() {
            match host.addr() {
                IpAddr::V4(ip) => targets.push((host_idx, ip)),
                IpAddr::V6(ip) => {
                    debug!("{ip}: ARP needs an IPv4 address");
                    settle(host, AliveReason::ScanFailed, None);
                }
            }
        }
        let ips: Vec<Ipv4Addr> = targets.iter().map(|&(_, ip)| ip).collect();
        let positions = interface::classify_targets(&ips, &self.interfaces);
        targets
            .into_iter()
            .zip(positions)
            .map(|((host_idx, ip), position)| (host_idx, ip, position))
            .collect()
    }

    fn send_request(&self, iface: &Interface, sender: &mut dyn FrameSender, host: &Host, ip: Ipv4Addr) -> bool {
        while !host.pacing().try_claim(self.delay) {
            thread::sleep(PACING_POLL);
        }
        let frame = match arp::create_request(iface.mac, iface.ipv4, ip) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("{ip}: {e:#}");
                return false;
            }
        };
        match sender.send(&frame) {
            Ok(()) => true,
            Err(e) => {
                debug!("{ip}: ARP request not sent on {}: {e}", iface.name);
                false
            }
        }
    }
}

/// Collects the first reply of each expected address until all have
/// answered or `listen` has passed since the send half finished.
fn listen(
    mut captures: Vec<Box<dyn FrameCapture>>,
    expected: &HashSet<Ipv4Addr>,
    listen: Duration,
    done: Receiver<Instant>,
) -> HashMap<Ipv4Addr, MacAddr> {
    let mut replies = HashMap::new();
    let mut deadline: Option<Instant> = None;

    while replies.len() < expected.len() {
        if deadline.is_none() {
            deadline = match done.try_recv() {
                Ok(sent_at) => Some(sent_at + listen),
                Err(TryRecvError::Disconnected) => Some(Instant::now() + listen),
                Err(TryRecvError::Empty) => None,
            };
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            break;
        }
        for capture in captures.iter_mut() {
            match capture.next_frame() {
                Ok(Some(frame)) if ethernet::is_arp_frame(&frame) => {
                    let Some(reply) = arp::parse_reply(&frame) else {
                        continue;
                    };
                    if expected.contains(&reply.sender_ip) {
                        replies.entry(reply.sender_ip).or_insert(reply.sender_mac);
                    }
                }
                Ok(_) => {}
                Err(e) => debug!("ARP capture read failed: {e}"),
            }
        }
    }
    replies
}

fn begin(host: &mut Host) {
    host.begin();
    host.mac = None;
    for service in arp_services(host) {
        service.begin();
    }
}

fn settle(host: &mut Host, reason: AliveReason, mac: Option<MacAddr>) {
    host.finish(reason);
    if mac.is_some() {
        host.mac = mac;
    }
    for service in arp_services(host) {
        service.finish(reason);
    }
}

fn arp_services(host: &mut Host) -> impl Iterator<Item = &mut Service> {
    host.services
        .iter_mut()
        .filter(|service| service.protocol() == Protocol::Arp)
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
