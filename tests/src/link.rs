#![cfg(test)]
use std::collections::VecDeque;
use std::io;
use std::net::{IpAddr, Ipv4Addr, TcpListener};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use pnet::util::MacAddr;
use sondr_common::config::ScanConfig;
use sondr_common::network::host::{AliveReason, Host, Protocol};
use sondr_common::network::interface::Interface;
use sondr_core::engine::Engine;
use sondr_core::network::link::{FrameCapture, FrameSender, LinkError, LinkHandles, LinkLayer};
use sondr_core::scanner::arp::ArpPinger;
use sondr_protocols::arp;

const LOCAL_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 10);

/// A segment where only the neighbours in `present` answer, each with a MAC
/// derived from its last octet.
#[derive(Clone, Default)]
struct Segment {
    wire: Arc<Mutex<VecDeque<Vec<u8>>>>,
    requests: Arc<Mutex<Vec<Ipv4Addr>>>,
    present: Vec<Ipv4Addr>,
}

fn neighbour_mac(ip: Ipv4Addr) -> MacAddr {
    MacAddr::new(0x52, 0x54, 0, 0, 0, ip.octets()[3])
}

impl LinkLayer for Segment {
    fn open(&self, _iface: &Interface) -> Result<LinkHandles, LinkError> {
        Ok((Box::new(self.clone()), Box::new(self.clone())))
    }
}

impl FrameSender for Segment {
    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        let Some((asker, target)) = arp::parse_request(frame) else {
            return Ok(());
        };
        self.requests.lock().unwrap().push(target);
        if self.present.contains(&target) {
            let reply = arp::create_reply(neighbour_mac(target), target, asker, LOCAL_IP).map_err(io::Error::other)?;
            self.wire.lock().unwrap().push_back(reply.to_vec());
        }
        Ok(())
    }
}

impl FrameCapture for Segment {
    fn next_frame(&mut self) -> io::Result<Option<Vec<u8>>> {
        let frame = self.wire.lock().unwrap().pop_front();
        if frame.is_none() {
            thread::sleep(Duration::from_millis(1));
        }
        Ok(frame)
    }
}

fn lan() -> Vec<Interface> {
    vec![Interface::new(
        "eth0",
        MacAddr::new(0x02, 0, 0, 0, 0, 0x0a),
        3,
        LOCAL_IP,
        Ipv4Addr::new(255, 255, 255, 0),
    )]
}

fn arp_host(ip: Ipv4Addr) -> Host {
    Host::new(IpAddr::V4(ip)).with_service(0, Protocol::Arp)
}

fn config() -> ScanConfig {
    ScanConfig {
        arp_listen: Duration::from_millis(150),
        ..ScanConfig::default()
    }
}

#[test]
fn arp_sweep_over_a_segment() {
    let gateway = Ipv4Addr::new(192, 168, 1, 1);
    let silent = Ipv4Addr::new(192, 168, 1, 254);
    let remote = Ipv4Addr::new(10, 1, 2, 3);
    let segment = Segment {
        present: vec![gateway],
        ..Segment::default()
    };
    let config = config();
    let engine = Engine::new(&config).with_arp(ArpPinger::with_link(&config, lan(), segment.clone()));
    let mut hosts = vec![arp_host(gateway), arp_host(silent), arp_host(remote)];

    engine.scan(&mut hosts);

    assert!(hosts[0].alive);
    assert_eq!(hosts[0].reason, AliveReason::ReplyReceived);
    assert_eq!(hosts[0].mac, Some(neighbour_mac(gateway)));
    assert_eq!(hosts[0].services[0].reason, AliveReason::ReplyReceived);

    assert!(!hosts[1].alive);
    assert_eq!(hosts[1].reason, AliveReason::TimedOut);
    assert_eq!(hosts[1].mac, None);

    assert_eq!(hosts[2].reason, AliveReason::ScanFailed);
    assert_eq!(*segment.requests.lock().unwrap(), vec![gateway, silent]);
}

#[test]
fn delay_spaces_out_requests_to_the_same_host() {
    let target = Ipv4Addr::new(192, 168, 1, 1);
    let segment = Segment {
        present: vec![target],
        ..Segment::default()
    };
    let config = config().with_delay_ms(100);
    let engine = Engine::new(&config).with_arp(ArpPinger::with_link(&config, lan(), segment));

    let mut hosts = vec![arp_host(target)];
    assert!(hosts[0].pacing().try_claim(config.delay));
    let started = Instant::now();
    engine.scan(&mut hosts);

    assert!(started.elapsed() >= Duration::from_millis(90));
    assert_eq!(hosts[0].reason, AliveReason::ReplyReceived);
}

#[test]
fn arp_and_tcp_in_one_batch() -> anyhow::Result<()> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
    let port = listener.local_addr()?.port();
    let neighbour = Ipv4Addr::new(192, 168, 1, 7);
    let segment = Segment {
        present: vec![neighbour],
        ..Segment::default()
    };
    let config = config().with_banner(false);
    let engine = Engine::new(&config).with_arp(ArpPinger::with_link(&config, lan(), segment));
    let mut hosts = vec![
        arp_host(neighbour),
        Host::new(IpAddr::V4(Ipv4Addr::LOCALHOST)).with_service(port, Protocol::Tcp),
    ];

    engine.scan(&mut hosts);

    assert_eq!(hosts[0].reason, AliveReason::ReplyReceived);
    assert_eq!(hosts[0].mac, Some(neighbour_mac(neighbour)));
    assert_eq!(hosts[1].reason, AliveReason::ReplyReceived);
    assert!(hosts.iter().all(|host| host.alive));
    drop(listener);
    Ok(())
}
