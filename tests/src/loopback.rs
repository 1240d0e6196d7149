#![cfg(test)]
use std::io::{Read, Write};
use std::net::{IpAddr, Ipv4Addr, TcpListener, UdpSocket};
use std::thread;

use sondr_common::config::ScanConfig;
use sondr_common::network::host::{AliveReason, Host, Protocol};
use sondr_core::engine::Engine;
use sondr_protocols::payloads::GENERIC_PAYLOAD;

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// A port nothing listens on: bound once to get a free number, then released.
fn closed_tcp_port() -> anyhow::Result<u16> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
    Ok(listener.local_addr()?.port())
}

#[test]
fn open_port_with_banner_and_closed_port() -> anyhow::Result<()> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
    let open = listener.local_addr()?.port();
    let closed = closed_tcp_port()?;
    let server = thread::spawn(move || -> std::io::Result<()> {
        let (mut stream, _) = listener.accept()?;
        stream.write_all(b"SSH-2.0-sondr_test\r\n")?;
        let mut sink = [0u8; 64];
        let _ = stream.read(&mut sink);
        Ok(())
    });

    let mut hosts = vec![
        Host::new(LOCALHOST)
            .with_service(closed, Protocol::Tcp)
            .with_service(open, Protocol::Tcp),
    ];
    Engine::new(&ScanConfig::default()).scan(&mut hosts);

    let host = &hosts[0];
    let closed_service = &host.services[0];
    let open_service = &host.services[1];
    assert_eq!(closed_service.reason, AliveReason::IcmpUnreachable);
    assert!(!closed_service.alive);
    assert_eq!(open_service.reason, AliveReason::ReplyReceived);
    assert!(open_service.alive);
    let banner = open_service.banner.as_deref().unwrap_or_default();
    assert!(banner.starts_with(b"SSH-2.0"), "banner: {banner:?}");

    assert!(host.alive);
    assert_eq!(host.reason, AliveReason::ReplyReceived);
    server.join().unwrap()?;
    Ok(())
}

#[test]
fn silent_service_answers_the_probe() -> anyhow::Result<()> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
    let port = listener.local_addr()?.port();
    let server = thread::spawn(move || -> std::io::Result<Vec<u8>> {
        let (mut stream, _) = listener.accept()?;
        let mut request = Vec::new();
        let mut buf = [0u8; 64];
        while !request.ends_with(b"\r\n\r\n") {
            let n = stream.read(&mut buf)?;
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        stream.write_all(b"HTTP/1.0 200 OK\r\n\r\n")?;
        Ok(request)
    });

    let mut hosts = vec![Host::new(LOCALHOST).with_service(port, Protocol::Tcp)];
    Engine::new(&ScanConfig::default().with_timeout_ms(200)).scan(&mut hosts);

    let service = &hosts[0].services[0];
    assert_eq!(service.reason, AliveReason::ReplyReceived);
    assert_eq!(service.banner.as_deref(), Some(&b"HTTP/1.0 200 OK\r\n\r\n"[..]));
    assert_eq!(server.join().unwrap()?, b"GET / HTTP/1.0\r\n\r\n");
    Ok(())
}

#[test]
fn connect_only_without_banner() -> anyhow::Result<()> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
    let port = listener.local_addr()?.port();

    let mut hosts = vec![Host::new(LOCALHOST).with_service(port, Protocol::Tcp)];
    Engine::new(&ScanConfig::default().with_banner(false)).scan(&mut hosts);

    let service = &hosts[0].services[0];
    assert_eq!(service.reason, AliveReason::ReplyReceived);
    assert_eq!(service.banner, None);
    drop(listener);
    Ok(())
}

#[test]
fn many_hosts_in_one_batch() -> anyhow::Result<()> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
    let port = listener.local_addr()?.port();

    let mut hosts: Vec<Host> = (1..=20)
        .map(|i| Host::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, i))).with_service(port, Protocol::Tcp))
        .collect();
    Engine::new(&ScanConfig::default().with_banner(false)).scan(&mut hosts);

    // Only 127.0.0.1 has the listener; the rest of 127/8 refuses.
    assert_eq!(hosts[0].reason, AliveReason::ReplyReceived);
    for host in &hosts[1..] {
        assert!(host.reason.is_terminal(), "{}: {}", host.addr(), host.reason);
        assert!(!host.reason.is_in_progress());
    }
    drop(listener);
    Ok(())
}

#[test]
fn udp_echo_is_alive() -> anyhow::Result<()> {
    let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))?;
    let port = socket.local_addr()?.port();
    let server = thread::spawn(move || -> std::io::Result<Vec<u8>> {
        let mut buf = [0u8; 512];
        let (n, peer) = socket.recv_from(&mut buf)?;
        socket.send_to(&buf[..n], peer)?;
        Ok(buf[..n].to_vec())
    });

    let mut hosts = vec![Host::new(LOCALHOST).with_service(port, Protocol::Udp)];
    Engine::new(&ScanConfig::default()).scan(&mut hosts);

    let service = &hosts[0].services[0];
    assert_eq!(service.reason, AliveReason::ReplyReceived);
    assert_eq!(service.banner.as_deref(), Some(GENERIC_PAYLOAD));
    assert_eq!(server.join().unwrap()?, GENERIC_PAYLOAD);
    Ok(())
}

#[cfg(target_os = "linux")]
#[test]
fn closed_udp_port_is_unreachable() -> anyhow::Result<()> {
    let port = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))?.local_addr()?.port();

    let mut hosts = vec![Host::new(LOCALHOST).with_service(port, Protocol::Udp)];
    Engine::new(&ScanConfig::default().with_timeout_ms(500)).scan(&mut hosts);

    assert_eq!(hosts[0].services[0].reason, AliveReason::IcmpUnreachable);
    assert!(!hosts[0].alive);
    Ok(())
}

#[test]
#[ignore = "needs raw socket privileges"]
fn ping_localhost() {
    let mut hosts = vec![Host::new(LOCALHOST).with_service(0, Protocol::Icmp)];
    Engine::new(&ScanConfig::default()).scan(&mut hosts);

    assert_eq!(hosts[0].services[0].reason, AliveReason::ReplyReceived);
    assert!(hosts[0].alive);
}
