use std::io::{self, Read};
use std::net::{IpAddr, SocketAddr};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};

pub const ICMP_TTL: u32 = 255;

/// A non-blocking raw ICMP socket connected to one remote address.
pub trait IcmpSocket {
    /// Echo identifier owned by this socket.
    fn identifier(&self) -> u16;

    fn send(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// IPv4 datagrams include the IP header, IPv6 ones do not.
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

pub trait IcmpOpener {
    fn open(&self, addr: IpAddr) -> io::Result<Box<dyn IcmpSocket>>;
}

/// Opens raw ICMP / ICMPv6 sockets. Needs root or `CAP_NET_RAW`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawIcmpOpener;

impl IcmpOpener for RawIcmpOpener {
    fn open(&self, addr: IpAddr) -> io::Result<Box<dyn IcmpSocket>> {
        let (domain, protocol) = match addr {
            IpAddr::V4(_) => (Domain::IPV4, Protocol::ICMPV4),
            IpAddr::V6(_) => (Domain::IPV6, Protocol::ICMPV6),
        };
        let socket = Socket::new(domain, Type::RAW, Some(protocol))?;
        socket.set_nonblocking(true)?;
        match addr {
            IpAddr::V4(_) => socket.set_ttl(ICMP_TTL)?,
            IpAddr::V6(_) => socket.set_unicast_hops_v6(ICMP_TTL)?,
        }
        socket.connect(&SockAddr::from(SocketAddr::new(addr, 0)))?;
        let identifier = handle_identifier(&socket);
        Ok(Box::new(RawIcmpSocket { socket, identifier }))
    }
}

#[cfg(unix)]
fn handle_identifier(socket: &Socket) -> u16 {
    use std::os::fd::AsRawFd;
    socket.as_raw_fd() as u16
}

#[cfg(windows)]
fn handle_identifier(socket: &Socket) -> u16 {
    use std::os::windows::io::AsRawSocket;
    socket.as_raw_socket() as u16
}

struct RawIcmpSocket {
    socket: Socket,
    identifier: u16,
}

impl IcmpSocket for RawIcmpSocket {
    fn identifier(&self) -> u16 {
        self.identifier
    }

    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.socket.send(buf)
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.socket.read(buf)
    }
}
