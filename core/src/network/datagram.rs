use std::io::{self, Read};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};

/// A non-blocking datagram socket connected to one remote address.
pub trait DatagramSocket {
    fn send(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// `WouldBlock` when nothing arrived. An ICMP port unreachable for an
    /// earlier send surfaces as `ConnectionRefused` on POSIX systems.
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

pub trait Binder {
    fn open(&self, addr: SocketAddr) -> io::Result<Box<dyn DatagramSocket>>;
}

/// Opens real UDP sockets on an ephemeral local port.
#[derive(Debug, Default, Clone, Copy)]
pub struct UdpBinder;

impl Binder for UdpBinder {
    fn open(&self, addr: SocketAddr) -> io::Result<Box<dyn DatagramSocket>> {
        let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
        let local = match addr.ip() {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        socket.bind(&SockAddr::from(SocketAddr::new(local, 0)))?;
        socket.set_nonblocking(true)?;
        socket.connect(&SockAddr::from(addr))?;
        Ok(Box::new(UdpSocket(socket)))
    }
}

struct UdpSocket(Socket);

impl DatagramSocket for UdpSocket {
    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.send(buf)
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}
