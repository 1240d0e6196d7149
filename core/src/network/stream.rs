use std::io::{self, Read};
use std::net::SocketAddr;

use socket2::{Domain, Protocol, SockAddr, Socket, Type};

#[derive(Debug)]
pub enum ConnectStatus {
    /// Handshake still in flight.
    Pending,
    Connected,
    Failed(io::Error),
}

/// A non-blocking stream socket bound to one remote address.
pub trait StreamSocket {
    /// Starts connecting. Never waits for the handshake.
    fn connect(&mut self) -> ConnectStatus;

    /// Zero-wait check on a connect started earlier.
    fn poll_connect(&mut self) -> ConnectStatus;

    fn send(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// `WouldBlock` when no data is queued, `Ok(0)` when the peer closed.
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

pub trait Connector {
    fn open(&self, addr: SocketAddr) -> io::Result<Box<dyn StreamSocket>>;
}

/// Opens real TCP sockets.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    fn open(&self, addr: SocketAddr) -> io::Result<Box<dyn StreamSocket>> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_nonblocking(true)?;
        socket.set_nodelay(true)?;
        Ok(Box::new(TcpSocket {
            socket,
            addr: SockAddr::from(addr),
        }))
    }
}

struct TcpSocket {
    socket: Socket,
    addr: SockAddr,
}

impl StreamSocket for TcpSocket {
    fn connect(&mut self) -> ConnectStatus {
        match self.socket.connect(&self.addr) {
            Ok(()) => ConnectStatus::Connected,
            Err(e) if super::is_would_block(&e) => ConnectStatus::Pending,
            Err(e) => ConnectStatus::Failed(e),
        }
    }

    // A pending connect has no pending error and no peer yet.
    fn poll_connect(&mut self) -> ConnectStatus {
        match self.socket.take_error() {
            Ok(Some(e)) | Err(e) => return ConnectStatus::Failed(e),
            Ok(None) => {}
        }
        match self.socket.peer_addr() {
            Ok(_) => ConnectStatus::Connected,
            Err(e) if e.kind() == io::ErrorKind::NotConnected => ConnectStatus::Pending,
            Err(e) => ConnectStatus::Failed(e),
        }
    }

    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.socket.send(buf)
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.socket.read(buf)
    }
}
