//! TCP connect scan with optional banner grab.
//!
//! ```text
//! InitSocket -> Connect -> PollSocket -> ReadBanner <-> SendProbe
//! ```
//!
//! A service that talks first (SSH, SMTP, FTP) is caught by the first
//! `ReadBanner`; a silent one gets a minimal HTTP request once the banner
//! deadline passes and is read again.

use std::io;
use std::time::{Duration, Instant};

use sondr_common::config::ScanConfig;
use sondr_common::network::host::{AliveReason, Service};
use tracing::debug;

use super::{Probe, ServiceScanner, Transition};
use crate::network::stream::{ConnectStatus, Connector, StreamSocket, TcpConnector};
use crate::task::Task;

pub const MAX_BANNER: usize = 1024;
pub const PROBE: &[u8] = b"GET / HTTP/1.0\r\n\r\n";

pub struct TcpScanner {
    connector: Box<dyn Connector>,
    timeout: Duration,
    delay: Duration,
    grab_banner: bool,
}

impl TcpScanner {
    pub fn new(config: &ScanConfig) -> Self {
        Self::with_connector(config, TcpConnector)
    }

    pub fn with_connector(config: &ScanConfig, connector: impl Connector + 'static) -> Self {
        Self {
            connector: Box::new(connector),
            timeout: config.timeout,
            delay: config.delay,
            grab_banner: config.grab_banner,
        }
    }
}

impl ServiceScanner for TcpScanner {
    fn scan<'a>(&'a self, service: &'a mut Service) -> Task<'a> {
        service.begin();
        let probe = TcpProbe {
            scanner: self,
            service,
        };
        Box::new(move || super::drive(probe, TcpState::InitSocket))
    }
}

enum TcpState {
    InitSocket,
    Connect(Box<dyn StreamSocket>),
    PollSocket {
        socket: Box<dyn StreamSocket>,
        deadline: Instant,
    },
    ReadBanner {
        socket: Box<dyn StreamSocket>,
        deadline: Instant,
        probe_sent: bool,
    },
    SendProbe(Box<dyn StreamSocket>),
}

struct TcpProbe<'a> {
    scanner: &'a TcpScanner,
    service: &'a mut Service,
}

impl<'a> Probe<'a> for TcpProbe<'a> {
    type State = TcpState;

    fn advance(&mut self, state: TcpState) -> Transition<TcpState> {
        match state {
            TcpState::InitSocket => self.init_socket(),
            TcpState::Connect(socket) => self.connect(socket),
            TcpState::PollSocket { socket, deadline } => self.poll_socket(socket, deadline),
            TcpState::ReadBanner {
                socket,
                deadline,
                probe_sent,
            } => self.read_banner(socket, deadline, probe_sent),
            TcpState::SendProbe(socket) => self.send_probe(socket),
        }
    }

    fn service(&mut self) -> &mut Service {
        self.service
    }
}

impl TcpProbe<'_> {
    fn init_socket(&mut self) -> Transition<TcpState> {
        match self.scanner.connector.open(self.service.socket_addr()) {
            Ok(socket) => self.connect(socket),
            Err(e) => {
                debug!("{}: socket setup failed: {e}", self.service);
                Transition::Finish(AliveReason::ScanFailed)
            }
        }
    }

    fn connect(&mut self, mut socket: Box<dyn StreamSocket>) -> Transition<TcpState> {
        if !self.service.pacing().try_claim(self.scanner.delay) {
            return Transition::Next(TcpState::Connect(socket));
        }
        let deadline = Instant::now() + self.scanner.timeout;
        match socket.connect() {
            ConnectStatus::Connected => self.connected(socket),
            ConnectStatus::Pending => Transition::Next(TcpState::PollSocket { socket, deadline }),
            ConnectStatus::Failed(e) => self.connect_failed(&e),
        }
    }

    fn poll_socket(&mut self, mut socket: Box<dyn StreamSocket>, deadline: Instant) -> Transition<TcpState> {
        match socket.poll_connect() {
            ConnectStatus::Connected => self.connected(socket),
            ConnectStatus::Pending if Instant::now() < deadline => {
                Transition::Next(TcpState::PollSocket { socket, deadline })
            }
            ConnectStatus::Pending => Transition::Finish(AliveReason::TimedOut),
            ConnectStatus::Failed(e) => self.connect_failed(&e),
        }
    }

    fn connected(&mut self, socket: Box<dyn StreamSocket>) -> Transition<TcpState> {
        if !self.scanner.grab_banner {
            return Transition::Finish(AliveReason::ReplyReceived);
        }
        self.service.alive = true;
        self.service.reason = AliveReason::InProgressExtra;
        Transition::Next(TcpState::ReadBanner {
            socket,
            deadline: Instant::now() + self.scanner.timeout,
            probe_sent: false,
        })
    }

    fn connect_failed(&self, err: &io::Error) -> Transition<TcpState> {
        let reason = super::reason_for_error(err);
        debug!("{}: connect failed ({reason}): {err}", self.service);
        Transition::Finish(reason)
    }

    fn read_banner(
        &mut self,
        mut socket: Box<dyn StreamSocket>,
        deadline: Instant,
        probe_sent: bool,
    ) -> Transition<TcpState> {
        let mut buf = [0u8; MAX_BANNER];
        match socket.recv(&mut buf) {
            Ok(0) => Transition::Finish(AliveReason::ReplyReceived),
            Ok(n) => {
                self.service.banner = Some(buf[..n].to_vec());
                Transition::Finish(AliveReason::ReplyReceived)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::Interrupted => {
                if Instant::now() < deadline {
                    Transition::Next(TcpState::ReadBanner {
                        socket,
                        deadline,
                        probe_sent,
                    })
                } else if !probe_sent {
                    self.send_probe(socket)
                } else {
                    Transition::Finish(AliveReason::ReplyReceived)
                }
            }
            Err(e) => {
                debug!("{}: banner read failed: {e}", self.service);
                Transition::Finish(AliveReason::ReplyReceived)
            }
        }
    }

    fn send_probe(&mut self, mut socket: Box<dyn StreamSocket>) -> Transition<TcpState> {
        if !self.service.pacing().try_claim(self.scanner.delay) {
            return Transition::Next(TcpState::SendProbe(socket));
        }
        match socket.send(PROBE) {
            Ok(_) => Transition::Next(TcpState::ReadBanner {
                socket,
                deadline: Instant::now() + self.scanner.timeout,
                probe_sent: true,
            }),
            Err(e) => {
                debug!("{}: probe send failed: {e}", self.service);
                Transition::Finish(AliveReason::ReplyReceived)
            }
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
