//! ICMP / ICMPv6 echo scan over raw sockets.

use std::io;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{Duration, Instant};

use sondr_common::config::ScanConfig;
use sondr_common::network::host::{AliveReason, Service};
use sondr_protocols::icmp::{self, EchoRequest, IcmpReply, IcmpVersion};
use tracing::{debug, warn};

use super::{Probe, ServiceScanner, Transition};
use crate::network::raw::{IcmpOpener, IcmpSocket, RawIcmpOpener};
use crate::task::Task;

pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

const MAX_DATAGRAM: usize = 1500;

static NEXT_SEQUENCE: AtomicU16 = AtomicU16::new(1);

fn next_sequence() -> u16 {
    NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed)
}

pub struct IcmpScanner {
    opener: Box<dyn IcmpOpener>,
    timeout: Duration,
    delay: Duration,
}

impl IcmpScanner {
    pub fn new(config: &ScanConfig) -> Self {
        Self::with_opener(config, RawIcmpOpener)
    }

    pub fn with_opener(config: &ScanConfig, opener: impl IcmpOpener + 'static) -> Self {
        Self {
            opener: Box::new(opener),
            timeout: config.timeout,
            delay: config.delay,
        }
    }
}

impl ServiceScanner for IcmpScanner {
    fn scan<'a>(&'a self, service: &'a mut Service) -> Task<'a> {
        service.begin();
        let probe = IcmpProbe {
            scanner: self,
            version: IcmpVersion::for_addr(service.addr()),
            service,
        };
        Box::new(move || super::drive(probe, IcmpState::InitSocket))
    }
}

enum IcmpState {
    InitSocket,
    Send {
        socket: Box<dyn IcmpSocket>,
        request: [u8; icmp::ECHO_LEN],
    },
    PollSocket {
        socket: Box<dyn IcmpSocket>,
        deadline: Instant,
        next_poll: Instant,
    },
}

struct IcmpProbe<'a> {
    scanner: &'a IcmpScanner,
    service: &'a mut Service,
    version: IcmpVersion,
}

impl<'a> Probe<'a> for IcmpProbe<'a> {
    type State = IcmpState;

    fn advance(&mut self, state: IcmpState) -> Transition<IcmpState> {
        match state {
            IcmpState::InitSocket => self.init_socket(),
            IcmpState::Send { socket, request } => self.send(socket, request),
            IcmpState::PollSocket {
                socket,
                deadline,
                next_poll,
            } => self.poll_socket(socket, deadline, next_poll),
        }
    }

    fn service(&mut self) -> &mut Service {
        self.service
    }
}

impl IcmpProbe<'_> {
    fn init_socket(&mut self) -> Transition<IcmpState> {
        let socket = match self.scanner.opener.open(self.service.addr()) {
            Ok(socket) => socket,
            Err(e) => {
                if e.kind() == io::ErrorKind::PermissionDenied {
                    warn!("{}: raw sockets need elevated privileges", self.service);
                } else {
                    debug!("{}: socket setup failed: {e}", self.service);
                }
                return Transition::Finish(AliveReason::ScanFailed);
            }
        };
        let request = EchoRequest::new(self.version, socket.identifier(), next_sequence()).encode();
        self.send(socket, request)
    }

    fn send(&mut self, mut socket: Box<dyn IcmpSocket>, request: [u8; icmp::ECHO_LEN]) -> Transition<IcmpState> {
        if !self.service.pacing().try_claim(self.scanner.delay) {
            return Transition::Next(IcmpState::Send { socket, request });
        }
        if let Err(e) = socket.send(&request) {
            debug!("{}: echo request not sent: {e}", self.service);
            return Transition::Finish(AliveReason::ScanFailed);
        }
        let now = Instant::now();
        Transition::Next(IcmpState::PollSocket {
            socket,
            deadline: now + self.scanner.timeout,
            next_poll: now,
        })
    }

    fn poll_socket(
        &mut self,
        mut socket: Box<dyn IcmpSocket>,
        deadline: Instant,
        next_poll: Instant,
    ) -> Transition<IcmpState> {
        let now = Instant::now();
        if now < next_poll {
            return Transition::Next(IcmpState::PollSocket {
                socket,
                deadline,
                next_poll,
            });
        }

        let identifier = socket.identifier();
        let mut buf = [0u8; MAX_DATAGRAM];
        loop {
            match socket.recv(&mut buf) {
                Ok(n) => match icmp::parse_reply(self.version, &buf[..n]) {
                    Some(reply) if reply.identifier() == Some(identifier) => {
                        return Transition::Finish(match reply {
                            IcmpReply::Echo { .. } => AliveReason::ReplyReceived,
                            _ => AliveReason::IcmpUnreachable,
                        });
                    }
                    _ => continue,
                },
                Err(e) if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::Interrupted => break,
                Err(e) => {
                    let reason = super::reason_for_error(&e);
                    debug!("{}: receive failed ({reason}): {e}", self.service);
                    return Transition::Finish(reason);
                }
            }
        }

        if now >= deadline {
            return Transition::Finish(AliveReason::TimedOut);
        }
        Transition::Next(IcmpState::PollSocket {
            socket,
            deadline,
            next_poll: now + POLL_INTERVAL,
        })
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
