//! UDP probe scan: send the port's payload, wait for any datagram back.

use std::io;
use std::path::Path;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use sondr_common::config::ScanConfig;
use sondr_common::network::host::{AliveReason, Service};
use sondr_protocols::payloads::PayloadTable;
use tracing::{debug, warn};

use super::{Probe, ServiceScanner, Transition};
use crate::network::datagram::{Binder, DatagramSocket, UdpBinder};
use crate::task::Task;

const MAX_RESPONSE: usize = 1024;

static PAYLOADS: OnceLock<PayloadTable> = OnceLock::new();

/// Process-wide payload table, loaded on first use.
///
/// Only the first caller's `db` is honoured. A database that fails to load
/// is reported and replaced by the built-in table.
pub fn payload_table(db: Option<&Path>) -> &'static PayloadTable {
    PAYLOADS.get_or_init(|| match db {
        Some(path) => PayloadTable::load(path).unwrap_or_else(|e| {
            warn!("Using built-in UDP payloads: {e}");
            PayloadTable::builtin()
        }),
        None => PayloadTable::builtin(),
    })
}

pub struct UdpScanner {
    binder: Box<dyn Binder>,
    payloads: &'static PayloadTable,
    timeout: Duration,
    delay: Duration,
    grab_banner: bool,
}

impl UdpScanner {
    pub fn new(config: &ScanConfig) -> Self {
        Self::with_binder(config, UdpBinder)
    }

    pub fn with_binder(config: &ScanConfig, binder: impl Binder + 'static) -> Self {
        Self {
            binder: Box::new(binder),
            payloads: payload_table(config.payload_db.as_deref()),
            timeout: config.timeout,
            delay: config.delay,
            grab_banner: config.grab_banner,
        }
    }
}

impl ServiceScanner for UdpScanner {
    fn scan<'a>(&'a self, service: &'a mut Service) -> Task<'a> {
        service.begin();
        let probe = UdpProbe {
            scanner: self,
            service,
        };
        Box::new(move || super::drive(probe, UdpState::InitSocket))
    }
}

enum UdpState {
    InitSocket,
    Send(Box<dyn DatagramSocket>),
    PollSocket {
        socket: Box<dyn DatagramSocket>,
        deadline: Instant,
    },
}

struct UdpProbe<'a> {
    scanner: &'a UdpScanner,
    service: &'a mut Service,
}

impl<'a> Probe<'a> for UdpProbe<'a> {
    type State = UdpState;

    fn advance(&mut self, state: UdpState) -> Transition<UdpState> {
        match state {
            UdpState::InitSocket => match self.scanner.binder.open(self.service.socket_addr()) {
                Ok(socket) => self.send(socket),
                Err(e) => {
                    debug!("{}: socket setup failed: {e}", self.service);
                    Transition::Finish(AliveReason::ScanFailed)
                }
            },
            UdpState::Send(socket) => self.send(socket),
            UdpState::PollSocket { socket, deadline } => self.poll_socket(socket, deadline),
        }
    }

    fn service(&mut self) -> &mut Service {
        self.service
    }
}

impl UdpProbe<'_> {
    fn send(&mut self, mut socket: Box<dyn DatagramSocket>) -> Transition<UdpState> {
        if !self.service.pacing().try_claim(self.scanner.delay) {
            return Transition::Next(UdpState::Send(socket));
        }
        let payload = self.scanner.payloads.payload_for(self.service.port());
        match socket.send(payload) {
            Ok(_) => Transition::Next(UdpState::PollSocket {
                socket,
                deadline: Instant::now() + self.scanner.timeout,
            }),
            Err(e) => {
                debug!("{}: send failed: {e}", self.service);
                Transition::Finish(AliveReason::ScanFailed)
            }
        }
    }

    fn poll_socket(&mut self, mut socket: Box<dyn DatagramSocket>, deadline: Instant) -> Transition<UdpState> {
        let mut buf = [0u8; MAX_RESPONSE];
        match socket.recv(&mut buf) {
            Ok(n) => {
                if self.scanner.grab_banner && n > 0 {
                    self.service.banner = Some(buf[..n].to_vec());
                }
                Transition::Finish(AliveReason::ReplyReceived)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::Interrupted => {
                if Instant::now() < deadline {
                    Transition::Next(UdpState::PollSocket { socket, deadline })
                } else {
                    Transition::Finish(AliveReason::TimedOut)
                }
            }
            Err(e) => {
                let reason = super::reason_for_error(&e);
                debug!("{}: receive failed ({reason}): {e}", self.service);
                Transition::Finish(reason)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskQueueRunner;
    use sondr_common::network::host::Protocol;
    use sondr_protocols::payloads::GENERIC_PAYLOAD;
    use std::collections::VecDeque;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Exchange {
        replies: VecDeque<io::Result<Vec<u8>>>,
        sent: Vec<Vec<u8>>,
        fail_send: bool,
    }

    type Shared = Arc<Mutex<Exchange>>;

    struct FakeBinder(Shared);

    impl Binder for FakeBinder {
        fn open(&self, _addr: SocketAddr) -> io::Result<Box<dyn DatagramSocket>> {
            Ok(Box::new(FakeDatagram(Arc::clone(&self.0))))
        }
    }

    struct FakeDatagram(Shared);

    impl DatagramSocket for FakeDatagram {
        fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
            let mut exchange = self.0.lock().unwrap();
            if exchange.fail_send {
                return Err(io::ErrorKind::PermissionDenied.into());
            }
            exchange.sent.push(buf.to_vec());
            Ok(buf.len())
        }

        fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.lock().unwrap().replies.pop_front() {
                Some(Ok(data)) => {
                    buf[..data.len()].copy_from_slice(&data);
                    Ok(data.len())
                }
                Some(Err(e)) => Err(e),
                None => Err(io::ErrorKind::WouldBlock.into()),
            }
        }
    }

    fn scan(exchange: &Shared, port: u16, config: ScanConfig) -> Service {
        let scanner = UdpScanner::with_binder(&config, FakeBinder(Arc::clone(exchange)));
        let mut service = Service::new(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)), port, Protocol::Udp);
        let mut runner = TaskQueueRunner::new(1, 1);
        runner.enqueue(scanner.scan(&mut service));
        runner.run();
        drop(runner);
        service
    }

    #[test]
    fn reply_marks_alive_and_keeps_banner() {
        let exchange = Shared::default();
        exchange
            .lock()
            .unwrap()
            .replies
            .extend([Err(io::ErrorKind::WouldBlock.into()), Ok(b"\x00\x06\x81\x80".to_vec())]);

        let service = scan(&exchange, 53, ScanConfig::default());

        assert!(service.alive);
        assert_eq!(service.reason, AliveReason::ReplyReceived);
        assert_eq!(service.banner.as_deref(), Some(&b"\x00\x06\x81\x80"[..]));
        let sent = &exchange.lock().unwrap().sent;
        assert_eq!(sent.len(), 1);
        assert_eq!(&sent[0][..2], &[0x00, 0x06]);
    }

    #[test]
    fn unknown_port_gets_generic_payload() {
        let exchange = Shared::default();
        let service = scan(&exchange, 40000, ScanConfig::default().with_timeout_ms(5));

        assert_eq!(service.reason, AliveReason::TimedOut);
        assert!(!service.alive);
        assert_eq!(exchange.lock().unwrap().sent, vec![GENERIC_PAYLOAD.to_vec()]);
    }

    #[test]
    fn refused_receive_is_unreachable() {
        let exchange = Shared::default();
        exchange
            .lock()
            .unwrap()
            .replies
            .push_back(Err(io::ErrorKind::ConnectionRefused.into()));

        let service = scan(&exchange, 161, ScanConfig::default());
        assert_eq!(service.reason, AliveReason::IcmpUnreachable);
        assert!(!service.alive);
    }

    #[test]
    fn send_failure_is_scan_failed() {
        let exchange = Shared::default();
        exchange.lock().unwrap().fail_send = true;
        let service = scan(&exchange, 123, ScanConfig::default());
        assert_eq!(service.reason, AliveReason::ScanFailed);
    }

    #[test]
    fn banner_skipped_when_disabled() {
        let exchange = Shared::default();
        exchange.lock().unwrap().replies.push_back(Ok(b"pong".to_vec()));
        let service = scan(&exchange, 7, ScanConfig::default().with_banner(false));
        assert_eq!(service.reason, AliveReason::ReplyReceived);
        assert_eq!(service.banner, None);
    }
}
