use std::path::PathBuf;

use clap::Parser;
use sondr_common::config::ScanConfig;
use sondr_common::network::host::{Host, Protocol};
use sondr_common::network::target::Target;

/// Probed when neither ports nor host-level probes are requested.
pub const DEFAULT_PORTS: &[u16] = &[
    21, 22, 23, 25, 53, 80, 110, 135, 139, 143, 443, 445, 993, 995, 1723, 3306, 3389, 5900,
    8080, 8443,
];

#[derive(Parser, Debug)]
#[command(name = "sondr")]
#[command(version, about = "Active host and service prober.")]
pub struct CommandLine {
    /// Address, range (10.0.0.1-40), CIDR block, `lan`, or a comma separated mix
    pub target: Target,

    /// Ports to probe, e.g. `22,80,8000-8100`
    #[arg(short, long, value_parser = parse_ports)]
    pub ports: Option<PortList>,

    /// Probe ports over UDP instead of TCP
    #[arg(short, long)]
    pub udp: bool,

    /// Send an ICMP echo request to every host
    #[arg(long)]
    pub ping: bool,

    /// Resolve every host over ARP (local subnets only)
    #[arg(long)]
    pub arp: bool,

    /// Per-probe timeout in milliseconds
    #[arg(short, long, default_value_t = 1000)]
    pub timeout: u64,

    /// Minimum delay between packets to the same host, in milliseconds
    #[arg(short, long, default_value_t = 0)]
    pub delay: u64,

    /// Do not read or provoke service banners
    #[arg(long)]
    pub no_banner: bool,

    /// UDP payload database (optionally gzip compressed)
    #[arg(long, value_name = "PATH")]
    pub payloads: Option<PathBuf>,

    /// Show debug output
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortList(pub Vec<u16>);

impl CommandLine {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            payload_db: self.payloads.clone(),
            ..ScanConfig::default()
                .with_timeout_ms(self.timeout)
                .with_delay_ms(self.delay)
                .with_banner(!self.no_banner)
        }
    }

    /// Ping and ARP need raw sockets.
    pub fn needs_privileges(&self) -> bool {
        self.ping || self.arp
    }

    pub fn port_list(&self) -> &[u16] {
        match &self.ports {
            Some(PortList(ports)) => ports,
            None if self.ping || self.arp => &[],
            None => DEFAULT_PORTS,
        }
    }

    /// Attaches the requested services to `host`.
    pub fn add_services(&self, host: &mut Host) {
        if self.arp {
            host.add_service(0, Protocol::Arp);
        }
        if self.ping {
            host.add_service(0, Protocol::ping_for(host.addr()));
        }
        let protocol = if self.udp { Protocol::Udp } else { Protocol::Tcp };
        for &port in self.port_list() {
            host.add_service(port, protocol);
        }
    }
}

/// Parses `22,80,8000-8100` into distinct ports in order of appearance.
pub fn parse_ports(s: &str) -> Result<PortList, String> {
    let mut ports = Vec::new();
    for part in s.split(',').map(str::trim).filter(|part| !part.is_empty()) {
        let (start, end) = match part.split_once('-') {
            Some((start, end)) => (parse_port(start)?, parse_port(end)?),
            None => {
                let port = parse_port(part)?;
                (port, port)
            }
        };
        if start > end {
            return Err(format!("descending port range '{part}'"));
        }
        for port in start..=end {
            if !ports.contains(&port) {
                ports.push(port);
            }
        }
    }
    if ports.is_empty() {
        return Err("no ports given".to_string());
    }
    Ok(PortList(ports))
}

fn parse_port(s: &str) -> Result<u16, String> {
    match s.trim().parse::<u16>() {
        Ok(0) | Err(_) => Err(format!("invalid port '{s}'")),
        Ok(port) => Ok(port),
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
