use colored::*;
use sondr_common::network::host::{AliveReason, Host, Service};
use tracing::info;

use super::logging::PRINT_TARGET;

pub const TOTAL_WIDTH: usize = 64;
const BANNER_WIDTH: usize = 40;

pub fn print(msg: &str) {
    info!(target: PRINT_TARGET, raw_msg = msg);
}

pub fn header(msg: &str) {
    let formatted: String = format!("⟦ {} ⟧", msg);
    let msg_len: usize = formatted.chars().count();

    let dash_count: usize = TOTAL_WIDTH.saturating_sub(msg_len);
    let left: usize = dash_count / 2;
    let right: usize = dash_count - left;

    let line: String = format!(
        "{}{}{}",
        "─".repeat(left).bright_black(),
        formatted.to_uppercase().bright_green(),
        "─".repeat(right).bright_black()
    );
    print(&line);
}

pub fn fat_separator() {
    print(&"═".repeat(TOTAL_WIDTH).bright_black().to_string());
}

pub fn results(hosts: &[Host]) {
    let alive = hosts.iter().filter(|host| host.alive).count();
    header(&format!("{alive} of {} hosts alive", hosts.len()));
    for host in hosts {
        host_line(host);
        for service in &host.services {
            service_line(service);
        }
    }
    fat_separator();
}

fn host_line(host: &Host) {
    let addr = if host.alive {
        host.addr().to_string().green().bold()
    } else {
        host.addr().to_string().bright_black()
    };
    let mut line = format!("{} {} {}", ">".bright_black(), addr, reason(host.reason));
    if let Some(mac) = host.mac {
        line.push_str(&format!(" {}", mac.to_string().cyan()));
    }
    print(&line);
}

fn service_line(service: &Service) {
    let label = match service.port() {
        0 => service.protocol().to_string(),
        port => format!("{port}/{}", service.protocol()),
    };
    let mut line = format!(" {} {:<12} {}", "└─".bright_black(), label, reason(service.reason));
    if let Some(banner) = service.banner.as_deref() {
        line.push_str(&format!(" {}", banner_preview(banner).italic()));
    }
    print(&line);
}

fn reason(reason: AliveReason) -> ColoredString {
    let text = reason.to_string();
    match reason {
        AliveReason::ReplyReceived => text.green(),
        AliveReason::IcmpUnreachable => text.red(),
        AliveReason::TimedOut => text.yellow(),
        AliveReason::ScanFailed => text.magenta(),
        _ => text.dimmed(),
    }
}

/// First line of a banner with control bytes escaped, cut to fit one row.
pub fn banner_preview(banner: &[u8]) -> String {
    let text = String::from_utf8_lossy(banner);
    let first_line = text.trim().lines().next().unwrap_or_default();
    let escaped: String = first_line.chars().flat_map(char::escape_default).collect();
    if escaped.chars().count() > BANNER_WIDTH {
        let cut: String = escaped.chars().take(BANNER_WIDTH).collect();
        format!("{cut}…")
    } else {
        escaped
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
