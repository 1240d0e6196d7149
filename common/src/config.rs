use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1_000);
pub const DEFAULT_ARP_LISTEN: Duration = Duration::from_millis(2_000);

/// Settings applied uniformly to every scanner of a batch.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Per-operation deadline (connect, banner read, reply wait).
    pub timeout: Duration,
    /// Minimum spacing between two packets sent to the same host.
    pub delay: Duration,
    /// Read (and if needed provoke) an application banner after a TCP connect.
    pub grab_banner: bool,
    /// UDP payload database. The built-in table is used when unset.
    pub payload_db: Option<PathBuf>,
    /// How long the ARP listener keeps capturing replies.
    pub arp_listen: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            delay: Duration::ZERO,
            grab_banner: true,
            payload_db: None,
            arp_listen: DEFAULT_ARP_LISTEN,
        }
    }
}

impl ScanConfig {
    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout = Duration::from_millis(ms);
        self
    }

    pub fn with_delay_ms(mut self, ms: u64) -> Self {
        self.delay = Duration::from_millis(ms);
        self
    }

    pub fn with_banner(mut self, grab_banner: bool) -> Self {
        self.grab_banner = grab_banner;
        self
    }
}
