use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};

use pnet::ipnetwork::Ipv4Network;

/// Continuous range of IPv4 addresses, inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Range {
    pub start_addr: Ipv4Addr,
    pub end_addr: Ipv4Addr,
}

impl Ipv4Range {
    pub fn new(start_addr: Ipv4Addr, end_addr: Ipv4Addr) -> Self {
        Self {
            start_addr,
            end_addr,
        }
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = Ipv4Addr> + Clone {
        let start: u32 = u32::from(self.start_addr);
        let end: u32 = u32::from(self.end_addr);
        (start..=end).map(Ipv4Addr::from)
    }

    pub fn to_iter(&self) -> impl Iterator<Item = IpAddr> {
        self.iter().map(IpAddr::V4)
    }

    pub fn len(&self) -> usize {
        let start: u32 = u32::from(self.start_addr);
        let end: u32 = u32::from(self.end_addr);
        if end < start { 0 } else { (end - start) as usize + 1 }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Creates a range covering the whole network block of `ip/prefix`.
pub fn cidr_range(ip: Ipv4Addr, prefix: u8) -> anyhow::Result<Ipv4Range> {
    let network = Ipv4Network::new(ip, prefix)?;
    Ok(Ipv4Range::new(network.network(), network.broadcast()))
}

/// Target addresses collected from user input, kept in insertion order.
#[derive(Debug, Clone, Default)]
pub struct IpCollection {
    pub singles: Vec<IpAddr>,
    pub ranges: Vec<Ipv4Range>,
}

impl IpCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_single(&mut self, ip: IpAddr) {
        self.singles.push(ip);
    }

    pub fn add_range(&mut self, range: Ipv4Range) {
        self.ranges.push(range);
    }

    /// Upper bound on the number of addresses; duplicates are counted.
    pub fn len(&self) -> usize {
        self.singles.len() + self.ranges.iter().map(Ipv4Range::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every distinct address, singles first, then ranges in order.
    pub fn addresses(&self) -> Vec<IpAddr> {
        let mut seen: HashSet<IpAddr> = HashSet::new();
        self.singles
            .iter()
            .copied()
            .chain(self.ranges.iter().flat_map(Ipv4Range::to_iter))
            .filter(|ip| seen.insert(*ip))
            .collect()
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

    #[test]
    fn range_iter_and_len() {
        let range = Ipv4Range::new(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 3));
        let ips: Vec<Ipv4Addr> = range.iter().collect();
        assert_eq!(ips, vec![
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 2),
            Ipv4Addr::new(10, 0, 0, 3),
        ]);
        assert_eq!(range.len(), 3);
    }

    #[test]
    fn reversed_range_is_empty() {
        let range = Ipv4Range::new(Ipv4Addr::new(10, 0, 0, 5), Ipv4Addr::new(10, 0, 0, 1));
        assert!(range.is_empty());
        assert_eq!(range.iter().count(), 0);
    }

    #[test]
    fn cidr_range_covers_block() {
        let range = cidr_range(Ipv4Addr::new(192, 168, 1, 100), 24).unwrap();
        assert_eq!(range.start_addr, Ipv4Addr::new(192, 168, 1, 0));
        assert_eq!(range.end_addr, Ipv4Addr::new(192, 168, 1, 255));

        let host = cidr_range(Ipv4Addr::new(172, 16, 0, 1), 32).unwrap();
        assert_eq!(host.len(), 1);

        let everything = cidr_range(Ipv4Addr::new(10, 1, 2, 3), 0).unwrap();
        assert_eq!(everything.start_addr, Ipv4Addr::UNSPECIFIED);
        assert_eq!(everything.end_addr, Ipv4Addr::BROADCAST);
    }

    #[test]
    fn cidr_range_invalid_prefix() {
        assert!(cidr_range(Ipv4Addr::new(192, 168, 1, 1), 33).is_err());
    }

    #[test]
    fn collection_deduplicates_in_order() {
        let mut collection = IpCollection::new();
        collection.add_single(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)));
        collection.add_range(Ipv4Range::new(
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 3),
        ));
        assert_eq!(collection.len(), 4);
        assert_eq!(collection.addresses(), vec![
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 3)),
        ]);
    }
}
