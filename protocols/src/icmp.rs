//! ICMP / ICMPv6 echo messages.
//!
//! Encoding and decoding work on explicit byte offsets. Raw IPv4 sockets hand
//! back the IP header in front of the ICMP message; raw IPv6 sockets do not.

use std::net::IpAddr;

pub const ICMP_HDR_LEN: usize = 8;
pub const ECHO_PAYLOAD_LEN: usize = 32;
pub const ECHO_LEN: usize = ICMP_HDR_LEN + ECHO_PAYLOAD_LEN;

const IPV4_MIN_HDR_LEN: usize = 20;
const IPV6_HDR_LEN: usize = 40;
const IPV4_PROTOCOL_OFFSET: usize = 9;
const IPV6_NEXT_HEADER_OFFSET: usize = 6;

const TYPE_OFFSET: usize = 0;
const CODE_OFFSET: usize = 1;
const CHECKSUM_OFFSET: usize = 2;
const IDENTIFIER_OFFSET: usize = 4;
const SEQUENCE_OFFSET: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcmpVersion {
    V4,
    V6,
}

impl IcmpVersion {
    pub fn for_addr(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Self::V4,
            IpAddr::V6(_) => Self::V6,
        }
    }

    pub const fn echo_request(self) -> u8 {
        match self {
            Self::V4 => 8,
            Self::V6 => 128,
        }
    }

    pub const fn echo_reply(self) -> u8 {
        match self {
            Self::V4 => 0,
            Self::V6 => 129,
        }
    }

    /// IP protocol number the quoted datagram of an error message carries.
    const fn ip_protocol(self) -> u8 {
        match self {
            Self::V4 => 1,
            Self::V6 => 58,
        }
    }

    fn is_error(self, icmp_type: u8) -> bool {
        match self {
            // unreachable, source quench, redirect, time exceeded, parameter problem
            Self::V4 => matches!(icmp_type, 3 | 4 | 5 | 11 | 12),
            Self::V6 => (1..=4).contains(&icmp_type),
        }
    }
}

/// Internet checksum: one's complement of the one's complement sum of all
/// big-endian 16-bit words, an odd trailing byte padded with zero.
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = data
        .chunks(2)
        .map(|word| match *word {
            [hi, lo] => u32::from(u16::from_be_bytes([hi, lo])),
            [hi] => u32::from(u16::from_be_bytes([hi, 0])),
            _ => 0,
        })
        .sum();
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoRequest {
    pub version: IcmpVersion,
    pub identifier: u16,
    pub sequence: u16,
    pub payload: [u8; ECHO_PAYLOAD_LEN],
}

impl EchoRequest {
    /// Echo request with a random payload.
    pub fn new(version: IcmpVersion, identifier: u16, sequence: u16) -> Self {
        Self {
            version,
            identifier,
            sequence,
            payload: rand::random(),
        }
    }

    pub fn encode(&self) -> [u8; ECHO_LEN] {
        let mut buffer = [0u8; ECHO_LEN];
        buffer[TYPE_OFFSET] = self.version.echo_request();
        buffer[CODE_OFFSET] = 0;
        buffer[IDENTIFIER_OFFSET..SEQUENCE_OFFSET].copy_from_slice(&self.identifier.to_be_bytes());
        buffer[SEQUENCE_OFFSET..ICMP_HDR_LEN].copy_from_slice(&self.sequence.to_be_bytes());
        buffer[ICMP_HDR_LEN..].copy_from_slice(&self.payload);
        let sum = checksum(&buffer);
        buffer[CHECKSUM_OFFSET..IDENTIFIER_OFFSET].copy_from_slice(&sum.to_be_bytes());
        buffer
    }
}

/// What a datagram read from a raw ICMP socket turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcmpReply {
    Echo { identifier: u16, sequence: u16 },
    /// An error message quoting one of our echo requests.
    Error { identifier: u16, icmp_type: u8, code: u8 },
    /// An echo request, typically our own looped back.
    Request,
}

impl IcmpReply {
    pub fn identifier(&self) -> Option<u16> {
        match *self {
            Self::Echo { identifier, .. } | Self::Error { identifier, .. } => Some(identifier),
            Self::Request => None,
        }
    }
}

/// Decodes a datagram read from a raw ICMP socket of `version`.
///
/// Returns `None` for truncated data and for message types that say nothing
/// about an echo request.
pub fn parse_reply(version: IcmpVersion, datagram: &[u8]) -> Option<IcmpReply> {
    let message = match version {
        IcmpVersion::V4 => skip_ipv4_header(datagram, Some(IcmpVersion::V4.ip_protocol()))?,
        IcmpVersion::V6 => datagram,
    };
    if message.len() < ICMP_HDR_LEN {
        return None;
    }
    let icmp_type = message[TYPE_OFFSET];
    let code = message[CODE_OFFSET];

    if icmp_type == version.echo_reply() {
        return Some(IcmpReply::Echo {
            identifier: read_u16(message, IDENTIFIER_OFFSET)?,
            sequence: read_u16(message, SEQUENCE_OFFSET)?,
        });
    }
    if icmp_type == version.echo_request() {
        return Some(IcmpReply::Request);
    }
    if !version.is_error(icmp_type) {
        return None;
    }

    let quoted = &message[ICMP_HDR_LEN..];
    let inner = match version {
        IcmpVersion::V4 => skip_ipv4_header(quoted, Some(version.ip_protocol()))?,
        IcmpVersion::V6 => {
            if quoted.len() < IPV6_HDR_LEN || quoted[IPV6_NEXT_HEADER_OFFSET] != version.ip_protocol() {
                return None;
            }
            &quoted[IPV6_HDR_LEN..]
        }
    };
    if inner.first() != Some(&version.echo_request()) {
        return None;
    }
    Some(IcmpReply::Error {
        identifier: read_u16(inner, IDENTIFIER_OFFSET)?,
        icmp_type,
        code,
    })
}

/// Strips an IPv4 header sized by its IHL field, optionally requiring the
/// carried protocol to be `protocol`.
fn skip_ipv4_header(datagram: &[u8], protocol: Option<u8>) -> Option<&[u8]> {
    let first = *datagram.first()?;
    if first >> 4 != 4 {
        return None;
    }
    let header_len = usize::from(first & 0x0f) * 4;
    if header_len < IPV4_MIN_HDR_LEN || datagram.len() < header_len {
        return None;
    }
    if protocol.is_some_and(|p| datagram[IPV4_PROTOCOL_OFFSET] != p) {
        return None;
    }
    Some(&datagram[header_len..])
}

fn read_u16(buffer: &[u8], offset: usize) -> Option<u16> {
    let bytes = buffer.get(offset..offset + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
