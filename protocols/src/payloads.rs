//! # UDP Probe Payloads
//!
//! Maps destination ports to the datagram most likely to draw an answer from
//! the service usually found there. Port 0 holds the generic payload used for
//! every port without a dedicated entry.
//!
//! The on-disk database is little-endian and may be gzip compressed:
//!
//! ```text
//! u16 tag (0x5544) | u16 version (1) | u32 entry count
//! per entry: u16 payload length | payload | u16 port count | port count * u16 port
//! ```

use std::collections::HashMap;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use thiserror::Error;
use tracing::debug;

pub const DB_TAG: u16 = 0x5544;
pub const DB_VERSION: u16 = 1;
pub const GENERIC_PORT: u16 = 0;
pub const GENERIC_PAYLOAD: &[u8] = b"\r\n\r\n";

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("failed to read payload database {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to decompress payload database")]
    Gzip(#[source] io::Error),
    #[error("not a payload database (tag {0:#06x})")]
    BadTag(u16),
    #[error("unsupported payload database version {0}")]
    BadVersion(u16),
    #[error("payload database truncated at byte {0}")]
    Truncated(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadTable {
    payloads: HashMap<u16, Vec<u8>>,
}

impl PayloadTable {
    /// Table holding only the generic payload.
    pub fn generic() -> Self {
        Self {
            payloads: HashMap::from([(GENERIC_PORT, GENERIC_PAYLOAD.to_vec())]),
        }
    }

    /// Payloads for a handful of chatty UDP services.
    pub fn builtin() -> Self {
        let mut table = Self::generic();
        table.insert(53, dns_version_query());
        table.insert(123, ntp_client_request());
        table.insert(137, netbios_status_query());
        table.insert(161, snmp_sysdescr_get());
        table.insert(1900, ssdp_search());
        table
    }

    pub fn load(path: &Path) -> Result<Self, PayloadError> {
        let raw = fs::read(path).map_err(|source| PayloadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let table = Self::parse(&raw)?;
        debug!("Loaded {} UDP payload port(s) from {}", table.len(), path.display());
        Ok(table)
    }

    /// Decodes a database image, decompressing it first when it starts with
    /// the gzip magic.
    pub fn parse(raw: &[u8]) -> Result<Self, PayloadError> {
        if raw.starts_with(&GZIP_MAGIC) {
            let mut inflated = Vec::new();
            GzDecoder::new(raw)
                .read_to_end(&mut inflated)
                .map_err(PayloadError::Gzip)?;
            return Self::decode(&inflated);
        }
        Self::decode(raw)
    }

    fn decode(data: &[u8]) -> Result<Self, PayloadError> {
        let mut reader = Reader::new(data);
        let tag = reader.u16()?;
        if tag != DB_TAG {
            return Err(PayloadError::BadTag(tag));
        }
        let version = reader.u16()?;
        if version != DB_VERSION {
            return Err(PayloadError::BadVersion(version));
        }

        let mut table = Self::generic();
        let count = reader.u32()?;
        for _ in 0..count {
            let len = usize::from(reader.u16()?);
            let payload = reader.bytes(len)?.to_vec();
            let port_count = reader.u16()?;
            for _ in 0..port_count {
                table.insert(reader.u16()?, payload.clone());
            }
        }
        Ok(table)
    }

    /// Later entries replace earlier ones for the same port.
    pub fn insert(&mut self, port: u16, payload: Vec<u8>) {
        self.payloads.insert(port, payload);
    }

    /// Payload registered for exactly `port`.
    pub fn get(&self, port: u16) -> Option<&[u8]> {
        self.payloads.get(&port).map(Vec::as_slice)
    }

    /// Payload for `port`, or the generic one.
    pub fn payload_for(&self, port: u16) -> &[u8] {
        self.get(port)
            .or_else(|| self.get(GENERIC_PORT))
            .unwrap_or(GENERIC_PAYLOAD)
    }

    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }
}

impl Default for PayloadTable {
    fn default() -> Self {
        Self::builtin()
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8], PayloadError> {
        let end = self.pos.checked_add(len).ok_or(PayloadError::Truncated(self.pos))?;
        let slice = self.data.get(self.pos..end).ok_or(PayloadError::Truncated(self.pos))?;
        self.pos = end;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16, PayloadError> {
        let b = self.bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, PayloadError> {
        let b = self.bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

/// `version.bind` CHAOS TXT query.
fn dns_version_query() -> Vec<u8> {
    let mut query = vec![0x00, 0x06, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
    query.push(7);
    query.extend_from_slice(b"version");
    query.push(4);
    query.extend_from_slice(b"bind");
    query.extend_from_slice(&[0x00, 0x00, 0x10, 0x00, 0x03]);
    query
}

/// NTPv4 client mode request.
fn ntp_client_request() -> Vec<u8> {
    let mut request = vec![0u8; 48];
    request[..12].copy_from_slice(&[0xe3, 0x00, 0x04, 0xfa, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00]);
    request
}

/// NBSTAT query for the wildcard name `*`.
fn netbios_status_query() -> Vec<u8> {
    let mut query = vec![0x80, 0xf0, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
    query.push(0x20);
    query.extend_from_slice(b"CK");
    query.extend_from_slice(&[b'A'; 30]);
    query.extend_from_slice(&[0x00, 0x00, 0x21, 0x00, 0x01]);
    query
}

/// SNMPv1 GetRequest for sysDescr.0 with community `public`.
fn snmp_sysdescr_get() -> Vec<u8> {
    vec![
        0x30, 0x26, 0x02, 0x01, 0x00, 0x04, 0x06, 0x70, 0x75, 0x62, 0x6c, 0x69, 0x63, 0xa0, 0x19,
        0x02, 0x01, 0x01, 0x02, 0x01, 0x00, 0x02, 0x01, 0x00, 0x30, 0x0e, 0x30, 0x0c, 0x06, 0x08,
        0x2b, 0x06, 0x01, 0x02, 0x01, 0x01, 0x01, 0x00, 0x05, 0x00,
    ]
}

fn ssdp_search() -> Vec<u8> {
    b"M-SEARCH * HTTP/1.1\r\n\
      HOST: 239.255.255.250:1900\r\n\
      MAN: \"ssdp:discover\"\r\n\
      MX: 1\r\n\
      ST: ssdp:all\r\n\r\n"
        .to_vec()
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
