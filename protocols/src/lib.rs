//! Byte-level encoders and decoders for everything the scanners put on, or
//! read off, the wire.

pub mod arp;
pub mod ethernet;
pub mod icmp;
pub mod payloads;
