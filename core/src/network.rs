//! Transport capabilities the scanners are written against.
//!
//! Each protocol state machine only sees the traits defined here, so tests
//! can drive it with scripted fakes while production code uses the
//! `socket2` and `pnet` backed implementations.

pub mod datagram;
pub mod link;
pub mod raw;
pub mod stream;

use std::io;

/// Whether a failed non-blocking call only means "not ready yet".
pub(crate) fn is_would_block(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::WouldBlock {
        return true;
    }
    #[cfg(unix)]
    if err.raw_os_error() == Some(libc::EINPROGRESS) {
        return true;
    }
    false
}
