//! Raw Ethernet frame I/O on one local interface.

use std::io;
use std::time::Duration;

use pnet::datalink::{self, Channel, Config, DataLinkReceiver, DataLinkSender, NetworkInterface};
use sondr_common::network::interface::Interface;
use thiserror::Error;

/// How long one capture read may block before reporting "no frame".
const READ_TIMEOUT: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("no link-layer device with index {0}")]
    NoDevice(u32),
    #[error("failed to open link-layer channel on {name}")]
    Open {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("{0} is not an Ethernet device")]
    NotEthernet(String),
}

pub trait FrameSender: Send {
    fn send(&mut self, frame: &[u8]) -> io::Result<()>;
}

pub trait FrameCapture: Send {
    /// Next captured frame, or `None` once the read timeout passed idle.
    fn next_frame(&mut self) -> io::Result<Option<Vec<u8>>>;
}

pub type LinkHandles = (Box<dyn FrameSender>, Box<dyn FrameCapture>);

pub trait LinkLayer: Send + Sync {
    fn open(&self, iface: &Interface) -> Result<LinkHandles, LinkError>;
}

/// `pnet::datalink` channels. Needs root or `CAP_NET_RAW`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DatalinkLayer;

impl LinkLayer for DatalinkLayer {
    fn open(&self, iface: &Interface) -> Result<LinkHandles, LinkError> {
        let device = datalink::interfaces()
            .into_iter()
            .find(|device| device.index == iface.index)
            .ok_or(LinkError::NoDevice(iface.index))?;
        open_ethernet(&device, datalink::channel)
    }
}

fn open_ethernet<F>(device: &NetworkInterface, channel_opener: F) -> Result<LinkHandles, LinkError>
where
    F: FnOnce(&NetworkInterface, Config) -> io::Result<Channel>,
{
    let config = Config {
        read_timeout: Some(READ_TIMEOUT),
        ..Default::default()
    };
    let channel = channel_opener(device, config).map_err(|source| LinkError::Open {
        name: device.name.clone(),
        source,
    })?;
    match channel {
        Channel::Ethernet(tx, rx) => Ok((Box::new(PnetSender(tx)), Box::new(PnetCapture(rx)))),
        _ => Err(LinkError::NotEthernet(device.name.clone())),
    }
}

struct PnetSender(Box<dyn DataLinkSender>);

impl FrameSender for PnetSender {
    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        self.0
            .send_to(frame, None)
            .unwrap_or_else(|| Err(io::Error::other("frame was not sent")))
    }
}

struct PnetCapture(Box<dyn DataLinkReceiver>);

impl FrameCapture for PnetCapture {
    fn next_frame(&mut self) -> io::Result<Option<Vec<u8>>> {
        match self.0.next() {
            Ok(frame) => Ok(Some(frame.to_vec())),
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                Ok(None)
            }
            Err(e) => Err(e),
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
    use pnet::datalink::dummy;

    #[test]
    fn open_ethernet_should_succeed_on_ethernet_channel() {
        let dummy_intf: NetworkInterface = dummy::dummy_interface(0);
        let opener = |i: &NetworkInterface, _cfg: Config| -> io::Result<Channel> {
            dummy::channel(i, dummy::Config::default())
        };
        assert!(open_ethernet(&dummy_intf, opener).is_ok());
    }

    #[test]
    fn open_ethernet_should_fail_on_io_error() {
        let dummy_intf: NetworkInterface = dummy::dummy_interface(0);
        let opener = |_: &NetworkInterface, _: Config| -> io::Result<Channel> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "Mock I/O Error"))
        };
        let Err(err) = open_ethernet(&dummy_intf, opener) else {
            panic!("expected an error");
        };
        assert!(err.to_string().contains("eth0"));
        match err {
            LinkError::Open { source, .. } => {
                assert_eq!(source.kind(), io::ErrorKind::PermissionDenied);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
