use std::net::Ipv4Addr;

use anyhow::Context;
use pnet::packet::Packet;
use pnet::packet::arp::{ArpHardwareTypes, ArpOperation, ArpOperations, ArpPacket, MutableArpPacket};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::util::MacAddr;

use crate::ethernet::{self, ETH_HDR_LEN, MIN_ETH_FRAME_NO_FCS};

pub const ARP_LEN: usize = 28;

/// Sender half of a captured ARP reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpReply {
    pub sender_mac: MacAddr,
    pub sender_ip: Ipv4Addr,
}

/// Broadcast "who has `dst_addr`" frame, padded to the minimum frame size.
pub fn create_request(
    src_mac: MacAddr,
    src_addr: Ipv4Addr,
    dst_addr: Ipv4Addr,
) -> anyhow::Result<[u8; MIN_ETH_FRAME_NO_FCS]> {
    create_frame(
        ArpOperations::Request,
        (src_mac, src_addr),
        (MacAddr::zero(), dst_addr),
        MacAddr::broadcast(),
    )
}

/// Unicast "`src_addr` is at `src_mac`" frame addressed to the asker.
pub fn create_reply(
    src_mac: MacAddr,
    src_addr: Ipv4Addr,
    dst_mac: MacAddr,
    dst_addr: Ipv4Addr,
) -> anyhow::Result<[u8; MIN_ETH_FRAME_NO_FCS]> {
    create_frame(ArpOperations::Reply, (src_mac, src_addr), (dst_mac, dst_addr), dst_mac)
}

fn create_frame(
    operation: ArpOperation,
    (sender_mac, sender_addr): (MacAddr, Ipv4Addr),
    (target_mac, target_addr): (MacAddr, Ipv4Addr),
    eth_dst: MacAddr,
) -> anyhow::Result<[u8; MIN_ETH_FRAME_NO_FCS]> {
    let mut buffer = [0u8; MIN_ETH_FRAME_NO_FCS];
    ethernet::make_header(&mut buffer, sender_mac, eth_dst, EtherTypes::Arp)?;
    let mut arp_packet = MutableArpPacket::new(&mut buffer[ETH_HDR_LEN..ETH_HDR_LEN + ARP_LEN])
        .context("failed to create mutable ARP packet")?;
    arp_packet.set_hardware_type(ArpHardwareTypes::Ethernet);
    arp_packet.set_protocol_type(EtherTypes::Ipv4);
    arp_packet.set_hw_addr_len(6);
    arp_packet.set_proto_addr_len(4);
    arp_packet.set_operation(operation);
    arp_packet.set_sender_hw_addr(sender_mac);
    arp_packet.set_sender_proto_addr(sender_addr);
    arp_packet.set_target_hw_addr(target_mac);
    arp_packet.set_target_proto_addr(target_addr);
    Ok(buffer)
}

/// Decodes an ARP request carried in `frame` into the asker's MAC and the
/// probed address.
pub fn parse_request(frame: &[u8]) -> Option<(MacAddr, Ipv4Addr)> {
    let decoded = decode(frame)?;
    (decoded.operation == ArpOperations::Request)
        .then_some((decoded.sender.sender_mac, decoded.target_ip))
}

/// Decodes an ARP reply carried in `frame`. Anything else yields `None`.
pub fn parse_reply(frame: &[u8]) -> Option<ArpReply> {
    let decoded = decode(frame)?;
    (decoded.operation == ArpOperations::Reply).then_some(decoded.sender)
}

struct Decoded {
    operation: ArpOperation,
    sender: ArpReply,
    target_ip: Ipv4Addr,
}

fn decode(frame: &[u8]) -> Option<Decoded> {
    let eth = EthernetPacket::new(frame)?;
    if eth.get_ethertype() != EtherTypes::Arp {
        return None;
    }
    let arp = ArpPacket::new(eth.payload())?;
    if arp.get_protocol_type() != EtherTypes::Ipv4 || arp.get_proto_addr_len() != 4 {
        return None;
    }
    Some(Decoded {
        operation: arp.get_operation(),
        sender: ArpReply {
            sender_mac: arp.get_sender_hw_addr(),
            sender_ip: arp.get_sender_proto_addr(),
        },
        target_ip: arp.get_target_proto_addr(),
    })
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
    use pnet::packet::ethernet::MutableEthernetPacket;

    fn local_mac() -> MacAddr {
        MacAddr::new(0x01, 0x02, 0x03, 0x04, 0x05, 0x06)
    }

    #[test]
    fn create_arp_request_packet() {
        let src_addr = Ipv4Addr::new(192, 168, 1, 10);
        let dst_addr = Ipv4Addr::new(192, 168, 1, 1);

        let buffer = create_request(local_mac(), src_addr, dst_addr).unwrap();
        assert_eq!(buffer.len(), MIN_ETH_FRAME_NO_FCS);

        let eth_packet = EthernetPacket::new(&buffer).expect("Failed to parse Ethernet packet");
        assert_eq!(eth_packet.get_destination(), MacAddr::broadcast());
        assert_eq!(eth_packet.get_source(), local_mac());
        assert_eq!(eth_packet.get_ethertype(), EtherTypes::Arp);

        let arp_packet = ArpPacket::new(eth_packet.payload()).expect("Failed to parse ARP packet");
        assert_eq!(arp_packet.get_operation(), ArpOperations::Request);
        assert_eq!(arp_packet.get_hardware_type(), ArpHardwareTypes::Ethernet);
        assert_eq!(arp_packet.get_protocol_type(), EtherTypes::Ipv4);
        assert_eq!(arp_packet.get_hw_addr_len(), 6);
        assert_eq!(arp_packet.get_proto_addr_len(), 4);
        assert_eq!(arp_packet.get_sender_hw_addr(), local_mac());
        assert_eq!(arp_packet.get_sender_proto_addr(), src_addr);
        assert_eq!(arp_packet.get_target_hw_addr(), MacAddr::zero());
        assert_eq!(arp_packet.get_target_proto_addr(), dst_addr);

        assert!(buffer[ETH_HDR_LEN + ARP_LEN..].iter().all(|&b| b == 0));
    }

    #[test]
    fn request_wire_layout_is_big_endian() {
        let buffer = create_request(
            local_mac(),
            Ipv4Addr::new(10, 0, 0, 2),
            Ipv4Addr::new(10, 0, 0, 1),
        )
        .unwrap();
        let arp = &buffer[ETH_HDR_LEN..ETH_HDR_LEN + ARP_LEN];
        assert_eq!(&arp[0..2], &[0x00, 0x01]);
        assert_eq!(&arp[2..4], &[0x08, 0x00]);
        assert_eq!(arp[4], 6);
        assert_eq!(arp[5], 4);
        assert_eq!(&arp[6..8], &[0x00, 0x01]);
        assert_eq!(&arp[14..18], &[10, 0, 0, 2]);
        assert_eq!(&arp[24..28], &[10, 0, 0, 1]);
    }

    #[test]
    fn parse_reply_extracts_sender() {
        let peer_mac = MacAddr::new(0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff);
        let frame = create_reply(
            peer_mac,
            Ipv4Addr::new(192, 168, 1, 1),
            local_mac(),
            Ipv4Addr::new(192, 168, 1, 10),
        )
        .unwrap();

        let reply = parse_reply(&frame).expect("reply should decode");
        assert_eq!(reply.sender_mac, peer_mac);
        assert_eq!(reply.sender_ip, Ipv4Addr::new(192, 168, 1, 1));
        assert!(parse_request(&frame).is_none());
    }

    #[test]
    fn parse_reply_ignores_requests() {
        let frame = create_request(
            local_mac(),
            Ipv4Addr::new(192, 168, 1, 10),
            Ipv4Addr::new(192, 168, 1, 1),
        )
        .unwrap();
        assert!(parse_reply(&frame).is_none());
        assert_eq!(
            parse_request(&frame),
            Some((local_mac(), Ipv4Addr::new(192, 168, 1, 1)))
        );
    }

    #[test]
    fn parse_reply_rejects_truncated_and_foreign_frames() {
        let frame = create_reply(
            local_mac(),
            Ipv4Addr::new(192, 168, 1, 1),
            local_mac(),
            Ipv4Addr::new(192, 168, 1, 10),
        )
        .unwrap();
        assert!(parse_reply(&frame[..ETH_HDR_LEN + 10]).is_none());

        let mut ipv4 = frame;
        MutableEthernetPacket::new(&mut ipv4)
            .unwrap()
            .set_ethertype(EtherTypes::Ipv4);
        assert!(parse_reply(&ipv4).is_none());
    }
}
