//! Frame builders for steering tests.
//!
//! Frames are complete enough for the steering path: a valid Ethernet II
//! header, a checksummed IPv4 header and a zeroed transport header.

use smoltcp::wire::{EthernetAddress, EthernetFrame, EthernetProtocol, IpProtocol, Ipv4Packet};
use std::net::Ipv4Addr;

pub const SRC_MAC: EthernetAddress = EthernetAddress([0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc]);
pub const DST_MAC: EthernetAddress = EthernetAddress([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);

pub const TCP_HEADER_LEN: usize = 20;
pub const UDP_HEADER_LEN: usize = 8;

/// Build an IPv4 packet carrying `payload_len` zero bytes of `protocol`.
pub fn ipv4_packet(src: Ipv4Addr, dst: Ipv4Addr, protocol: u8, payload_len: usize) -> Vec<u8> {
    let total = 20 + payload_len;
    let mut buf = vec![0u8; total];
    let mut ip = Ipv4Packet::new_unchecked(&mut buf[..]);
    ip.set_version(4);
    ip.set_header_len(20);
    ip.set_total_len(total as u16);
    ip.set_hop_limit(64);
    ip.set_next_header(IpProtocol::from(protocol));
    ip.set_src_addr(src);
    ip.set_dst_addr(dst);
    ip.fill_checksum();
    buf
}

/// Wrap `payload` in an Ethernet II header.
pub fn ethernet_frame(ethertype: EthernetProtocol, payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; 14 + payload.len()];
    let mut eth = EthernetFrame::new_unchecked(&mut buf[..]);
    eth.set_dst_addr(DST_MAC);
    eth.set_src_addr(SRC_MAC);
    eth.set_ethertype(ethertype);
    eth.payload_mut().copy_from_slice(payload);
    buf
}

/// Ethernet + IPv4 + TCP frame from `src` to `dst`.
pub fn tcp_frame(src: Ipv4Addr, dst: Ipv4Addr) -> Vec<u8> {
    ethernet_frame(
        EthernetProtocol::Ipv4,
        &ipv4_packet(src, dst, 6, TCP_HEADER_LEN),
    )
}

/// Ethernet + IPv4 + UDP frame from `src` to `dst`.
pub fn udp_frame(src: Ipv4Addr, dst: Ipv4Addr) -> Vec<u8> {
    ethernet_frame(
        EthernetProtocol::Ipv4,
        &ipv4_packet(src, dst, 17, UDP_HEADER_LEN),
    )
}

/// Ethernet + IPv4 frame with an arbitrary transport protocol.
pub fn ipv4_frame(src: Ipv4Addr, dst: Ipv4Addr, protocol: u8) -> Vec<u8> {
    ethernet_frame(EthernetProtocol::Ipv4, &ipv4_packet(src, dst, protocol, 8))
}

/// An ARP request frame (not steerable).
pub fn arp_frame() -> Vec<u8> {
    let mut arp = [0u8; 28];
    arp[0..2].copy_from_slice(&[0x00, 0x01]); // Hardware type: Ethernet
    arp[2..4].copy_from_slice(&[0x08, 0x00]); // Protocol type: IPv4
    arp[4] = 6;
    arp[5] = 4;
    arp[6..8].copy_from_slice(&[0x00, 0x01]); // Operation: request
    ethernet_frame(EthernetProtocol::Arp, &arp)
}

/// An IPv6 frame (outside the supported family).
pub fn ipv6_frame() -> Vec<u8> {
    let mut ip6 = [0u8; 40];
    ip6[0] = 0x60;
    ip6[6] = 6; // Next header: TCP
    ethernet_frame(EthernetProtocol::Ipv6, &ip6)
}
