//! Packet views consumed by the steering core.
//!
//! The receive pipeline owns the packet buffer. Steering only needs three
//! things from it: the outer network protocol, whether enough header bytes are
//! present, and read-only access to the network header. [`Packet`] captures
//! exactly that, and the two views below cover the buffers the pipeline
//! actually hands us: full Ethernet frames and bare L3 packets (TUN).

use smoltcp::wire::{EthernetFrame, EthernetProtocol, Ipv4Packet};
use std::net::Ipv4Addr;

/// Ethernet II header: dst MAC (6) + src MAC (6) + EtherType (2).
pub const ETHERNET_HEADER_LEN: usize = 14;

/// Minimum IPv4 header (no options).
pub const IPV4_MIN_HEADER_LEN: usize = 20;

/// Read-only view of a received packet.
pub trait Packet {
    /// Outer network-layer protocol.
    fn ethertype(&self) -> EthernetProtocol;

    /// Bytes starting at the network-layer header.
    fn network_header(&self) -> &[u8];

    /// Whether at least `len` bytes of network header are available.
    #[inline]
    fn may_pull(&self, len: usize) -> bool {
        self.network_header().len() >= len
    }
}

/// Parse the IPv4 header of `packet`.
///
/// Only the header has to be present: the payload may live in later segments
/// and `total_len` is not checked (it is 0 on GSO/GRO super-packets). Returns
/// `None` for non-IPv4 packets, a version other than 4, an IHL below 5 or a
/// header longer than the available bytes. Never panics.
#[inline]
pub fn ipv4_header(packet: &dyn Packet) -> Option<Ipv4Packet<&[u8]>> {
    if packet.ethertype() != EthernetProtocol::Ipv4 || !packet.may_pull(IPV4_MIN_HEADER_LEN) {
        return None;
    }
    // At least IPV4_MIN_HEADER_LEN bytes, so every fixed field is in bounds.
    let ip = Ipv4Packet::new_unchecked(packet.network_header());
    let header_len = usize::from(ip.header_len());
    if ip.version() != 4 || header_len < IPV4_MIN_HEADER_LEN || !packet.may_pull(header_len) {
        return None;
    }
    Some(ip)
}

/// Destination address of an IPv4 packet.
#[inline]
pub fn ipv4_destination(packet: &dyn Packet) -> Option<Ipv4Addr> {
    ipv4_header(packet).map(|ip| Ipv4Addr::from(ip.dst_addr().octets()))
}

/// A raw Ethernet II frame as received from the NIC.
#[derive(Debug, Clone, Copy)]
pub struct EthernetRx<'a> {
    frame: &'a [u8],
    ethertype: EthernetProtocol,
}

impl<'a> EthernetRx<'a> {
    /// Wrap a received frame. Frames shorter than an Ethernet header report
    /// an unknown EtherType and an empty network header.
    pub fn new(frame: &'a [u8]) -> Self {
        let ethertype = match EthernetFrame::new_checked(frame) {
            Ok(eth) => eth.ethertype(),
            Err(_) => EthernetProtocol::Unknown(0),
        };
        Self { frame, ethertype }
    }

    /// The full frame, including the Ethernet header.
    pub fn frame(&self) -> &'a [u8] {
        self.frame
    }
}

impl Packet for EthernetRx<'_> {
    #[inline]
    fn ethertype(&self) -> EthernetProtocol {
        self.ethertype
    }

    #[inline]
    fn network_header(&self) -> &[u8] {
        self.frame.get(ETHERNET_HEADER_LEN..).unwrap_or(&[])
    }
}

/// A bare network-layer packet, as read from a TUN device.
///
/// The EtherType is derived from the IP version nibble.
#[derive(Debug, Clone, Copy)]
pub struct IpRx<'a> {
    packet: &'a [u8],
}

impl<'a> IpRx<'a> {
    pub fn new(packet: &'a [u8]) -> Self {
        Self { packet }
    }
}

impl Packet for IpRx<'_> {
    #[inline]
    fn ethertype(&self) -> EthernetProtocol {
        match self.packet.first().map(|b| b >> 4) {
            Some(4) => EthernetProtocol::Ipv4,
            Some(6) => EthernetProtocol::Ipv6,
            _ => EthernetProtocol::Unknown(0),
        }
    }

    #[inline]
    fn network_header(&self) -> &[u8] {
        self.packet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 20-byte IPv4 header, TCP, 10.0.0.1 -> 10.0.0.5, no payload.
    fn ipv4_tcp_header() -> Vec<u8> {
        let mut ip = vec![0u8; 20];
        ip[0] = 0x45;
        ip[2..4].copy_from_slice(&20u16.to_be_bytes());
        ip[8] = 64;
        ip[9] = 6;
        ip[12..16].copy_from_slice(&[10, 0, 0, 1]);
        ip[16..20].copy_from_slice(&[10, 0, 0, 5]);
        ip
    }

    fn ethernet(ethertype: [u8; 2], payload: &[u8]) -> Vec<u8> {
        let mut frame = vec![0u8; ETHERNET_HEADER_LEN];
        frame[12..14].copy_from_slice(&ethertype);
        frame.extend_from_slice(payload);
        frame
    }

    #[test]
    fn test_ethernet_ipv4_view() {
        let frame = ethernet([0x08, 0x00], &ipv4_tcp_header());
        let rx = EthernetRx::new(&frame);

        assert_eq!(rx.ethertype(), EthernetProtocol::Ipv4);
        assert!(rx.may_pull(IPV4_MIN_HEADER_LEN));
        assert!(!rx.may_pull(IPV4_MIN_HEADER_LEN + 1));
        assert_eq!(ipv4_destination(&rx), Some(Ipv4Addr::new(10, 0, 0, 5)));
    }

    #[test]
    fn test_runt_frame() {
        let frame = [0u8; 6];
        let rx = EthernetRx::new(&frame);

        assert_eq!(rx.ethertype(), EthernetProtocol::Unknown(0));
        assert!(rx.network_header().is_empty());
        assert!(ipv4_header(&rx).is_none());
    }

    #[test]
    fn test_truncated_ipv4_header() {
        let header = ipv4_tcp_header();
        let frame = ethernet([0x08, 0x00], &header[..12]);
        let rx = EthernetRx::new(&frame);

        assert_eq!(rx.ethertype(), EthernetProtocol::Ipv4);
        assert!(ipv4_header(&rx).is_none());
    }

    #[test]
    fn test_header_only_view() {
        // Payload in a later segment: total_len says 40, only 20 bytes here.
        let mut header = ipv4_tcp_header();
        header[2..4].copy_from_slice(&40u16.to_be_bytes());
        let frame = ethernet([0x08, 0x00], &header);
        let rx = EthernetRx::new(&frame);

        let ip = ipv4_header(&rx).unwrap();
        assert_eq!(ip.next_header(), smoltcp::wire::IpProtocol::Tcp);
        assert_eq!(ipv4_destination(&rx), Some(Ipv4Addr::new(10, 0, 0, 5)));
    }

    #[test]
    fn test_zero_total_len() {
        let mut header = ipv4_tcp_header();
        header[2..4].copy_from_slice(&0u16.to_be_bytes());
        assert_eq!(
            ipv4_destination(&IpRx::new(&header)),
            Some(Ipv4Addr::new(10, 0, 0, 5))
        );
    }

    #[test]
    fn test_bad_header_len_and_version() {
        let mut header = ipv4_tcp_header();
        header[0] = 0x44; // IHL 4 is below the minimum
        assert!(ipv4_header(&IpRx::new(&header)).is_none());

        header[0] = 0x46; // options claimed but not present
        assert!(ipv4_header(&IpRx::new(&header)).is_none());
        header.extend_from_slice(&[0u8; 4]);
        assert!(ipv4_header(&IpRx::new(&header)).is_some());

        let mut header = ipv4_tcp_header();
        header[0] = 0x55;
        let frame = ethernet([0x08, 0x00], &header);
        assert!(ipv4_header(&EthernetRx::new(&frame)).is_none());
    }

    #[test]
    fn test_arp_is_not_ipv4() {
        let frame = ethernet([0x08, 0x06], &[0u8; 28]);
        let rx = EthernetRx::new(&frame);
        assert_eq!(rx.ethertype(), EthernetProtocol::Arp);
        assert!(ipv4_header(&rx).is_none());
    }

    #[test]
    fn test_ip_view_version_nibble() {
        let header = ipv4_tcp_header();
        assert_eq!(IpRx::new(&header).ethertype(), EthernetProtocol::Ipv4);
        assert_eq!(IpRx::new(&[0x60, 0, 0, 0]).ethertype(), EthernetProtocol::Ipv6);
        assert_eq!(IpRx::new(&[]).ethertype(), EthernetProtocol::Unknown(0));
        assert_eq!(
            ipv4_destination(&IpRx::new(&header)),
            Some(Ipv4Addr::new(10, 0, 0, 5))
        );
    }
}
