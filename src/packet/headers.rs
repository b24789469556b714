//! Minimal L2/L3/L4 header parsing.
//!
//! Covers what the Rule matcher needs (spec section 4.2): Ethernet with
//! an optional single 802.1Q tag, IPv4/IPv6 addresses and protocol, and
//! TCP/UDP ports plus TCP control bits. IPv6 extension header chains are
//! not walked (Non-goal: no payload reassembly beyond a fixed-length
//! front capture, and the spec scopes out anything beyond rule-driven
//! field extraction).

use crate::error::ProtocolError;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum L4Protocol {
    Tcp,
    Udp,
    Icmp,
    Other(u8),
}

impl L4Protocol {
    fn from_ip_proto(n: u8) -> Self {
        match n {
            6 => L4Protocol::Tcp,
            17 => L4Protocol::Udp,
            1 | 58 => L4Protocol::Icmp,
            other => L4Protocol::Other(other),
        }
    }
}

/// The subset of a packet's headers that rule matching and flow-key
/// synthesis consume. Computed once per packet by [`parse`].
#[derive(Debug, Clone, Copy)]
pub struct HeaderView {
    pub l3_offset: usize,
    pub l4_offset: Option<usize>,
    pub vlan_id: Option<u16>,
    pub src_mac: [u8; 6],
    pub dst_mac: [u8; 6],
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub protocol: u8,
    pub ttl: u8,
    pub ip_total_length: u16,
    pub l4: L4Protocol,
    pub src_port: Option<u16>,
    pub dst_port: Option<u16>,
    pub tcp_flags: Option<u8>,
}

const ETH_HEADER_LEN: usize = 14;
const VLAN_TAG_LEN: usize = 4;
const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_IPV6: u16 = 0x86DD;
const ETHERTYPE_VLAN: u16 = 0x8100;

pub fn parse(buf: &[u8]) -> Result<HeaderView, ProtocolError> {
    if buf.len() < ETH_HEADER_LEN {
        return Err(ProtocolError::ShortBuffer { needed: ETH_HEADER_LEN, got: buf.len() });
    }

    let mut dst_mac = [0u8; 6];
    let mut src_mac = [0u8; 6];
    dst_mac.copy_from_slice(&buf[0..6]);
    src_mac.copy_from_slice(&buf[6..12]);

    let mut offset = 12;
    let mut ethertype = u16::from_be_bytes([buf[offset], buf[offset + 1]]);
    offset += 2;

    let mut vlan_id = None;
    if ethertype == ETHERTYPE_VLAN {
        if buf.len() < offset + VLAN_TAG_LEN {
            return Err(ProtocolError::ShortBuffer { needed: offset + VLAN_TAG_LEN, got: buf.len() });
        }
        let tci = u16::from_be_bytes([buf[offset], buf[offset + 1]]);
        vlan_id = Some(tci & 0x0FFF);
        ethertype = u16::from_be_bytes([buf[offset + 2], buf[offset + 3]]);
        offset += VLAN_TAG_LEN;
    }

    let l3_offset = offset;

    match ethertype {
        ETHERTYPE_IPV4 => parse_ipv4(buf, l3_offset, src_mac, dst_mac, vlan_id),
        ETHERTYPE_IPV6 => parse_ipv6(buf, l3_offset, src_mac, dst_mac, vlan_id),
        other => Err(ProtocolError::UnsupportedVersion(other)),
    }
}

fn parse_ipv4(buf: &[u8], off: usize, src_mac: [u8; 6], dst_mac: [u8; 6], vlan_id: Option<u16>) -> Result<HeaderView, ProtocolError> {
    if buf.len() < off + 20 {
        return Err(ProtocolError::ShortBuffer { needed: off + 20, got: buf.len() });
    }
    let version_ihl = buf[off];
    let ihl = ((version_ihl & 0x0F) as usize) * 4;
    if buf.len() < off + ihl {
        return Err(ProtocolError::ShortBuffer { needed: off + ihl, got: buf.len() });
    }
    let ttl = buf[off + 8];
    let protocol = buf[off + 9];
    let total_length = u16::from_be_bytes([buf[off + 2], buf[off + 3]]);
    let src_ip = Ipv4Addr::new(buf[off + 12], buf[off + 13], buf[off + 14], buf[off + 15]);
    let dst_ip = Ipv4Addr::new(buf[off + 16], buf[off + 17], buf[off + 18], buf[off + 19]);

    let l4_offset = off + ihl;
    let l4 = L4Protocol::from_ip_proto(protocol);
    let (src_port, dst_port, tcp_flags) = parse_l4(buf, l4_offset, l4);

    Ok(HeaderView {
        l3_offset: off,
        l4_offset: Some(l4_offset),
        vlan_id,
        src_mac,
        dst_mac,
        src_ip: IpAddr::V4(src_ip),
        dst_ip: IpAddr::V4(dst_ip),
        protocol,
        ttl,
        ip_total_length: total_length,
        l4,
        src_port,
        dst_port,
        tcp_flags,
    })
}

fn parse_ipv6(buf: &[u8], off: usize, src_mac: [u8; 6], dst_mac: [u8; 6], vlan_id: Option<u16>) -> Result<HeaderView, ProtocolError> {
    const IPV6_HEADER_LEN: usize = 40;
    if buf.len() < off + IPV6_HEADER_LEN {
        return Err(ProtocolError::ShortBuffer { needed: off + IPV6_HEADER_LEN, got: buf.len() });
    }
    let payload_length = u16::from_be_bytes([buf[off + 4], buf[off + 5]]);
    let next_header = buf[off + 6];
    let hop_limit = buf[off + 7];
    let mut src = [0u8; 16];
    let mut dst = [0u8; 16];
    src.copy_from_slice(&buf[off + 8..off + 24]);
    dst.copy_from_slice(&buf[off + 24..off + 40]);

    let l4_offset = off + IPV6_HEADER_LEN;
    let l4 = L4Protocol::from_ip_proto(next_header);
    let (src_port, dst_port, tcp_flags) = parse_l4(buf, l4_offset, l4);

    Ok(HeaderView {
        l3_offset: off,
        l4_offset: Some(l4_offset),
        vlan_id,
        src_mac,
        dst_mac,
        src_ip: IpAddr::V6(Ipv6Addr::from(src)),
        dst_ip: IpAddr::V6(Ipv6Addr::from(dst)),
        protocol: next_header,
        ttl: hop_limit,
        ip_total_length: payload_length,
        l4,
        src_port,
        dst_port,
        tcp_flags,
    })
}

fn parse_l4(buf: &[u8], off: usize, l4: L4Protocol) -> (Option<u16>, Option<u16>, Option<u8>) {
    match l4 {
        L4Protocol::Tcp if buf.len() >= off + 14 => {
            let src = u16::from_be_bytes([buf[off], buf[off + 1]]);
            let dst = u16::from_be_bytes([buf[off + 2], buf[off + 3]]);
            let flags = buf[off + 13];
            (Some(src), Some(dst), Some(flags))
        }
        L4Protocol::Udp if buf.len() >= off + 4 => {
            let src = u16::from_be_bytes([buf[off], buf[off + 1]]);
            let dst = u16::from_be_bytes([buf[off + 2], buf[off + 3]]);
            (Some(src), Some(dst), None)
        }
        _ => (None, None, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tcp_packet(src_ip: [u8; 4], dst_ip: [u8; 4], src_port: u16, dst_port: u16, flags: u8) -> Vec<u8> {
        let mut buf = vec![0u8; 14 + 20 + 20];
        buf[12] = 0x08;
        buf[13] = 0x00;
        buf[14] = 0x45;
        buf[14 + 9] = 6;
        buf[14 + 8] = 64;
        buf[14 + 12..14 + 16].copy_from_slice(&src_ip);
        buf[14 + 16..14 + 20].copy_from_slice(&dst_ip);
        let l4 = 14 + 20;
        buf[l4..l4 + 2].copy_from_slice(&src_port.to_be_bytes());
        buf[l4 + 2..l4 + 4].copy_from_slice(&dst_port.to_be_bytes());
        buf[l4 + 13] = flags;
        buf
    }

    #[test]
    fn parses_tcp_over_ipv4() {
        let buf = tcp_packet([10, 0, 0, 1], [10, 0, 0, 2], 1000, 80, 0x02);
        let h = parse(&buf).unwrap();
        assert_eq!(h.src_ip, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(h.dst_ip, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)));
        assert_eq!(h.src_port, Some(1000));
        assert_eq!(h.dst_port, Some(80));
        assert_eq!(h.tcp_flags, Some(0x02));
        assert_eq!(h.protocol, 6);
    }

    #[test]
    fn too_short_for_ethernet_header_errors() {
        let buf = vec![0u8; 4];
        assert!(matches!(parse(&buf), Err(ProtocolError::ShortBuffer { .. })));
    }

    #[test]
    fn vlan_tag_is_unwrapped() {
        let mut buf = vec![0u8; 14 + 4 + 20];
        buf[12] = 0x81;
        buf[13] = 0x00;
        buf[14] = 0x00;
        buf[15] = 0x2A; // vlan id 42
        buf[16] = 0x08;
        buf[17] = 0x00;
        buf[18] = 0x45;
        buf[18 + 9] = 17; // UDP
        let h = parse(&buf).unwrap();
        assert_eq!(h.vlan_id, Some(42));
        assert_eq!(h.protocol, 17);
    }
}
