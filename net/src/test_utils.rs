// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Builders for the frames the tests dissect.
//!
//! Ordinary headers are produced with etherparse; the encapsulations it
//! cannot express (GRE, MPLS, PPPoE, TIPC, batman-adv) are assembled by
//! hand next to the views that read them.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::missing_panics_doc
)]

pub use crate::buffer::TestFrame;
use crate::eth::EthType;
use crate::gre::{GRE_ACK, GRE_KEY, GRE_PROTO_PPP, GRE_SEQ};
use crate::transport::proto;
use etherparse::{
    EtherType, Ethernet2Header, IpFragOffset, IpNumber, Ipv4Header, Ipv6FlowLabel, Ipv6Header,
    SingleVlanHeader, TcpHeader, UdpHeader, VlanId, VlanPcp,
};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// Source MAC used by every builder.
pub const SRC_MAC: [u8; 6] = [0x02, 0, 0, 0, 0, 1];
/// Destination MAC used by every builder.
pub const DST_MAC: [u8; 6] = [0x02, 0, 0, 0, 0, 2];

/// Build an IPv4 address from a string.
#[must_use]
pub fn addr_v4(addr: &str) -> Ipv4Addr {
    Ipv4Addr::from_str(addr).expect("bad IPv4 address")
}

/// Build an IPv6 address from a string.
#[must_use]
pub fn addr_v6(addr: &str) -> Ipv6Addr {
    Ipv6Addr::from_str(addr).expect("bad IPv6 address")
}

/// A 14-byte Ethernet header.
#[must_use]
pub fn eth_bytes(ether_type: EthType) -> Vec<u8> {
    Ethernet2Header {
        source: SRC_MAC,
        destination: DST_MAC,
        ether_type: EtherType(ether_type.raw()),
    }
    .to_bytes()
    .to_vec()
}

/// An IPv4 header with no options.
#[must_use]
pub fn ipv4_bytes(src: &str, dst: &str, ip_proto: u8, payload_len: usize) -> Vec<u8> {
    ipv4_fragment_bytes(src, dst, ip_proto, payload_len, 0, false)
}

/// An IPv4 header with explicit fragment fields.
#[must_use]
pub fn ipv4_fragment_bytes(
    src: &str,
    dst: &str,
    ip_proto: u8,
    payload_len: usize,
    frag_offset: u16,
    more_fragments: bool,
) -> Vec<u8> {
    let mut header = Ipv4Header::default();
    header.source = addr_v4(src).octets();
    header.destination = addr_v4(dst).octets();
    header.protocol = IpNumber(ip_proto);
    header.time_to_live = 64;
    header.fragment_offset = IpFragOffset::try_new(frag_offset).unwrap();
    header.more_fragments = more_fragments;
    header.set_payload_len(payload_len).unwrap();
    header.to_bytes().to_vec()
}

/// An IPv6 header.
#[must_use]
pub fn ipv6_bytes(
    src: &str,
    dst: &str,
    next_header: u8,
    flow_label: u32,
    payload_len: usize,
) -> Vec<u8> {
    let mut header = Ipv6Header::default();
    header.source = addr_v6(src).octets();
    header.destination = addr_v6(dst).octets();
    header.next_header = IpNumber(next_header);
    header.flow_label = Ipv6FlowLabel::try_new(flow_label).unwrap();
    header.hop_limit = 64;
    header.payload_length = u16::try_from(payload_len).unwrap();
    header.to_bytes().to_vec()
}

/// A minimal 20-byte TCP header with SYN set.
#[must_use]
pub fn tcp_bytes(sport: u16, dport: u16) -> Vec<u8> {
    let mut header = TcpHeader::new(sport, dport, 1, 64);
    header.syn = true;
    header.to_bytes().to_vec()
}

/// An 8-byte UDP header.
#[must_use]
pub fn udp_bytes(sport: u16, dport: u16, payload_len: usize) -> Vec<u8> {
    let mut header = UdpHeader::default();
    header.source_port = sport;
    header.destination_port = dport;
    header.length = u16::try_from(8 + payload_len).unwrap();
    header.to_bytes().to_vec()
}

/// A 4-byte 802.1Q tag.
#[must_use]
pub fn vlan_bytes(vid: u16, priority: u8, inner: EthType) -> Vec<u8> {
    SingleVlanHeader {
        pcp: VlanPcp::try_new(priority).unwrap(),
        drop_eligible_indicator: false,
        vlan_id: VlanId::try_new(vid).unwrap(),
        ether_type: EtherType(inner.raw()),
    }
    .to_bytes()
    .to_vec()
}

/// An Ethernet/IPv4/TCP frame.
#[must_use]
pub fn ipv4_tcp_frame(src: &str, dst: &str, sport: u16, dport: u16) -> TestFrame {
    let tcp = tcp_bytes(sport, dport);
    let mut bytes = eth_bytes(EthType::IPV4);
    bytes.extend_from_slice(&ipv4_bytes(src, dst, proto::TCP, tcp.len()));
    bytes.extend_from_slice(&tcp);
    TestFrame::from_ethernet(bytes)
}

/// An Ethernet/IPv4/UDP frame.
#[must_use]
pub fn ipv4_udp_frame(src: &str, dst: &str, sport: u16, dport: u16) -> TestFrame {
    let udp = udp_bytes(sport, dport, 0);
    let mut bytes = eth_bytes(EthType::IPV4);
    bytes.extend_from_slice(&ipv4_bytes(src, dst, proto::UDP, udp.len()));
    bytes.extend_from_slice(&udp);
    TestFrame::from_ethernet(bytes)
}

/// An Ethernet/IPv6/TCP frame.
#[must_use]
pub fn ipv6_tcp_frame(src: &str, dst: &str, sport: u16, dport: u16) -> TestFrame {
    let tcp = tcp_bytes(sport, dport);
    let mut bytes = eth_bytes(EthType::IPV6);
    bytes.extend_from_slice(&ipv6_bytes(src, dst, proto::TCP, 0, tcp.len()));
    bytes.extend_from_slice(&tcp);
    TestFrame::from_ethernet(bytes)
}

/// An Ethernet/IPv6 frame with a hop-by-hop options header before UDP.
#[must_use]
pub fn ipv6_hopbyhop_udp_frame(src: &str, dst: &str, sport: u16, dport: u16) -> TestFrame {
    let udp = udp_bytes(sport, dport, 0);
    // hdrlen 0: an 8-byte options header carrying only padding
    let mut ext = vec![proto::UDP, 0, 1, 4, 0, 0, 0, 0];
    ext.extend_from_slice(&udp);
    let mut bytes = eth_bytes(EthType::IPV6);
    bytes.extend_from_slice(&ipv6_bytes(src, dst, proto::HOPOPT, 0, ext.len()));
    bytes.extend_from_slice(&ext);
    TestFrame::from_ethernet(bytes)
}

/// An Ethernet/IPv6 frame with a fragment header.
#[must_use]
pub fn ipv6_fragment_frame(src: &str, dst: &str, frag_offset: u16, sport: u16, dport: u16) -> TestFrame {
    let udp = udp_bytes(sport, dport, 0);
    let off_field = frag_offset << 3;
    let mut payload = vec![
        proto::UDP,
        0,
        (off_field >> 8) as u8,
        (off_field & 0xFF) as u8 | 0x01,
        0,
        0,
        0,
        1,
    ];
    payload.extend_from_slice(&udp);
    let mut bytes = eth_bytes(EthType::IPV6);
    bytes.extend_from_slice(&ipv6_bytes(src, dst, proto::FRAGMENT, 0, payload.len()));
    bytes.extend_from_slice(&payload);
    TestFrame::from_ethernet(bytes)
}

/// A QinQ frame: two stacked VLAN tags over IPv4/UDP.
#[must_use]
pub fn qinq_ipv4_udp_frame(outer_vid: u16, inner_vid: u16) -> TestFrame {
    let udp = udp_bytes(40000, 80, 0);
    let mut bytes = eth_bytes(EthType::VLAN);
    bytes.extend_from_slice(&vlan_bytes(outer_vid, 0, EthType::VLAN));
    bytes.extend_from_slice(&vlan_bytes(inner_vid, 0, EthType::IPV4));
    bytes.extend_from_slice(&ipv4_bytes("10.0.0.1", "10.0.0.2", proto::UDP, udp.len()));
    bytes.extend_from_slice(&udp);
    TestFrame::from_ethernet(bytes)
}

/// An IPv4 frame carrying a later fragment (nonzero offset) of a UDP
/// datagram.
#[must_use]
pub fn ipv4_later_fragment_frame(frag_offset: u16) -> TestFrame {
    let mut bytes = eth_bytes(EthType::IPV4);
    bytes.extend_from_slice(&ipv4_fragment_bytes(
        "10.0.0.1",
        "10.0.0.2",
        proto::UDP,
        32,
        frag_offset,
        false,
    ));
    bytes.extend_from_slice(&[0u8; 32]);
    TestFrame::from_ethernet(bytes)
}

/// An IPv4 frame carrying the first fragment of a UDP datagram.
#[must_use]
pub fn ipv4_first_fragment_frame(sport: u16, dport: u16) -> TestFrame {
    let udp = udp_bytes(sport, dport, 24);
    let mut bytes = eth_bytes(EthType::IPV4);
    bytes.extend_from_slice(&ipv4_fragment_bytes(
        "10.0.0.1",
        "10.0.0.2",
        proto::UDP,
        udp.len() + 24,
        0,
        true,
    ));
    bytes.extend_from_slice(&udp);
    bytes.extend_from_slice(&[0u8; 24]);
    TestFrame::from_ethernet(bytes)
}

/// A PPTP frame: IPv4/GREv1 with key, sequence and acknowledgment fields,
/// carrying PPP/IPv4/TCP.
#[must_use]
pub fn gre_pptp_ipv4_tcp_frame(call_id: u16) -> TestFrame {
    let tcp = tcp_bytes(1111, 80);
    let inner = ipv4_bytes("192.168.0.1", "192.168.0.2", proto::TCP, tcp.len());

    let mut gre = Vec::new();
    let flags: u16 = GRE_KEY | GRE_SEQ | GRE_ACK | 1;
    gre.extend_from_slice(&flags.to_be_bytes());
    gre.extend_from_slice(&GRE_PROTO_PPP.to_be_bytes());
    // key: payload length + call id
    let payload_len = u16::try_from(inner.len() + tcp.len()).unwrap();
    gre.extend_from_slice(&payload_len.to_be_bytes());
    gre.extend_from_slice(&call_id.to_be_bytes());
    gre.extend_from_slice(&1u32.to_be_bytes()); // sequence
    gre.extend_from_slice(&0u32.to_be_bytes()); // acknowledgment
    gre.extend_from_slice(&[0xFF, 0x03, 0x00, 0x21]); // PPP: address, control, IPv4

    let mut bytes = eth_bytes(EthType::IPV4);
    let payload = gre.len() + inner.len() + tcp.len();
    bytes.extend_from_slice(&ipv4_bytes("172.16.0.1", "172.16.0.2", proto::GRE, payload));
    bytes.extend_from_slice(&gre);
    bytes.extend_from_slice(&inner);
    bytes.extend_from_slice(&tcp);
    TestFrame::from_ethernet(bytes)
}

/// An IPv4/GREv0 frame with a key field, carrying transparent Ethernet
/// bridging around an inner IPv4/UDP flow.
#[must_use]
pub fn gre_teb_frame(keyid: u32) -> TestFrame {
    let udp = udp_bytes(5353, 5353, 0);
    let inner_ip = ipv4_bytes("192.168.1.1", "192.168.1.2", proto::UDP, udp.len());
    let inner_eth = eth_bytes(EthType::IPV4);

    let mut gre = Vec::new();
    let flags: u16 = GRE_KEY;
    gre.extend_from_slice(&flags.to_be_bytes());
    gre.extend_from_slice(&EthType::TEB.raw().to_be_bytes());
    gre.extend_from_slice(&keyid.to_be_bytes());

    let mut bytes = eth_bytes(EthType::IPV4);
    let payload = gre.len() + inner_eth.len() + inner_ip.len() + udp.len();
    bytes.extend_from_slice(&ipv4_bytes("172.16.0.1", "172.16.0.2", proto::GRE, payload));
    bytes.extend_from_slice(&gre);
    bytes.extend_from_slice(&inner_eth);
    bytes.extend_from_slice(&inner_ip);
    bytes.extend_from_slice(&udp);
    TestFrame::from_ethernet(bytes)
}

/// A PPPoE session frame carrying IPv4/UDP.
#[must_use]
pub fn pppoe_ipv4_udp_frame(sport: u16, dport: u16) -> TestFrame {
    let udp = udp_bytes(sport, dport, 0);
    let ip = ipv4_bytes("10.1.0.1", "10.1.0.2", proto::UDP, udp.len());

    let mut pppoe = Vec::new();
    pppoe.push(0x11); // version 1, type 1
    pppoe.push(0x00); // code: session data
    pppoe.extend_from_slice(&0x0001u16.to_be_bytes()); // session id
    pppoe.extend_from_slice(&u16::try_from(2 + ip.len() + udp.len()).unwrap().to_be_bytes());
    pppoe.extend_from_slice(&0x0021u16.to_be_bytes()); // PPP: IPv4

    let mut bytes = eth_bytes(EthType::PPPOE_SESSION);
    bytes.extend_from_slice(&pppoe);
    bytes.extend_from_slice(&ip);
    bytes.extend_from_slice(&udp);
    TestFrame::from_ethernet(bytes)
}

/// An MPLS frame with an entropy label below the indicator.
#[must_use]
pub fn mpls_entropy_frame(entropy_label: u32) -> TestFrame {
    let mut bytes = eth_bytes(EthType::MPLS_UC);
    // entropy label indicator (13), tc 0, ttl 64
    let indicator: u32 = (13 << 12) | 64;
    bytes.extend_from_slice(&indicator.to_be_bytes());
    // the entropy entry itself, bottom of stack
    let entry: u32 = (entropy_label << 12) | (1 << 8) | 64;
    bytes.extend_from_slice(&entry.to_be_bytes());
    TestFrame::from_ethernet(bytes)
}

/// A TIPC frame.
#[must_use]
pub fn tipc_frame(srcnode: u32) -> TestFrame {
    let mut bytes = eth_bytes(EthType::TIPC);
    bytes.extend_from_slice(&0x0540_0000u32.to_be_bytes());
    bytes.extend_from_slice(&[0u8; 8]);
    bytes.extend_from_slice(&srcnode.to_be_bytes());
    TestFrame::from_ethernet(bytes)
}

/// An ARP request frame.
#[must_use]
pub fn arp_request_frame(sender_ip: &str, target_ip: &str) -> TestFrame {
    let mut bytes = eth_bytes(EthType::ARP);
    bytes.extend_from_slice(&[0x00, 0x01, 0x08, 0x00, 6, 4, 0x00, 0x01]);
    bytes.extend_from_slice(&SRC_MAC);
    bytes.extend_from_slice(&addr_v4(sender_ip).octets());
    bytes.extend_from_slice(&[0u8; 6]);
    bytes.extend_from_slice(&addr_v4(target_ip).octets());
    TestFrame::from_ethernet(bytes)
}

/// A batman-adv unicast frame carrying IPv4/UDP.
#[must_use]
pub fn batadv_ipv4_udp_frame() -> TestFrame {
    let udp = udp_bytes(68, 67, 0);
    let ip = ipv4_bytes("10.2.0.1", "10.2.0.2", proto::UDP, udp.len());

    let mut bytes = eth_bytes(EthType::BATMAN);
    bytes.push(0x40); // unicast
    bytes.push(15); // compat version
    bytes.push(10); // ttl
    bytes.push(0); // ttvn
    bytes.extend_from_slice(&DST_MAC);
    bytes.extend_from_slice(&eth_bytes(EthType::IPV4));
    bytes.extend_from_slice(&ip);
    bytes.extend_from_slice(&udp);
    TestFrame::from_ethernet(bytes)
}

/// A frame whose VLAN stack exceeds the dissection header budget.
#[must_use]
pub fn deep_vlan_frame(depth: usize) -> TestFrame {
    let udp = udp_bytes(1, 2, 0);
    let mut bytes = eth_bytes(EthType::VLAN);
    for vid in 0..depth {
        let inner = if vid + 1 == depth {
            EthType::IPV4
        } else {
            EthType::VLAN
        };
        bytes.extend_from_slice(&vlan_bytes(u16::try_from(vid + 1).unwrap(), 0, inner));
    }
    bytes.extend_from_slice(&ipv4_bytes("10.0.0.1", "10.0.0.2", proto::UDP, udp.len()));
    bytes.extend_from_slice(&udp);
    TestFrame::from_ethernet(bytes)
}
