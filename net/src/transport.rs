// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Transport-layer helpers: protocol numbers, the per-protocol port-offset
//! table, and the payload-offset computation.

use crate::buffer::{ByteWindow, Frame};
use crate::dissect::{DissectFlags, flow_keys_buf_dissector, flow_keys_dissector};
use crate::eth::EthHdr;
use crate::keys::{ControlFlags, FlowKeys};

/// IP payload protocol numbers the dissector switches on.
#[allow(missing_docs)]
pub mod proto {
    use etherparse::IpNumber;

    pub const HOPOPT: u8 = IpNumber::IPV6_HEADER_HOP_BY_HOP.0;
    pub const ICMP: u8 = IpNumber::ICMP.0;
    pub const IGMP: u8 = 2;
    pub const IPIP: u8 = 4;
    pub const TCP: u8 = IpNumber::TCP.0;
    pub const UDP: u8 = IpNumber::UDP.0;
    pub const DCCP: u8 = 33;
    pub const IPV6: u8 = 41;
    pub const ROUTING: u8 = IpNumber::IPV6_ROUTE_HEADER.0;
    pub const FRAGMENT: u8 = IpNumber::IPV6_FRAGMENTATION_HEADER.0;
    pub const GRE: u8 = 47;
    pub const ESP: u8 = 50;
    pub const AH: u8 = IpNumber::AUTHENTICATION_HEADER.0;
    pub const ICMPV6: u8 = IpNumber::IPV6_ICMP.0;
    pub const DSTOPTS: u8 = IpNumber::IPV6_DESTINATION_OPTIONS.0;
    pub const SCTP: u8 = 132;
    pub const UDPLITE: u8 = 136;
    pub const MPLS: u8 = 137;
}

/// Offset of the 4-byte port pair (or SPI) within the transport header,
/// or `None` for protocols that carry neither.
#[must_use]
pub fn ports_offset(ip_proto: u8) -> Option<usize> {
    match ip_proto {
        proto::TCP
        | proto::UDP
        | proto::DCCP
        | proto::ESP
        | proto::SCTP
        | proto::UDPLITE => Some(0),
        proto::AH => Some(4),
        _ => None,
    }
}

const TCP_MIN_LEN: u32 = 20;
const UDP_LEN: u32 = 8;
const ICMP_LEN: u32 = 8;
const ICMPV6_LEN: u32 = 8;
const IGMP_LEN: u32 = 8;
const DCCP_LEN: u32 = 16;
const SCTP_LEN: u32 = 12;

/// Compute the offset of the transport payload from dissected `keys`.
///
/// Starts from the recorded transport offset and adds the live length of
/// the transport header: for TCP the data offset is re-read from the frame
/// (clamped to at least the minimal header), the others use their fixed
/// sizes. Fragments after the first return the transport offset unchanged
/// since no transport header is present.
#[must_use]
pub fn payload_offset(data: &[u8], hlen: usize, keys: &FlowKeys) -> u32 {
    let control = keys.control();
    let mut poff = u32::from(control.thoff);

    if control.flags.contains(ControlFlags::IS_FRAGMENT)
        && !control.flags.contains(ControlFlags::FIRST_FRAG)
    {
        return poff;
    }

    match keys.basic().ip_proto {
        proto::TCP => {
            let window = ByteWindow::new(data, hlen);
            let Some([doff]) = window.get::<1>(usize::from(control.thoff) + 12) else {
                return poff;
            };
            poff += TCP_MIN_LEN.max(u32::from(doff >> 4) * 4);
        }
        proto::UDP | proto::UDPLITE => poff += UDP_LEN,
        proto::ICMP => poff += ICMP_LEN,
        proto::ICMPV6 => poff += ICMPV6_LEN,
        proto::IGMP => poff += IGMP_LEN,
        proto::DCCP => poff += DCCP_LEN,
        proto::SCTP => poff += SCTP_LEN,
        _ => {}
    }

    poff
}

/// Dissect `frame` and return the offset of its transport payload, or 0
/// when dissection fails outright.
pub fn frame_payload_offset<F: Frame + ?Sized>(frame: &F) -> u32 {
    let mut keys = FlowKeys::new();
    if !flow_keys_dissector().dissect(frame, keys.as_bytes_mut(), DissectFlags::empty()) {
        return 0;
    }
    payload_offset(frame.bytes(), frame.headlen(), &keys)
}

/// Compute how many bytes at the start of `data` are protocol headers,
/// for sizing a linear pull-in. `data` must begin with an Ethernet
/// header; the walk runs with the control/basic-only dissector since no
/// extracted keys are needed.
#[must_use]
#[allow(clippy::cast_possible_truncation)] // bounded by the u32 header walk
pub fn header_length(data: &[u8]) -> u32 {
    let len = data.len() as u32;
    if data.len() < EthHdr::LEN {
        return len;
    }
    let proto = crate::eth::EthType::new_from_be_bytes([data[12], data[13]]);

    let mut keys = FlowKeys::new();
    let ok = flow_keys_buf_dissector().dissect_raw(
        data,
        proto,
        EthHdr::LEN,
        data.len(),
        keys.as_bytes_mut(),
        DissectFlags::empty(),
    );
    if !ok {
        return (EthHdr::LEN as u32).max(len);
    }
    payload_offset(data, data.len(), &keys).min(len)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod test {
    use super::*;
    use crate::keys::{AddrType, KeyBasic, KeyControl};

    fn keys_with(thoff: u16, ip_proto: u8, flags: ControlFlags) -> FlowKeys {
        let mut keys = FlowKeys::new();
        keys.set_control(KeyControl {
            thoff,
            addr_type: AddrType::Unspecified,
            flags,
        });
        keys.set_basic(KeyBasic {
            n_proto: crate::eth::EthType::IPV4,
            ip_proto,
        });
        keys
    }

    #[test]
    fn ports_offset_table() {
        assert_eq!(ports_offset(proto::TCP), Some(0));
        assert_eq!(ports_offset(proto::UDP), Some(0));
        assert_eq!(ports_offset(proto::SCTP), Some(0));
        assert_eq!(ports_offset(proto::AH), Some(4));
        assert_eq!(ports_offset(proto::ICMP), None);
        assert_eq!(ports_offset(proto::GRE), None);
    }

    #[test]
    fn tcp_uses_live_data_offset() {
        let keys = keys_with(0, proto::TCP, ControlFlags::empty());
        // 32-byte TCP header (doff = 8)
        let mut data = [0u8; 40];
        data[12] = 8 << 4;
        assert_eq!(payload_offset(&data, data.len(), &keys), 32);
        // nonsense doff below the minimum clamps to 20
        data[12] = 2 << 4;
        assert_eq!(payload_offset(&data, data.len(), &keys), 20);
    }

    #[test]
    fn tcp_truncated_returns_thoff() {
        let keys = keys_with(0, proto::TCP, ControlFlags::empty());
        let data = [0u8; 10];
        assert_eq!(payload_offset(&data, data.len(), &keys), 0);
    }

    #[test]
    fn fixed_sizes() {
        let data = [0u8; 64];
        for (ip_proto, expect) in [
            (proto::UDP, 8),
            (proto::UDPLITE, 8),
            (proto::ICMP, 8),
            (proto::ICMPV6, 8),
            (proto::IGMP, 8),
            (proto::DCCP, 16),
            (proto::SCTP, 12),
            (proto::GRE, 0),
        ] {
            let keys = keys_with(34, ip_proto, ControlFlags::empty());
            assert_eq!(payload_offset(&data, data.len(), &keys), 34 + expect);
        }
    }

    #[test]
    fn later_fragment_unchanged() {
        let keys = keys_with(34, proto::UDP, ControlFlags::IS_FRAGMENT);
        let data = [0u8; 64];
        assert_eq!(payload_offset(&data, data.len(), &keys), 34);
    }

    #[test]
    fn frame_payload_offset_dissects_first() {
        let frame = crate::test_utils::ipv4_udp_frame("10.0.0.1", "10.0.0.2", 5000, 53);
        assert_eq!(frame_payload_offset(&frame), 14 + 20 + 8);

        let bad = frame.truncated(16);
        assert_eq!(frame_payload_offset(&bad), 0);
    }

    #[test]
    fn header_length_bounds_pull_in() {
        let frame = crate::test_utils::ipv4_tcp_frame("10.0.0.1", "10.0.0.2", 1, 2);
        // eth + ipv4 + tcp, no payload: everything is header
        assert_eq!(header_length(frame.bytes()), 14 + 20 + 20);

        let mut with_payload = frame.bytes().to_vec();
        with_payload.extend_from_slice(&[0u8; 100]);
        assert_eq!(header_length(&with_payload), 14 + 20 + 20);

        // too short for an ethernet header: everything is "header"
        assert_eq!(header_length(&with_payload[..6]), 6);
    }
}
