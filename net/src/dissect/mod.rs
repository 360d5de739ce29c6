// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The dissection descriptor and driver.
//!
//! A [`Dissector`] is built once from a key/offset table and is read-only
//! afterwards, so it can be shared freely between threads. Each call to
//! [`Dissector::dissect`] walks one frame through two interleaved switch
//! loops (link-layer protocols and IP payload protocols); per-protocol
//! steps report a [`Verdict`] that drives the loops. A hard budget of
//! [`MAX_DISSECT_HDRS`] headers bounds every walk, which is the only
//! defense against encapsulation cycles.

use crate::arp::{ArpEthBody, ArpHdr};
use crate::batadv::{BATADV_COMPAT_VERSION, BATADV_UNICAST, BatadvUnicastHdr};
use crate::buffer::{ByteWindow, Frame};
use crate::eth::{EthHdr, EthType, ethertype};
use crate::gre::{GRE_PROTO_PPP, GreBaseHdr, pptp_key_mask};
use crate::ipv4::Ipv4Hdr;
use crate::ipv6::{Ipv6ExtHdr, Ipv6FragHdr, Ipv6Hdr};
use crate::keys::{
    AddrType, ControlFlags, FlowKeys, KeyArp, KeyBasic, KeyCodec, KeyControl, KeyEthAddrs,
    KeyIcmp, KeyId, KeyIp, KeyIpv4Addrs, KeyIpv6Addrs, KeyKeyid, KeyMpls, KeyPorts, KeyTags,
    KeyTcp, KeyTipcAddrs, KeyVlan,
};
use crate::mpls::{MPLS_LABEL_ENTROPY, MplsEntry};
use crate::ppp;
use crate::pppoe::PppoeSesHdr;
use crate::tipc::TipcHdr;
use crate::transport::{ports_offset, proto};
use crate::vlan::{VlanHdr, VlanTag};
use std::sync::OnceLock;
use tracing::{debug, trace};

/// Maximum number of protocol headers dissected from one frame.
pub const MAX_DISSECT_HDRS: u32 = 15;

/// Length of an FCoE header.
const FCOE_HEADER_LEN: usize = 38;

bitflags::bitflags! {
    /// Caller-supplied switches altering how far a dissection runs.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
    pub struct DissectFlags: u32 {
        /// Continue into the transport header of a first fragment.
        const PARSE_1ST_FRAG = 1 << 0;
        /// Stop once network-layer addresses are recorded.
        const STOP_AT_L3 = 1 << 1;
        /// Stop once a nonzero IPv6 flow label is seen.
        const STOP_AT_FLOW_LABEL = 1 << 2;
        /// Stop at the first encapsulation boundary.
        const STOP_AT_ENCAP = 1 << 3;
    }
}

/// Outcome of a per-protocol dissection step.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Verdict {
    /// Fall through to the IP-protocol switch.
    Continue,
    /// Restart the link-layer switch with an updated protocol.
    ProtoAgain,
    /// Restart the IP-protocol switch with an updated protocol.
    IpProtoAgain,
    /// Stop dissecting; the walk succeeded.
    OutGood,
    /// Stop dissecting; the frame is malformed or unsupported.
    OutBad,
}

/// One entry of the init-time key table: which key to extract and where to
/// deposit it inside the target aggregate.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DissectorKey {
    /// The key to extract.
    pub id: KeyId,
    /// Byte offset of the key inside the target aggregate.
    pub offset: usize,
}

impl DissectorKey {
    /// Build a table entry.
    #[must_use]
    pub const fn new(id: KeyId, offset: usize) -> DissectorKey {
        DissectorKey { id, offset }
    }
}

/// Errors rejected when building a [`Dissector`].
///
/// These are programmer errors in the key table, caught before any frame
/// is ever dissected.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum DissectorInitError {
    /// The same key was registered twice.
    #[error("key {0:?} registered more than once")]
    DuplicateKey(KeyId),
    /// An offset does not fit the 16-bit offset table.
    #[error("offset {offset} for key {id:?} exceeds the 16-bit limit")]
    OffsetTooLarge {
        /// The offending key.
        id: KeyId,
        /// The rejected offset.
        offset: usize,
    },
    /// A key would extend past the end of the target aggregate.
    #[error("key {id:?} at offset {offset} overruns a {target_len} byte target")]
    KeyOutOfBounds {
        /// The offending key.
        id: KeyId,
        /// Its offset.
        offset: usize,
        /// The declared aggregate size.
        target_len: usize,
    },
    /// The mandatory control key is missing.
    #[error("the control key must be registered")]
    MissingControl,
    /// The mandatory basic key is missing.
    #[error("the basic key must be registered")]
    MissingBasic,
}

/// An immutable key/offset table driving flow dissection.
#[derive(Debug, Clone)]
pub struct Dissector {
    used_keys: u32,
    offset: [u16; KeyId::COUNT],
    target_len: usize,
}

impl Dissector {
    /// Build a dissector from a key table and the size of the target
    /// aggregate the offsets point into.
    ///
    /// # Errors
    ///
    /// Rejects duplicate keys, offsets beyond the 16-bit table range,
    /// keys overrunning the declared aggregate size, and tables missing
    /// the mandatory control or basic key.
    pub fn new(keys: &[DissectorKey], target_len: usize) -> Result<Dissector, DissectorInitError> {
        let mut dissector = Dissector {
            used_keys: 0,
            offset: [0u16; KeyId::COUNT],
            target_len,
        };

        for key in keys {
            if dissector.uses(key.id) {
                return Err(DissectorInitError::DuplicateKey(key.id));
            }
            let Ok(offset) = u16::try_from(key.offset) else {
                return Err(DissectorInitError::OffsetTooLarge {
                    id: key.id,
                    offset: key.offset,
                });
            };
            if key.offset + key.id.size() > target_len {
                return Err(DissectorInitError::KeyOutOfBounds {
                    id: key.id,
                    offset: key.offset,
                    target_len,
                });
            }
            dissector.used_keys |= key.id.bit();
            dissector.offset[key.id.index()] = offset;
        }

        if !dissector.uses(KeyId::Control) {
            return Err(DissectorInitError::MissingControl);
        }
        if !dissector.uses(KeyId::Basic) {
            return Err(DissectorInitError::MissingBasic);
        }

        Ok(dissector)
    }

    /// The bitmask of registered keys.
    #[must_use]
    pub fn used_keys(&self) -> u32 {
        self.used_keys
    }

    /// True when `id` has an offset assigned.
    #[must_use]
    pub fn uses(&self, id: KeyId) -> bool {
        self.used_keys & id.bit() != 0
    }

    /// The minimum target-aggregate size this dissector writes into.
    #[must_use]
    pub fn target_len(&self) -> usize {
        self.target_len
    }

    fn target_for<'t>(&self, id: KeyId, target: &'t mut [u8]) -> Option<&'t mut [u8]> {
        if !self.uses(id) {
            return None;
        }
        Some(&mut target[usize::from(self.offset[id.index()])..])
    }

    /// Dissect a live frame into `target`.
    ///
    /// Initial conditions are seeded from the frame: the protocol of an
    /// offloaded VLAN tag (falling back to the frame protocol), the
    /// frame's network offset, and its linear length.
    ///
    /// Returns `false` when the walk ended on a malformed or unsupported
    /// header. The control and basic keys are written either way.
    ///
    /// # Panics
    ///
    /// Panics if `target` is smaller than the aggregate size declared at
    /// init time. The caller contract also requires `target` to be
    /// pre-zeroed; the dissector only writes keys it extracts.
    pub fn dissect<F: Frame + ?Sized>(
        &self,
        frame: &F,
        target: &mut [u8],
        flags: DissectFlags,
    ) -> bool {
        let data = frame.bytes();
        let (proto, offloaded) = match frame.vlan_tag() {
            Some(tag) => (
                tag.tpid,
                Some(OffloadedVlan {
                    tag,
                    inner_proto: frame.protocol(),
                }),
            ),
            None => (frame.protocol(), None),
        };

        if let Some(slot) = self.target_for(KeyId::EthAddrs, target) {
            let window = ByteWindow::new(data, data.len());
            if let Some(raw) = window.get::<{ KeyEthAddrs::SIZE }>(frame.mac_offset()) {
                KeyEthAddrs::read_from(&raw).write_to(slot);
            }
        }

        self.run(
            data,
            data.len(),
            offloaded,
            proto,
            frame.network_offset(),
            target,
            flags,
        )
    }

    /// Dissect a raw buffer into `target`.
    ///
    /// `proto` names the protocol found at `nhoff`; `hlen` bounds the
    /// validated prefix of `data`. See [`Dissector::dissect`] for the
    /// result contract.
    ///
    /// # Panics
    ///
    /// Panics if `target` is smaller than the aggregate size declared at
    /// init time.
    pub fn dissect_raw(
        &self,
        data: &[u8],
        proto: EthType,
        nhoff: usize,
        hlen: usize,
        target: &mut [u8],
        flags: DissectFlags,
    ) -> bool {
        self.run(data, hlen, None, proto, nhoff, target, flags)
    }

    #[allow(clippy::too_many_arguments)]
    fn run(
        &self,
        data: &[u8],
        hlen: usize,
        offloaded: Option<OffloadedVlan>,
        proto: EthType,
        nhoff: usize,
        target: &mut [u8],
        flags: DissectFlags,
    ) -> bool {
        assert!(
            target.len() >= self.target_len,
            "target aggregate smaller than the size declared at init"
        );

        let mut ctx = Ctx {
            dissector: self,
            target: &mut *target,
            window: ByteWindow::new(data, hlen),
            flags,
            offloaded,
            proto,
            ip_proto: 0,
            nhoff,
            skip_vlan: false,
            ctrl_flags: ControlFlags::empty(),
            addr_type: AddrType::Unspecified,
        };
        let mut num_hdrs = 0u32;

        let ok = 'walk: {
            'proto_again: loop {
                match ctx.dissect_l2() {
                    Verdict::OutGood => break 'walk true,
                    Verdict::ProtoAgain => {
                        if dissect_allowed(&mut num_hdrs) {
                            continue 'proto_again;
                        }
                        break 'walk true;
                    }
                    Verdict::Continue | Verdict::IpProtoAgain => {}
                    Verdict::OutBad => break 'walk false,
                }

                loop {
                    let verdict = ctx.dissect_l4();
                    ctx.capture_ports_and_icmp();
                    match verdict {
                        Verdict::ProtoAgain => {
                            if dissect_allowed(&mut num_hdrs) {
                                continue 'proto_again;
                            }
                            break 'walk true;
                        }
                        Verdict::IpProtoAgain => {
                            if dissect_allowed(&mut num_hdrs) {
                                continue;
                            }
                            break 'walk true;
                        }
                        Verdict::OutGood | Verdict::Continue => break 'walk true,
                        Verdict::OutBad => break 'walk false,
                    }
                }
            }
        };

        // Both outcomes leave the control and basic keys populated so the
        // caller can still see how far the walk got.
        #[allow(clippy::cast_possible_truncation)] // offsets wrap like the thoff field does
        let thoff = (ctx.nhoff as u16).min(ctx.window.hlen() as u16);
        let (proto, ip_proto, addr_type, ctrl_flags) =
            (ctx.proto, ctx.ip_proto, ctx.addr_type, ctx.ctrl_flags);
        if let Some(slot) = self.target_for(KeyId::Control, target) {
            KeyControl {
                thoff,
                addr_type,
                flags: ctrl_flags,
            }
            .write_to(slot);
        }
        if let Some(slot) = self.target_for(KeyId::Basic, target) {
            KeyBasic {
                n_proto: proto,
                ip_proto,
            }
            .write_to(slot);
        }

        ok
    }
}

fn dissect_allowed(num_hdrs: &mut u32) -> bool {
    *num_hdrs += 1;
    *num_hdrs <= MAX_DISSECT_HDRS
}

/// The offloaded VLAN tag plus the protocol the frame reported underneath
/// it.
#[derive(Debug, Copy, Clone)]
struct OffloadedVlan {
    tag: VlanTag,
    inner_proto: EthType,
}

struct Ctx<'d, 't, 'p> {
    dissector: &'d Dissector,
    target: &'t mut [u8],
    window: ByteWindow<'p>,
    flags: DissectFlags,
    offloaded: Option<OffloadedVlan>,
    proto: EthType,
    ip_proto: u8,
    nhoff: usize,
    skip_vlan: bool,
    ctrl_flags: ControlFlags,
    addr_type: AddrType,
}

impl Ctx<'_, '_, '_> {
    fn uses(&self, id: KeyId) -> bool {
        self.dissector.uses(id)
    }

    fn write_key<K: KeyCodec>(&mut self, id: KeyId, key: &K) {
        if let Some(slot) = self.dissector.target_for(id, self.target) {
            key.write_to(slot);
        }
    }

    fn dissect_l2(&mut self) -> Verdict {
        match self.proto.raw() {
            ethertype::IP => self.ipv4(),
            ethertype::IPV6 => self.ipv6(),
            ethertype::VLAN_8021Q | ethertype::VLAN_8021AD => self.vlan(),
            ethertype::PPP_SES => self.pppoe(),
            ethertype::TIPC => self.tipc(),
            ethertype::MPLS_UC | ethertype::MPLS_MC => self.mpls(),
            ethertype::FCOE => self.fcoe(),
            ethertype::ARP | ethertype::RARP => self.arp(),
            ethertype::BATMAN => self.batadv(),
            other => {
                trace!("unsupported link-layer protocol {other:#06x}");
                Verdict::OutBad
            }
        }
    }

    fn dissect_l4(&mut self) -> Verdict {
        match self.ip_proto {
            proto::GRE => self.gre(),
            proto::HOPOPT | proto::ROUTING | proto::DSTOPTS => self.ipv6_ext(),
            proto::FRAGMENT => self.ipv6_frag(),
            proto::IPIP => self.encap(EthType::IPV4),
            proto::IPV6 => self.encap(EthType::IPV6),
            proto::MPLS => {
                self.proto = EthType::MPLS_UC;
                Verdict::ProtoAgain
            }
            proto::TCP => self.tcp(),
            _ => Verdict::Continue,
        }
    }

    fn ipv4(&mut self) -> Verdict {
        let Some(raw) = self.window.get::<{ Ipv4Hdr::LEN }>(self.nhoff) else {
            debug!("truncated ipv4 header");
            return Verdict::OutBad;
        };
        let iph = Ipv4Hdr::new(raw);
        if iph.ihl() < 5 {
            debug!("ipv4 header length below minimum (ihl {})", iph.ihl());
            return Verdict::OutBad;
        }

        self.nhoff += iph.header_len();
        self.ip_proto = iph.protocol();

        if self.uses(KeyId::Ipv4Addrs) {
            let key = KeyIpv4Addrs {
                src: iph.source(),
                dst: iph.destination(),
            };
            self.write_key(KeyId::Ipv4Addrs, &key);
            self.addr_type = AddrType::Ipv4;
        }

        if iph.is_fragment() {
            self.ctrl_flags |= ControlFlags::IS_FRAGMENT;

            if iph.fragment_offset() != 0 {
                return Verdict::OutGood;
            }
            self.ctrl_flags |= ControlFlags::FIRST_FRAG;
            if !self.flags.contains(DissectFlags::PARSE_1ST_FRAG) {
                return Verdict::OutGood;
            }
        }

        let key = KeyIp {
            tos: iph.tos(),
            ttl: iph.ttl(),
        };
        self.write_key(KeyId::Ip, &key);

        if self.flags.contains(DissectFlags::STOP_AT_L3) {
            return Verdict::OutGood;
        }
        Verdict::Continue
    }

    fn ipv6(&mut self) -> Verdict {
        let Some(raw) = self.window.get::<{ Ipv6Hdr::LEN }>(self.nhoff) else {
            debug!("truncated ipv6 header");
            return Verdict::OutBad;
        };
        let iph = Ipv6Hdr::new(raw);

        self.ip_proto = iph.next_header();
        self.nhoff += Ipv6Hdr::LEN;

        if self.uses(KeyId::Ipv6Addrs) {
            let key = KeyIpv6Addrs {
                src: iph.source(),
                dst: iph.destination(),
            };
            self.write_key(KeyId::Ipv6Addrs, &key);
            self.addr_type = AddrType::Ipv6;
        }

        let flow_label = iph.flow_label();
        if (self.uses(KeyId::FlowLabel) || self.flags.contains(DissectFlags::STOP_AT_FLOW_LABEL))
            && flow_label != 0
        {
            self.write_key(KeyId::FlowLabel, &KeyTags { flow_label });
            if self.flags.contains(DissectFlags::STOP_AT_FLOW_LABEL) {
                return Verdict::OutGood;
            }
        }

        let key = KeyIp {
            tos: iph.dsfield(),
            ttl: iph.hop_limit(),
        };
        self.write_key(KeyId::Ip, &key);

        if self.flags.contains(DissectFlags::STOP_AT_L3) {
            return Verdict::OutGood;
        }
        Verdict::Continue
    }

    fn vlan(&mut self) -> Verdict {
        let offloaded = self.offloaded;
        if let Some(meta) = offloaded {
            self.proto = meta.inner_proto;
        }

        // An in-band tag is read when there is no offloaded tag, or when
        // the protocol under the offloaded tag is itself a VLAN ethertype.
        // This priority keeps offloaded and in-band renderings of the same
        // frame bit-compatible.
        let mut inband: Option<VlanHdr> = None;
        if offloaded.is_none() || self.proto.is_vlan() {
            let Some(raw) = self.window.get::<{ VlanHdr::LEN }>(self.nhoff) else {
                debug!("truncated vlan header");
                return Verdict::OutBad;
            };
            let hdr = VlanHdr::new(raw);
            self.proto = hdr.inner_ethtype();
            self.nhoff += VlanHdr::LEN;
            if self.skip_vlan {
                return Verdict::ProtoAgain;
            }
            inband = Some(hdr);
        }

        self.skip_vlan = true;
        if self.uses(KeyId::Vlan) {
            let key = match (offloaded, inband) {
                (Some(meta), _) => KeyVlan {
                    id: meta.tag.id(),
                    priority: meta.tag.priority(),
                },
                (None, Some(hdr)) => KeyVlan {
                    id: hdr.vid(),
                    priority: hdr.priority(),
                },
                (None, None) => unreachable!(),
            };
            self.write_key(KeyId::Vlan, &key);
        }
        Verdict::ProtoAgain
    }

    fn pppoe(&mut self) -> Verdict {
        let Some(raw) = self.window.get::<{ PppoeSesHdr::LEN }>(self.nhoff) else {
            debug!("truncated pppoe session header");
            return Verdict::OutBad;
        };
        let hdr = PppoeSesHdr::new(raw);
        self.proto = EthType::new(hdr.ppp_proto());
        self.nhoff += PppoeSesHdr::LEN;
        match ppp::ethertype_for(hdr.ppp_proto()) {
            Some(inner) => {
                self.proto = inner;
                Verdict::ProtoAgain
            }
            None => {
                trace!("unsupported ppp protocol {:#06x}", hdr.ppp_proto());
                Verdict::OutBad
            }
        }
    }

    fn tipc(&mut self) -> Verdict {
        let Some(raw) = self.window.get::<{ TipcHdr::LEN }>(self.nhoff) else {
            debug!("truncated tipc header");
            return Verdict::OutBad;
        };
        let hdr = TipcHdr::new(raw);
        if self.uses(KeyId::TipcAddrs) {
            let key = KeyTipcAddrs {
                srcnode: hdr.srcnode(),
            };
            self.write_key(KeyId::TipcAddrs, &key);
            self.addr_type = AddrType::Tipc;
        }
        Verdict::OutGood
    }

    fn mpls(&mut self) -> Verdict {
        if !self.uses(KeyId::MplsEntropy) && !self.uses(KeyId::Mpls) {
            return Verdict::OutGood;
        }

        let Some(raw) = self.window.get::<{ 2 * MplsEntry::LEN }>(self.nhoff) else {
            debug!("truncated mpls label stack");
            return Verdict::OutBad;
        };
        let entry = MplsEntry::new([raw[0], raw[1], raw[2], raw[3]]);
        let label = entry.label();

        if self.uses(KeyId::Mpls) {
            let key = KeyMpls {
                label,
                tc: entry.tc(),
                bos: entry.bos(),
                ttl: entry.ttl(),
            };
            self.write_key(KeyId::Mpls, &key);
        }

        if label == MPLS_LABEL_ENTROPY {
            // The entropy value is the label field of the entry below the
            // entropy label indicator, kept in wire order.
            let key = KeyKeyid {
                keyid: [raw[4], raw[5], raw[6] & 0xF0, 0],
            };
            self.write_key(KeyId::MplsEntropy, &key);
        }
        Verdict::OutGood
    }

    fn fcoe(&mut self) -> Verdict {
        if self.window.hlen() < self.nhoff + FCOE_HEADER_LEN {
            return Verdict::OutBad;
        }
        self.nhoff += FCOE_HEADER_LEN;
        Verdict::OutGood
    }

    fn arp(&mut self) -> Verdict {
        if !self.uses(KeyId::Arp) {
            return Verdict::OutGood;
        }

        let Some(raw) = self.window.get::<{ ArpHdr::LEN }>(self.nhoff) else {
            debug!("truncated arp header");
            return Verdict::OutBad;
        };
        let hdr = ArpHdr::new(raw);
        if !hdr.is_supported() {
            debug!("arp header is not an ethernet/ipv4 request or reply");
            return Verdict::OutBad;
        }

        let Some(raw) = self
            .window
            .get::<{ ArpEthBody::LEN }>(self.nhoff + ArpHdr::LEN)
        else {
            debug!("truncated arp body");
            return Verdict::OutBad;
        };
        let body = ArpEthBody::new(raw);

        #[allow(clippy::cast_possible_truncation)] // low byte only
        let key = KeyArp {
            sip: body.sip().into(),
            tip: body.tip().into(),
            op: (hdr.operation() & 0xFF) as u8,
            sha: body.sha(),
            tha: body.tha(),
        };
        self.write_key(KeyId::Arp, &key);
        Verdict::OutGood
    }

    fn batadv(&mut self) -> Verdict {
        let Some(raw) = self.window.get::<{ BatadvUnicastHdr::LEN }>(self.nhoff) else {
            debug!("truncated batman-adv header");
            return Verdict::OutBad;
        };
        let hdr = BatadvUnicastHdr::new(raw);
        if hdr.version() != BATADV_COMPAT_VERSION {
            debug!("unsupported batman-adv version {}", hdr.version());
            return Verdict::OutBad;
        }
        if hdr.packet_type() != BATADV_UNICAST {
            debug!("batman-adv packet type {:#04x} not unicast", hdr.packet_type());
            return Verdict::OutBad;
        }

        self.proto = hdr.inner_ethtype();
        self.nhoff += BatadvUnicastHdr::LEN;

        self.ctrl_flags |= ControlFlags::ENCAPSULATION;
        if self.flags.contains(DissectFlags::STOP_AT_ENCAP) {
            return Verdict::OutGood;
        }
        Verdict::ProtoAgain
    }

    fn gre(&mut self) -> Verdict {
        let Some(raw) = self.window.get::<{ GreBaseHdr::LEN }>(self.nhoff) else {
            debug!("truncated gre header");
            return Verdict::OutBad;
        };
        let hdr = GreBaseHdr::new(raw);

        // Only look inside GRE without routing, and only versions 0 and 1.
        if hdr.has_routing() {
            return Verdict::OutGood;
        }
        let version = hdr.version();
        if version > 1 {
            return Verdict::OutGood;
        }

        self.proto = hdr.protocol();
        if version == 1 && !(self.proto.raw() == GRE_PROTO_PPP && hdr.has_key()) {
            // Version 1 is only ever PPTP, which requires the key flag.
            return Verdict::OutGood;
        }

        let mut offset = GreBaseHdr::LEN;
        if hdr.has_csum() {
            offset += GreBaseHdr::OPT_LEN;
        }
        if hdr.has_key() {
            let Some(keyid) = self.window.get::<4>(self.nhoff + offset) else {
                debug!("truncated gre key field");
                return Verdict::OutBad;
            };
            if self.uses(KeyId::GreKeyid) {
                let keyid = if version == 0 {
                    keyid
                } else {
                    pptp_key_mask(keyid)
                };
                self.write_key(KeyId::GreKeyid, &KeyKeyid { keyid });
            }
            offset += GreBaseHdr::OPT_LEN;
        }
        if hdr.has_seq() {
            offset += GreBaseHdr::OPT_LEN;
        }

        if version == 0 {
            if self.proto.raw() == ethertype::TEB {
                let Some(raw) = self.window.get::<{ EthHdr::LEN }>(self.nhoff + offset) else {
                    debug!("truncated inner ethernet header");
                    return Verdict::OutBad;
                };
                self.proto = EthHdr::new(raw).ether_type();
                offset += EthHdr::LEN;
            }
        } else {
            if hdr.has_ack() {
                offset += GreBaseHdr::OPT_LEN;
            }
            let Some(raw) = self.window.get::<{ ppp::PPP_HDRLEN }>(self.nhoff + offset) else {
                debug!("truncated ppp header");
                return Verdict::OutBad;
            };
            // Could probably catch some more like MPLS here.
            if let Some(inner) = ppp::ethertype_for(u16::from_be_bytes([raw[2], raw[3]])) {
                self.proto = inner;
            }
            offset += ppp::PPP_HDRLEN;
        }

        self.nhoff += offset;
        self.ctrl_flags |= ControlFlags::ENCAPSULATION;
        if self.flags.contains(DissectFlags::STOP_AT_ENCAP) {
            return Verdict::OutGood;
        }
        Verdict::ProtoAgain
    }

    fn ipv6_ext(&mut self) -> Verdict {
        if self.proto != EthType::IPV6 {
            return Verdict::Continue;
        }

        let Some(raw) = self.window.get::<{ Ipv6ExtHdr::LEN }>(self.nhoff) else {
            debug!("truncated ipv6 extension header");
            return Verdict::OutBad;
        };
        let ext = Ipv6ExtHdr::new(raw);
        self.ip_proto = ext.next_header();
        self.nhoff += ext.header_len();
        Verdict::IpProtoAgain
    }

    fn ipv6_frag(&mut self) -> Verdict {
        if self.proto != EthType::IPV6 {
            return Verdict::Continue;
        }

        let Some(raw) = self.window.get::<{ Ipv6FragHdr::LEN }>(self.nhoff) else {
            debug!("truncated ipv6 fragment header");
            return Verdict::OutBad;
        };
        let fh = Ipv6FragHdr::new(raw);

        self.ctrl_flags |= ControlFlags::IS_FRAGMENT;
        self.nhoff += Ipv6FragHdr::LEN;
        self.ip_proto = fh.next_header();

        if !fh.offset_nonzero() {
            self.ctrl_flags |= ControlFlags::FIRST_FRAG;
            if self.flags.contains(DissectFlags::PARSE_1ST_FRAG) {
                return Verdict::IpProtoAgain;
            }
        }
        Verdict::OutGood
    }

    fn encap(&mut self, inner: EthType) -> Verdict {
        self.proto = inner;
        self.ctrl_flags |= ControlFlags::ENCAPSULATION;
        if self.flags.contains(DissectFlags::STOP_AT_ENCAP) {
            return Verdict::OutGood;
        }
        Verdict::ProtoAgain
    }

    fn tcp(&mut self) -> Verdict {
        if self.uses(KeyId::Tcp) {
            if let Some(raw) = self.window.get::<20>(self.nhoff) {
                let data_offset = usize::from(raw[12] >> 4) * 4;
                if data_offset >= 20 {
                    let flags = u16::from_be_bytes([raw[12], raw[13]]) & 0x0FFF;
                    self.write_key(KeyId::Tcp, &KeyTcp { flags });
                }
            }
        }
        Verdict::Continue
    }

    /// Runs after every pass through the IP-protocol switch: ports and
    /// ICMP type/code are latched at the current cursor whether or not
    /// the pass turns out to be the last.
    fn capture_ports_and_icmp(&mut self) {
        if self.uses(KeyId::Ports) && !self.ctrl_flags.contains(ControlFlags::IS_FRAGMENT) {
            let ports = ports_offset(self.ip_proto)
                .and_then(|poff| self.window.get::<{ KeyPorts::SIZE }>(self.nhoff + poff))
                .unwrap_or([0u8; KeyPorts::SIZE]);
            self.write_key(KeyId::Ports, &KeyPorts::read_from(&ports));
        }

        if self.uses(KeyId::Icmp) {
            let raw = self
                .window
                .get::<{ KeyIcmp::SIZE }>(self.nhoff)
                .unwrap_or([0u8; KeyIcmp::SIZE]);
            self.write_key(KeyId::Icmp, &KeyIcmp::read_from(&raw));
        }
    }
}

static FLOW_KEYS_DISSECTOR: OnceLock<Dissector> = OnceLock::new();
static FLOW_KEYS_DISSECTOR_SYMMETRIC: OnceLock<Dissector> = OnceLock::new();
static FLOW_KEYS_BUF_DISSECTOR: OnceLock<Dissector> = OnceLock::new();

/// The stock dissector extracting every key [`FlowKeys`] can hold.
pub fn flow_keys_dissector() -> &'static Dissector {
    FLOW_KEYS_DISSECTOR.get_or_init(|| {
        Dissector::new(&FlowKeys::KEYS, FlowKeys::SIZE).unwrap_or_else(|_| unreachable!())
    })
}

/// The stock dissector restricted to the direction-independent key set.
pub fn flow_keys_dissector_symmetric() -> &'static Dissector {
    FLOW_KEYS_DISSECTOR_SYMMETRIC.get_or_init(|| {
        Dissector::new(&FlowKeys::SYMMETRIC_KEYS, FlowKeys::SIZE)
            .unwrap_or_else(|_| unreachable!())
    })
}

/// The stock dissector extracting only the control and basic keys.
pub fn flow_keys_buf_dissector() -> &'static Dissector {
    FLOW_KEYS_BUF_DISSECTOR.get_or_init(|| {
        Dissector::new(&FlowKeys::BUF_KEYS, FlowKeys::SIZE).unwrap_or_else(|_| unreachable!())
    })
}
