// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Flow key identifiers, key value types and their byte encodings, and the
//! canonical [`FlowKeys`] aggregate.
//!
//! Every key type defines a fixed byte layout via [`KeyCodec`]. The
//! dissector writes keys into a caller aggregate at offsets supplied by the
//! descriptor table; [`FlowKeys`] is the stock aggregate whose layout keeps
//! the hashable fields contiguous.

use crate::dissect::DissectorKey;
use crate::eth::EthType;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Identifier of a key group the dissector can extract.
#[repr(u16)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyId {
    /// Transport offset, address-variant discriminant and control flags.
    Control = 0,
    /// Outermost network protocol and its payload protocol.
    Basic = 1,
    /// IPv4 source/destination pair.
    Ipv4Addrs = 2,
    /// IPv6 source/destination pair.
    Ipv6Addrs = 3,
    /// TIPC source node.
    TipcAddrs = 4,
    /// Transport source/destination ports.
    Ports = 5,
    /// ICMP type and code.
    Icmp = 6,
    /// Ethernet destination/source addresses.
    EthAddrs = 7,
    /// TCP flag word.
    Tcp = 8,
    /// IP TOS and TTL / hop limit.
    Ip = 9,
    /// VLAN id and priority.
    Vlan = 10,
    /// IPv6 flow label.
    FlowLabel = 11,
    /// GRE key field.
    GreKeyid = 12,
    /// Generic encapsulation key field.
    EncKeyid = 13,
    /// MPLS entropy label.
    MplsEntropy = 14,
    /// Top MPLS label stack entry.
    Mpls = 15,
    /// ARP operation, protocol and hardware addresses.
    Arp = 16,
}

impl KeyId {
    /// Number of key identifiers.
    pub const COUNT: usize = 17;

    pub(crate) fn bit(self) -> u32 {
        1 << (self as u32)
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }

    /// Size in bytes of this key's encoding in a target aggregate.
    #[must_use]
    pub fn size(self) -> usize {
        match self {
            KeyId::Control => KeyControl::SIZE,
            KeyId::Basic => KeyBasic::SIZE,
            KeyId::Ipv4Addrs => KeyIpv4Addrs::SIZE,
            KeyId::Ipv6Addrs => KeyIpv6Addrs::SIZE,
            KeyId::TipcAddrs => KeyTipcAddrs::SIZE,
            KeyId::Ports => KeyPorts::SIZE,
            KeyId::Icmp => KeyIcmp::SIZE,
            KeyId::EthAddrs => KeyEthAddrs::SIZE,
            KeyId::Tcp => KeyTcp::SIZE,
            KeyId::Ip => KeyIp::SIZE,
            KeyId::Vlan => KeyVlan::SIZE,
            KeyId::FlowLabel => KeyTags::SIZE,
            KeyId::GreKeyid | KeyId::EncKeyid | KeyId::MplsEntropy => KeyKeyid::SIZE,
            KeyId::Mpls => KeyMpls::SIZE,
            KeyId::Arp => KeyArp::SIZE,
        }
    }
}

/// The live address variant recorded in the control key.
///
/// `Unspecified` is the state of a pre-zeroed aggregate; the other values
/// are the address-carrying [`KeyId`]s.
#[repr(u16)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum AddrType {
    /// No address variant has been recorded.
    #[default]
    Unspecified = 0,
    /// [`KeyId::Ipv4Addrs`] is live.
    Ipv4 = KeyId::Ipv4Addrs as u16,
    /// [`KeyId::Ipv6Addrs`] is live.
    Ipv6 = KeyId::Ipv6Addrs as u16,
    /// [`KeyId::TipcAddrs`] is live.
    Tipc = KeyId::TipcAddrs as u16,
}

impl AddrType {
    fn from_raw(raw: u16) -> AddrType {
        match raw {
            x if x == AddrType::Ipv4 as u16 => AddrType::Ipv4,
            x if x == AddrType::Ipv6 as u16 => AddrType::Ipv6,
            x if x == AddrType::Tipc as u16 => AddrType::Tipc,
            _ => AddrType::Unspecified,
        }
    }
}

bitflags::bitflags! {
    /// Status bits recorded in the control key.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
    pub struct ControlFlags: u32 {
        /// The frame is a fragment.
        const IS_FRAGMENT = 1 << 0;
        /// The frame is the first fragment.
        const FIRST_FRAG = 1 << 1;
        /// An encapsulation boundary was crossed.
        const ENCAPSULATION = 1 << 2;
    }
}

/// Fixed byte encoding of a key value inside a target aggregate.
///
/// `write_to` / `read_from` operate on the first [`KeyCodec::SIZE`] bytes
/// of the supplied slice; the descriptor table guarantees the slice is
/// large enough before either is called.
pub trait KeyCodec: Sized {
    /// Encoded size in bytes.
    const SIZE: usize;

    /// Encode into `buf[..Self::SIZE]`.
    fn write_to(&self, buf: &mut [u8]);

    /// Decode from `buf[..Self::SIZE]`.
    fn read_from(buf: &[u8]) -> Self;
}

/// The control key: transport offset, address variant, status flags.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct KeyControl {
    /// Offset of the transport header from the start of the frame.
    pub thoff: u16,
    /// Which address key variant is live.
    pub addr_type: AddrType,
    /// Status bits.
    pub flags: ControlFlags,
}

impl KeyCodec for KeyControl {
    const SIZE: usize = 8;

    fn write_to(&self, buf: &mut [u8]) {
        buf[0..2].copy_from_slice(&self.thoff.to_ne_bytes());
        buf[2..4].copy_from_slice(&(self.addr_type as u16).to_ne_bytes());
        buf[4..8].copy_from_slice(&self.flags.bits().to_ne_bytes());
    }

    fn read_from(buf: &[u8]) -> KeyControl {
        KeyControl {
            thoff: u16::from_ne_bytes([buf[0], buf[1]]),
            addr_type: AddrType::from_raw(u16::from_ne_bytes([buf[2], buf[3]])),
            flags: ControlFlags::from_bits_retain(u32::from_ne_bytes([
                buf[4], buf[5], buf[6], buf[7],
            ])),
        }
    }
}

/// The basic key: outermost network protocol and its payload protocol.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct KeyBasic {
    /// Outermost network-layer protocol reached.
    pub n_proto: EthType,
    /// IP payload protocol code.
    pub ip_proto: u8,
}

impl KeyCodec for KeyBasic {
    const SIZE: usize = 4;

    fn write_to(&self, buf: &mut [u8]) {
        buf[0..2].copy_from_slice(&self.n_proto.raw().to_be_bytes());
        buf[2] = self.ip_proto;
        buf[3] = 0;
    }

    fn read_from(buf: &[u8]) -> KeyBasic {
        KeyBasic {
            n_proto: EthType::new_from_be_bytes([buf[0], buf[1]]),
            ip_proto: buf[2],
        }
    }
}

/// IPv4 source and destination addresses.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct KeyIpv4Addrs {
    /// Source address.
    pub src: Ipv4Addr,
    /// Destination address.
    pub dst: Ipv4Addr,
}

impl KeyCodec for KeyIpv4Addrs {
    const SIZE: usize = 8;

    fn write_to(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.src.octets());
        buf[4..8].copy_from_slice(&self.dst.octets());
    }

    fn read_from(buf: &[u8]) -> KeyIpv4Addrs {
        KeyIpv4Addrs {
            src: Ipv4Addr::new(buf[0], buf[1], buf[2], buf[3]),
            dst: Ipv4Addr::new(buf[4], buf[5], buf[6], buf[7]),
        }
    }
}

/// IPv6 source and destination addresses.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct KeyIpv6Addrs {
    /// Source address.
    pub src: Ipv6Addr,
    /// Destination address.
    pub dst: Ipv6Addr,
}

impl KeyCodec for KeyIpv6Addrs {
    const SIZE: usize = 32;

    fn write_to(&self, buf: &mut [u8]) {
        buf[0..16].copy_from_slice(&self.src.octets());
        buf[16..32].copy_from_slice(&self.dst.octets());
    }

    fn read_from(buf: &[u8]) -> KeyIpv6Addrs {
        let mut src = [0u8; 16];
        let mut dst = [0u8; 16];
        src.copy_from_slice(&buf[0..16]);
        dst.copy_from_slice(&buf[16..32]);
        KeyIpv6Addrs {
            src: Ipv6Addr::from(src),
            dst: Ipv6Addr::from(dst),
        }
    }
}

/// TIPC source node.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct KeyTipcAddrs {
    /// The source node identifier.
    pub srcnode: u32,
}

impl KeyCodec for KeyTipcAddrs {
    const SIZE: usize = 4;

    fn write_to(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.srcnode.to_be_bytes());
    }

    fn read_from(buf: &[u8]) -> KeyTipcAddrs {
        KeyTipcAddrs {
            srcnode: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
        }
    }
}

/// Transport source and destination ports.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct KeyPorts {
    /// Source port.
    pub src: u16,
    /// Destination port.
    pub dst: u16,
}

impl KeyCodec for KeyPorts {
    const SIZE: usize = 4;

    fn write_to(&self, buf: &mut [u8]) {
        buf[0..2].copy_from_slice(&self.src.to_be_bytes());
        buf[2..4].copy_from_slice(&self.dst.to_be_bytes());
    }

    fn read_from(buf: &[u8]) -> KeyPorts {
        KeyPorts {
            src: u16::from_be_bytes([buf[0], buf[1]]),
            dst: u16::from_be_bytes([buf[2], buf[3]]),
        }
    }
}

/// ICMP type and code.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct KeyIcmp {
    /// ICMP message type.
    pub icmp_type: u8,
    /// ICMP message code.
    pub code: u8,
}

impl KeyCodec for KeyIcmp {
    const SIZE: usize = 2;

    fn write_to(&self, buf: &mut [u8]) {
        buf[0] = self.icmp_type;
        buf[1] = self.code;
    }

    fn read_from(buf: &[u8]) -> KeyIcmp {
        KeyIcmp {
            icmp_type: buf[0],
            code: buf[1],
        }
    }
}

/// Ethernet destination and source addresses, in wire order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct KeyEthAddrs {
    /// Destination MAC.
    pub dst: [u8; 6],
    /// Source MAC.
    pub src: [u8; 6],
}

impl KeyCodec for KeyEthAddrs {
    const SIZE: usize = 12;

    fn write_to(&self, buf: &mut [u8]) {
        buf[0..6].copy_from_slice(&self.dst);
        buf[6..12].copy_from_slice(&self.src);
    }

    fn read_from(buf: &[u8]) -> KeyEthAddrs {
        let mut key = KeyEthAddrs::default();
        key.dst.copy_from_slice(&buf[0..6]);
        key.src.copy_from_slice(&buf[6..12]);
        key
    }
}

/// The 12 reserved+flag bits of the TCP header.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct KeyTcp {
    /// Flag word, masked to its low 12 bits.
    pub flags: u16,
}

impl KeyCodec for KeyTcp {
    const SIZE: usize = 2;

    fn write_to(&self, buf: &mut [u8]) {
        buf[0..2].copy_from_slice(&self.flags.to_ne_bytes());
    }

    fn read_from(buf: &[u8]) -> KeyTcp {
        KeyTcp {
            flags: u16::from_ne_bytes([buf[0], buf[1]]),
        }
    }
}

/// IP TOS and TTL (hop limit for IPv6).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct KeyIp {
    /// Type-of-service / traffic-class byte.
    pub tos: u8,
    /// TTL or hop limit.
    pub ttl: u8,
}

impl KeyCodec for KeyIp {
    const SIZE: usize = 2;

    fn write_to(&self, buf: &mut [u8]) {
        buf[0] = self.tos;
        buf[1] = self.ttl;
    }

    fn read_from(buf: &[u8]) -> KeyIp {
        KeyIp {
            tos: buf[0],
            ttl: buf[1],
        }
    }
}

/// VLAN id and priority.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct KeyVlan {
    /// 12-bit VLAN identifier.
    pub id: u16,
    /// 3-bit priority code point.
    pub priority: u8,
}

impl KeyCodec for KeyVlan {
    const SIZE: usize = 4;

    fn write_to(&self, buf: &mut [u8]) {
        let word = (self.id & 0x0FFF) | (u16::from(self.priority) << 12);
        buf[0..2].copy_from_slice(&word.to_ne_bytes());
        buf[2] = 0;
        buf[3] = 0;
    }

    #[allow(clippy::cast_possible_truncation)] // 3-bit field
    fn read_from(buf: &[u8]) -> KeyVlan {
        let word = u16::from_ne_bytes([buf[0], buf[1]]);
        KeyVlan {
            id: word & 0x0FFF,
            priority: (word >> 12) as u8,
        }
    }
}

/// Tag-like keys; currently only the IPv6 flow label.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct KeyTags {
    /// The 20-bit flow label, in host order.
    pub flow_label: u32,
}

impl KeyCodec for KeyTags {
    const SIZE: usize = 4;

    fn write_to(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.flow_label.to_ne_bytes());
    }

    fn read_from(buf: &[u8]) -> KeyTags {
        KeyTags {
            flow_label: u32::from_ne_bytes([buf[0], buf[1], buf[2], buf[3]]),
        }
    }
}

/// An opaque 32-bit key identifier carried in wire order (GRE key,
/// encapsulation key, MPLS entropy label).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct KeyKeyid {
    /// The key field, as it appeared on the wire.
    pub keyid: [u8; 4],
}

impl KeyCodec for KeyKeyid {
    const SIZE: usize = 4;

    fn write_to(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.keyid);
    }

    fn read_from(buf: &[u8]) -> KeyKeyid {
        KeyKeyid {
            keyid: [buf[0], buf[1], buf[2], buf[3]],
        }
    }
}

/// Fields of the top MPLS label stack entry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct KeyMpls {
    /// 20-bit label.
    pub label: u32,
    /// 3-bit traffic class.
    pub tc: u8,
    /// Bottom-of-stack bit.
    pub bos: bool,
    /// Time to live.
    pub ttl: u8,
}

impl KeyCodec for KeyMpls {
    const SIZE: usize = 4;

    fn write_to(&self, buf: &mut [u8]) {
        let word = u32::from(self.ttl)
            | (u32::from(self.bos) << 8)
            | (u32::from(self.tc & 0x07) << 9)
            | ((self.label & 0x000F_FFFF) << 12);
        buf[0..4].copy_from_slice(&word.to_ne_bytes());
    }

    #[allow(clippy::cast_possible_truncation)] // 8- and 3-bit fields
    fn read_from(buf: &[u8]) -> KeyMpls {
        let word = u32::from_ne_bytes([buf[0], buf[1], buf[2], buf[3]]);
        KeyMpls {
            label: word >> 12,
            tc: ((word >> 9) & 0x07) as u8,
            bos: (word >> 8) & 1 == 1,
            ttl: (word & 0xFF) as u8,
        }
    }
}

/// ARP operation, protocol addresses and hardware addresses.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct KeyArp {
    /// Sender protocol address.
    pub sip: Ipv4Addr,
    /// Target protocol address.
    pub tip: Ipv4Addr,
    /// Low byte of the operation code.
    pub op: u8,
    /// Sender hardware address.
    pub sha: [u8; 6],
    /// Target hardware address.
    pub tha: [u8; 6],
}

impl KeyCodec for KeyArp {
    const SIZE: usize = 21;

    fn write_to(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.sip.octets());
        buf[4..8].copy_from_slice(&self.tip.octets());
        buf[8] = self.op;
        buf[9..15].copy_from_slice(&self.sha);
        buf[15..21].copy_from_slice(&self.tha);
    }

    fn read_from(buf: &[u8]) -> KeyArp {
        let mut sha = [0u8; 6];
        let mut tha = [0u8; 6];
        sha.copy_from_slice(&buf[9..15]);
        tha.copy_from_slice(&buf[15..21]);
        KeyArp {
            sip: Ipv4Addr::new(buf[0], buf[1], buf[2], buf[3]),
            tip: Ipv4Addr::new(buf[4], buf[5], buf[6], buf[7]),
            op: buf[8],
            sha,
            tha,
        }
    }
}

/// The canonical flow-keys aggregate.
///
/// Layout keeps the hashable fields contiguous: `basic` through the live
/// address variant form the byte range fed to the flow hasher. The address
/// slot is a union-style region sized for the largest variant; which bytes
/// are live is recorded in `control.addr_type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowKeys([u8; FlowKeys::SIZE]);

impl FlowKeys {
    /// Offset of the control key.
    pub const CONTROL: usize = 0;
    /// Offset of the basic key. Start of the hashable prefix.
    pub const BASIC: usize = 8;
    /// Offset of the tags (flow label) key.
    pub const TAGS: usize = 12;
    /// Offset of the VLAN key.
    pub const VLAN: usize = 16;
    /// Offset of the keyid key.
    pub const KEYID: usize = 20;
    /// Offset of the ports key.
    pub const PORTS: usize = 24;
    /// Offset of the address region.
    pub const ADDRS: usize = 28;
    /// Total size in bytes.
    pub const SIZE: usize = FlowKeys::ADDRS + KeyIpv6Addrs::SIZE;

    /// Keys of the stock full dissector.
    pub const KEYS: [DissectorKey; 9] = [
        DissectorKey::new(KeyId::Control, FlowKeys::CONTROL),
        DissectorKey::new(KeyId::Basic, FlowKeys::BASIC),
        DissectorKey::new(KeyId::Ipv4Addrs, FlowKeys::ADDRS),
        DissectorKey::new(KeyId::Ipv6Addrs, FlowKeys::ADDRS),
        DissectorKey::new(KeyId::TipcAddrs, FlowKeys::ADDRS),
        DissectorKey::new(KeyId::Ports, FlowKeys::PORTS),
        DissectorKey::new(KeyId::Vlan, FlowKeys::VLAN),
        DissectorKey::new(KeyId::FlowLabel, FlowKeys::TAGS),
        DissectorKey::new(KeyId::GreKeyid, FlowKeys::KEYID),
    ];

    /// Keys of the stock symmetric dissector.
    pub const SYMMETRIC_KEYS: [DissectorKey; 5] = [
        DissectorKey::new(KeyId::Control, FlowKeys::CONTROL),
        DissectorKey::new(KeyId::Basic, FlowKeys::BASIC),
        DissectorKey::new(KeyId::Ipv4Addrs, FlowKeys::ADDRS),
        DissectorKey::new(KeyId::Ipv6Addrs, FlowKeys::ADDRS),
        DissectorKey::new(KeyId::Ports, FlowKeys::PORTS),
    ];

    /// Keys of the stock control/basic-only dissector.
    pub const BUF_KEYS: [DissectorKey; 2] = [
        DissectorKey::new(KeyId::Control, FlowKeys::CONTROL),
        DissectorKey::new(KeyId::Basic, FlowKeys::BASIC),
    ];

    /// A zeroed aggregate, ready to be dissected into.
    #[must_use]
    pub fn new() -> FlowKeys {
        FlowKeys([0u8; FlowKeys::SIZE])
    }

    /// The raw bytes of the aggregate.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The raw bytes of the aggregate, mutably. This is the target slice
    /// to hand to a dissector built from [`FlowKeys::KEYS`].
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }

    /// The control key.
    #[must_use]
    pub fn control(&self) -> KeyControl {
        KeyControl::read_from(&self.0[FlowKeys::CONTROL..])
    }

    /// Replace the control key.
    pub fn set_control(&mut self, control: KeyControl) {
        control.write_to(&mut self.0[FlowKeys::CONTROL..]);
    }

    /// The basic key.
    #[must_use]
    pub fn basic(&self) -> KeyBasic {
        KeyBasic::read_from(&self.0[FlowKeys::BASIC..])
    }

    /// Replace the basic key.
    pub fn set_basic(&mut self, basic: KeyBasic) {
        basic.write_to(&mut self.0[FlowKeys::BASIC..]);
    }

    /// The tags key.
    #[must_use]
    pub fn tags(&self) -> KeyTags {
        KeyTags::read_from(&self.0[FlowKeys::TAGS..])
    }

    /// The VLAN key.
    #[must_use]
    pub fn vlan(&self) -> KeyVlan {
        KeyVlan::read_from(&self.0[FlowKeys::VLAN..])
    }

    /// The keyid key.
    #[must_use]
    pub fn keyid(&self) -> KeyKeyid {
        KeyKeyid::read_from(&self.0[FlowKeys::KEYID..])
    }

    /// Replace the keyid key.
    pub fn set_keyid(&mut self, keyid: KeyKeyid) {
        keyid.write_to(&mut self.0[FlowKeys::KEYID..]);
    }

    /// The ports key.
    #[must_use]
    pub fn ports(&self) -> KeyPorts {
        KeyPorts::read_from(&self.0[FlowKeys::PORTS..])
    }

    /// Replace the ports key.
    pub fn set_ports(&mut self, ports: KeyPorts) {
        ports.write_to(&mut self.0[FlowKeys::PORTS..]);
    }

    /// The IPv4 address pair. Meaningful when `addr_type` is
    /// [`AddrType::Ipv4`].
    #[must_use]
    pub fn v4addrs(&self) -> KeyIpv4Addrs {
        KeyIpv4Addrs::read_from(&self.0[FlowKeys::ADDRS..])
    }

    /// Record an IPv4 address pair and mark the variant live.
    pub fn set_v4addrs(&mut self, addrs: KeyIpv4Addrs) {
        addrs.write_to(&mut self.0[FlowKeys::ADDRS..]);
        let mut control = self.control();
        control.addr_type = AddrType::Ipv4;
        self.set_control(control);
    }

    /// The IPv6 address pair. Meaningful when `addr_type` is
    /// [`AddrType::Ipv6`].
    #[must_use]
    pub fn v6addrs(&self) -> KeyIpv6Addrs {
        KeyIpv6Addrs::read_from(&self.0[FlowKeys::ADDRS..])
    }

    /// Record an IPv6 address pair and mark the variant live.
    pub fn set_v6addrs(&mut self, addrs: KeyIpv6Addrs) {
        addrs.write_to(&mut self.0[FlowKeys::ADDRS..]);
        let mut control = self.control();
        control.addr_type = AddrType::Ipv6;
        self.set_control(control);
    }

    /// The TIPC address. Meaningful when `addr_type` is [`AddrType::Tipc`].
    #[must_use]
    pub fn tipc(&self) -> KeyTipcAddrs {
        KeyTipcAddrs::read_from(&self.0[FlowKeys::ADDRS..])
    }

    /// Which address variant is live.
    #[must_use]
    pub fn addr_type(&self) -> AddrType {
        self.control().addr_type
    }

    /// Collapse the live source address to 32 bits.
    ///
    /// IPv4 yields the address itself, IPv6 an xor-fold of its four words,
    /// TIPC the source node.
    #[must_use]
    pub fn src_u32(&self) -> u32 {
        match self.addr_type() {
            AddrType::Ipv4 => u32::from(self.v4addrs().src),
            AddrType::Ipv6 => ipv6_addr_fold(self.v6addrs().src),
            AddrType::Tipc => self.tipc().srcnode,
            AddrType::Unspecified => 0,
        }
    }

    /// Collapse the live destination address to 32 bits.
    #[must_use]
    pub fn dst_u32(&self) -> u32 {
        match self.addr_type() {
            AddrType::Ipv4 => u32::from(self.v4addrs().dst),
            AddrType::Ipv6 => ipv6_addr_fold(self.v6addrs().dst),
            AddrType::Tipc | AddrType::Unspecified => 0,
        }
    }

    /// True when the keys cover transport-level entropy (nonzero ports or
    /// a nonzero flow label).
    #[must_use]
    pub fn has_l4(&self) -> bool {
        let ports = self.ports();
        ports.src != 0 || ports.dst != 0 || self.tags().flow_label != 0
    }

    /// Length of the hashable prefix, which starts at [`FlowKeys::BASIC`]
    /// and runs through the live address variant.
    #[must_use]
    pub fn hash_len(&self) -> usize {
        let base = FlowKeys::ADDRS - FlowKeys::BASIC;
        base + match self.addr_type() {
            AddrType::Ipv4 => KeyIpv4Addrs::SIZE,
            AddrType::Ipv6 => KeyIpv6Addrs::SIZE,
            AddrType::Tipc => KeyTipcAddrs::SIZE,
            AddrType::Unspecified => 0,
        }
    }

    /// The hashable prefix.
    #[must_use]
    pub fn hash_bytes(&self) -> &[u8] {
        &self.0[FlowKeys::BASIC..FlowKeys::BASIC + self.hash_len()]
    }
}

impl Default for FlowKeys {
    fn default() -> FlowKeys {
        FlowKeys::new()
    }
}

fn ipv6_addr_fold(addr: Ipv6Addr) -> u32 {
    let octets = addr.octets();
    let mut folded = 0u32;
    for word in octets.chunks_exact(4) {
        folded ^= u32::from_be_bytes([word[0], word[1], word[2], word[3]]);
    }
    folded
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod test {
    use super::*;

    #[test]
    fn layout() {
        assert_eq!(FlowKeys::SIZE, 60);
        assert_eq!(FlowKeys::ADDRS - FlowKeys::BASIC, 20);
        // The hashable prefix must start on SipHash's native alignment.
        assert_eq!(FlowKeys::BASIC % 8, 0);
    }

    #[test]
    fn control_roundtrip() {
        let control = KeyControl {
            thoff: 54,
            addr_type: AddrType::Ipv6,
            flags: ControlFlags::IS_FRAGMENT | ControlFlags::FIRST_FRAG,
        };
        let mut buf = [0u8; KeyControl::SIZE];
        control.write_to(&mut buf);
        assert_eq!(KeyControl::read_from(&buf), control);
    }

    #[test]
    fn vlan_word_packing() {
        let key = KeyVlan { id: 100, priority: 5 };
        let mut buf = [0u8; KeyVlan::SIZE];
        key.write_to(&mut buf);
        let word = u16::from_ne_bytes([buf[0], buf[1]]);
        assert_eq!(word & 0x0FFF, 100);
        assert_eq!(word >> 12, 5);
        assert_eq!(KeyVlan::read_from(&buf), key);
    }

    #[test]
    fn mpls_word_packing() {
        let key = KeyMpls {
            label: 0xABCDE,
            tc: 3,
            bos: true,
            ttl: 64,
        };
        let mut buf = [0u8; KeyMpls::SIZE];
        key.write_to(&mut buf);
        assert_eq!(KeyMpls::read_from(&buf), key);
    }

    #[test]
    fn hash_len_follows_addr_type() {
        let mut keys = FlowKeys::new();
        assert_eq!(keys.hash_len(), 20);
        keys.set_v4addrs(KeyIpv4Addrs {
            src: Ipv4Addr::new(10, 0, 0, 1),
            dst: Ipv4Addr::new(10, 0, 0, 2),
        });
        assert_eq!(keys.hash_len(), 28);
        keys.set_v6addrs(KeyIpv6Addrs {
            src: Ipv6Addr::LOCALHOST,
            dst: Ipv6Addr::LOCALHOST,
        });
        assert_eq!(keys.hash_len(), 52);

        let mut control = keys.control();
        control.addr_type = AddrType::Tipc;
        keys.set_control(control);
        assert_eq!(keys.hash_len(), 24);
    }

    #[test]
    fn src_u32_folds_v6() {
        let mut keys = FlowKeys::new();
        keys.set_v6addrs(KeyIpv6Addrs {
            src: Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1),
            dst: Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 2),
        });
        let expected = 0x2001_0db8_u32 ^ 0 ^ 0 ^ 1;
        assert_eq!(keys.src_u32(), expected);
        assert_eq!(keys.dst_u32(), 0x2001_0db8_u32 ^ 2);
    }
}
