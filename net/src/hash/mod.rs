// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Flow hashing: canonicalization, the keyed SipHash-2-4 over the
//! hashable prefix of a [`FlowKeys`], and the compact digest.
//!
//! The process-wide secret is drawn from a cryptographic RNG exactly once
//! and published through a [`OnceLock`]; it is never reseeded, since a
//! change would silently re-steer every flow in the system.

use crate::buffer::Frame;
use crate::dissect::{DissectFlags, flow_keys_dissector, flow_keys_dissector_symmetric};
use crate::keys::{AddrType, FlowKeys, KeyBasic, KeyIpv4Addrs, KeyIpv6Addrs, KeyPorts};
use rand::Rng;
use siphasher::sip::SipHasher24;
use static_assertions::const_assert;
use static_assertions::const_assert_eq;
use std::hash::Hasher;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::OnceLock;

// The hashable prefix must start on SipHash's native word alignment.
const_assert_eq!(FlowKeys::BASIC % 8, 0);

/// A 128-bit SipHash key.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SipKey {
    /// First half of the key.
    pub k0: u64,
    /// Second half of the key.
    pub k1: u64,
}

static HASH_SECRET: OnceLock<SipKey> = OnceLock::new();

fn hash_secret() -> &'static SipKey {
    HASH_SECRET.get_or_init(|| {
        let mut rng = rand::rng();
        SipKey {
            k0: rng.random(),
            k1: rng.random(),
        }
    })
}

fn siphash_u32(bytes: &[u8], key: &SipKey) -> u32 {
    let mut hasher = SipHasher24::new_with_keys(key.k0, key.k1);
    hasher.write(bytes);
    #[allow(clippy::cast_possible_truncation)] // 32-bit truncation is the contract
    let hash = hasher.finish() as u32;
    hash
}

/// Canonicalize `keys` so that a flow and its reverse hash identically.
///
/// The (src, dst) pair is sorted: addresses compare as host-order numbers
/// (IPv4) or as their 16 raw bytes (IPv6), with ports breaking ties. Both
/// addresses and ports swap together or not at all.
pub(crate) fn consistentify(keys: &mut FlowKeys) {
    let ports = keys.ports();
    let swap_ports = |keys: &mut FlowKeys| {
        keys.set_ports(KeyPorts {
            src: ports.dst,
            dst: ports.src,
        });
    };

    match keys.addr_type() {
        AddrType::Ipv4 => {
            let addrs = keys.v4addrs();
            let (src, dst) = (u32::from(addrs.src), u32::from(addrs.dst));
            if dst < src || (dst == src && ports.dst < ports.src) {
                keys.set_v4addrs(KeyIpv4Addrs {
                    src: addrs.dst,
                    dst: addrs.src,
                });
                swap_ports(keys);
            }
        }
        AddrType::Ipv6 => {
            let addrs = keys.v6addrs();
            let (src, dst) = (addrs.src.octets(), addrs.dst.octets());
            if dst < src || (dst == src && ports.dst < ports.src) {
                keys.set_v6addrs(KeyIpv6Addrs {
                    src: addrs.dst,
                    dst: addrs.src,
                });
                swap_ports(keys);
            }
        }
        AddrType::Tipc | AddrType::Unspecified => {}
    }
}

fn nonzero(hash: u32) -> u32 {
    // Zero is reserved to mean "no hash".
    if hash == 0 { 1 } else { hash }
}

fn hash_canonical(keys: &mut FlowKeys, key: &SipKey) -> u32 {
    consistentify(keys);
    nonzero(siphash_u32(keys.hash_bytes(), key))
}

fn hash_plain(keys: &FlowKeys, key: &SipKey) -> u32 {
    nonzero(siphash_u32(keys.hash_bytes(), key))
}

/// Hash a completed flow-keys aggregate with the process-wide secret.
///
/// Canonicalizes `keys` in place first, so a flow and its reverse produce
/// the same value. Never returns 0.
pub fn hash_from_keys(keys: &mut FlowKeys) -> u32 {
    hash_canonical(keys, hash_secret())
}

/// Dissect `frame` with the stock dissector and hash the result.
///
/// Direction-sensitive: the keys are hashed as dissected, so the forward
/// and reverse halves of a flow get distinct values. Dissection runs with
/// [`DissectFlags::STOP_AT_FLOW_LABEL`]: a nonzero IPv6 flow label
/// already carries the flow's entropy, so deeper parsing would only cost
/// cycles.
pub fn hash_frame<F: Frame + ?Sized>(frame: &F) -> u32 {
    hash_frame_l4(frame).0
}

/// Like [`hash_frame`], also reporting whether the hash covered
/// transport-level entropy (ports or a flow label).
pub fn hash_frame_l4<F: Frame + ?Sized>(frame: &F) -> (u32, bool) {
    let mut keys = FlowKeys::new();
    flow_keys_dissector().dissect(
        frame,
        keys.as_bytes_mut(),
        DissectFlags::STOP_AT_FLOW_LABEL,
    );
    (hash_plain(&keys, hash_secret()), keys.has_l4())
}

/// Hash `frame` over the direction-independent key set, canonicalized, so
/// that both ends of a link compute the same value for a flow and its
/// reverse.
pub fn hash_frame_symmetric<F: Frame + ?Sized>(frame: &F) -> u32 {
    let mut keys = FlowKeys::new();
    flow_keys_dissector_symmetric().dissect(
        frame,
        keys.as_bytes_mut(),
        DissectFlags::STOP_AT_FLOW_LABEL,
    );
    hash_canonical(&mut keys, hash_secret())
}

/// Hash `frame` with a caller-supplied key instead of the process-wide
/// secret, for consumers that need their own hash domain.
pub fn hash_frame_perturb<F: Frame + ?Sized>(frame: &F, key: &SipKey) -> u32 {
    let mut keys = FlowKeys::new();
    flow_keys_dissector().dissect(
        frame,
        keys.as_bytes_mut(),
        DissectFlags::STOP_AT_FLOW_LABEL,
    );
    hash_plain(&keys, key)
}

/// Seed a [`FlowKeys`] from an IPv4 tuple and hash it, producing the same
/// value a dissected frame with this tuple would.
pub fn hash_from_v4_tuple(
    src: Ipv4Addr,
    dst: Ipv4Addr,
    ports: (u16, u16),
    ip_proto: u8,
) -> u32 {
    let mut keys = FlowKeys::new();
    keys.set_v4addrs(KeyIpv4Addrs { src, dst });
    keys.set_ports(KeyPorts {
        src: ports.0,
        dst: ports.1,
    });
    keys.set_basic(KeyBasic {
        n_proto: crate::eth::EthType::IPV4,
        ip_proto,
    });
    hash_from_keys(&mut keys)
}

/// Seed a [`FlowKeys`] from an IPv6 tuple and hash it.
pub fn hash_from_v6_tuple(
    src: Ipv6Addr,
    dst: Ipv6Addr,
    ports: (u16, u16),
    ip_proto: u8,
) -> u32 {
    let mut keys = FlowKeys::new();
    keys.set_v6addrs(KeyIpv6Addrs { src, dst });
    keys.set_ports(KeyPorts {
        src: ports.0,
        dst: ports.1,
    });
    keys.set_basic(KeyBasic {
        n_proto: crate::eth::EthType::IPV6,
        ip_proto,
    });
    hash_from_keys(&mut keys)
}

const DIGEST_DATA_LEN: usize = 16;

/// A compact 16-byte flow fingerprint for callers that want a short,
/// stable identifier rather than a hash: network protocol, IP protocol,
/// ports, and the first 8 address bytes, all in wire order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct FlowKeysDigest(pub [u8; DIGEST_DATA_LEN]);

// The digest fields must fit the digest container.
const_assert!(DIGEST_DATA_LEN <= size_of::<FlowKeysDigest>());

/// Fill a digest from dissected `keys`.
#[must_use]
pub fn make_digest(keys: &FlowKeys) -> FlowKeysDigest {
    let mut digest = FlowKeysDigest::default();
    let basic = keys.basic();
    let ports = keys.ports();
    let addrs = keys.v4addrs();
    digest.0[0..2].copy_from_slice(&basic.n_proto.raw().to_be_bytes());
    digest.0[2] = basic.ip_proto;
    digest.0[4..6].copy_from_slice(&ports.src.to_be_bytes());
    digest.0[6..8].copy_from_slice(&ports.dst.to_be_bytes());
    digest.0[8..12].copy_from_slice(&addrs.src.octets());
    digest.0[12..16].copy_from_slice(&addrs.dst.octets());
    digest
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod test {
    use super::*;
    use crate::keys::{ControlFlags, KeyControl};
    use crate::test_utils::*;
    use crate::transport::proto;

    #[test]
    fn symmetric_hash_is_direction_independent() {
        let forward = ipv4_tcp_frame("10.0.0.1", "10.0.0.2", 1111, 80);
        let reverse = ipv4_tcp_frame("10.0.0.2", "10.0.0.1", 80, 1111);
        assert_eq!(
            hash_frame_symmetric(&forward),
            hash_frame_symmetric(&reverse)
        );
        // the plain hash is direction-sensitive
        assert_ne!(hash_frame(&forward), hash_frame(&reverse));
    }

    #[test]
    fn symmetric_hash_v6() {
        let forward = ipv6_tcp_frame("2001:db8::1", "2001:db8::2", 1111, 443);
        let reverse = ipv6_tcp_frame("2001:db8::2", "2001:db8::1", 443, 1111);
        assert_eq!(
            hash_frame_symmetric(&forward),
            hash_frame_symmetric(&reverse)
        );
    }

    #[test]
    fn hash_is_deterministic() {
        let frame = ipv4_udp_frame("10.0.0.1", "10.0.0.2", 5000, 53);
        assert_eq!(hash_frame(&frame), hash_frame(&frame));

        let key = SipKey { k0: 7, k1: 9 };
        assert_eq!(
            hash_frame_perturb(&frame, &key),
            hash_frame_perturb(&frame, &key)
        );
        // a different key lands in a different hash domain
        let other = SipKey { k0: 8, k1: 9 };
        assert_ne!(
            hash_frame_perturb(&frame, &key),
            hash_frame_perturb(&frame, &other)
        );
    }

    #[test]
    fn hash_never_returns_zero() {
        let mut keys = FlowKeys::new();
        assert_ne!(hash_from_keys(&mut keys), 0);
    }

    #[test]
    fn consistentify_sorts_v4_pair() {
        let mut keys = FlowKeys::new();
        keys.set_v4addrs(KeyIpv4Addrs {
            src: addr_v4("10.0.0.2"),
            dst: addr_v4("10.0.0.1"),
        });
        keys.set_ports(KeyPorts { src: 80, dst: 1111 });
        consistentify(&mut keys);
        assert_eq!(keys.v4addrs().src, addr_v4("10.0.0.1"));
        assert_eq!(keys.v4addrs().dst, addr_v4("10.0.0.2"));
        assert_eq!(keys.ports().src, 1111);
        assert_eq!(keys.ports().dst, 80);

        // already sorted: untouched
        consistentify(&mut keys);
        assert_eq!(keys.v4addrs().src, addr_v4("10.0.0.1"));
        assert_eq!(keys.ports().src, 1111);
    }

    #[test]
    fn consistentify_breaks_ties_on_ports() {
        let mut keys = FlowKeys::new();
        keys.set_v4addrs(KeyIpv4Addrs {
            src: addr_v4("10.0.0.1"),
            dst: addr_v4("10.0.0.1"),
        });
        keys.set_ports(KeyPorts { src: 9000, dst: 80 });
        consistentify(&mut keys);
        assert_eq!(keys.ports().src, 80);
        assert_eq!(keys.ports().dst, 9000);
    }

    #[test]
    fn consistentify_sorts_v6_bytes() {
        let mut keys = FlowKeys::new();
        keys.set_v6addrs(KeyIpv6Addrs {
            src: addr_v6("2001:db8::ff"),
            dst: addr_v6("2001:db8::1"),
        });
        keys.set_ports(KeyPorts { src: 1, dst: 2 });
        consistentify(&mut keys);
        assert_eq!(keys.v6addrs().src, addr_v6("2001:db8::1"));
        assert_eq!(keys.v6addrs().dst, addr_v6("2001:db8::ff"));
        assert_eq!(keys.ports().src, 2);
    }

    #[test]
    fn tuple_hash_matches_symmetric_frame_hash() {
        // seeding a tuple must land in the same bucket as dissecting a
        // frame that carries it
        let frame = ipv4_udp_frame("10.0.0.1", "10.0.0.2", 5000, 53);
        let from_tuple = hash_from_v4_tuple(
            addr_v4("10.0.0.1"),
            addr_v4("10.0.0.2"),
            (5000, 53),
            proto::UDP,
        );
        assert_eq!(hash_frame_symmetric(&frame), from_tuple);

        let frame = ipv6_tcp_frame("2001:db8::1", "2001:db8::2", 1111, 443);
        let from_tuple = hash_from_v6_tuple(
            addr_v6("2001:db8::1"),
            addr_v6("2001:db8::2"),
            (1111, 443),
            proto::TCP,
        );
        assert_eq!(hash_frame_symmetric(&frame), from_tuple);
    }

    #[test]
    fn l4_signal() {
        let (_, has_l4) = hash_frame_l4(&ipv4_udp_frame("10.0.0.1", "10.0.0.2", 5000, 53));
        assert!(has_l4);
        let (_, has_l4) = hash_frame_l4(&ipv4_later_fragment_frame(100));
        assert!(!has_l4);
    }

    #[test]
    fn digest_contents() {
        let frame = ipv4_tcp_frame("10.0.0.1", "10.0.0.2", 1111, 80);
        let mut keys = FlowKeys::new();
        flow_keys_dissector().dissect(&frame, keys.as_bytes_mut(), DissectFlags::empty());
        let digest = make_digest(&keys);
        assert_eq!(&digest.0[0..2], &0x0800u16.to_be_bytes());
        assert_eq!(digest.0[2], proto::TCP);
        assert_eq!(digest.0[3], 0);
        assert_eq!(&digest.0[4..6], &1111u16.to_be_bytes());
        assert_eq!(&digest.0[6..8], &80u16.to_be_bytes());
        assert_eq!(&digest.0[8..12], &addr_v4("10.0.0.1").octets());
        assert_eq!(&digest.0[12..16], &addr_v4("10.0.0.2").octets());
    }

    #[test]
    fn hash_covers_partial_keys_on_failure() {
        // a dissection that ends OUT_BAD still yields hashable keys
        let mut keys = FlowKeys::new();
        keys.set_control(KeyControl {
            thoff: 14,
            addr_type: crate::keys::AddrType::Unspecified,
            flags: ControlFlags::empty(),
        });
        let hash = hash_from_keys(&mut keys);
        assert_ne!(hash, 0);
    }
}
