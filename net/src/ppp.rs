// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! PPP protocol numbers shared by the PPPoE and PPTP paths.

use crate::eth::EthType;

/// PPP protocol number for IPv4.
pub const PPP_IP: u16 = 0x0021;
/// PPP protocol number for IPv6.
pub const PPP_IPV6: u16 = 0x0057;
/// Length of a full PPP header (address, control, protocol).
pub const PPP_HDRLEN: usize = 4;

/// Translate a PPP protocol number to the ethertype of its payload.
///
/// Only IPv4 and IPv6 are translated; anything else (MPLSCP, LCP, ...)
/// yields `None` and the caller decides whether that is fatal.
#[must_use]
pub fn ethertype_for(ppp_proto: u16) -> Option<EthType> {
    match ppp_proto {
        PPP_IP => Some(EthType::IPV4),
        PPP_IPV6 => Some(EthType::IPV6),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn translation() {
        assert_eq!(ethertype_for(PPP_IP), Some(EthType::IPV4));
        assert_eq!(ethertype_for(PPP_IPV6), Some(EthType::IPV6));
        assert_eq!(ethertype_for(0xC021), None);
    }
}
