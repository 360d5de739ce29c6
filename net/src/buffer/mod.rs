// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Bounded frame access: the [`ByteWindow`] read primitive and the
//! [`Frame`] trait the dissector consumes.

use crate::eth::EthType;
use crate::vlan::VlanTag;

#[cfg(any(test, doc, feature = "test_frame"))]
pub mod test_frame;

#[allow(unused_imports)] // re-export
#[cfg(any(test, doc, feature = "test_frame"))]
pub use test_frame::*;

/// A read-only view over the validated prefix of a frame.
///
/// All header reads performed by the dissector go through this type, which
/// bounds every access to `hlen` bytes. A request reaching past the
/// validated prefix yields `None`; the underlying bytes are never mutated.
#[derive(Debug, Clone, Copy)]
pub struct ByteWindow<'a> {
    data: &'a [u8],
    hlen: usize,
}

impl<'a> ByteWindow<'a> {
    /// Create a window over `data` whose readable prefix is `hlen` bytes.
    ///
    /// `hlen` is clamped to `data.len()`.
    #[must_use]
    pub fn new(data: &'a [u8], hlen: usize) -> ByteWindow<'a> {
        ByteWindow {
            data,
            hlen: hlen.min(data.len()),
        }
    }

    /// Borrow `len` bytes starting at `nhoff`, or `None` if the request
    /// does not fit within the validated prefix.
    #[must_use]
    pub fn peek(&self, nhoff: usize, len: usize) -> Option<&'a [u8]> {
        let end = nhoff.checked_add(len)?;
        if end > self.hlen {
            return None;
        }
        self.data.get(nhoff..end)
    }

    /// Copy `N` bytes starting at `nhoff` out of the window.
    ///
    /// This is the scratch-slot flavor of [`ByteWindow::peek`]: the caller
    /// gets an owned array it can hold while continuing to advance the
    /// cursor.
    #[must_use]
    pub fn get<const N: usize>(&self, nhoff: usize) -> Option<[u8; N]> {
        let src = self.peek(nhoff, N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(src);
        Some(out)
    }

    /// Length of the validated prefix.
    #[must_use]
    pub fn hlen(&self) -> usize {
        self.hlen
    }
}

/// The capabilities a live frame must offer the dissector.
///
/// This is the received-packet analog of a raw buffer: in addition to the
/// linear bytes it carries the link-layer protocol the driver reported and,
/// when the NIC stripped an 802.1Q tag on receive, that tag as metadata.
pub trait Frame {
    /// The linear bytes of the frame.
    fn bytes(&self) -> &[u8];

    /// The ethertype following the link-layer header (with any offloaded
    /// VLAN tag already stripped).
    fn protocol(&self) -> EthType;

    /// The VLAN tag the hardware stripped on receive, if any.
    fn vlan_tag(&self) -> Option<VlanTag>;

    /// Byte offset of the network header within [`Frame::bytes`].
    fn network_offset(&self) -> usize;

    /// Byte offset of the link-layer header within [`Frame::bytes`].
    fn mac_offset(&self) -> usize {
        0
    }

    /// Length of the linear data.
    fn headlen(&self) -> usize {
        self.bytes().len()
    }
}

#[cfg(test)]
mod test {
    use super::ByteWindow;

    #[test]
    fn peek_respects_hlen() {
        let data = [0u8; 32];
        let window = ByteWindow::new(&data, 16);
        assert!(window.peek(0, 16).is_some());
        assert!(window.peek(0, 17).is_none());
        assert!(window.peek(12, 4).is_some());
        assert!(window.peek(13, 4).is_none());
        assert!(window.peek(usize::MAX, 2).is_none());
    }

    #[test]
    fn hlen_clamped_to_data() {
        let data = [0u8; 8];
        let window = ByteWindow::new(&data, 1024);
        assert_eq!(window.hlen(), 8);
        assert!(window.peek(0, 9).is_none());
    }

    #[test]
    fn get_copies_out() {
        let data = [1u8, 2, 3, 4, 5, 6];
        let window = ByteWindow::new(&data, data.len());
        assert_eq!(window.get::<4>(1), Some([2, 3, 4, 5]));
        assert_eq!(window.get::<4>(3), None);
    }
}
