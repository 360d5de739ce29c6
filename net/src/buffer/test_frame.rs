// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! An owned, heap-backed [`Frame`] implementation for tests.

use crate::buffer::Frame;
use crate::eth::EthType;
use crate::vlan::VlanTag;

/// A test frame: linear bytes plus the metadata a receive path would have
/// attached.
#[derive(Debug, Clone)]
pub struct TestFrame {
    data: Vec<u8>,
    protocol: EthType,
    vlan: Option<VlanTag>,
    network_offset: usize,
}

impl TestFrame {
    /// Build a frame from bytes that start with an Ethernet header; the
    /// frame protocol and network offset are derived from it.
    ///
    /// # Panics
    ///
    /// Panics when `data` is shorter than an Ethernet header.
    #[must_use]
    pub fn from_ethernet(data: Vec<u8>) -> TestFrame {
        assert!(data.len() >= 14, "frame too short for an ethernet header");
        let protocol = EthType::new_from_be_bytes([data[12], data[13]]);
        TestFrame {
            data,
            protocol,
            vlan: None,
            network_offset: 14,
        }
    }

    /// Attach an offloaded VLAN tag, as a tag-stripping NIC would.
    #[must_use]
    pub fn with_vlan_tag(mut self, tag: VlanTag) -> TestFrame {
        self.vlan = Some(tag);
        self
    }

    /// Override the frame protocol.
    #[must_use]
    pub fn with_protocol(mut self, protocol: EthType) -> TestFrame {
        self.protocol = protocol;
        self
    }

    /// A copy of this frame truncated to its first `len` bytes.
    #[must_use]
    pub fn truncated(&self, len: usize) -> TestFrame {
        let mut copy = self.clone();
        copy.data.truncate(len);
        copy
    }
}

impl Frame for TestFrame {
    fn bytes(&self) -> &[u8] {
        &self.data
    }

    fn protocol(&self) -> EthType {
        self.protocol
    }

    fn vlan_tag(&self) -> Option<VlanTag> {
        self.vlan
    }

    fn network_offset(&self) -> usize {
        self.network_offset
    }
}
