//! Ethernet frame parsing and construction
//!
//! Packet-ins carry the raw frame the switch could not resolve. The
//! controller only reads the L2 header: addresses and the optional 802.1Q tag.

use super::{EtherType, MacAddr, VlanTag};
use crate::{Error, Result};

/// Minimum Ethernet header size (without FCS)
pub const MIN_FRAME_SIZE: usize = 14;
/// Maximum Ethernet frame size (without FCS, with VLAN tag)
pub const MAX_FRAME_SIZE: usize = 1522;

const TAGGED_HEADER_SIZE: usize = 18;

/// Parsed Ethernet frame (zero-copy reference)
#[derive(Debug)]
pub struct Frame<'a> {
    buffer: &'a [u8],
    vlan_tag: Option<VlanTag>,
    payload_offset: usize,
}

impl<'a> Frame<'a> {
    /// Parse an Ethernet frame from a buffer
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < MIN_FRAME_SIZE {
            return Err(Error::InvalidPacket(format!(
                "frame too short ({} bytes)",
                buffer.len()
            )));
        }

        let ethertype = u16::from_be_bytes([buffer[12], buffer[13]]);
        let (vlan_tag, payload_offset) = if ethertype == EtherType::Vlan as u16 {
            if buffer.len() < TAGGED_HEADER_SIZE {
                return Err(Error::InvalidPacket("802.1Q frame too short".into()));
            }
            (Some(VlanTag::from_bytes([buffer[14], buffer[15]])), 18)
        } else {
            (None, MIN_FRAME_SIZE)
        };

        Ok(Self {
            buffer,
            vlan_tag,
            payload_offset,
        })
    }

    fn mac_at(&self, offset: usize) -> MacAddr {
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&self.buffer[offset..offset + 6]);
        MacAddr(mac)
    }

    pub fn dst_mac(&self) -> MacAddr {
        self.mac_at(0)
    }

    pub fn src_mac(&self) -> MacAddr {
        self.mac_at(6)
    }

    /// EtherType of the payload (inner type for tagged frames)
    pub fn ethertype(&self) -> u16 {
        let offset = self.payload_offset - 2;
        u16::from_be_bytes([self.buffer[offset], self.buffer[offset + 1]])
    }

    pub fn vlan_tag(&self) -> Option<VlanTag> {
        self.vlan_tag
    }

    pub fn payload(&self) -> &[u8] {
        &self.buffer[self.payload_offset..]
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.buffer
    }
}

/// Builder for constructing Ethernet frames
pub struct FrameBuilder {
    buffer: Vec<u8>,
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MAX_FRAME_SIZE),
        }
    }

    pub fn dst_mac(mut self, mac: MacAddr) -> Self {
        self.buffer.extend_from_slice(&mac.0);
        self
    }

    pub fn src_mac(mut self, mac: MacAddr) -> Self {
        self.buffer.extend_from_slice(&mac.0);
        self
    }

    pub fn vlan_tag(mut self, tag: VlanTag) -> Self {
        self.buffer
            .extend_from_slice(&(EtherType::Vlan as u16).to_be_bytes());
        self.buffer.extend_from_slice(&tag.to_bytes());
        self
    }

    pub fn ethertype(mut self, ethertype: u16) -> Self {
        self.buffer.extend_from_slice(&ethertype.to_be_bytes());
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.buffer.extend_from_slice(payload);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.buffer
    }
}

impl Default for FrameBuilder {
    fn default() -> Self {
        Self::new()
    }
}
