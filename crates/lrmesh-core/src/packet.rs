//! Mesh packet data model
//!
//! A [`MeshPacket`] is the unit of mesh traffic. Its identity for duplicate
//! suppression is the pair `(source, id)`; the id only has to stay unique
//! per origin node for as long as the dedup retention window, so a
//! session-local counter seeded from a random value is sufficient.

use crate::payload::PayloadType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Node identifier - 4-byte unique ID
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId([u8; 4]);

impl NodeId {
    /// Broadcast address (all 0xFF): deliver to all, relay until the hop
    /// budget is exhausted.
    pub const BROADCAST: NodeId = NodeId([0xFF, 0xFF, 0xFF, 0xFF]);

    /// Unknown/unset address (all 0x00)
    pub const UNKNOWN: NodeId = NodeId([0x00, 0x00, 0x00, 0x00]);

    /// Create a NodeId from a u32
    pub fn from_u32(value: u32) -> Self {
        NodeId(value.to_be_bytes())
    }

    /// Convert to u32
    pub fn to_u32(&self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    /// Check if this is the broadcast address
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// Check if this is unknown/unset
    pub fn is_unknown(&self) -> bool {
        *self == Self::UNKNOWN
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({self})")
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}{:02x}{:02x}{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

/// A unit of mesh traffic.
///
/// Header fields travel on the wire (see [`crate::wire`]); the receive
/// metadata is filled in locally when a frame arrives off the radio.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshPacket {
    /// Packet ID, unique per origin node within the dedup window
    pub id: u32,
    /// Origin node
    pub source: NodeId,
    /// Destination node (BROADCAST for all nodes)
    pub destination: NodeId,
    /// Remaining relay budget, decremented on each re-broadcast
    pub hop_limit: u8,
    /// Original hop budget, carried for hops-traveled accounting
    pub hop_start: u8,
    /// Acknowledgment requested by the sender
    pub want_ack: bool,
    /// Logical channel/key context this packet belongs to
    pub channel_hash: u8,
    /// Payload type discriminator
    pub payload_type: PayloadType,
    /// Opaque application payload
    pub payload: Vec<u8>,
    /// RSSI of the frame this packet arrived in (dBm), receive side only
    pub rx_rssi: Option<f32>,
    /// SNR of the frame this packet arrived in (dB), receive side only
    pub rx_snr: Option<f32>,
}

impl MeshPacket {
    /// Maximum payload size in bytes
    pub const MAX_PAYLOAD_SIZE: usize = 237;

    /// Create a broadcast packet originating at `source`
    pub fn broadcast(
        source: NodeId,
        id: u32,
        payload_type: PayloadType,
        payload: Vec<u8>,
        hop_limit: u8,
        channel_hash: u8,
    ) -> Self {
        Self {
            id,
            source,
            destination: NodeId::BROADCAST,
            hop_limit,
            hop_start: hop_limit,
            want_ack: false,
            channel_hash,
            payload_type,
            payload,
            rx_rssi: None,
            rx_snr: None,
        }
    }

    /// Create a direct (unicast) packet
    pub fn direct(
        source: NodeId,
        destination: NodeId,
        id: u32,
        payload_type: PayloadType,
        payload: Vec<u8>,
        hop_limit: u8,
        channel_hash: u8,
    ) -> Self {
        Self {
            destination,
            ..Self::broadcast(source, id, payload_type, payload, hop_limit, channel_hash)
        }
    }

    /// Identity used for duplicate detection
    pub fn dedup_key(&self) -> (NodeId, u32) {
        (self.source, self.id)
    }

    /// Check if this packet should be delivered to `node` locally
    pub fn is_for(&self, node: NodeId) -> bool {
        self.destination.is_broadcast() || self.destination == node
    }

    /// Hops traveled so far, derived from the hop accounting
    pub fn hops_away(&self) -> u8 {
        self.hop_start.saturating_sub(self.hop_limit)
    }

    /// Decrement hop limit, returns false if already zero
    pub fn decrement_hop_limit(&mut self) -> bool {
        if self.hop_limit > 0 {
            self.hop_limit -= 1;
            true
        } else {
            false
        }
    }

    /// Stamp reception metadata
    pub fn set_rx_metadata(&mut self, rssi: f32, snr: f32) {
        self.rx_rssi = Some(rssi);
        self.rx_snr = Some(snr);
    }
}
