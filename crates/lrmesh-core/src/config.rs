//! Mesh session configuration
//!
//! Plain numeric/string policy values consumed from the surrounding
//! system. All behavior beyond the defaults is specified by the router
//! itself; nothing here changes protocol semantics.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Logical channel: a name plus optional key material. The byte-fold
/// hash of both becomes the one-byte channel hash carried on the wire,
/// so nodes on a different channel reject frames before payload decode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Channel name
    pub name: String,
    /// Pre-shared key material, if any
    pub key: Option<String>,
}

impl ChannelConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            key: None,
        }
    }

    /// One-byte channel hash for the wire header
    pub fn hash(&self) -> u8 {
        let mut acc = self
            .name
            .bytes()
            .fold(0u8, |acc, b| acc.wrapping_add(b));
        if let Some(key) = &self.key {
            acc = key.bytes().fold(acc, |acc, b| acc.wrapping_add(b));
        }
        acc
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::new("LongFast")
    }
}

/// Configuration for a mesh session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    /// This node's ID (random if None)
    pub node_id: Option<u32>,
    /// Default hop budget for originated packets
    pub default_hop_limit: u8,
    /// Relay jitter window in milliseconds (inclusive bounds)
    pub relay_jitter_ms: (u64, u64),
    /// How long packet identities stay in the dedup cache (seconds)
    pub dedup_retention_secs: u64,
    /// How long before an idle peer is evicted (seconds)
    pub node_timeout_secs: u64,
    /// Radio receive poll timeout in milliseconds (policy, not protocol)
    pub radio_poll_ms: u64,
    /// Backoff before the single transmit retry (milliseconds)
    pub tx_retry_backoff_ms: u64,
    /// Primary channel
    pub channel: ChannelConfig,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            node_id: None,
            default_hop_limit: 3,
            relay_jitter_ms: (100, 200),
            dedup_retention_secs: 300,
            node_timeout_secs: 600,
            radio_poll_ms: 100,
            tx_retry_backoff_ms: 50,
            channel: ChannelConfig::default(),
        }
    }
}

impl MeshConfig {
    pub fn dedup_retention(&self) -> Duration {
        Duration::from_secs(self.dedup_retention_secs)
    }

    pub fn node_timeout(&self) -> Duration {
        Duration::from_secs(self.node_timeout_secs)
    }

    pub fn radio_poll(&self) -> Duration {
        Duration::from_millis(self.radio_poll_ms)
    }

    pub fn tx_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.tx_retry_backoff_ms)
    }
}
