//! Node table: remembered peers and their link metrics
//!
//! A peer appears on the first packet observed from an unknown source,
//! gets refreshed on every subsequent packet, and is removed outright
//! once idle past the staleness timeout — it simply reappears fresh on
//! next contact.

use crate::packet::NodeId;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// A remembered peer
#[derive(Debug, Clone, PartialEq)]
pub struct NodeInfo {
    /// Peer's unique identifier
    pub node_id: NodeId,
    /// Short name (up to 4 characters), from a node announcement
    pub short_name: Option<String>,
    /// Long name (up to 40 characters), from a node announcement
    pub long_name: Option<String>,
    /// When the last packet from this node was heard
    pub last_heard: Instant,
    /// RSSI of the most recent packet (dBm)
    pub last_rssi: f32,
    /// SNR of the most recent packet (dB)
    pub last_snr: f32,
    /// Hops traveled by the most recent packet
    pub hops_away: u8,
}

/// Table of known peers, evicting entries not heard within a timeout
#[derive(Debug)]
pub struct NodeTable {
    nodes: HashMap<NodeId, NodeInfo>,
    timeout: Duration,
}

impl NodeTable {
    pub fn new(timeout: Duration) -> Self {
        Self {
            nodes: HashMap::new(),
            timeout,
        }
    }

    /// Create or refresh a peer entry. Idempotent, last-write-wins per
    /// field. Returns a snapshot of the updated entry.
    pub fn update(
        &mut self,
        node_id: NodeId,
        rssi: f32,
        snr: f32,
        hops_away: u8,
        now: Instant,
    ) -> NodeInfo {
        let entry = self.nodes.entry(node_id).or_insert_with(|| NodeInfo {
            node_id,
            short_name: None,
            long_name: None,
            last_heard: now,
            last_rssi: rssi,
            last_snr: snr,
            hops_away,
        });
        entry.last_heard = now;
        entry.last_rssi = rssi;
        entry.last_snr = snr;
        entry.hops_away = hops_away;
        entry.clone()
    }

    /// Attach display names from a node announcement
    pub fn set_names(&mut self, node_id: NodeId, short_name: &str, long_name: &str) {
        if let Some(entry) = self.nodes.get_mut(&node_id) {
            entry.short_name = Some(short_name.to_string());
            entry.long_name = Some(long_name.to_string());
        }
    }

    /// Get a peer by ID
    pub fn get(&self, node_id: &NodeId) -> Option<&NodeInfo> {
        self.nodes.get(node_id)
    }

    /// All known peers, most recently heard first
    pub fn list(&self) -> Vec<NodeInfo> {
        let mut nodes: Vec<_> = self.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| b.last_heard.cmp(&a.last_heard));
        nodes
    }

    /// Remove peers idle past the staleness timeout; returns how many
    /// were evicted
    pub fn evict_stale(&mut self, now: Instant) -> usize {
        let timeout = self.timeout;
        let before = self.nodes.len();
        self.nodes
            .retain(|_, node| now.duration_since(node.last_heard) <= timeout);
        before - self.nodes.len()
    }

    /// Number of known peers
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_packet_creates_entry() {
        let now = Instant::now();
        let mut table = NodeTable::new(Duration::from_secs(600));
        let id = NodeId::from_u32(0x10);

        let info = table.update(id, -80.0, 10.0, 1, now);
        assert_eq!(info.node_id, id);
        assert_eq!(info.hops_away, 1);
        assert!(info.short_name.is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_update_is_last_write_wins() {
        let now = Instant::now();
        let mut table = NodeTable::new(Duration::from_secs(600));
        let id = NodeId::from_u32(0x10);

        table.update(id, -80.0, 10.0, 2, now);
        let later = now + Duration::from_secs(5);
        let info = table.update(id, -70.0, 12.0, 0, later);

        assert_eq!(info.last_rssi, -70.0);
        assert_eq!(info.last_snr, 12.0);
        assert_eq!(info.hops_away, 0);
        assert_eq!(info.last_heard, later);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_names_survive_metric_updates() {
        let now = Instant::now();
        let mut table = NodeTable::new(Duration::from_secs(600));
        let id = NodeId::from_u32(0x10);

        table.update(id, -80.0, 10.0, 0, now);
        table.set_names(id, "RLY1", "Relay one");
        table.update(id, -75.0, 11.0, 0, now + Duration::from_secs(1));

        let info = table.get(&id).unwrap();
        assert_eq!(info.short_name.as_deref(), Some("RLY1"));
    }

    #[test]
    fn test_list_ordered_by_last_heard() {
        let now = Instant::now();
        let mut table = NodeTable::new(Duration::from_secs(600));

        table.update(NodeId::from_u32(1), -80.0, 10.0, 0, now);
        table.update(
            NodeId::from_u32(2),
            -80.0,
            10.0,
            0,
            now + Duration::from_secs(1),
        );
        table.update(
            NodeId::from_u32(3),
            -80.0,
            10.0,
            0,
            now + Duration::from_millis(500),
        );

        let ids: Vec<u32> = table.list().iter().map(|n| n.node_id.to_u32()).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn test_stale_eviction() {
        let now = Instant::now();
        let timeout = Duration::from_secs(600);
        let mut table = NodeTable::new(timeout);
        let id = NodeId::from_u32(0x10);

        table.update(id, -80.0, 10.0, 0, now);

        // Still present right at the timeout boundary
        assert_eq!(table.evict_stale(now + timeout), 0);
        assert!(table.get(&id).is_some());

        // Gone just past it
        assert_eq!(table.evict_stale(now + timeout + Duration::from_millis(1)), 1);
        assert!(table.get(&id).is_none());
    }
}
