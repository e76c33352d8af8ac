//! Duplicate packet suppression
//!
//! Every node that relays a flooded packet records its identity here, so
//! a copy heard again from a different neighbor within the retention
//! window is dropped instead of re-relayed. This is the mechanism that
//! keeps a managed flood from becoming a broadcast storm.

use crate::packet::NodeId;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Short-lived record of recently seen packet identities.
///
/// Entries expire after the retention window, which should exceed the
/// worst-case end-to-end flood propagation time for the configured hop
/// budget. Identity collisions after expiry cause at most one spurious
/// duplicate delivery, which is acceptable.
#[derive(Debug)]
pub struct DedupCache {
    seen: HashMap<(NodeId, u32), Instant>,
    retention: Duration,
    last_sweep: Instant,
}

/// How often the opportunistic sweep actually walks the map
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

impl DedupCache {
    pub fn new(retention: Duration, now: Instant) -> Self {
        Self {
            seen: HashMap::new(),
            retention,
            last_sweep: now,
        }
    }

    /// True if this identity was recorded within the retention window
    pub fn seen(&self, source: NodeId, id: u32, now: Instant) -> bool {
        self.seen
            .get(&(source, id))
            .map(|recorded| now.duration_since(*recorded) < self.retention)
            .unwrap_or(false)
    }

    /// Insert or refresh an identity. Sweeps expired entries
    /// opportunistically; there is no dedicated timer.
    pub fn record(&mut self, source: NodeId, id: u32, now: Instant) {
        if now.duration_since(self.last_sweep) > SWEEP_INTERVAL {
            self.sweep(now);
        }
        self.seen.insert((source, id), now);
    }

    /// Drop all expired entries to bound memory
    pub fn sweep(&mut self, now: Instant) {
        let retention = self.retention;
        self.seen
            .retain(|_, recorded| now.duration_since(*recorded) < retention);
        self.last_sweep = now;
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
