//! Managed-flood router
//!
//! The central state machine of the mesh. One router instance exclusively
//! owns the dedup cache and node table for the lifetime of a radio
//! session; all three are torn down together. Packet arrival, duplicate
//! lookup, node-table update, and relay scheduling happen as one atomic
//! step per packet — the router is driven from a single task and never
//! processes two packets concurrently.
//!
//! There is no persistent per-packet state machine: in-flight state is
//! implicit in the dedup cache plus the pending-relay timers. A relay
//! waits out a randomized jitter delay before transmission so that
//! simultaneous neighbor relays desynchronize; hearing a duplicate during
//! that wait cancels the pending relay, since another neighbor has
//! already covered the hop.

use crate::config::MeshConfig;
use crate::dedup::DedupCache;
use crate::error::CodecError;
use crate::nodes::{NodeInfo, NodeTable};
use crate::packet::{MeshPacket, NodeId};
use crate::payload::{self, NodeAnnounce, PayloadType};
use crate::wire;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// How a received frame was handled
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// Delivered to the local application (relay may also be scheduled)
    Delivered,
    /// Not for us; relay scheduled
    Relayed,
    /// Addressed elsewhere and hop budget exhausted
    HopLimitExhausted,
    /// Already seen within the retention window; suppressed
    Duplicate,
    /// Different logical channel; dropped before payload decode
    WrongChannel,
    /// Frame failed length or checksum validation
    Invalid(CodecError),
}

/// Result of feeding one received frame through the router
#[derive(Debug)]
pub struct RxOutcome {
    /// Packet to hand to the application boundary, if addressed here
    pub delivery: Option<MeshPacket>,
    /// Node-table snapshot after the sender update
    pub node_update: Option<NodeInfo>,
    /// Acknowledgment packet to transmit, for want_ack traffic to us
    pub ack: Option<MeshPacket>,
    pub disposition: Disposition,
}

impl RxOutcome {
    fn dropped(disposition: Disposition) -> Self {
        Self {
            delivery: None,
            node_update: None,
            ack: None,
            disposition,
        }
    }
}

/// Router counters, exposed at the application boundary
#[derive(Debug, Clone, Default, Serialize)]
pub struct RouterStats {
    pub frames_received: u64,
    pub delivered: u64,
    pub originated: u64,
    pub duplicates_dropped: u64,
    pub wrong_channel: u64,
    pub invalid_frames: u64,
    pub relays_scheduled: u64,
    pub relays_cancelled: u64,
    pub relays_flushed: u64,
    pub hop_limit_exhausted: u64,
    pub acks_generated: u64,
}

/// A relay waiting out its jitter delay
#[derive(Debug)]
struct PendingRelay {
    key: (NodeId, u32),
    packet: MeshPacket,
    fire_at: Instant,
}

/// Interval between opportunistic dedup/node-table sweeps
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(30);

/// Flood router for one mesh session
#[derive(Debug)]
pub struct FloodRouter {
    node_id: NodeId,
    channel_hash: u8,
    default_hop_limit: u8,
    jitter_ms: (u64, u64),
    dedup: DedupCache,
    nodes: NodeTable,
    pending: Vec<PendingRelay>,
    next_id: u32,
    rng: StdRng,
    stats: RouterStats,
    last_maintenance: Instant,
}

impl FloodRouter {
    pub fn new(config: &MeshConfig, now: Instant) -> Self {
        let mut rng = StdRng::from_entropy();
        let node_id = config
            .node_id
            .map(NodeId::from_u32)
            .unwrap_or_else(|| NodeId::from_u32(rng.gen_range(0x1000_0000..=u32::MAX)));

        Self {
            node_id,
            channel_hash: config.channel.hash(),
            default_hop_limit: config.default_hop_limit,
            jitter_ms: config.relay_jitter_ms,
            dedup: DedupCache::new(config.dedup_retention(), now),
            nodes: NodeTable::new(config.node_timeout()),
            pending: Vec::new(),
            next_id: rng.gen(),
            rng,
            stats: RouterStats::default(),
            last_maintenance: now,
        }
    }

    /// This node's identifier
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Feed one raw frame received from the radio through the full
    /// receive path: channel gate, decode, dedup, node-table update,
    /// local delivery, relay scheduling.
    pub fn receive_frame(&mut self, frame: &[u8], rssi: f32, snr: f32, now: Instant) -> RxOutcome {
        self.stats.frames_received += 1;
        self.maybe_sweep(now);

        match wire::peek_channel_hash(frame) {
            Some(hash) if hash == self.channel_hash => {}
            Some(hash) => {
                trace!(hash, "dropping frame for unknown channel");
                self.stats.wrong_channel += 1;
                return RxOutcome::dropped(Disposition::WrongChannel);
            }
            None => {
                self.stats.invalid_frames += 1;
                return RxOutcome::dropped(Disposition::Invalid(CodecError::Malformed(
                    "frame shorter than minimum",
                )));
            }
        }

        let mut packet = match wire::decode(frame) {
            Ok(packet) => packet,
            Err(err) => {
                debug!(%err, "discarding undecodable frame");
                self.stats.invalid_frames += 1;
                return RxOutcome::dropped(Disposition::Invalid(err));
            }
        };
        packet.set_rx_metadata(rssi, snr);

        let key = packet.dedup_key();
        if packet.source == self.node_id || self.dedup.seen(key.0, key.1, now) {
            // A copy heard again while our own relay is still pending
            // means another neighbor covered that hop already.
            if self.cancel_pending(key) {
                debug!(source = %key.0, id = key.1, "duplicate heard, cancelled pending relay");
            } else {
                trace!(source = %key.0, id = key.1, "duplicate packet suppressed");
            }
            self.stats.duplicates_dropped += 1;
            return RxOutcome::dropped(Disposition::Duplicate);
        }
        self.dedup.record(key.0, key.1, now);

        let node_update = Some(
            self.nodes
                .update(packet.source, rssi, snr, packet.hops_away(), now),
        );
        if packet.payload_type == PayloadType::NodeAnnounce {
            if let Some(announce) = NodeAnnounce::from_bytes(&packet.payload) {
                self.nodes
                    .set_names(packet.source, &announce.short_name, &announce.long_name);
            }
        }

        let for_us = packet.is_for(self.node_id);
        let ack = if for_us && packet.want_ack && packet.destination == self.node_id {
            Some(self.build_ack(&packet, now))
        } else {
            None
        };

        // Relay anything not addressed to us while hop budget remains;
        // local delivery still happens for exhausted broadcasts.
        let disposition = if packet.destination != self.node_id && packet.hop_limit > 0 {
            let mut relay = packet.clone();
            relay.decrement_hop_limit();
            let jitter = Duration::from_millis(
                self.rng.gen_range(self.jitter_ms.0..=self.jitter_ms.1),
            );
            trace!(source = %key.0, id = key.1, ?jitter, "relay scheduled");
            self.pending.push(PendingRelay {
                key,
                packet: relay,
                fire_at: now + jitter,
            });
            self.stats.relays_scheduled += 1;
            if for_us {
                Disposition::Delivered
            } else {
                Disposition::Relayed
            }
        } else if for_us {
            Disposition::Delivered
        } else {
            self.stats.hop_limit_exhausted += 1;
            Disposition::HopLimitExhausted
        };

        let delivery = if for_us {
            self.stats.delivered += 1;
            Some(packet)
        } else {
            None
        };

        RxOutcome {
            delivery,
            node_update,
            ack,
            disposition,
        }
    }

    /// Build an outbound packet with a fresh session-local id, record it
    /// in the dedup cache (so our own echo is never re-relayed), and
    /// encode it. Originating transmissions carry no jitter.
    pub fn originate(
        &mut self,
        destination: NodeId,
        payload_type: PayloadType,
        payload: Vec<u8>,
        want_ack: bool,
        now: Instant,
    ) -> std::result::Result<(u32, Vec<u8>), CodecError> {
        let id = self.alloc_packet_id();
        let mut packet = MeshPacket::direct(
            self.node_id,
            destination,
            id,
            payload_type,
            payload,
            self.default_hop_limit,
            self.channel_hash,
        );
        packet.want_ack = want_ack;

        let frame = wire::encode(&packet)?;
        self.dedup.record(self.node_id, id, now);
        self.stats.originated += 1;
        debug!(id, dest = %destination, ?payload_type, "originating packet");
        Ok((id, frame))
    }

    /// Pending relays whose jitter delay has elapsed, ready to encode
    /// and transmit. A relay popped here is committed; it can no longer
    /// be cancelled by a late duplicate.
    pub fn due_relays(&mut self, now: Instant) -> Vec<MeshPacket> {
        self.maybe_sweep(now);
        let mut due = Vec::new();
        self.pending.retain(|relay| {
            if relay.fire_at <= now {
                due.push(relay.packet.clone());
                false
            } else {
                true
            }
        });
        self.stats.relays_flushed += due.len() as u64;
        due
    }

    /// Earliest pending-relay deadline, if any
    pub fn next_relay_deadline(&self) -> Option<Instant> {
        self.pending.iter().map(|relay| relay.fire_at).min()
    }

    /// Known peers, most recently heard first
    pub fn nodes(&self) -> Vec<NodeInfo> {
        self.nodes.list()
    }

    /// Counter snapshot
    pub fn stats(&self) -> RouterStats {
        self.stats.clone()
    }

    fn build_ack(&mut self, packet: &MeshPacket, now: Instant) -> MeshPacket {
        let id = self.alloc_packet_id();
        self.dedup.record(self.node_id, id, now);
        self.stats.acks_generated += 1;
        MeshPacket::direct(
            self.node_id,
            packet.source,
            id,
            PayloadType::Routing,
            payload::encode_ack(packet.id),
            self.default_hop_limit,
            self.channel_hash,
        )
    }

    fn alloc_packet_id(&mut self) -> u32 {
        self.next_id = self.next_id.wrapping_add(1);
        self.next_id
    }

    fn cancel_pending(&mut self, key: (NodeId, u32)) -> bool {
        let before = self.pending.len();
        self.pending.retain(|relay| relay.key != key);
        let cancelled = before - self.pending.len();
        self.stats.relays_cancelled += cancelled as u64;
        cancelled > 0
    }

    /// Opportunistic maintenance: dedup sweep with node eviction
    /// alongside it. No dedicated timer.
    fn maybe_sweep(&mut self, now: Instant) {
        if now.duration_since(self.last_maintenance) > MAINTENANCE_INTERVAL {
            self.dedup.sweep(now);
            let evicted = self.nodes.evict_stale(now);
            if evicted > 0 {
                debug!(evicted, "evicted stale nodes");
            }
            self.last_maintenance = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> MeshConfig {
        MeshConfig {
            node_id: Some(0x0000_0001),
            ..MeshConfig::default()
        }
    }

    fn router() -> FloodRouter {
        FloodRouter::new(&test_config(), Instant::now())
    }

    fn frame_from(source: u32, id: u32, dest: NodeId, hop_limit: u8) -> Vec<u8> {
        let channel_hash = test_config().channel.hash();
        let packet = MeshPacket {
            hop_limit,
            hop_start: 3,
            ..MeshPacket::direct(
                NodeId::from_u32(source),
                dest,
                id,
                PayloadType::Text,
                b"field report".to_vec(),
                3,
                channel_hash,
            )
        };
        wire::encode(&packet).unwrap()
    }

    #[test]
    fn test_broadcast_delivered_and_relay_scheduled() {
        let mut router = router();
        let now = Instant::now();
        let frame = frame_from(0x22, 7, NodeId::BROADCAST, 3);

        let outcome = router.receive_frame(&frame, -80.0, 10.0, now);
        assert_eq!(outcome.disposition, Disposition::Delivered);
        let delivery = outcome.delivery.unwrap();
        assert_eq!(delivery.payload, b"field report");
        assert_eq!(delivery.rx_rssi, Some(-80.0));
        assert_eq!(outcome.node_update.unwrap().node_id.to_u32(), 0x22);

        // Relay carries a decremented budget and fires inside the window.
        let deadline = router.next_relay_deadline().unwrap();
        let delay = deadline - now;
        assert!(delay >= Duration::from_millis(100) && delay <= Duration::from_millis(200));
        assert!(router.due_relays(now).is_empty());
        let relays = router.due_relays(now + Duration::from_millis(200));
        assert_eq!(relays.len(), 1);
        assert_eq!(relays[0].hop_limit, 2);
        assert_eq!(relays[0].id, 7);
    }

    #[test]
    fn test_duplicate_suppressed_and_relay_cancelled() {
        let mut router = router();
        let now = Instant::now();
        let frame = frame_from(0x22, 7, NodeId::BROADCAST, 3);

        let first = router.receive_frame(&frame, -80.0, 10.0, now);
        assert_eq!(first.disposition, Disposition::Delivered);

        // Same identity heard again from another neighbor.
        let second = router.receive_frame(&frame, -90.0, 5.0, now + Duration::from_millis(50));
        assert_eq!(second.disposition, Disposition::Duplicate);
        assert!(second.delivery.is_none());

        // The pending relay is gone: this hop is covered.
        assert!(router.next_relay_deadline().is_none());
        assert!(router
            .due_relays(now + Duration::from_millis(500))
            .is_empty());
        let stats = router.stats();
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.duplicates_dropped, 1);
        assert_eq!(stats.relays_cancelled, 1);
    }

    #[test]
    fn test_committed_relay_not_cancelled() {
        let mut router = router();
        let now = Instant::now();
        let frame = frame_from(0x22, 7, NodeId::BROADCAST, 3);

        router.receive_frame(&frame, -80.0, 10.0, now);
        let relays = router.due_relays(now + Duration::from_millis(250));
        assert_eq!(relays.len(), 1);

        // A duplicate after the relay was flushed has nothing to cancel.
        router.receive_frame(&frame, -90.0, 5.0, now + Duration::from_millis(300));
        assert_eq!(router.stats().relays_cancelled, 0);
    }

    #[test]
    fn test_hop_limit_zero_delivers_but_never_relays() {
        let mut router = router();
        let now = Instant::now();
        let frame = frame_from(0x22, 9, NodeId::BROADCAST, 0);

        let outcome = router.receive_frame(&frame, -80.0, 10.0, now);
        assert_eq!(outcome.disposition, Disposition::Delivered);
        assert!(outcome.delivery.is_some());
        assert!(router.next_relay_deadline().is_none());
    }

    #[test]
    fn test_unicast_to_third_party_relayed_not_delivered() {
        let mut router = router();
        let now = Instant::now();
        let frame = frame_from(0x22, 11, NodeId::from_u32(0x33), 3);

        let outcome = router.receive_frame(&frame, -80.0, 10.0, now);
        assert_eq!(outcome.disposition, Disposition::Relayed);
        assert!(outcome.delivery.is_none());
        assert!(router.next_relay_deadline().is_some());
    }

    #[test]
    fn test_unicast_to_third_party_hop_exhausted() {
        let mut router = router();
        let now = Instant::now();
        let frame = frame_from(0x22, 12, NodeId::from_u32(0x33), 0);

        let outcome = router.receive_frame(&frame, -80.0, 10.0, now);
        assert_eq!(outcome.disposition, Disposition::HopLimitExhausted);
        assert!(outcome.delivery.is_none());
        assert!(router.next_relay_deadline().is_none());
    }

    #[test]
    fn test_wrong_channel_dropped() {
        let mut router = router();
        let mut frame = frame_from(0x22, 13, NodeId::BROADCAST, 3);
        frame[13] ^= 0xFF; // different channel hash
        let n = frame.len();
        let crc = wire::crc16_ccitt(&frame[..n - 2]).to_le_bytes();
        frame[n - 2..].copy_from_slice(&crc);

        let outcome = router.receive_frame(&frame, -80.0, 10.0, Instant::now());
        assert_eq!(outcome.disposition, Disposition::WrongChannel);
        assert_eq!(router.stats().wrong_channel, 1);
    }

    #[test]
    fn test_corrupt_frame_dropped() {
        let mut router = router();
        let mut frame = frame_from(0x22, 14, NodeId::BROADCAST, 3);
        frame[20] ^= 0x01;

        let outcome = router.receive_frame(&frame, -80.0, 10.0, Instant::now());
        assert!(matches!(
            outcome.disposition,
            Disposition::Invalid(CodecError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_want_ack_to_self_generates_ack() {
        let mut router = router();
        let now = Instant::now();
        let channel_hash = test_config().channel.hash();
        let mut packet = MeshPacket::direct(
            NodeId::from_u32(0x22),
            NodeId::from_u32(0x0000_0001),
            21,
            PayloadType::Text,
            b"ping".to_vec(),
            3,
            channel_hash,
        );
        packet.want_ack = true;
        let frame = wire::encode(&packet).unwrap();

        let outcome = router.receive_frame(&frame, -80.0, 10.0, now);
        let ack = outcome.ack.expect("ack expected");
        assert_eq!(ack.destination.to_u32(), 0x22);
        assert_eq!(ack.payload_type, PayloadType::Routing);
        assert_eq!(payload::decode_ack(&ack.payload), Some(21));
    }

    #[test]
    fn test_broadcast_want_ack_gets_no_ack() {
        let mut router = router();
        let channel_hash = test_config().channel.hash();
        let mut packet = MeshPacket::broadcast(
            NodeId::from_u32(0x22),
            22,
            PayloadType::Text,
            b"all".to_vec(),
            3,
            channel_hash,
        );
        packet.want_ack = true;
        let frame = wire::encode(&packet).unwrap();

        let outcome = router.receive_frame(&frame, -80.0, 10.0, Instant::now());
        assert!(outcome.ack.is_none());
        assert!(outcome.delivery.is_some());
    }

    #[test]
    fn test_own_echo_not_rerelayed() {
        let mut router = router();
        let now = Instant::now();
        let (id, frame) = router
            .originate(
                NodeId::BROADCAST,
                PayloadType::Text,
                b"hello out there".to_vec(),
                false,
                now,
            )
            .unwrap();

        // Hearing our own packet relayed back must not deliver or relay.
        let outcome = router.receive_frame(&frame, -70.0, 12.0, now + Duration::from_millis(150));
        assert_eq!(outcome.disposition, Disposition::Duplicate);
        assert!(router.next_relay_deadline().is_none());

        let decoded = wire::decode(&frame).unwrap();
        assert_eq!(decoded.id, id);
        assert_eq!(decoded.hop_start, 3);
        assert_eq!(decoded.hop_limit, 3);
    }

    #[test]
    fn test_fresh_packet_ids_are_distinct() {
        let mut router = router();
        let now = Instant::now();
        let (a, _) = router
            .originate(NodeId::BROADCAST, PayloadType::Text, vec![1], false, now)
            .unwrap();
        let (b, _) = router
            .originate(NodeId::BROADCAST, PayloadType::Text, vec![2], false, now)
            .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_announce_updates_node_names() {
        let mut router = router();
        let now = Instant::now();
        let channel_hash = test_config().channel.hash();
        let announce = NodeAnnounce::new("RLY2", "Ridge relay");
        let packet = MeshPacket::broadcast(
            NodeId::from_u32(0x55),
            31,
            PayloadType::NodeAnnounce,
            announce.to_bytes(),
            3,
            channel_hash,
        );
        router.receive_frame(&wire::encode(&packet).unwrap(), -80.0, 10.0, now);

        let nodes = router.nodes();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].short_name.as_deref(), Some("RLY2"));
        assert_eq!(nodes[0].long_name.as_deref(), Some("Ridge relay"));
    }
}
