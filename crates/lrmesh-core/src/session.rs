//! Mesh session: the single task that owns radio and router
//!
//! One tokio task per mesh session serializes everything that touches
//! the half-duplex radio: inbound frames, jittered relays, and outbound
//! application sends all flow through the same loop, so an outbound send
//! and a pending relay never transmit simultaneously and no locking is
//! needed around the dedup cache or node table.
//!
//! The loop multiplexes three wake sources: application commands, radio
//! receive polls, and the earliest pending-relay deadline. Because the
//! receive path keeps running while a relay waits out its jitter delay,
//! a duplicate heard in that window cancels the pending relay before it
//! ever reaches the radio; a relay that has already been popped for
//! transmission is committed and cannot be cancelled.

use crate::config::MeshConfig;
use crate::error::{MeshError, TransmitError};
use crate::gateway::GatewayBridge;
use crate::nodes::NodeInfo;
use crate::packet::NodeId;
use crate::payload::PayloadType;
use crate::radio::{RadioTransport, RxFrame};
use crate::router::{Disposition, FloodRouter, RouterStats};
use crate::wire;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Events emitted at the application boundary
#[derive(Debug, Clone)]
pub enum MeshEvent {
    /// A packet addressed to this node (or broadcast) arrived
    MessageReceived {
        from: NodeId,
        payload_type: PayloadType,
        payload: Vec<u8>,
        hops_away: u8,
    },
    /// A peer was created or refreshed in the node table
    NodeUpdated(NodeInfo),
    /// An outbound send failed at the radio after its retry
    DeliveryFailed { packet_id: u32, reason: String },
}

enum Command {
    Send {
        destination: NodeId,
        payload_type: PayloadType,
        payload: Vec<u8>,
        want_ack: bool,
        reply: oneshot::Sender<Result<u32, MeshError>>,
    },
    InjectRemote {
        frame: Vec<u8>,
    },
    Nodes {
        reply: oneshot::Sender<Vec<NodeInfo>>,
    },
    Stats {
        reply: oneshot::Sender<RouterStats>,
    },
    Shutdown,
}

/// Cloneable handle for issuing requests into a running session.
///
/// Sends may be issued concurrently from any task; they queue into the
/// session and serialize against relays on the single radio owner.
#[derive(Clone)]
pub struct MeshHandle {
    commands: mpsc::Sender<Command>,
}

impl MeshHandle {
    /// Queue an outbound message. Returns the allocated packet id as
    /// soon as the packet is built; transmit failures arrive later as
    /// [`MeshEvent::DeliveryFailed`].
    pub async fn send_message(
        &self,
        destination: NodeId,
        payload_type: PayloadType,
        payload: Vec<u8>,
        want_ack: bool,
    ) -> Result<u32, MeshError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Send {
                destination,
                payload_type,
                payload,
                want_ack,
                reply,
            })
            .await
            .map_err(|_| MeshError::SessionClosed)?;
        response.await.map_err(|_| MeshError::SessionClosed)?
    }

    /// Broadcast a text message with the default hop budget
    pub async fn send_text(&self, text: &str) -> Result<u32, MeshError> {
        self.send_message(
            NodeId::BROADCAST,
            PayloadType::Text,
            text.as_bytes().to_vec(),
            false,
        )
        .await
    }

    /// Inject a frame received from the gateway, as if heard over radio
    pub async fn inject_remote(&self, frame: Vec<u8>) -> Result<(), MeshError> {
        self.commands
            .send(Command::InjectRemote { frame })
            .await
            .map_err(|_| MeshError::SessionClosed)
    }

    /// Snapshot of the node table, most recently heard first
    pub async fn nodes(&self) -> Result<Vec<NodeInfo>, MeshError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Nodes { reply })
            .await
            .map_err(|_| MeshError::SessionClosed)?;
        response.await.map_err(|_| MeshError::SessionClosed)
    }

    /// Router counter snapshot
    pub async fn stats(&self) -> Result<RouterStats, MeshError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Stats { reply })
            .await
            .map_err(|_| MeshError::SessionClosed)?;
        response.await.map_err(|_| MeshError::SessionClosed)
    }
}

/// A running mesh session.
///
/// Owns the session task; router, dedup cache, and node table live
/// inside it and are torn down together when the session ends.
pub struct MeshSession {
    node_id: NodeId,
    commands: mpsc::Sender<Command>,
    task: JoinHandle<()>,
}

impl MeshSession {
    /// Start a session over the given radio. Returns the session and
    /// the event stream for the application boundary.
    pub fn spawn<R>(config: MeshConfig, radio: R) -> (Self, mpsc::Receiver<MeshEvent>)
    where
        R: RadioTransport + 'static,
    {
        Self::spawn_with_gateway(config, radio, None)
    }

    /// Start a session with an optional gateway bridge attached
    pub fn spawn_with_gateway<R>(
        config: MeshConfig,
        radio: R,
        gateway: Option<Box<dyn GatewayBridge>>,
    ) -> (Self, mpsc::Receiver<MeshEvent>)
    where
        R: RadioTransport + 'static,
    {
        let router = FloodRouter::new(&config, Instant::now());
        let node_id = router.node_id();
        info!(node = %node_id, channel = %config.channel.name, "mesh session starting");

        let (command_tx, command_rx) = mpsc::channel(32);
        let (event_tx, event_rx) = mpsc::channel(64);

        let task = SessionTask {
            config,
            router,
            radio,
            gateway,
            commands: command_rx,
            events: event_tx,
        };
        let task = tokio::spawn(task.run());

        (
            Self {
                node_id,
                commands: command_tx,
                task,
            },
            event_rx,
        )
    }

    /// This node's identifier
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Handle for issuing requests from other tasks
    pub fn handle(&self) -> MeshHandle {
        MeshHandle {
            commands: self.commands.clone(),
        }
    }

    /// Stop the session and wait for the task to finish
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown).await;
        let _ = self.task.await;
    }
}

enum Wake {
    Command(Option<Command>),
    Radio(Option<RxFrame>),
    RelayDue,
}

struct SessionTask<R> {
    config: MeshConfig,
    router: FloodRouter,
    radio: R,
    gateway: Option<Box<dyn GatewayBridge>>,
    commands: mpsc::Receiver<Command>,
    events: mpsc::Sender<MeshEvent>,
}

impl<R: RadioTransport> SessionTask<R> {
    async fn run(mut self) {
        loop {
            let wake = {
                let relay_deadline = self.router.next_relay_deadline();
                let poll = self.config.radio_poll();
                tokio::select! {
                    command = self.commands.recv() => Wake::Command(command),
                    frame = self.radio.receive(poll) => Wake::Radio(frame),
                    _ = sleep_until_deadline(relay_deadline) => Wake::RelayDue,
                }
            };

            match wake {
                Wake::Command(None) | Wake::Command(Some(Command::Shutdown)) => break,
                Wake::Command(Some(command)) => self.handle_command(command).await,
                Wake::Radio(Some(frame)) => {
                    self.handle_frame(&frame.bytes, frame.rssi, frame.snr, true)
                        .await;
                }
                Wake::Radio(None) => {} // poll timeout, re-evaluate deadlines
                Wake::RelayDue => self.flush_relays().await,
            }
        }
        debug!(node = %self.router.node_id(), "mesh session stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Send {
                destination,
                payload_type,
                payload,
                want_ack,
                reply,
            } => {
                match self
                    .router
                    .originate(destination, payload_type, payload, want_ack, Instant::now())
                {
                    Ok((packet_id, frame)) => {
                        let _ = reply.send(Ok(packet_id));
                        // Originating transmissions go out immediately,
                        // without jitter.
                        if let Err(err) = self.transmit_with_retry(&frame).await {
                            warn!(packet_id, %err, "outbound send failed after retry");
                            self.emit(MeshEvent::DeliveryFailed {
                                packet_id,
                                reason: err.to_string(),
                            })
                            .await;
                        }
                        self.publish_upstream(&frame).await;
                    }
                    Err(err) => {
                        let _ = reply.send(Err(err.into()));
                    }
                }
            }
            Command::InjectRemote { frame } => {
                // Remote traffic runs the same dedup and relay logic as
                // radio traffic, but is not re-published upstream.
                self.handle_frame(&frame, 0.0, 0.0, false).await;
            }
            Command::Nodes { reply } => {
                let _ = reply.send(self.router.nodes());
            }
            Command::Stats { reply } => {
                let _ = reply.send(self.router.stats());
            }
            Command::Shutdown => unreachable!("handled by the loop"),
        }
    }

    async fn handle_frame(&mut self, frame: &[u8], rssi: f32, snr: f32, from_radio: bool) {
        let outcome = self.router.receive_frame(frame, rssi, snr, Instant::now());

        if let Some(node) = outcome.node_update {
            self.emit(MeshEvent::NodeUpdated(node)).await;
        }
        if let Some(packet) = outcome.delivery {
            let hops_away = packet.hops_away();
            self.emit(MeshEvent::MessageReceived {
                from: packet.source,
                payload_type: packet.payload_type,
                payload: packet.payload,
                hops_away,
            })
            .await;
        }
        if let Some(ack) = outcome.ack {
            match wire::encode(&ack) {
                Ok(ack_frame) => {
                    if let Err(err) = self.transmit_with_retry(&ack_frame).await {
                        warn!(%err, "ack transmit failed");
                    }
                }
                Err(err) => warn!(%err, "ack encode failed"),
            }
        }

        // Novel radio traffic is forwarded upstream for cloud visibility.
        let novel = matches!(
            outcome.disposition,
            Disposition::Delivered | Disposition::Relayed | Disposition::HopLimitExhausted
        );
        if from_radio && novel {
            self.publish_upstream(frame).await;
        }
    }

    async fn flush_relays(&mut self) {
        for relay in self.router.due_relays(Instant::now()) {
            match wire::encode(&relay) {
                Ok(frame) => {
                    // Relay failures are not the application's request;
                    // log and move on.
                    if let Err(err) = self.transmit_with_retry(&frame).await {
                        warn!(source = %relay.source, id = relay.id, %err, "relay transmit failed");
                    }
                }
                Err(err) => warn!(%err, "relay encode failed"),
            }
        }
    }

    /// One retry after a short backoff, then the failure surfaces.
    async fn transmit_with_retry(&mut self, frame: &[u8]) -> Result<(), TransmitError> {
        match self.radio.send(frame).await {
            Ok(()) => Ok(()),
            Err(err) => {
                debug!(%err, "transmit failed, retrying once");
                tokio::time::sleep(self.config.tx_retry_backoff()).await;
                self.radio.send(frame).await
            }
        }
    }

    async fn publish_upstream(&mut self, frame: &[u8]) {
        if let Some(gateway) = self.gateway.as_mut() {
            if let Err(err) = gateway.publish(frame).await {
                warn!(%err, "gateway publish failed");
            }
        }
    }

    async fn emit(&mut self, event: MeshEvent) {
        // A dropped receiver just means nobody is listening anymore.
        let _ = self.events.send(event).await;
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}
