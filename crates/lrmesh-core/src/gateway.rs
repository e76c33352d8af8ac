//! Gateway bridge boundary
//!
//! Optional uplink toward a pub/sub broker for cloud visibility. The
//! bridge does format translation only: encoded frames go up verbatim,
//! and remote frames injected back through
//! [`crate::session::MeshHandle::inject_remote`] run the identical
//! dedup and relay logic as radio traffic. No routing decisions are
//! made here.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Gateway publish failure. Logged by the session, never fatal.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("gateway publish failed: {0}")]
    Publish(String),
}

/// Sink for encoded mesh frames heading to an upstream broker.
#[async_trait]
pub trait GatewayBridge: Send {
    async fn publish(&mut self, frame: &[u8]) -> Result<(), GatewayError>;
}

/// Bridge that hands frames to an in-process channel. Stands in for a
/// broker client; also used by the tests.
pub struct ChannelGateway {
    uplink: mpsc::Sender<Vec<u8>>,
}

impl ChannelGateway {
    pub fn new(uplink: mpsc::Sender<Vec<u8>>) -> Self {
        Self { uplink }
    }
}

#[async_trait]
impl GatewayBridge for ChannelGateway {
    async fn publish(&mut self, frame: &[u8]) -> Result<(), GatewayError> {
        self.uplink
            .send(frame.to_vec())
            .await
            .map_err(|_| GatewayError::Publish("uplink closed".to_string()))
    }
}
