//! Radio transport boundary
//!
//! The transceiver is half-duplex and single-owner: at most one send or
//! receive is in flight at a time, so all access goes through the one
//! session task that owns the implementation. The physical layer
//! (modulation, register map) lives behind this trait and is not
//! specified here.

use crate::error::TransmitError;
use async_trait::async_trait;
use std::time::Duration;

/// A raw frame received off the air, with per-frame link metrics
#[derive(Debug, Clone)]
pub struct RxFrame {
    pub bytes: Vec<u8>,
    /// Received signal strength (dBm)
    pub rssi: f32,
    /// Signal-to-noise ratio (dB)
    pub snr: f32,
}

/// Half-duplex send/receive primitive for raw byte frames.
#[async_trait]
pub trait RadioTransport: Send {
    /// Transmit one frame. `Busy` means the transceiver could not take
    /// the frame right now; callers retry once after a short backoff.
    async fn send(&mut self, frame: &[u8]) -> Result<(), TransmitError>;

    /// Wait up to `timeout` for a frame. None means the poll timed out;
    /// the polling cadence is a policy parameter, not a protocol one.
    async fn receive(&mut self, timeout: Duration) -> Option<RxFrame>;
}
