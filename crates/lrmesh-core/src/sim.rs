//! In-memory radio bus for tests and simulation
//!
//! A [`SimBus`] is a fully-connected broadcast medium: every frame sent
//! by one endpoint is delivered to all others, stamped with a fixed
//! RSSI/SNR. There is no propagation model — the physical layer is out
//! of scope — but it is enough to exercise flooding, dedup, relay
//! cancellation, and hop accounting across real sessions.

use crate::error::TransmitError;
use crate::radio::{RadioTransport, RxFrame};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

struct BusInner {
    endpoints: Vec<mpsc::Sender<RxFrame>>,
}

/// Shared broadcast medium handing out radio endpoints
#[derive(Clone)]
pub struct SimBus {
    inner: Arc<Mutex<BusInner>>,
    rssi: f32,
    snr: f32,
}

impl SimBus {
    pub fn new() -> Self {
        Self::with_link(-80.0, 10.0)
    }

    /// Bus whose deliveries carry the given link metrics
    pub fn with_link(rssi: f32, snr: f32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusInner {
                endpoints: Vec::new(),
            })),
            rssi,
            snr,
        }
    }

    /// Attach a new radio to the bus
    pub fn endpoint(&self) -> SimRadio {
        let (tx, rx) = mpsc::channel(64);
        let index = {
            let mut inner = self.inner.lock().expect("bus lock poisoned");
            inner.endpoints.push(tx);
            inner.endpoints.len() - 1
        };
        SimRadio {
            bus: self.inner.clone(),
            index,
            rx,
            rssi: self.rssi,
            snr: self.snr,
        }
    }
}

impl Default for SimBus {
    fn default() -> Self {
        Self::new()
    }
}

/// One endpoint on a [`SimBus`]
pub struct SimRadio {
    bus: Arc<Mutex<BusInner>>,
    index: usize,
    rx: mpsc::Receiver<RxFrame>,
    rssi: f32,
    snr: f32,
}

#[async_trait]
impl RadioTransport for SimRadio {
    async fn send(&mut self, frame: &[u8]) -> Result<(), TransmitError> {
        let inner = self.bus.lock().expect("bus lock poisoned");
        for (i, endpoint) in inner.endpoints.iter().enumerate() {
            if i == self.index {
                continue; // half-duplex: a radio never hears itself
            }
            // A full receive queue models a receiver that was deaf to
            // this frame; the medium itself is lossy.
            let _ = endpoint.try_send(RxFrame {
                bytes: frame.to_vec(),
                rssi: self.rssi,
                snr: self.snr,
            });
        }
        Ok(())
    }

    async fn receive(&mut self, timeout: Duration) -> Option<RxFrame> {
        tokio::time::timeout(timeout, self.rx.recv()).await.ok()?
    }
}
