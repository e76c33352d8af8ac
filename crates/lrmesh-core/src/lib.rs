//! # lrmesh-core
//!
//! Mesh-networking packet router for long-range radio links. This crate
//! sits between a half-duplex radio transceiver and the rest of the
//! system: it encodes and decodes a compact binary frame format,
//! propagates messages across multiple hops with managed flooding,
//! suppresses duplicate rebroadcasts, and keeps a live table of peers
//! with link-quality metrics.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                    Application boundary                       │
//! │      send_message / event stream / node list / stats          │
//! └───────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌───────────────────────────────────────────────────────────────┐
//! │                      MeshSession (task)                       │
//! │  ┌──────────────────────┐   ┌──────────────────────────────┐  │
//! │  │     FloodRouter      │   │  pending relays (jittered)   │  │
//! │  │  dedup │ node table  │   │  cancel on duplicate heard   │  │
//! │  └──────────────────────┘   └──────────────────────────────┘  │
//! └───────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌──────────────────────────────┐   ┌───────────────────────────┐
//! │    wire codec (CRC-16)       │   │   GatewayBridge (opt.)    │
//! └──────────────────────────────┘   └───────────────────────────┘
//!                               │
//!                               ▼
//! ┌───────────────────────────────────────────────────────────────┐
//! │            RadioTransport (half-duplex, single owner)         │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use lrmesh_core::{MeshConfig, MeshSession, SimBus};
//!
//! #[tokio::main]
//! async fn main() {
//!     let bus = SimBus::new();
//!     let (session, mut events) = MeshSession::spawn(MeshConfig::default(), bus.endpoint());
//!
//!     session.handle().send_text("hello mesh").await.unwrap();
//!     if let Some(event) = events.recv().await {
//!         println!("{event:?}");
//!     }
//!     session.shutdown().await;
//! }
//! ```

pub mod config;
pub mod dedup;
pub mod error;
pub mod gateway;
pub mod nodes;
pub mod packet;
pub mod payload;
pub mod radio;
pub mod router;
pub mod session;
pub mod sim;
pub mod wire;

// Re-export main types
pub use config::{ChannelConfig, MeshConfig};
pub use error::{CodecError, MeshError, TransmitError};
pub use gateway::{ChannelGateway, GatewayBridge};
pub use nodes::{NodeInfo, NodeTable};
pub use packet::{MeshPacket, NodeId};
pub use payload::PayloadType;
pub use radio::{RadioTransport, RxFrame};
pub use router::{Disposition, FloodRouter, RouterStats, RxOutcome};
pub use session::{MeshEvent, MeshHandle, MeshSession};
pub use sim::{SimBus, SimRadio};
