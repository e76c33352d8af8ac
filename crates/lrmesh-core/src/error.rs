//! Error types for the mesh router.

use thiserror::Error;

/// Frame codec errors. Terminal for the offending frame only; never
/// propagated past the router as a failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Frame too short or structurally inconsistent
    #[error("malformed frame: {0}")]
    Malformed(&'static str),

    /// Checksum did not match; the frame is corrupt
    #[error("checksum mismatch: expected {expected:#06x}, got {actual:#06x}")]
    ChecksumMismatch { expected: u16, actual: u16 },

    /// Payload exceeds the wire cap
    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),
}

/// Radio transport send failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransmitError {
    /// Transceiver busy (half-duplex contention)
    #[error("radio busy")]
    Busy,

    /// Transport-level failure
    #[error("radio error: {0}")]
    Failed(String),
}

/// Errors surfaced at the application boundary
#[derive(Error, Debug)]
pub enum MeshError {
    /// Payload rejected before a packet was built
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The session task is gone
    #[error("mesh session closed")]
    SessionClosed,
}

/// Result type alias for mesh operations
pub type Result<T> = std::result::Result<T, MeshError>;
