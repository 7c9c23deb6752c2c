//! Error types for shardwire.

use thiserror::Error;

/// Main error type for all transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while loading configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Protocol error (framing desync, oversized packet, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Send queue would exceed its hard byte cap.
    #[error("Send queue capacity exceeded: requested {requested} bytes, {available} available")]
    CapacityExceeded {
        /// Bytes the caller tried to enqueue.
        requested: usize,
        /// Bytes still available under the cap.
        available: usize,
    },

    /// Caller passed an offset/length that does not fit the buffer.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation requires an open connection.
    #[error("Not connected")]
    NotConnected,

    /// Connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Host name could not be resolved to an address.
    #[error("Could not resolve address: {0}")]
    AddressResolution(String),
}

/// Result type alias using TransportError.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Validate an `(offset, size)` window against a buffer of `len` bytes.
pub(crate) fn check_range(len: usize, offset: usize, size: usize) -> Result<()> {
    match offset.checked_add(size) {
        Some(end) if end <= len => Ok(()),
        _ => Err(TransportError::InvalidArgument(format!(
            "offset {} + size {} out of bounds for buffer of {} bytes",
            offset, size, len
        ))),
    }
}
