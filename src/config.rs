//! Transport configuration.
//!
//! All values have defaults matching the classic client behaviour, so an
//! empty JSON object is a valid configuration.
//!
//! # Example
//!
//! ```
//! use shardwire::TransportConfig;
//!
//! let config = TransportConfig::from_json_str(r#"{ "send_queue_capacity": 65536 }"#).unwrap();
//! assert_eq!(config.send_queue_capacity, 65536);
//! assert!(config.nodelay);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TransportError};

/// Default size of a receive segment (64 KiB).
pub const DEFAULT_RECEIVE_SEGMENT_SIZE: usize = 0x10000;

/// Default size of a pooled buffer for one received packet (4 KiB).
pub const DEFAULT_PACKET_SEGMENT_SIZE: usize = 4096;

/// Default number of segments pre-allocated in the shared receive pool.
pub const DEFAULT_POOL_SEGMENTS: usize = 10;

/// Default hard cap for queued outbound bytes (256 KiB).
pub const DEFAULT_SEND_QUEUE_CAPACITY: usize = 256 * 1024;

/// Largest packet the framer accepts by default (the u16 length field limit).
pub const DEFAULT_MAX_PACKET_LENGTH: usize = u16::MAX as usize;

/// Default write timeout in milliseconds.
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 30_000;

/// Configuration for a [`TransportSession`](crate::TransportSession).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Size of each pooled receive / spill-over segment.
    pub receive_segment_size: usize,
    /// Size of pooled packet buffers; longer packets get their own allocation.
    pub packet_segment_size: usize,
    /// Segments pre-allocated in the shared pool.
    pub pool_segments: usize,
    /// Hard cap on queued outbound bytes; exceeding it drops the connection.
    pub send_queue_capacity: usize,
    /// Declared packet lengths above this are a framing desync.
    pub max_packet_length: usize,
    /// Set `TCP_NODELAY` on the socket.
    pub nodelay: bool,
    /// A single gram write taking longer than this is treated as a socket error.
    pub write_timeout_ms: u64,
    /// Emit hex dumps of every packet at `trace` level.
    pub log_packets: bool,
}

impl TransportConfig {
    /// Parse a configuration from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the values can drive a session.
    pub fn validate(&self) -> Result<()> {
        if self.receive_segment_size == 0 {
            return Err(TransportError::InvalidArgument(
                "receive_segment_size must be greater than zero".into(),
            ));
        }
        if self.packet_segment_size == 0 {
            return Err(TransportError::InvalidArgument(
                "packet_segment_size must be greater than zero".into(),
            ));
        }
        if self.send_queue_capacity == 0 {
            return Err(TransportError::InvalidArgument(
                "send_queue_capacity must be greater than zero".into(),
            ));
        }
        if self.write_timeout_ms == 0 {
            return Err(TransportError::InvalidArgument(
                "write_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.max_packet_length < 3 {
            return Err(TransportError::InvalidArgument(format!(
                "max_packet_length {} cannot hold a dynamic header",
                self.max_packet_length
            )));
        }
        Ok(())
    }

    /// Write timeout as a `Duration`.
    #[inline]
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            receive_segment_size: DEFAULT_RECEIVE_SEGMENT_SIZE,
            packet_segment_size: DEFAULT_PACKET_SEGMENT_SIZE,
            pool_segments: DEFAULT_POOL_SEGMENTS,
            send_queue_capacity: DEFAULT_SEND_QUEUE_CAPACITY,
            max_packet_length: DEFAULT_MAX_PACKET_LENGTH,
            nodelay: true,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
            log_packets: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = TransportConfig::default();
        assert_eq!(config.receive_segment_size, 0x10000);
        assert_eq!(config.packet_segment_size, 4096);
        assert_eq!(config.send_queue_capacity, 256 * 1024);
        assert_eq!(config.max_packet_length, 0xFFFF);
        assert!(config.nodelay);
        assert!(!config.log_packets);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config = TransportConfig::from_json_str("{}").unwrap();
        assert_eq!(config, TransportConfig::default());
    }

    #[test]
    fn test_partial_json_overrides() {
        let config =
            TransportConfig::from_json_str(r#"{ "log_packets": true, "write_timeout_ms": 50 }"#)
                .unwrap();
        assert!(config.log_packets);
        assert_eq!(config.write_timeout(), Duration::from_millis(50));
        assert_eq!(config.pool_segments, DEFAULT_POOL_SEGMENTS);
    }

    #[test]
    fn test_invalid_json() {
        let result = TransportConfig::from_json_str("{ not json");
        assert!(matches!(result, Err(TransportError::Json(_))));
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let result = TransportConfig::from_json_str(r#"{ "send_queue_capacity": 0 }"#);
        assert!(matches!(result, Err(TransportError::InvalidArgument(_))));
    }

    #[test]
    fn test_rejects_zero_write_timeout() {
        let result = TransportConfig::from_json_str(r#"{ "write_timeout_ms": 0 }"#);
        assert!(matches!(result, Err(TransportError::InvalidArgument(_))));
    }

    #[test]
    fn test_rejects_tiny_max_packet() {
        let config = TransportConfig {
            max_packet_length: 2,
            ..TransportConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
