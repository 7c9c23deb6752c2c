//! Per-session traffic counters.
//!
//! Counters are atomics updated from the reader and writer tasks and read
//! from anywhere. [`NetStatistics::snapshot`] gives a serializable copy.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use serde::Serialize;

/// Live traffic counters of one session.
#[derive(Debug, Default)]
pub struct NetStatistics {
    bytes_received: AtomicU64,
    bytes_sent: AtomicU64,
    packets_received: AtomicU64,
    packets_sent: AtomicU64,
    connected_at: Mutex<Option<SystemTime>>,
}

/// Point-in-time copy of [`NetStatistics`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatisticsSnapshot {
    /// Raw bytes read from the socket (before decompression).
    pub bytes_received: u64,
    /// Bytes written to the socket.
    pub bytes_sent: u64,
    /// Packets dispatched.
    pub packets_received: u64,
    /// Packets handed to the send queue.
    pub packets_sent: u64,
    /// When the current connection was established.
    pub connected_at: Option<SystemTime>,
}

impl NetStatistics {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero every counter and stamp the connection time.
    pub fn reset(&self) {
        self.bytes_received.store(0, Ordering::Relaxed);
        self.bytes_sent.store(0, Ordering::Relaxed);
        self.packets_received.store(0, Ordering::Relaxed);
        self.packets_sent.store(0, Ordering::Relaxed);
        *self.connected_at.lock() = Some(SystemTime::now());
    }

    #[inline]
    pub(crate) fn record_received_bytes(&self, n: usize) {
        self.bytes_received.fetch_add(n as u64, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_sent_bytes(&self, n: usize) {
        self.bytes_sent.fetch_add(n as u64, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_received_packet(&self) {
        self.record_received_packets(1);
    }

    #[inline]
    pub(crate) fn record_received_packets(&self, n: usize) {
        self.packets_received.fetch_add(n as u64, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_sent_packet(&self) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Raw bytes read from the socket.
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    /// Bytes written to the socket.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    /// Packets dispatched.
    pub fn packets_received(&self) -> u64 {
        self.packets_received.load(Ordering::Relaxed)
    }

    /// Packets handed to the send queue.
    pub fn packets_sent(&self) -> u64 {
        self.packets_sent.load(Ordering::Relaxed)
    }

    /// Time since the connection was established.
    pub fn connected_for(&self) -> Option<Duration> {
        let since = (*self.connected_at.lock())?;
        SystemTime::now().duration_since(since).ok()
    }

    /// Copy all counters.
    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            bytes_received: self.bytes_received(),
            bytes_sent: self.bytes_sent(),
            packets_received: self.packets_received(),
            packets_sent: self.packets_sent(),
            connected_at: *self.connected_at.lock(),
        }
    }
}
