//! Slices complete packets out of the receive ring.
//!
//! The framer is stateless between calls: every decision is made by peeking
//! at the ring. For each packet it:
//! - peeks the id and looks up its declared length
//! - for dynamic ids, waits until the 3-byte header is buffered and reads
//!   the length field
//! - waits until the whole packet is buffered, then dequeues it into a
//!   pooled segment (or a one-off allocation for oversized packets)
//!
//! An incomplete packet is not an error; `next_packet` returns `Ok(None)`
//! and the bytes stay in the ring. A declared length that cannot hold its
//! own header, or that exceeds the configured maximum, means the stream is
//! desynchronized and is reported as a protocol error.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use shardwire::pool::{BufferPool, SegmentPool};
//! use shardwire::protocol::{PacketFramer, PacketLengthTable, RingBuffer};
//!
//! let table = Arc::new(PacketLengthTable::new().with_fixed(0x73, 2));
//! let pool: Arc<dyn BufferPool> = Arc::new(SegmentPool::new(4096, 1));
//! let framer = PacketFramer::new(table, pool);
//!
//! let mut ring = RingBuffer::new();
//! ring.enqueue(&[0x73]);
//! assert!(framer.next_packet(&mut ring).unwrap().is_none());
//!
//! ring.enqueue(&[0x01]);
//! let packet = framer.next_packet(&mut ring).unwrap().unwrap();
//! assert_eq!(packet.payload(), &[0x01]);
//! ```

use std::sync::Arc;

use super::packet::Packet;
use super::packet_table::{PacketLength, PacketLengths};
use super::ring_buffer::RingBuffer;
use super::wire_format::{DYNAMIC_HEADER_SIZE, ID_SIZE};
use crate::config::DEFAULT_MAX_PACKET_LENGTH;
use crate::error::{Result, TransportError};
use crate::pool::{BufferPool, PooledSegment};

/// Extracts length-delimited packets from a [`RingBuffer`].
#[derive(Clone)]
pub struct PacketFramer {
    lengths: Arc<dyn PacketLengths>,
    pool: Arc<dyn BufferPool>,
    max_packet_length: usize,
}

impl PacketFramer {
    /// Create a framer over a length table, drawing packet buffers from `pool`.
    pub fn new(lengths: Arc<dyn PacketLengths>, pool: Arc<dyn BufferPool>) -> Self {
        Self {
            lengths,
            pool,
            max_packet_length: DEFAULT_MAX_PACKET_LENGTH,
        }
    }

    /// Reject declared lengths above `max`.
    pub fn with_max_packet_length(mut self, max: usize) -> Self {
        self.max_packet_length = max;
        self
    }

    /// The length table in use.
    pub fn lengths(&self) -> &Arc<dyn PacketLengths> {
        &self.lengths
    }

    /// Try to take one packet off the ring.
    ///
    /// Returns:
    /// - `Ok(Some(packet))` if a complete packet was dequeued
    /// - `Ok(None)` if the ring is empty or the next packet is incomplete
    /// - `Err(Protocol)` if the next packet's declared length is impossible
    pub fn next_packet(&self, ring: &mut RingBuffer) -> Result<Option<Packet>> {
        if ring.is_empty() {
            return Ok(None);
        }

        let id = ring.peek_byte();
        let (declared, dynamic) = match self.lengths.packet_length(id) {
            PacketLength::Fixed(n) => (n as usize, false),
            PacketLength::Dynamic => {
                if ring.len() < DYNAMIC_HEADER_SIZE {
                    return Ok(None);
                }
                (ring.peek_length() as usize, true)
            }
        };

        let header = if dynamic { DYNAMIC_HEADER_SIZE } else { ID_SIZE };
        if declared < header || declared > self.max_packet_length {
            tracing::warn!(
                id,
                declared,
                buffered = ring.len(),
                "Framing desync"
            );
            return Err(TransportError::Protocol(format!(
                "packet 0x{:02X} declares length {} (allowed {}..={})",
                id, declared, header, self.max_packet_length
            )));
        }

        if ring.len() < declared {
            return Ok(None);
        }

        let mut segment = PooledSegment::for_size(&self.pool, declared);
        let taken = ring.dequeue(&mut segment.buffer_mut()[..declared]);
        segment.set_len(taken);

        Ok(Some(Packet::from_segment(segment, dynamic)))
    }

    /// Take every complete packet currently in the ring.
    ///
    /// Packets dequeued before an error are lost along with the connection.
    pub fn extract_all(&self, ring: &mut RingBuffer) -> Result<Vec<Packet>> {
        let mut packets = Vec::new();
        while let Some(packet) = self.next_packet(ring)? {
            packets.push(packet);
        }
        Ok(packets)
    }
}
