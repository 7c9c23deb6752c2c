//! Growable circular byte buffer for inbound bytes awaiting framing.
//!
//! Bytes are appended at `tail` and consumed from `head`, both modulo the
//! capacity. When an append does not fit, the buffer grows to the next
//! multiple of [`GROWTH_STEP`] that holds everything and re-linearizes the
//! unread bytes at offset 0. Draining the buffer resets both cursors to 0.
//!
//! # Example
//!
//! ```
//! use shardwire::protocol::RingBuffer;
//!
//! let mut ring = RingBuffer::new();
//! ring.enqueue(&[0xA8, 0x00, 0x05, 1, 2]);
//!
//! assert_eq!(ring.peek_byte(), 0xA8);
//! assert_eq!(ring.peek_length(), 5);
//!
//! let mut out = [0u8; 5];
//! assert_eq!(ring.dequeue(&mut out), 5);
//! assert!(ring.is_empty());
//! ```

use super::wire_format::{read_u16_be, DYNAMIC_HEADER_SIZE, EMPTY_ID_SENTINEL};
use crate::error::{check_range, Result};

/// Capacity is always a multiple of this many bytes.
pub const GROWTH_STEP: usize = 2048;

/// Circular byte queue with unbounded growth.
#[derive(Debug, Default)]
pub struct RingBuffer {
    buffer: Vec<u8>,
    head: usize,
    tail: usize,
    len: usize,
}

impl RingBuffer {
    /// Create an empty ring with no backing storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a ring able to hold `capacity` bytes before growing.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: vec![0u8; round_up(capacity)],
            head: 0,
            tail: 0,
            len: 0,
        }
    }

    /// Number of unread bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether there is nothing to read.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size of the backing array.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Read cursor.
    #[inline]
    pub fn head(&self) -> usize {
        self.head
    }

    /// Write cursor.
    #[inline]
    pub fn tail(&self) -> usize {
        self.tail
    }

    /// Append all of `data`, growing first when it does not fit.
    pub fn enqueue(&mut self, data: &[u8]) {
        let size = data.len();
        if size == 0 {
            return;
        }

        if self.len + size > self.buffer.len() {
            self.grow(self.len + size);
        }

        let capacity = self.buffer.len();
        let first = size.min(capacity - self.tail);
        self.buffer[self.tail..self.tail + first].copy_from_slice(&data[..first]);
        if first < size {
            self.buffer[..size - first].copy_from_slice(&data[first..]);
        }

        self.tail = (self.tail + size) % capacity;
        self.len += size;
    }

    /// Append `data[offset..offset + size]`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when the window does not fit `data`; the ring is untouched.
    pub fn enqueue_range(&mut self, data: &[u8], offset: usize, size: usize) -> Result<()> {
        check_range(data.len(), offset, size)?;
        self.enqueue(&data[offset..offset + size]);
        Ok(())
    }

    /// Move up to `dest.len()` bytes out of the ring. Returns the count moved.
    pub fn dequeue(&mut self, dest: &mut [u8]) -> usize {
        let size = dest.len().min(self.len);
        if size == 0 {
            return 0;
        }

        let capacity = self.buffer.len();
        let first = size.min(capacity - self.head);
        dest[..first].copy_from_slice(&self.buffer[self.head..self.head + first]);
        if first < size {
            dest[first..size].copy_from_slice(&self.buffer[..size - first]);
        }

        self.head = (self.head + size) % capacity;
        self.len -= size;

        if self.len == 0 {
            self.head = 0;
            self.tail = 0;
        }

        size
    }

    /// Move up to `size` bytes into `dest[offset..offset + size]`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when the window does not fit `dest`; nothing is consumed.
    pub fn dequeue_range(&mut self, dest: &mut [u8], offset: usize, size: usize) -> Result<usize> {
        check_range(dest.len(), offset, size)?;
        Ok(self.dequeue(&mut dest[offset..offset + size]))
    }

    /// First unread byte (the packet id), or `0xFF` when empty.
    #[inline]
    pub fn peek_byte(&self) -> u8 {
        if self.len == 0 {
            EMPTY_ID_SENTINEL
        } else {
            self.buffer[self.head]
        }
    }

    /// Big-endian u16 at logical offsets 1..3, or 0 with fewer than 3 bytes.
    pub fn peek_length(&self) -> u16 {
        if self.len < DYNAMIC_HEADER_SIZE {
            return 0;
        }
        let capacity = self.buffer.len();
        let hi = self.buffer[(self.head + 1) % capacity];
        let lo = self.buffer[(self.head + 2) % capacity];
        read_u16_be(hi, lo)
    }

    /// Discard all unread bytes, keeping the allocation.
    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.len = 0;
    }

    fn grow(&mut self, required: usize) {
        let new_capacity = round_up(required);
        let mut grown = vec![0u8; new_capacity];
        let moved = self.len;
        self.dequeue(&mut grown[..moved]);

        tracing::trace!(
            from = self.buffer.len(),
            to = new_capacity,
            "Growing receive ring"
        );

        self.buffer = grown;
        self.head = 0;
        self.tail = moved % new_capacity;
        self.len = moved;
    }
}

#[inline]
fn round_up(size: usize) -> usize {
    size.div_ceil(GROWTH_STEP) * GROWTH_STEP
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(ring: &mut RingBuffer) -> Vec<u8> {
        let mut out = vec![0u8; ring.len()];
        let n = ring.dequeue(&mut out);
        out.truncate(n);
        out
    }

    #[test]
    fn test_new_is_empty() {
        let ring = RingBuffer::new();
        assert!(ring.is_empty());
        assert_eq!(ring.capacity(), 0);
        assert_eq!(ring.peek_byte(), 0xFF);
        assert_eq!(ring.peek_length(), 0);
    }

    #[test]
    fn test_growth_rounds_to_step() {
        let mut ring = RingBuffer::new();
        ring.enqueue(&[1]);
        assert_eq!(ring.capacity(), 2048);

        ring.enqueue(&vec![2u8; 2048]);
        assert_eq!(ring.len(), 2049);
        assert_eq!(ring.capacity(), 4096);
    }

    #[test]
    fn test_exact_fit_does_not_grow() {
        let mut ring = RingBuffer::with_capacity(2048);
        ring.enqueue(&vec![7u8; 2048]);
        assert_eq!(ring.capacity(), 2048);
        assert_eq!(ring.len(), 2048);
        assert_eq!(ring.head(), ring.tail());
    }

    #[test]
    fn test_round_trip_across_wrap_and_growth() {
        let mut ring = RingBuffer::with_capacity(2048);
        let mut expected = Vec::new();
        let mut actual = Vec::new();
        let mut next = 0u8;

        let mut produce = |n: usize| -> Vec<u8> {
            (0..n)
                .map(|_| {
                    next = next.wrapping_add(1);
                    next
                })
                .collect()
        };

        // Advance head so the next write wraps past the physical end
        let a = produce(1500);
        ring.enqueue(&a);
        expected.extend_from_slice(&a);
        let mut out = vec![0u8; 1200];
        ring.dequeue(&mut out);
        actual.extend_from_slice(&out);

        let b = produce(1000);
        ring.enqueue(&b);
        expected.extend_from_slice(&b);
        assert!(ring.tail() < ring.head(), "write should have wrapped");
        assert_eq!(ring.capacity(), 2048);

        // Grow while wrapped
        let c = produce(3000);
        ring.enqueue(&c);
        expected.extend_from_slice(&c);
        assert_eq!(ring.capacity(), 6144);
        assert_eq!(ring.head(), 0);

        actual.extend(drain(&mut ring));
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_drain_resets_cursors() {
        let mut ring = RingBuffer::new();
        ring.enqueue(b"abcdef");

        let mut out = [0u8; 4];
        ring.dequeue(&mut out);
        assert_eq!(ring.head(), 4);

        let mut rest = [0u8; 10];
        assert_eq!(ring.dequeue(&mut rest), 2);
        assert_eq!(&rest[..2], b"ef");
        assert_eq!(ring.head(), 0);
        assert_eq!(ring.tail(), 0);
        assert_eq!(ring.peek_byte(), 0xFF);
    }

    #[test]
    fn test_dequeue_empty_returns_zero() {
        let mut ring = RingBuffer::new();
        let mut out = [0u8; 8];
        assert_eq!(ring.dequeue(&mut out), 0);
    }

    #[test]
    fn test_peek_length_across_wrap() {
        let mut ring = RingBuffer::with_capacity(2048);

        // Keep one byte unread so the cursors are not reset
        ring.enqueue(&vec![0u8; 2047]);
        let mut skip = vec![0u8; 2046];
        ring.dequeue(&mut skip);
        assert_eq!(ring.head(), 2046);

        // Remaining byte at 2046, then id at 2047, length bytes at 0 and 1
        let mut one = [0u8; 1];
        ring.enqueue(&[0xA8, 0x01, 0x02]);
        ring.dequeue(&mut one);
        assert_eq!(ring.head(), 2047);
        assert_eq!(ring.peek_byte(), 0xA8);
        assert_eq!(ring.peek_length(), 0x0102);
    }

    #[test]
    fn test_peek_length_needs_three_bytes() {
        let mut ring = RingBuffer::new();
        ring.enqueue(&[0xA8, 0x00]);
        assert_eq!(ring.peek_length(), 0);
        ring.enqueue(&[0x07]);
        assert_eq!(ring.peek_length(), 7);
    }

    #[test]
    fn test_enqueue_range_rejects_bad_window() {
        let mut ring = RingBuffer::new();
        let data = [1u8, 2, 3];

        assert!(ring.enqueue_range(&data, 2, 5).is_err());
        assert!(ring.enqueue_range(&data, usize::MAX, 2).is_err());
        assert!(ring.is_empty());

        ring.enqueue_range(&data, 1, 2).unwrap();
        assert_eq!(drain(&mut ring), vec![2, 3]);
    }

    #[test]
    fn test_dequeue_range() {
        let mut ring = RingBuffer::new();
        ring.enqueue(b"xyz");

        let mut dest = [0u8; 6];
        assert!(ring.dequeue_range(&mut dest, 4, 3).is_err());
        assert_eq!(ring.len(), 3);

        assert_eq!(ring.dequeue_range(&mut dest, 3, 3).unwrap(), 3);
        assert_eq!(&dest[3..], b"xyz");
    }

    #[test]
    fn test_clear() {
        let mut ring = RingBuffer::new();
        ring.enqueue(b"data");
        ring.clear();
        assert!(ring.is_empty());
        assert_eq!(ring.head(), 0);
        assert_eq!(ring.capacity(), 2048);
    }
}
