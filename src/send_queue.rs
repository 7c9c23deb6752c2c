//! Outbound send coalescing into fixed-size grams.
//!
//! Outgoing bytes are packed into pooled 512-byte blocks ("grams"). Full
//! grams wait in a FIFO (`pending`) for the writer; at most one partially
//! filled gram (`buffered`) collects the tail of the stream until it fills
//! up or is promoted by [`SendQueue::check_flush_ready`].
//!
//! The total queued size is capped. An enqueue that would exceed the cap
//! fails with [`TransportError::CapacityExceeded`] and leaves the queue
//! exactly as it was.
//!
//! The queue itself is not synchronized; the session keeps it behind its own
//! lock, separate from the "write in flight" flag.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use shardwire::pool::{BufferPool, SegmentPool};
//! use shardwire::send_queue::{SendQueue, GRAM_SIZE};
//!
//! let pool: Arc<dyn BufferPool> = Arc::new(SegmentPool::new(GRAM_SIZE, 4));
//! let mut queue = SendQueue::new(pool, 4096);
//!
//! // A small write stays buffered
//! assert!(queue.enqueue(&[0x73; 10]).unwrap().is_none());
//! assert!(queue.is_flush_ready());
//!
//! // Promote it so it can be written without waiting for more data
//! let gram = queue.check_flush_ready().unwrap();
//! assert_eq!(gram.len(), 10);
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use crate::error::{check_range, Result, TransportError};
use crate::pool::{BufferPool, PooledSegment};

/// Size of one gram in bytes.
pub const GRAM_SIZE: usize = 512;

/// One pooled block of outgoing bytes.
pub struct Gram {
    segment: PooledSegment,
}

impl Gram {
    fn acquire(pool: &Arc<dyn BufferPool>) -> Self {
        Self {
            segment: PooledSegment::acquire(pool),
        }
    }

    /// Filled bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.segment
    }

    /// Filled length.
    #[inline]
    pub fn len(&self) -> usize {
        self.segment.len()
    }

    /// Whether nothing is filled.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.segment.is_empty()
    }

    /// Whether no more bytes fit.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.segment.len() == self.segment.capacity()
    }

    /// Copy as much of `data` as fits; returns the number of bytes taken.
    fn fill(&mut self, data: &[u8]) -> usize {
        let start = self.segment.len();
        let n = (self.segment.capacity() - start).min(data.len());
        self.segment.buffer_mut()[start..start + n].copy_from_slice(&data[..n]);
        self.segment.set_len(start + n);
        n
    }
}

impl fmt::Debug for Gram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gram")
            .field("len", &self.segment.len())
            .field("capacity", &self.segment.capacity())
            .finish()
    }
}

/// FIFO of full grams plus one partially filled gram, under a byte cap.
pub struct SendQueue {
    pool: Arc<dyn BufferPool>,
    gram_size: usize,
    capacity: usize,
    pending: VecDeque<Gram>,
    buffered: Option<Gram>,
}

impl SendQueue {
    /// Create an empty queue drawing grams from `pool`.
    ///
    /// Grams are the pool's segment size; sessions use a [`GRAM_SIZE`] pool.
    pub fn new(pool: Arc<dyn BufferPool>, capacity: usize) -> Self {
        let gram_size = pool.segment_size();
        Self {
            pool,
            gram_size,
            capacity,
            pending: VecDeque::new(),
            buffered: None,
        }
    }

    /// Append `data`.
    ///
    /// Returns the head of `pending` when this call moved the first gram
    /// into an empty `pending` list (nothing can be in flight, so the caller
    /// should start writing it). Returns `None` otherwise.
    ///
    /// Fails with `CapacityExceeded` without touching the queue when the
    /// cap would be exceeded.
    pub fn enqueue(&mut self, data: &[u8]) -> Result<Option<&Gram>> {
        if data.is_empty() {
            return Ok(None);
        }
        if self.gram_size == 0 {
            return Err(TransportError::InvalidArgument(
                "gram pool hands out empty segments".into(),
            ));
        }

        let existing = self.queued_bytes();
        if existing + data.len() > self.capacity {
            tracing::warn!(
                requested = data.len(),
                queued = existing,
                capacity = self.capacity,
                "Send queue capacity exceeded"
            );
            return Err(TransportError::CapacityExceeded {
                requested: data.len(),
                available: self.capacity.saturating_sub(existing),
            });
        }

        let was_idle = self.pending.is_empty();
        let mut rest = data;

        while !rest.is_empty() {
            let pool = &self.pool;
            let gram = self.buffered.get_or_insert_with(|| Gram::acquire(pool));
            let taken = gram.fill(rest);
            rest = &rest[taken..];

            if gram.is_full() {
                if let Some(full) = self.buffered.take() {
                    self.pending.push_back(full);
                }
            }
        }

        if was_idle && !self.pending.is_empty() {
            Ok(self.pending.front())
        } else {
            Ok(None)
        }
    }

    /// Checked `(buffer, offset, len)` form of [`enqueue`](Self::enqueue).
    pub fn enqueue_range(&mut self, data: &[u8], offset: usize, len: usize) -> Result<Option<&Gram>> {
        check_range(data.len(), offset, len)?;
        self.enqueue(&data[offset..offset + len])
    }

    /// Release the head gram (the one just written) and return the new head.
    pub fn dequeue(&mut self) -> Option<&Gram> {
        self.pending.pop_front();
        self.pending.front()
    }

    /// Whether only a partial gram is waiting.
    #[inline]
    pub fn is_flush_ready(&self) -> bool {
        self.pending.is_empty() && self.buffered.as_ref().is_some_and(|g| !g.is_empty())
    }

    /// Promote the partial gram into `pending` when flush-ready, and return it.
    pub fn check_flush_ready(&mut self) -> Option<&Gram> {
        if !self.is_flush_ready() {
            return None;
        }
        let gram = self.buffered.take()?;
        self.pending.push_back(gram);
        self.pending.front()
    }

    /// Release every gram back to the pool.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.buffered = None;
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.buffered.as_ref().map_or(true, Gram::is_empty)
    }

    /// Number of grams waiting in `pending`.
    #[inline]
    pub fn pending_grams(&self) -> usize {
        self.pending.len()
    }

    /// Bytes in the partial gram.
    #[inline]
    pub fn buffered_len(&self) -> usize {
        self.buffered.as_ref().map_or(0, Gram::len)
    }

    /// Bytes counted against the cap.
    ///
    /// Pending grams count as full even when a promoted partial gram is
    /// shorter.
    #[inline]
    pub fn queued_bytes(&self) -> usize {
        self.pending.len() * self.gram_size + self.buffered_len()
    }

    /// The byte cap.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl fmt::Debug for SendQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendQueue")
            .field("pending_grams", &self.pending.len())
            .field("buffered_len", &self.buffered_len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::SegmentPool;

    fn queue(capacity: usize) -> (SendQueue, Arc<dyn BufferPool>) {
        let pool: Arc<dyn BufferPool> = Arc::new(SegmentPool::new(GRAM_SIZE, 4));
        (SendQueue::new(pool.clone(), capacity), pool)
    }

    #[test]
    fn test_small_write_stays_buffered() {
        let (mut q, _) = queue(4096);
        assert!(q.enqueue(b"hello").unwrap().is_none());
        assert_eq!(q.pending_grams(), 0);
        assert_eq!(q.buffered_len(), 5);
        assert!(q.is_flush_ready());
    }

    #[test]
    fn test_coalescing_n_full_plus_partial() {
        let (mut q, _) = queue(64 * 1024);
        let total = 3 * GRAM_SIZE + 100;
        let data: Vec<u8> = (0..total).map(|i| i as u8).collect();

        // Feed in uneven pieces
        let first = q.enqueue(&data[..700]).unwrap().map(|g| g.as_bytes().to_vec());
        assert_eq!(first.as_deref(), Some(&data[..GRAM_SIZE]));
        for chunk in data[700..].chunks(333) {
            assert!(q.enqueue(chunk).unwrap().is_none());
        }

        assert_eq!(q.pending_grams(), 3);
        assert_eq!(q.buffered_len(), 100);
        assert!(!q.is_flush_ready());

        let mut out = Vec::new();
        let mut head = Some(data[..GRAM_SIZE].to_vec());
        while let Some(bytes) = head {
            out.extend_from_slice(&bytes);
            head = q.dequeue().map(|g| g.as_bytes().to_vec());
        }
        assert_eq!(q.pending_grams(), 0);
        assert!(q.is_flush_ready());

        let tail = q.check_flush_ready().unwrap().as_bytes().to_vec();
        assert_eq!(tail.len(), 100);
        assert!(!q.is_flush_ready());
        out.extend_from_slice(&tail);
        assert_eq!(out, data);
    }

    #[test]
    fn test_enqueue_returns_gram_only_when_pending_was_empty() {
        let (mut q, _) = queue(64 * 1024);
        assert!(q.enqueue(&[1; GRAM_SIZE]).unwrap().is_some());
        assert!(q.enqueue(&[2; GRAM_SIZE]).unwrap().is_none());
        assert_eq!(q.pending_grams(), 2);
    }

    #[test]
    fn test_exact_gram_boundary() {
        let (mut q, _) = queue(4096);
        let gram = q.enqueue(&[7; GRAM_SIZE]).unwrap().unwrap();
        assert!(gram.is_full());
        assert_eq!(q.buffered_len(), 0);
        assert!(!q.is_flush_ready());
    }

    #[test]
    fn test_capacity_exceeded_leaves_queue_unchanged() {
        let (mut q, _) = queue(256 * 1024);
        q.enqueue(&[0; 1000]).unwrap();
        let pending = q.pending_grams();
        let buffered = q.buffered_len();

        let err = q.enqueue(&vec![0; 256 * 1024]).unwrap_err();
        assert!(matches!(
            err,
            TransportError::CapacityExceeded { requested, .. } if requested == 256 * 1024
        ));
        assert_eq!(q.pending_grams(), pending);
        assert_eq!(q.buffered_len(), buffered);
    }

    #[test]
    fn test_capacity_cap_one_byte_over() {
        let (mut q, _) = queue(256 * 1024);
        assert!(q.enqueue(&vec![0; 256 * 1024 + 1]).is_err());
        assert!(q.is_empty());

        assert!(q.enqueue(&vec![0; 256 * 1024]).is_ok());
        assert!(q.enqueue(&[0]).is_err());
    }

    #[test]
    fn test_dequeue_returns_grams_to_pool() {
        let (mut q, pool) = queue(64 * 1024);
        q.enqueue(&[0; GRAM_SIZE * 2]).unwrap();
        assert_eq!(pool.available(), 2);

        assert!(q.dequeue().is_some());
        assert!(q.dequeue().is_none());
        assert_eq!(pool.available(), 4);
    }

    #[test]
    fn test_clear() {
        let (mut q, pool) = queue(64 * 1024);
        q.enqueue(&[0; GRAM_SIZE + 3]).unwrap();
        q.clear();
        assert!(q.is_empty());
        assert_eq!(q.queued_bytes(), 0);
        assert_eq!(pool.available(), 4);
    }

    #[test]
    fn test_check_flush_ready_with_pending_does_nothing() {
        let (mut q, _) = queue(64 * 1024);
        q.enqueue(&[0; GRAM_SIZE + 3]).unwrap();
        assert!(q.check_flush_ready().is_none());
        assert_eq!(q.buffered_len(), 3);
    }

    #[test]
    fn test_enqueue_range() {
        let (mut q, _) = queue(4096);
        q.enqueue_range(b"xxabcxx", 2, 3).unwrap();
        assert_eq!(q.check_flush_ready().unwrap().as_bytes(), b"abc");

        assert!(matches!(
            q.enqueue_range(b"abc", 2, 5),
            Err(TransportError::InvalidArgument(_))
        ));
    }
}
