//! Shared buffer pools for receive segments, spill-over staging and grams.
//!
//! A pool hands out fixed-size byte segments and takes them back when the
//! holder is done. Pools are shared between sessions through an
//! `Arc<dyn BufferPool>`; every implementation must be safe to call from
//! any task, which [`SegmentPool`] guarantees with one lock around its free
//! list (acquire and release never hold any other lock).
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//! use shardwire::pool::{BufferPool, PooledSegment, SegmentPool};
//!
//! let pool: Arc<dyn BufferPool> = Arc::new(SegmentPool::new(1024, 2));
//!
//! let mut segment = PooledSegment::acquire(&pool);
//! segment.buffer_mut()[..5].copy_from_slice(b"hello");
//! segment.set_len(5);
//! assert_eq!(&segment[..], b"hello");
//!
//! // Dropping the segment returns it to the pool.
//! drop(segment);
//! assert_eq!(pool.available(), 2);
//! ```

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::Mutex;

/// Acquire/release contract for fixed-size byte segments.
///
/// Implementations must be thread-safe: acquire and release are called
/// concurrently from reader tasks, writer tasks and the caller's thread.
pub trait BufferPool: Send + Sync {
    /// Size in bytes of every segment this pool hands out.
    fn segment_size(&self) -> usize;

    /// Take a segment of exactly `segment_size()` bytes. Contents are unspecified.
    fn acquire(&self) -> Vec<u8>;

    /// Return a segment. Segments of the wrong size may be discarded.
    fn release(&self, segment: Vec<u8>);

    /// Number of idle segments currently held.
    fn available(&self) -> usize;
}

/// Free-list pool of equally sized segments.
pub struct SegmentPool {
    segment_size: usize,
    max_free: usize,
    free: Mutex<Vec<Vec<u8>>>,
}

impl SegmentPool {
    /// Create a pool and pre-allocate `initial` segments.
    ///
    /// The free list keeps at most `4 * initial` (minimum 4) idle segments.
    pub fn new(segment_size: usize, initial: usize) -> Self {
        Self::with_limits(segment_size, initial, initial.max(1) * 4)
    }

    /// Create a pool with an explicit idle-segment limit.
    pub fn with_limits(segment_size: usize, initial: usize, max_free: usize) -> Self {
        let free = (0..initial.min(max_free))
            .map(|_| vec![0u8; segment_size])
            .collect();

        Self {
            segment_size,
            max_free,
            free: Mutex::new(free),
        }
    }
}

impl BufferPool for SegmentPool {
    #[inline]
    fn segment_size(&self) -> usize {
        self.segment_size
    }

    fn acquire(&self) -> Vec<u8> {
        self.free
            .lock()
            .pop()
            .unwrap_or_else(|| vec![0u8; self.segment_size])
    }

    fn release(&self, segment: Vec<u8>) {
        if segment.len() != self.segment_size {
            return;
        }
        let mut free = self.free.lock();
        if free.len() < self.max_free {
            free.push(segment);
        }
    }

    fn available(&self) -> usize {
        self.free.lock().len()
    }
}

impl fmt::Debug for SegmentPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentPool")
            .field("segment_size", &self.segment_size)
            .field("max_free", &self.max_free)
            .field("available", &self.available())
            .finish()
    }
}

/// A segment on loan from a pool, or a one-off allocation.
///
/// Tracks a fill length separately from the backing buffer; dereferences
/// to the filled part. Returned to its pool on drop.
pub struct PooledSegment {
    buf: Vec<u8>,
    len: usize,
    pool: Option<Arc<dyn BufferPool>>,
}

impl PooledSegment {
    /// Borrow a segment from `pool`.
    pub fn acquire(pool: &Arc<dyn BufferPool>) -> Self {
        Self {
            buf: pool.acquire(),
            len: 0,
            pool: Some(Arc::clone(pool)),
        }
    }

    /// Pooled segment when `size` fits the pool's block size, else a fresh allocation.
    pub fn for_size(pool: &Arc<dyn BufferPool>, size: usize) -> Self {
        if size <= pool.segment_size() {
            Self::acquire(pool)
        } else {
            Self::detached(size)
        }
    }

    /// A heap buffer of `capacity` bytes that belongs to no pool.
    pub fn detached(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity],
            len: 0,
            pool: None,
        }
    }

    /// Build a detached segment holding a copy of `data`.
    pub fn from_slice(data: &[u8]) -> Self {
        Self {
            buf: data.to_vec(),
            len: data.len(),
            pool: None,
        }
    }

    /// Whether this segment goes back to a pool on drop.
    #[inline]
    pub fn is_pooled(&self) -> bool {
        self.pool.is_some()
    }

    /// Total bytes available in the backing buffer.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Filled length.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether nothing is filled.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Set the filled length, clamped to the capacity.
    #[inline]
    pub fn set_len(&mut self, len: usize) {
        self.len = len.min(self.buf.len());
    }

    /// The whole backing buffer, filled or not.
    #[inline]
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    /// The filled part, mutable.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf[..self.len]
    }
}

impl Deref for PooledSegment {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl Drop for PooledSegment {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.release(std::mem::take(&mut self.buf));
        }
    }
}

impl fmt::Debug for PooledSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledSegment")
            .field("len", &self.len)
            .field("capacity", &self.buf.len())
            .field("pooled", &self.pool.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared(size: usize, initial: usize) -> Arc<dyn BufferPool> {
        Arc::new(SegmentPool::new(size, initial))
    }

    #[test]
    fn test_pool_preallocates() {
        let pool = SegmentPool::new(64, 3);
        assert_eq!(pool.available(), 3);
        assert_eq!(pool.segment_size(), 64);
    }

    #[test]
    fn test_acquire_release_cycle() {
        let pool = SegmentPool::new(64, 1);

        let a = pool.acquire();
        assert_eq!(a.len(), 64);
        assert_eq!(pool.available(), 0);

        // Empty pool allocates on demand
        let b = pool.acquire();
        assert_eq!(b.len(), 64);

        pool.release(a);
        pool.release(b);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_release_wrong_size_discarded() {
        let pool = SegmentPool::new(64, 0);
        pool.release(vec![0u8; 32]);
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn test_free_list_is_capped() {
        let pool = SegmentPool::with_limits(8, 0, 2);
        for _ in 0..5 {
            pool.release(vec![0u8; 8]);
        }
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_segment_returns_on_drop() {
        let pool = shared(16, 1);
        {
            let segment = PooledSegment::acquire(&pool);
            assert!(segment.is_pooled());
            assert_eq!(pool.available(), 0);
        }
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_for_size_falls_back_to_allocation() {
        let pool = shared(16, 1);

        let small = PooledSegment::for_size(&pool, 16);
        assert!(small.is_pooled());

        let large = PooledSegment::for_size(&pool, 17);
        assert!(!large.is_pooled());
        assert_eq!(large.capacity(), 17);

        drop(large);
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn test_set_len_clamps() {
        let mut segment = PooledSegment::detached(4);
        segment.set_len(10);
        assert_eq!(segment.len(), 4);
    }

    #[test]
    fn test_from_slice() {
        let segment = PooledSegment::from_slice(b"abc");
        assert_eq!(&segment[..], b"abc");
        assert!(!segment.is_pooled());
    }
}
