//! Streaming decompression of inbound chunks.
//!
//! The codec itself is an external collaborator behind [`ChunkDecompressor`].
//! [`DecompressionStage`] feeds it each raw socket chunk, prefixed with any
//! bytes left over from the previous chunk. A codec may stop in the middle
//! of the input (a code split across reads is normal); the unconsumed tail
//! is staged and retried with the next chunk.
//!
//! Staged bytes must fit in one staging segment. More than that means the
//! codec is not making progress and the stream is treated as corrupt.

use std::fmt;

use crate::error::{Result, TransportError};
use crate::pool::PooledSegment;

/// Chunked decompressor contract.
pub trait ChunkDecompressor: Send {
    /// Decode one unit starting at `src[*src_offset..]`.
    ///
    /// On progress, appends the decoded bytes to `dst`, advances
    /// `src_offset` past the consumed input and returns `Some(written)`.
    /// Returns `None` without touching either when the remaining input does
    /// not hold a complete unit.
    fn decompress_chunk(&mut self, src: &[u8], src_offset: &mut usize, dst: &mut Vec<u8>)
        -> Option<usize>;

    /// Drop any codec state. Called when the connection is torn down.
    fn reset(&mut self) {}
}

/// Decompressor plus the staging segment for partial input.
pub struct DecompressionStage {
    decompressor: Box<dyn ChunkDecompressor>,
    staging: PooledSegment,
    input: Vec<u8>,
    output: Vec<u8>,
}

impl DecompressionStage {
    /// Create a stage staging leftovers in `staging`.
    pub fn new(decompressor: Box<dyn ChunkDecompressor>, staging: PooledSegment) -> Self {
        Self {
            decompressor,
            staging,
            input: Vec::new(),
            output: Vec::new(),
        }
    }

    /// Decompress `chunk` and return everything decoded from it so far.
    ///
    /// Fails with a protocol error when the leftover does not fit the
    /// staging segment.
    pub fn process(&mut self, chunk: &[u8]) -> Result<&[u8]> {
        let Self {
            decompressor,
            staging,
            input,
            output,
        } = self;

        let src: &[u8] = if staging.is_empty() {
            chunk
        } else {
            input.clear();
            input.extend_from_slice(&staging[..]);
            input.extend_from_slice(chunk);
            input
        };

        output.clear();
        let mut offset = 0;
        while offset < src.len() {
            let before = offset;
            match decompressor.decompress_chunk(src, &mut offset, output) {
                Some(_) if offset > before => {}
                _ => break,
            }
        }

        let leftover = &src[offset.min(src.len())..];
        if leftover.len() > staging.capacity() {
            return Err(TransportError::Protocol(format!(
                "{} undecodable bytes exceed the {} byte staging segment",
                leftover.len(),
                staging.capacity()
            )));
        }
        staging.buffer_mut()[..leftover.len()].copy_from_slice(leftover);
        staging.set_len(leftover.len());

        Ok(output.as_slice())
    }

    /// Bytes waiting for the next chunk.
    #[inline]
    pub fn staged_len(&self) -> usize {
        self.staging.len()
    }

    /// Drop staged bytes and codec state.
    pub fn reset(&mut self) {
        self.staging.set_len(0);
        self.input.clear();
        self.output.clear();
        self.decompressor.reset();
    }
}

impl fmt::Debug for DecompressionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecompressionStage")
            .field("staged", &self.staging.len())
            .field("staging_capacity", &self.staging.capacity())
            .finish()
    }
}
