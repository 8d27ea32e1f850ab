//! A linear allocator for per-frame scratch memory.
//!
//! Constants and other short-lived buffer data are placed in scratch space
//! that lives exactly as long as the frame. The allocator works by linearly
//! incrementing an offset on every allocation; deallocation is only possible
//! by calling [`ScratchSpace::reset`], which frees everything at once. The
//! scheduler resets scratch spaces by returning them to their pool when the
//! frame fence completes.

use anyhow::Result;

/// A range of scratch memory returned by [`ScratchSpace::allocate`]. Valid
/// until the owning space is reset.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ScratchRange {
    /// Index of the backing chunk.
    pub chunk: u32,
    /// Byte offset inside the chunk.
    pub offset: u64,
    /// Requested size in bytes.
    pub size: u64,
}

/// Chunked linear bump allocator. Grows by whole chunks when the current
/// chunk is exhausted; a reset compacts multiple chunks back into a single
/// one sized for the previous frame's total demand.
#[derive(Debug)]
pub struct ScratchSpace {
    chunks: Vec<u64>,
    current_chunk: usize,
    local_offset: u64,
    chunk_size: u64,
    alignment: u64,
}

impl ScratchSpace {
    /// Create a scratch space with the given minimum chunk size and the
    /// default alignment of 256 bytes.
    pub fn new(chunk_size: u64) -> Self {
        Self::new_with_alignment(chunk_size, 256)
    }

    /// Create a scratch space with an explicit alignment. The alignment must
    /// be large enough for every use the returned ranges are put to.
    pub fn new_with_alignment(chunk_size: u64, alignment: u64) -> Self {
        debug_assert!(alignment.is_power_of_two());
        let chunk_size = align_up(chunk_size.max(alignment), alignment);
        Self {
            chunks: vec![chunk_size],
            current_chunk: 0,
            local_offset: 0,
            chunk_size,
            alignment,
        }
    }

    /// Allocate at least `size` bytes. The actual amount consumed may be
    /// slightly more to satisfy alignment requirements.
    pub fn allocate(&mut self, size: u64) -> Result<ScratchRange> {
        let padded_size = align_up(size, self.alignment);

        let fits = self
            .chunks
            .get(self.current_chunk)
            .map(|chunk| self.local_offset + padded_size <= *chunk)
            .unwrap_or_default();

        let range = if fits {
            ScratchRange {
                chunk: self.current_chunk as u32,
                offset: self.local_offset,
                size,
            }
        } else {
            // Allocations larger than the chunk size get a dedicated chunk.
            let new_chunk = align_up(size.max(self.chunk_size), self.alignment);
            self.chunks.push(new_chunk);
            self.current_chunk = self.chunks.len() - 1;
            self.local_offset = 0;
            ScratchRange {
                chunk: self.current_chunk as u32,
                offset: 0,
                size,
            }
        };

        self.local_offset += padded_size;
        Ok(range)
    }

    /// Reset the space back to the beginning, invalidating every range handed
    /// out so far. Callers must ensure the GPU no longer reads old ranges;
    /// the pool and fence discipline of the scheduler guarantees this.
    pub fn reset(&mut self) {
        if self.chunks.len() > 1 {
            // Compact into a single chunk sized for everything the previous
            // frame allocated.
            let total: u64 = self.chunks.iter().sum();
            self.chunks.clear();
            self.chunks.push(total);
        }
        self.current_chunk = 0;
        self.local_offset = 0;
    }

    /// Total capacity of all chunks in bytes.
    pub fn capacity(&self) -> u64 {
        self.chunks.iter().sum()
    }
}

impl crate::resource::pool::Poolable for ScratchSpace {
    type Key = ();

    fn on_release(&mut self) {
        self.reset();
    }
}

fn align_up(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) & !(alignment - 1)
}
