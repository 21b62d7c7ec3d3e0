//! Frame-scoped upload allocator
//!
//! Upload memory is split into one page per frame slot. Each frame
//! generation bump-allocates from its own page; [`UploadAllocator::advance_frame`]
//! moves to the next page and rewinds the cursor. A page is reused only after
//! the frame ring has waited for the generation that last wrote it.

use log::trace;

use crate::foundation::math::align_up;
use crate::render::backend::{BufferId, UploadMemory};
use crate::render::error::{FrameError, FrameResult};

/// Placement of one upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadAllocation {
    /// Buffer holding the data
    pub buffer: BufferId,
    /// Byte offset within the buffer
    pub offset: u64,
    /// Bytes written
    pub size: u64,
    /// Frame generation the allocation belongs to
    pub generation: u64,
}

impl UploadAllocation {
    /// One past the last byte
    pub const fn end(&self) -> u64 {
        self.offset + self.size
    }
}

/// Linear per-frame arena over [`UploadMemory`]
#[derive(Debug)]
pub struct UploadAllocator<M> {
    memory: M,
    page_size: u64,
    pages: u64,
    generation: u64,
    cursor: u64,
}

impl<M: UploadMemory> UploadAllocator<M> {
    /// Split `memory` into `pages` pages of `page_size` bytes
    pub fn new(memory: M, page_size: u64, pages: usize) -> FrameResult<Self> {
        let pages = pages as u64;
        let required = page_size.checked_mul(pages).unwrap_or(u64::MAX);
        if pages == 0 || memory.capacity() < required {
            return Err(FrameError::InvalidConfig(format!(
                "upload memory of {} bytes cannot hold {pages} pages of {page_size} bytes",
                memory.capacity()
            )));
        }

        Ok(Self {
            memory,
            page_size,
            pages,
            generation: 0,
            cursor: 0,
        })
    }

    /// Current frame generation
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Bytes used in the current page
    pub fn used(&self) -> u64 {
        self.cursor
    }

    /// Backing memory
    pub fn memory(&self) -> &M {
        &self.memory
    }

    fn page_base(&self) -> u64 {
        (self.generation % self.pages) * self.page_size
    }

    /// Copy `bytes` into the current page at the next `alignment` boundary
    pub fn upload(&mut self, bytes: &[u8], alignment: u64) -> FrameResult<UploadAllocation> {
        let size = bytes.len() as u64;
        let offset = align_up(self.cursor, alignment);
        let end = offset + size;
        if end > self.page_size {
            return Err(FrameError::UploadBufferExhausted {
                requested: size,
                available: self.page_size.saturating_sub(offset),
            });
        }

        let absolute = self.page_base() + offset;
        self.memory.write(absolute, bytes)?;
        self.cursor = end;

        Ok(UploadAllocation {
            buffer: self.memory.buffer(),
            offset: absolute,
            size,
            generation: self.generation,
        })
    }

    /// Start the next frame generation
    pub fn advance_frame(&mut self) {
        trace!(
            "Upload generation {} used {} of {} bytes",
            self.generation,
            self.cursor,
            self.page_size
        );
        self.generation += 1;
        self.cursor = 0;
    }
}
