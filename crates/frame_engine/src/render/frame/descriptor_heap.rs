//! Shader-visible descriptor heap manager
//!
//! The heap is split in two:
//!
//! ```text
//! [0, persistent)              persistent tables, allocated once, stable offsets
//! [persistent, capacity)       circular reserve, one segment per frame slot
//! ```
//!
//! Frame generation `g` allocates only from segment `g % frames`, so a
//! segment is rewritten only after the frame ring has retired the generation
//! that last used it.

use log::{debug, trace};

use crate::render::backend::{CpuDescriptorHandle, DescriptorHeapId, DescriptorHeapLayout, GpuDescriptorHandle};
use crate::render::error::{FrameError, FrameResult, SchemaError};

/// CPU and GPU address of a single descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorHandle {
    /// Address used when writing the descriptor
    pub cpu: CpuDescriptorHandle,
    /// Address used when binding the descriptor
    pub gpu: GpuDescriptorHandle,
}

/// Contiguous run of descriptors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorTable {
    /// Index of the first descriptor in the heap
    pub start: u32,
    /// Number of descriptors
    pub count: u32,
    /// Address of the first descriptor
    pub handle: DescriptorHandle,
    /// Frame generation for circular tables, `None` for persistent ones
    pub generation: Option<u64>,
}

impl DescriptorTable {
    /// GPU address bound to a root slot
    pub const fn gpu(&self) -> GpuDescriptorHandle {
        self.handle.gpu
    }

    /// One past the last heap index
    pub const fn end(&self) -> u32 {
        self.start + self.count
    }
}

/// Persistent and circular descriptor regions of one heap
#[derive(Debug)]
pub struct ShaderDescriptorHeap {
    layout: DescriptorHeapLayout,
    persistent_capacity: u32,
    persistent_cursor: u32,
    per_frame: u32,
    segments: u32,
    generation: u64,
    cursor: u32,
}

impl ShaderDescriptorHeap {
    /// Partition `layout` with `circular_reserve` descriptors split across `frames` segments
    pub fn new(layout: DescriptorHeapLayout, circular_reserve: u32, frames: usize) -> FrameResult<Self> {
        let segments = u32::try_from(frames).unwrap_or(0);
        if segments == 0 || circular_reserve > layout.capacity || circular_reserve / segments == 0 {
            return Err(FrameError::InvalidConfig(format!(
                "descriptor heap of {} cannot reserve {circular_reserve} circular descriptors for {frames} frames",
                layout.capacity
            )));
        }

        let heap = Self {
            layout,
            persistent_capacity: layout.capacity - circular_reserve,
            persistent_cursor: 0,
            per_frame: circular_reserve / segments,
            segments,
            generation: 0,
            cursor: 0,
        };
        debug!(
            "Descriptor heap: {} persistent, {} circular per frame x {}",
            heap.persistent_capacity, heap.per_frame, heap.segments
        );
        Ok(heap)
    }

    /// Heap to bind for shader access
    pub fn heap_id(&self) -> DescriptorHeapId {
        self.layout.heap
    }

    /// Descriptors one frame generation may allocate
    pub fn circular_capacity(&self) -> u32 {
        self.per_frame
    }

    /// Descriptors still free in the current generation
    pub fn circular_available(&self) -> u32 {
        self.per_frame - self.cursor
    }

    /// Current frame generation
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn handle_at(&self, index: u32) -> DescriptorHandle {
        DescriptorHandle {
            cpu: self.layout.cpu_base.offset(index, self.layout.increment),
            gpu: self.layout.gpu_base.offset(index, self.layout.increment),
        }
    }

    fn segment_base(&self) -> u32 {
        // Bounded by `segments`, which came from a u32.
        let segment = (self.generation % u64::from(self.segments)) as u32;
        self.persistent_capacity + segment * self.per_frame
    }

    /// Allocate `count` descriptors that stay valid for the heap's lifetime
    pub fn allocate_persistent(&mut self, count: u32) -> FrameResult<DescriptorTable> {
        let available = self.persistent_capacity - self.persistent_cursor;
        if count > available {
            return Err(FrameError::PersistentRegionExhausted {
                requested: count,
                available,
            });
        }

        let start = self.persistent_cursor;
        self.persistent_cursor += count;
        Ok(DescriptorTable {
            start,
            count,
            handle: self.handle_at(start),
            generation: None,
        })
    }

    /// Allocate `count` descriptors valid until this generation retires
    ///
    /// Returns the table and the heap index of its first descriptor.
    pub fn allocate_circular(&mut self, count: u32) -> FrameResult<(DescriptorTable, u32)> {
        if count == 0 || count > self.per_frame {
            return Err(SchemaError::InvalidCircularAllocation {
                requested: count,
                capacity: self.per_frame,
            }
            .into());
        }

        let available = self.circular_available();
        if count > available {
            return Err(FrameError::DescriptorHeapExhausted {
                requested: count,
                available,
            });
        }

        let start = self.segment_base() + self.cursor;
        self.cursor += count;
        let table = DescriptorTable {
            start,
            count,
            handle: self.handle_at(start),
            generation: Some(self.generation),
        };
        Ok((table, start))
    }

    /// Address of descriptor `index` inside `table`
    pub fn advance(&self, table: &DescriptorTable, index: u32) -> FrameResult<DescriptorHandle> {
        if index >= table.count {
            return Err(SchemaError::DescriptorIndexOutOfRange {
                index,
                count: table.count,
            }
            .into());
        }
        Ok(self.handle_at(table.start + index))
    }

    /// Start the next frame generation
    pub fn advance_frame(&mut self) {
        trace!(
            "Descriptor generation {} used {} of {}",
            self.generation,
            self.cursor,
            self.per_frame
        );
        self.generation += 1;
        self.cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(capacity: u32) -> DescriptorHeapLayout {
        DescriptorHeapLayout {
            heap: DescriptorHeapId(1),
            cpu_base: CpuDescriptorHandle(1000),
            gpu_base: GpuDescriptorHandle(5000),
            increment: 10,
            capacity,
        }
    }

    #[test]
    fn test_regions_are_disjoint() {
        let mut heap = ShaderDescriptorHeap::new(layout(64), 48, 3).unwrap();
        assert_eq!(heap.circular_capacity(), 16);

        let persistent = heap.allocate_persistent(16).unwrap();
        assert_eq!(persistent.start, 0);
        assert!(heap.allocate_persistent(1).is_err());

        let (table, start) = heap.allocate_circular(4).unwrap();
        assert_eq!(start, 16);
        assert!(table.start >= persistent.end());
    }

    #[test]
    fn test_circular_allocation_rejects_bad_counts() {
        let mut heap = ShaderDescriptorHeap::new(layout(64), 48, 3).unwrap();
        assert!(matches!(
            heap.allocate_circular(0),
            Err(FrameError::Schema(SchemaError::InvalidCircularAllocation { requested: 0, .. }))
        ));
        assert!(matches!(
            heap.allocate_circular(17),
            Err(FrameError::Schema(SchemaError::InvalidCircularAllocation { requested: 17, .. }))
        ));

        heap.allocate_circular(10).unwrap();
        assert!(matches!(
            heap.allocate_circular(7),
            Err(FrameError::DescriptorHeapExhausted { requested: 7, available: 6 })
        ));
    }

    #[test]
    fn test_advance_addresses_descriptors() {
        let mut heap = ShaderDescriptorHeap::new(layout(64), 48, 3).unwrap();
        let (table, start) = heap.allocate_circular(2).unwrap();

        let second = heap.advance(&table, 1).unwrap();
        assert_eq!(second.cpu, CpuDescriptorHandle(1000 + u64::from(start + 1) * 10));
        assert_eq!(second.gpu, GpuDescriptorHandle(5000 + u64::from(start + 1) * 10));
        assert!(heap.advance(&table, 2).is_err());
    }

    #[test]
    fn test_in_flight_generations_never_overlap() {
        let frames = 3;
        let mut heap = ShaderDescriptorHeap::new(layout(64), 48, frames).unwrap();
        let mut live: Vec<DescriptorTable> = Vec::new();

        for frame in 0..10u32 {
            heap.advance_frame();
            let current = heap.generation();
            live.retain(|table| current - table.generation.unwrap_or(0) < frames as u64);

            let (table, _) = heap.allocate_circular(1 + frame % 16).unwrap();
            for older in live.iter().filter(|older| older.generation != Some(current)) {
                assert!(table.end() <= older.start || older.end() <= table.start);
            }
            live.push(table);
        }
    }

    #[test]
    fn test_rejects_impossible_partition() {
        assert!(ShaderDescriptorHeap::new(layout(16), 32, 3).is_err());
        assert!(ShaderDescriptorHeap::new(layout(16), 2, 3).is_err());
        assert!(ShaderDescriptorHeap::new(layout(16), 6, 0).is_err());
    }
}
