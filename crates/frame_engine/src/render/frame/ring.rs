//! Frame slot ring
//!
//! A fixed number of frame slots, each owning a command recorder and the
//! fence value it must wait for before reuse. Slots are addressed through
//! [`FrameHandle`]s carrying the fence value they were issued with; a handle
//! from an earlier occupancy no longer matches and is rejected.

use crate::render::backend::{CpuDescriptorHandle, ResourceId};
use crate::render::error::{FrameResult, PreconditionError};

/// Shared fence counter of the ring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FenceCounter {
    next: u64,
}

impl FenceCounter {
    /// Counter whose first issued value is 1
    pub const fn new() -> Self {
        Self { next: 1 }
    }

    /// Issue the next value
    pub fn issue(&mut self) -> u64 {
        let value = self.next;
        self.next += 1;
        value
    }

    /// Value the next call to [`issue`](Self::issue) returns
    pub const fn peek(&self) -> u64 {
        self.next
    }
}

impl Default for FenceCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Where a slot is in its frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStage {
    /// Never used
    Idle,
    /// Between `begin_frame` and `render_frame`
    Recording,
    /// Commands submitted, retirement not yet scheduled
    Submitted,
    /// Retirement signal scheduled
    InFlight,
}

impl FrameStage {
    /// Lower-case name for error messages
    pub const fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Recording => "recording",
            Self::Submitted => "submitted",
            Self::InFlight => "in flight",
        }
    }
}

/// Back buffer captured when a slot is occupied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BackBufferBinding {
    /// Swap chain image index
    pub index: u32,
    /// Number of swap chain images
    pub count: u32,
    /// Back buffer resource
    pub resource: ResourceId,
    /// Linear render target view
    pub rtv: CpuDescriptorHandle,
    /// sRGB render target view
    pub srgb_rtv: CpuDescriptorHandle,
}

/// One ring entry
#[derive(Debug)]
pub struct FrameSlot<R> {
    /// Command recorder owned by the slot
    pub recorder: R,
    /// Fence value of the slot's latest occupancy
    pub fence_watermark: u64,
    /// Back buffer of the current occupancy
    pub back_buffer: BackBufferBinding,
    /// Render solution drawn
    pub solution_id: usize,
    /// Render pipeline drawn
    pub pipeline_id: usize,
    /// Current stage
    pub stage: FrameStage,
}

impl<R> FrameSlot<R> {
    fn new(recorder: R) -> Self {
        Self {
            recorder,
            fence_watermark: 0,
            back_buffer: BackBufferBinding::default(),
            solution_id: 0,
            pipeline_id: 0,
            stage: FrameStage::Idle,
        }
    }

    /// Fail unless the slot is in `expected`
    pub fn expect_stage(&self, index: usize, expected: FrameStage) -> FrameResult<()> {
        if self.stage != expected {
            return Err(PreconditionError::InvalidFrameStage {
                index,
                expected: expected.name(),
                actual: self.stage.name(),
            }
            .into());
        }
        Ok(())
    }
}

/// Opaque reference to an occupied slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHandle {
    index: usize,
    fence: u64,
}

impl FrameHandle {
    /// Ring index of the slot
    pub const fn index(self) -> usize {
        self.index
    }

    /// Fence value the frame retires with
    pub const fn fence_value(self) -> u64 {
        self.fence
    }
}

/// Fixed ring of frame slots
#[derive(Debug)]
pub struct FrameRing<R> {
    slots: Vec<FrameSlot<R>>,
    next_index: usize,
    fence: FenceCounter,
}

impl<R> FrameRing<R> {
    /// Build a ring with one slot per recorder
    pub fn new(recorders: Vec<R>) -> Self {
        Self {
            slots: recorders.into_iter().map(FrameSlot::new).collect(),
            next_index: 0,
            fence: FenceCounter::new(),
        }
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the ring has no slots
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Issue a fence value and move to the next slot
    ///
    /// Returns the handle for the new occupancy and the watermark the slot
    /// held before, which must be waited on before the slot is touched.
    /// The slot itself is not modified; call [`occupy`](Self::occupy) after the wait.
    pub fn advance(&mut self) -> (FrameHandle, u64) {
        let fence = self.fence.issue();
        let index = self.next_index;
        self.next_index = (self.next_index + 1) % self.slots.len().max(1);
        let previous = self.slots.get(index).map_or(0, |slot| slot.fence_watermark);
        (FrameHandle { index, fence }, previous)
    }

    /// Index and slot the next [`advance`](Self::advance) hands out
    pub fn upcoming(&self) -> Option<(usize, &FrameSlot<R>)> {
        self.slots.get(self.next_index).map(|slot| (self.next_index, slot))
    }

    /// Store `handle`'s watermark in its slot
    pub fn occupy(&mut self, handle: FrameHandle) -> FrameResult<&mut FrameSlot<R>> {
        let slot = self
            .slots
            .get_mut(handle.index)
            .ok_or(PreconditionError::StaleFrameHandle {
                index: handle.index,
                handle_fence: handle.fence,
                slot_fence: 0,
            })?;
        slot.fence_watermark = handle.fence;
        Ok(slot)
    }

    /// Slot occupied by `handle`
    pub fn slot(&self, handle: FrameHandle) -> FrameResult<&FrameSlot<R>> {
        match self.slots.get(handle.index) {
            Some(slot) if slot.fence_watermark == handle.fence => Ok(slot),
            slot => Err(PreconditionError::StaleFrameHandle {
                index: handle.index,
                handle_fence: handle.fence,
                slot_fence: slot.map_or(0, |slot| slot.fence_watermark),
            }
            .into()),
        }
    }

    /// Mutable slot occupied by `handle`
    pub fn slot_mut(&mut self, handle: FrameHandle) -> FrameResult<&mut FrameSlot<R>> {
        match self.slots.get_mut(handle.index) {
            Some(slot) if slot.fence_watermark == handle.fence => Ok(slot),
            slot => Err(PreconditionError::StaleFrameHandle {
                index: handle.index,
                handle_fence: handle.fence,
                slot_fence: slot.map_or(0, |slot| slot.fence_watermark),
            }
            .into()),
        }
    }

    /// Iterate over every slot
    pub fn slots(&self) -> impl Iterator<Item = &FrameSlot<R>> {
        self.slots.iter()
    }

    /// Value the next frame will be issued
    pub fn next_fence_value(&self) -> u64 {
        self.fence.peek()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::error::FrameError;

    #[test]
    fn test_fence_counter_starts_at_one() {
        let mut counter = FenceCounter::new();
        assert_eq!(counter.issue(), 1);
        assert_eq!(counter.issue(), 2);
        assert_eq!(counter.peek(), 3);
    }

    #[test]
    fn test_advance_cycles_slots_and_reports_previous_watermark() {
        let mut ring = FrameRing::new(vec![(), (), ()]);
        let mut seen = Vec::new();

        for _ in 0..5 {
            assert_eq!(ring.upcoming().map(|(_, slot)| slot.stage), Some(FrameStage::Idle));
            let (handle, previous) = ring.advance();
            ring.occupy(handle).unwrap();
            seen.push((handle.index(), handle.fence_value(), previous));
        }

        assert_eq!(
            seen,
            vec![(0, 1, 0), (1, 2, 0), (2, 3, 0), (0, 4, 1), (1, 5, 2)]
        );
    }

    #[test]
    fn test_stale_handle_rejected() {
        let mut ring = FrameRing::new(vec![(), ()]);
        let (first, _) = ring.advance();
        ring.occupy(first).unwrap();
        assert!(ring.slot(first).is_ok());

        let (second, _) = ring.advance();
        ring.occupy(second).unwrap();
        let (third, _) = ring.advance();
        ring.occupy(third).unwrap();

        assert_eq!(third.index(), first.index());
        assert!(matches!(
            ring.slot_mut(first),
            Err(FrameError::Precondition(PreconditionError::StaleFrameHandle {
                handle_fence: 1,
                slot_fence: 3,
                ..
            }))
        ));
    }

    #[test]
    fn test_stage_check() {
        let mut ring = FrameRing::new(vec![()]);
        let (handle, _) = ring.advance();
        let slot = ring.occupy(handle).unwrap();
        assert!(slot.expect_stage(0, FrameStage::Idle).is_ok());
        slot.stage = FrameStage::Recording;
        assert!(slot.expect_stage(0, FrameStage::Submitted).is_err());
    }
}
