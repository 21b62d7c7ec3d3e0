//! Swap chain collaborator
//!
//! Presentation lives outside the frame queue. It only needs to know which
//! back buffer is current, its render target views, and which render
//! solution and pipeline to draw.

use crate::render::backend::{CpuDescriptorHandle, ResourceId};

/// State the frame queue reads from the swap chain at `begin_frame`
pub trait SwapChain {
    /// Whether a native surface exists
    fn has_surface(&self) -> bool;

    /// Index of the back buffer the next frame renders into
    fn current_back_buffer_index(&self) -> u32;

    /// Number of back buffers
    fn back_buffer_count(&self) -> u32;

    /// Back buffer resource at `index`
    fn back_buffer(&self, index: u32) -> ResourceId;

    /// Render target view of back buffer `index`, linear or sRGB
    fn back_buffer_descriptor(&self, index: u32, srgb: bool) -> CpuDescriptorHandle;

    /// Active render solution
    fn solution_id(&self) -> usize;

    /// Active render pipeline of the solution
    fn pipeline_id(&self) -> usize;
}

/// Swap chain described by plain data
///
/// Back buffer views are laid out linear first, then sRGB:
/// view `i` is at `rtv_base + i * increment`, its sRGB twin at
/// `rtv_base + (count + i) * increment`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticSwapChain {
    /// Whether a surface exists
    pub surface: bool,
    /// Back buffer resources
    pub back_buffers: Vec<ResourceId>,
    /// First back buffer view
    pub rtv_base: CpuDescriptorHandle,
    /// Distance between views
    pub rtv_increment: u32,
    /// Current back buffer
    pub current: u32,
    /// Active render solution
    pub solution: usize,
    /// Active render pipeline
    pub pipeline: usize,
}

impl StaticSwapChain {
    /// Swap chain over `back_buffers` drawing solution 0, pipeline 0
    pub fn new(back_buffers: Vec<ResourceId>, rtv_base: CpuDescriptorHandle, rtv_increment: u32) -> Self {
        Self {
            surface: true,
            back_buffers,
            rtv_base,
            rtv_increment,
            current: 0,
            solution: 0,
            pipeline: 0,
        }
    }

    /// Move to the next back buffer, as presenting would
    pub fn present(&mut self) {
        let count = self.back_buffer_count().max(1);
        self.current = (self.current + 1) % count;
    }
}

impl SwapChain for StaticSwapChain {
    fn has_surface(&self) -> bool {
        self.surface
    }

    fn current_back_buffer_index(&self) -> u32 {
        self.current
    }

    fn back_buffer_count(&self) -> u32 {
        u32::try_from(self.back_buffers.len()).unwrap_or(u32::MAX)
    }

    fn back_buffer(&self, index: u32) -> ResourceId {
        self.back_buffers.get(index as usize).copied().unwrap_or_default()
    }

    fn back_buffer_descriptor(&self, index: u32, srgb: bool) -> CpuDescriptorHandle {
        let slot = if srgb { self.back_buffer_count() + index } else { index };
        self.rtv_base.offset(slot, self.rtv_increment)
    }

    fn solution_id(&self) -> usize {
        self.solution
    }

    fn pipeline_id(&self) -> usize {
        self.pipeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_layout_and_present() {
        let mut swap_chain = StaticSwapChain::new(
            vec![ResourceId(1), ResourceId(2)],
            CpuDescriptorHandle(100),
            4,
        );
        assert_eq!(swap_chain.back_buffer_descriptor(1, false), CpuDescriptorHandle(104));
        assert_eq!(swap_chain.back_buffer_descriptor(1, true), CpuDescriptorHandle(112));

        swap_chain.present();
        assert_eq!(swap_chain.current_back_buffer_index(), 1);
        assert_eq!(swap_chain.back_buffer(1), ResourceId(2));
        swap_chain.present();
        assert_eq!(swap_chain.current_back_buffer_index(), 0);
    }
}
