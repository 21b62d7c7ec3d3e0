//! Frame queue
//!
//! Owns the frame ring, the shader descriptor heap, the upload arena and the
//! backend objects they feed, and drives one frame through
//! `begin_frame -> render_frame -> end_frame`.

use log::{debug, error, trace, warn};

use crate::core::config::FrameQueueConfig;
use crate::render::backend::{
    CommandQueue, CommandRecorder, DescriptorDevice, GpuBackend, GpuFence, ResourceBarrier, ResourceState,
};
use crate::render::binding::BindingResolver;
use crate::render::error::{FrameError, FrameResult, PreconditionError, SchemaError};
use crate::render::graph::RenderGraph;

use super::descriptor_heap::ShaderDescriptorHeap;
use super::ring::{BackBufferBinding, FrameHandle, FrameRing, FrameStage};
use super::swapchain::SwapChain;
use super::upload::UploadAllocator;
use super::walker::{FrameInputs, PassWalker, WalkSummary};

/// Backend objects a frame queue takes ownership of
pub struct FrameQueueParts<B: GpuBackend> {
    /// Descriptor writer and heap layout
    pub device: B::Device,
    /// Execution queue
    pub queue: B::Queue,
    /// Fence shared by every slot
    pub fence: B::Fence,
    /// Host-visible upload memory
    pub upload: B::Upload,
    /// One recorder per frame slot
    pub recorders: Vec<B::Recorder>,
}

/// Ring of in-flight frames over a GPU backend
pub struct FrameQueue<B: GpuBackend> {
    config: FrameQueueConfig,
    ring: FrameRing<B::Recorder>,
    queue: B::Queue,
    fence: B::Fence,
    device: B::Device,
    heap: ShaderDescriptorHeap,
    upload: UploadAllocator<B::Upload>,
    scratch: Vec<u8>,
    fault: Option<String>,
}

impl<B: GpuBackend> FrameQueue<B> {
    /// Create a frame queue from validated configuration and backend parts
    pub fn new(config: FrameQueueConfig, parts: FrameQueueParts<B>) -> FrameResult<Self> {
        config.validate().map_err(FrameError::InvalidConfig)?;
        if parts.recorders.len() != config.frame_queue_size {
            return Err(PreconditionError::RecorderCountMismatch {
                expected: config.frame_queue_size,
                actual: parts.recorders.len(),
            }
            .into());
        }

        let heap = ShaderDescriptorHeap::new(
            parts.device.heap_layout(),
            config.shader_descriptor_circular_reserve,
            config.frame_queue_size,
        )?;
        let upload = UploadAllocator::new(parts.upload, config.upload_page_size, config.frame_queue_size)?;

        debug!(
            "Frame queue: {} slots, {} circular descriptors and {} upload bytes per frame",
            config.frame_queue_size,
            heap.circular_capacity(),
            config.upload_page_size
        );

        Ok(Self {
            ring: FrameRing::new(parts.recorders),
            queue: parts.queue,
            fence: parts.fence,
            device: parts.device,
            heap,
            upload,
            scratch: Vec::with_capacity(256),
            fault: None,
            config,
        })
    }

    /// Configuration the queue was built with
    pub fn config(&self) -> &FrameQueueConfig {
        &self.config
    }

    /// Whether an earlier failure aborted a frame
    pub fn is_faulted(&self) -> bool {
        self.fault.is_some()
    }

    /// Shader-visible descriptor heap
    pub fn descriptor_heap(&self) -> &ShaderDescriptorHeap {
        &self.heap
    }

    /// Mutable heap access for persistent table setup
    pub fn descriptor_heap_mut(&mut self) -> &mut ShaderDescriptorHeap {
        &mut self.heap
    }

    /// Frame-scoped upload arena
    pub fn upload_allocator(&self) -> &UploadAllocator<B::Upload> {
        &self.upload
    }

    /// Fence value the next frame will retire with
    pub fn next_fence_value(&self) -> u64 {
        self.ring.next_fence_value()
    }

    fn check_fault(&self) -> FrameResult<()> {
        match &self.fault {
            Some(reason) => Err(FrameError::Faulted(reason.clone())),
            None => Ok(()),
        }
    }

    fn fault(&mut self, error: FrameError) -> FrameError {
        error!("Frame aborted, queue faulted: {error}");
        self.fault = Some(error.to_string());
        error
    }

    /// Start a frame
    ///
    /// Moves to the next slot, blocks until the GPU has retired the frame
    /// that last used it, then resets the slot for recording.
    pub fn begin_frame(&mut self, swap_chain: &impl SwapChain) -> FrameResult<FrameHandle> {
        self.check_fault()?;
        if !swap_chain.has_surface() {
            return Err(PreconditionError::MissingSurface.into());
        }
        if let Some((index, slot)) = self.ring.upcoming() {
            if matches!(slot.stage, FrameStage::Recording | FrameStage::Submitted) {
                // Its retirement was never scheduled, so the wait would never return.
                warn!("Next frame slot is still {}", slot.stage.name());
                return Err(PreconditionError::InvalidFrameStage {
                    index,
                    expected: FrameStage::InFlight.name(),
                    actual: slot.stage.name(),
                }
                .into());
            }
        }

        let result = self.advance(swap_chain);
        result.map_err(|error| self.fault(error))
    }

    fn advance(&mut self, swap_chain: &impl SwapChain) -> FrameResult<FrameHandle> {
        let (handle, previous) = self.ring.advance();
        trace!(
            "Frame {} in slot {}, waiting for {previous}",
            handle.fence_value(),
            handle.index()
        );
        self.fence.wait_for(previous)?;

        let slot = self.ring.occupy(handle)?;
        slot.recorder.reset()?;

        let index = swap_chain.current_back_buffer_index();
        slot.back_buffer = BackBufferBinding {
            index,
            count: swap_chain.back_buffer_count(),
            resource: swap_chain.back_buffer(index),
            rtv: swap_chain.back_buffer_descriptor(index, false),
            srgb_rtv: swap_chain.back_buffer_descriptor(index, true),
        };
        slot.solution_id = swap_chain.solution_id();
        slot.pipeline_id = swap_chain.pipeline_id();
        slot.stage = FrameStage::Recording;

        self.heap.advance_frame();
        self.upload.advance_frame();
        Ok(handle)
    }

    /// Record the frame's passes and submit them
    pub fn render_frame(&mut self, handle: FrameHandle, inputs: &FrameInputs<'_>) -> FrameResult<WalkSummary> {
        self.check_fault()?;
        self.ring.slot(handle)?.expect_stage(handle.index(), FrameStage::Recording)?;

        let result = self.record_and_submit(handle, inputs);
        result.map_err(|error| self.fault(error))
    }

    fn record_and_submit(&mut self, handle: FrameHandle, inputs: &FrameInputs<'_>) -> FrameResult<WalkSummary> {
        let slot = self.ring.slot_mut(handle)?;
        let resolver = BindingResolver::new(&mut self.heap, &mut self.upload, &mut self.device, &mut self.scratch);
        let walker = PassWalker::new(
            &mut slot.recorder,
            resolver,
            slot.back_buffer,
            slot.solution_id,
            slot.pipeline_id,
        );
        let summary = walker.walk(inputs)?;

        slot.recorder.close()?;
        self.queue.execute(&[&slot.recorder])?;
        slot.stage = FrameStage::Submitted;

        trace!(
            "Frame {} submitted: {} passes, {} subpasses, {} draws",
            handle.fence_value(),
            summary.passes,
            summary.subpasses,
            summary.draws
        );
        Ok(summary)
    }

    /// Schedule the frame's retirement signal
    pub fn end_frame(&mut self, handle: FrameHandle) -> FrameResult<()> {
        self.check_fault()?;
        self.ring.slot(handle)?.expect_stage(handle.index(), FrameStage::Submitted)?;

        let result = self.signal(handle);
        result.map_err(|error| self.fault(error))
    }

    fn signal(&mut self, handle: FrameHandle) -> FrameResult<()> {
        self.queue.signal(&self.fence, handle.fence_value())?;
        self.ring.slot_mut(handle)?.stage = FrameStage::InFlight;
        Ok(())
    }

    /// Move every render target of the active pipeline into its initial state
    ///
    /// Render targets start out as `RenderTarget`; targets declared as
    /// `Common` or `RenderTarget` need no transition.
    pub fn init_pipeline(&mut self, swap_chain: &impl SwapChain, graph: &RenderGraph) -> FrameResult<()> {
        let handle = self.begin_frame(swap_chain)?;

        let result = self.record_initial_states(handle, graph);
        result.map_err(|error| self.fault(error))?;
        self.end_frame(handle)
    }

    fn record_initial_states(&mut self, handle: FrameHandle, graph: &RenderGraph) -> FrameResult<()> {
        let slot = self.ring.slot_mut(handle)?;
        let solution = graph.solution(slot.solution_id).ok_or(SchemaError::MissingGraphEntry {
            what: "render solution",
            index: slot.solution_id,
        })?;
        let pipeline = graph
            .pipeline(slot.solution_id, slot.pipeline_id)
            .ok_or(SchemaError::MissingGraphEntry {
                what: "render pipeline",
                index: slot.pipeline_id,
            })?;

        let mut barriers = Vec::new();
        for (target, &state) in pipeline.rtv_initial_states.iter().enumerate() {
            if matches!(state, ResourceState::Common | ResourceState::RenderTarget) {
                continue;
            }
            let source = solution.rtv_sources.get(target).copied().ok_or(SchemaError::MissingGraphEntry {
                what: "render target source",
                index: target,
            })?;
            let resource = graph.framebuffer(source).ok_or(SchemaError::MissingGraphEntry {
                what: "framebuffer",
                index: source as usize,
            })?;
            barriers.push(ResourceBarrier::transition(resource, ResourceState::RenderTarget, state));
        }

        debug!(
            "Priming pipeline {} of solution {}: {} transitions",
            slot.pipeline_id,
            slot.solution_id,
            barriers.len()
        );
        // Recorded as one batch rather than one call per render target.
        if !barriers.is_empty() {
            slot.recorder.resource_barrier(&barriers);
        }

        slot.recorder.close()?;
        self.queue.execute(&[&slot.recorder])?;
        slot.stage = FrameStage::Submitted;
        Ok(())
    }
}
