//! In-memory recording backend
//!
//! Every command is appended to a [`RecordingCommandList`] instead of being
//! sent to a GPU. Submissions, fence signals, fence waits and constant
//! buffer views all land in a shared [`SimulatedGpu`] log that tests and the
//! `frame_dump` tool inspect after the fact.
//!
//! The simulated GPU only makes progress when someone waits on it: signals
//! queue up in submission order and are retired by [`ManualFence::wait_for`]
//! or explicitly through [`RecordingBackend::retire_through`]. That makes
//! every fence wait observable, including whether it had to block.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{
    BackendError, BackendResult, BufferId, ClearFlags, CommandQueue, CommandRecorder, ConstantBufferView,
    CpuDescriptorHandle, DescriptorDevice, DescriptorHeapId, DescriptorHeapLayout, GpuBackend,
    GpuDescriptorHandle, GpuFence, IndexBufferView, PipelineStateId, PrimitiveTopology, ResourceBarrier,
    RootSignatureId, ScissorRect, UploadMemory, VertexBufferView, Viewport,
};
use crate::core::config::FrameQueueConfig;
use crate::render::frame::FrameQueueParts;

/// Buffer id of the host upload memory
pub const UPLOAD_BUFFER_ID: BufferId = BufferId(0xB0);

/// Heap id of the simulated shader-visible heap
pub const SHADER_HEAP_ID: DescriptorHeapId = DescriptorHeapId(1);

/// One command as recorded
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    /// Descriptor heap bound
    SetDescriptorHeap(DescriptorHeapId),
    /// Barrier batch
    ResourceBarrier(Vec<ResourceBarrier>),
    /// Viewport set
    SetViewport(Viewport),
    /// Scissor set
    SetScissorRect(ScissorRect),
    /// Color clear
    ClearRenderTarget {
        /// Cleared view
        target: CpuDescriptorHandle,
        /// Clear color
        color: [f32; 4],
    },
    /// Depth/stencil clear
    ClearDepthStencil {
        /// Cleared view
        target: CpuDescriptorHandle,
        /// Cleared aspects
        flags: ClearFlags,
        /// Depth value
        depth: f32,
        /// Stencil value
        stencil: u8,
    },
    /// Render targets bound
    SetRenderTargets {
        /// Color views
        color: Vec<CpuDescriptorHandle>,
        /// Depth/stencil view
        depth_stencil: Option<CpuDescriptorHandle>,
    },
    /// Root signature bound
    SetRootSignature(RootSignatureId),
    /// Descriptor table bound to a root slot
    SetRootDescriptorTable {
        /// Root slot
        slot: u32,
        /// Table start
        table: GpuDescriptorHandle,
    },
    /// Pipeline state bound
    SetPipelineState(PipelineStateId),
    /// Topology set
    SetPrimitiveTopology(PrimitiveTopology),
    /// Vertex buffers bound; empty means unbound
    SetVertexBuffers {
        /// First slot
        start_slot: u32,
        /// Views
        views: Vec<VertexBufferView>,
    },
    /// Index buffer bound or unbound
    SetIndexBuffer(Option<IndexBufferView>),
    /// Non-indexed draw
    DrawInstanced {
        /// Vertices per instance
        vertex_count: u32,
        /// Instances
        instance_count: u32,
        /// First vertex
        first_vertex: u32,
        /// First instance
        first_instance: u32,
    },
    /// Indexed draw
    DrawIndexedInstanced {
        /// Indices per instance
        index_count: u32,
        /// Instances
        instance_count: u32,
        /// First index
        first_index: u32,
        /// Added to each index
        base_vertex: i32,
        /// First instance
        first_instance: u32,
    },
}

impl RecordedCommand {
    /// Whether this is a draw of either kind
    pub const fn is_draw(&self) -> bool {
        matches!(self, Self::DrawInstanced { .. } | Self::DrawIndexedInstanced { .. })
    }
}

/// Command list that records into memory
#[derive(Debug, Clone, Default)]
pub struct RecordingCommandList {
    id: usize,
    commands: Vec<RecordedCommand>,
    closed: bool,
    reset_count: usize,
}

impl RecordingCommandList {
    /// Create a closed, empty list
    pub fn new(id: usize) -> Self {
        Self {
            id,
            commands: Vec::new(),
            closed: true,
            reset_count: 0,
        }
    }

    /// Identifier given at creation
    pub fn id(&self) -> usize {
        self.id
    }

    /// Commands recorded since the last reset
    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    /// Whether the list has been closed
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Number of resets so far
    pub fn reset_count(&self) -> usize {
        self.reset_count
    }

    fn push(&mut self, command: RecordedCommand) {
        self.commands.push(command);
    }
}

impl CommandRecorder for RecordingCommandList {
    fn reset(&mut self) -> BackendResult<()> {
        self.commands.clear();
        self.closed = false;
        self.reset_count += 1;
        Ok(())
    }

    fn close(&mut self) -> BackendResult<()> {
        if self.closed {
            return Err(BackendError::RecorderState("already closed"));
        }
        self.closed = true;
        Ok(())
    }

    fn set_descriptor_heap(&mut self, heap: DescriptorHeapId) {
        self.push(RecordedCommand::SetDescriptorHeap(heap));
    }

    fn resource_barrier(&mut self, barriers: &[ResourceBarrier]) {
        self.push(RecordedCommand::ResourceBarrier(barriers.to_vec()));
    }

    fn set_viewport(&mut self, viewport: &Viewport) {
        self.push(RecordedCommand::SetViewport(*viewport));
    }

    fn set_scissor_rect(&mut self, rect: &ScissorRect) {
        self.push(RecordedCommand::SetScissorRect(*rect));
    }

    fn clear_render_target(&mut self, target: CpuDescriptorHandle, color: [f32; 4]) {
        self.push(RecordedCommand::ClearRenderTarget { target, color });
    }

    fn clear_depth_stencil(&mut self, target: CpuDescriptorHandle, flags: ClearFlags, depth: f32, stencil: u8) {
        self.push(RecordedCommand::ClearDepthStencil {
            target,
            flags,
            depth,
            stencil,
        });
    }

    fn set_render_targets(&mut self, color: &[CpuDescriptorHandle], depth_stencil: Option<CpuDescriptorHandle>) {
        self.push(RecordedCommand::SetRenderTargets {
            color: color.to_vec(),
            depth_stencil,
        });
    }

    fn set_root_signature(&mut self, root_signature: RootSignatureId) {
        self.push(RecordedCommand::SetRootSignature(root_signature));
    }

    fn set_root_descriptor_table(&mut self, slot: u32, table: GpuDescriptorHandle) {
        self.push(RecordedCommand::SetRootDescriptorTable { slot, table });
    }

    fn set_pipeline_state(&mut self, pipeline: PipelineStateId) {
        self.push(RecordedCommand::SetPipelineState(pipeline));
    }

    fn set_primitive_topology(&mut self, topology: PrimitiveTopology) {
        self.push(RecordedCommand::SetPrimitiveTopology(topology));
    }

    fn set_vertex_buffers(&mut self, start_slot: u32, views: &[VertexBufferView]) {
        self.push(RecordedCommand::SetVertexBuffers {
            start_slot,
            views: views.to_vec(),
        });
    }

    fn set_index_buffer(&mut self, view: Option<&IndexBufferView>) {
        self.push(RecordedCommand::SetIndexBuffer(view.copied()));
    }

    fn draw_instanced(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        self.push(RecordedCommand::DrawInstanced {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        });
    }

    fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    ) {
        self.push(RecordedCommand::DrawIndexedInstanced {
            index_count,
            instance_count,
            first_index,
            base_vertex,
            first_instance,
        });
    }
}

/// A fence wait as observed by the simulated GPU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FenceWait {
    /// Value waited for
    pub value: u64,
    /// Whether the value was not yet reached when the wait started
    pub blocked: bool,
}

/// A batch handed to [`RecordingQueue::execute`]
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    /// Id of each submitted list
    pub lists: Vec<usize>,
    /// Commands of every list in submission order
    pub commands: Vec<RecordedCommand>,
}

impl Submission {
    /// Count commands matching `predicate`
    pub fn count(&self, predicate: impl Fn(&RecordedCommand) -> bool) -> usize {
        self.commands.iter().filter(|command| predicate(command)).count()
    }
}

/// Shared state of the simulated GPU
#[derive(Debug, Default)]
pub struct SimulatedGpu {
    completed: u64,
    pending: VecDeque<u64>,
    auto_retire: bool,
    waits: Vec<FenceWait>,
    signals: Vec<u64>,
    submissions: Vec<Submission>,
    constant_buffer_views: Vec<(ConstantBufferView, CpuDescriptorHandle)>,
}

impl SimulatedGpu {
    fn retire_through(&mut self, value: u64) {
        while self.completed < value {
            match self.pending.pop_front() {
                Some(signal) => self.completed = self.completed.max(signal),
                None => break,
            }
        }
    }
}

type SharedGpu = Arc<Mutex<SimulatedGpu>>;

fn lock(gpu: &SharedGpu) -> MutexGuard<'_, SimulatedGpu> {
    gpu.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fence over the simulated GPU timeline
#[derive(Debug, Clone)]
pub struct ManualFence {
    gpu: SharedGpu,
}

impl GpuFence for ManualFence {
    fn completed_value(&self) -> u64 {
        lock(&self.gpu).completed
    }

    fn wait_for(&self, value: u64) -> BackendResult<()> {
        let mut gpu = lock(&self.gpu);
        let blocked = gpu.completed < value;
        gpu.waits.push(FenceWait { value, blocked });

        if blocked {
            gpu.retire_through(value);
            if gpu.completed < value {
                return Err(BackendError::Deadlock {
                    value,
                    completed: gpu.completed,
                });
            }
        }
        Ok(())
    }
}

/// Queue that logs submissions and schedules signals
#[derive(Debug, Clone)]
pub struct RecordingQueue {
    gpu: SharedGpu,
}

impl CommandQueue for RecordingQueue {
    type Recorder = RecordingCommandList;
    type Fence = ManualFence;

    fn execute(&mut self, recorders: &[&RecordingCommandList]) -> BackendResult<()> {
        if recorders.iter().any(|list| !list.is_closed()) {
            return Err(BackendError::RecorderState("still open at submission"));
        }

        let submission = Submission {
            lists: recorders.iter().map(|list| list.id()).collect(),
            commands: recorders.iter().flat_map(|list| list.commands().iter().cloned()).collect(),
        };
        lock(&self.gpu).submissions.push(submission);
        Ok(())
    }

    fn signal(&mut self, fence: &ManualFence, value: u64) -> BackendResult<()> {
        let mut gpu = lock(&fence.gpu);
        gpu.signals.push(value);
        if gpu.auto_retire {
            gpu.completed = gpu.completed.max(value);
        } else {
            gpu.pending.push_back(value);
        }
        Ok(())
    }
}

/// Device that logs constant buffer views
#[derive(Debug, Clone)]
pub struct RecordingDevice {
    gpu: SharedGpu,
    layout: DescriptorHeapLayout,
}

impl DescriptorDevice for RecordingDevice {
    fn heap_layout(&self) -> DescriptorHeapLayout {
        self.layout
    }

    fn create_constant_buffer_view(&mut self, view: &ConstantBufferView, destination: CpuDescriptorHandle) {
        lock(&self.gpu).constant_buffer_views.push((*view, destination));
    }
}

/// Upload memory backed by a host vector
#[derive(Debug, Clone)]
pub struct HostUploadMemory {
    buffer: BufferId,
    bytes: Vec<u8>,
}

impl HostUploadMemory {
    /// Allocate `capacity` zeroed bytes
    pub fn new(buffer: BufferId, capacity: u64) -> Self {
        Self {
            buffer,
            bytes: vec![0; usize::try_from(capacity).unwrap_or(usize::MAX)],
        }
    }

    /// Contents of the memory
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl UploadMemory for HostUploadMemory {
    fn buffer(&self) -> BufferId {
        self.buffer
    }

    fn capacity(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn write(&mut self, offset: u64, data: &[u8]) -> BackendResult<()> {
        let capacity = self.bytes.len() as u64;
        let out_of_bounds = || BackendError::UploadOutOfBounds {
            offset,
            len: data.len(),
            capacity,
        };
        let start = usize::try_from(offset).map_err(|_| out_of_bounds())?;
        let end = start.checked_add(data.len()).ok_or_else(out_of_bounds)?;
        let target = self.bytes.get_mut(start..end).ok_or_else(out_of_bounds)?;
        target.copy_from_slice(data);
        Ok(())
    }
}

/// Recording backend and handle to its simulated GPU
#[derive(Debug, Clone, Default)]
pub struct RecordingBackend {
    gpu: SharedGpu,
}

impl GpuBackend for RecordingBackend {
    type Recorder = RecordingCommandList;
    type Fence = ManualFence;
    type Queue = RecordingQueue;
    type Device = RecordingDevice;
    type Upload = HostUploadMemory;
}

impl RecordingBackend {
    /// Create a backend whose signals wait to be retired
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend whose signals retire immediately
    pub fn with_auto_retire() -> Self {
        let backend = Self::new();
        lock(&backend.gpu).auto_retire = true;
        backend
    }

    /// Build everything a frame queue needs for `config`
    pub fn parts(&self, config: &FrameQueueConfig) -> FrameQueueParts<Self> {
        let layout = DescriptorHeapLayout {
            heap: SHADER_HEAP_ID,
            cpu_base: CpuDescriptorHandle(0x1_0000),
            gpu_base: GpuDescriptorHandle(0x8000_0000),
            increment: 32,
            capacity: config.shader_descriptor_capacity,
        };

        FrameQueueParts {
            device: RecordingDevice {
                gpu: Arc::clone(&self.gpu),
                layout,
            },
            queue: RecordingQueue {
                gpu: Arc::clone(&self.gpu),
            },
            fence: ManualFence {
                gpu: Arc::clone(&self.gpu),
            },
            upload: HostUploadMemory::new(UPLOAD_BUFFER_ID, config.upload_buffer_size()),
            recorders: (0..config.frame_queue_size).map(RecordingCommandList::new).collect(),
        }
    }

    /// Retire queued signals until `value` is reached or none are left
    pub fn retire_through(&self, value: u64) {
        lock(&self.gpu).retire_through(value);
    }

    /// Retire every queued signal
    pub fn retire_all(&self) {
        self.retire_through(u64::MAX);
    }

    /// Highest retired fence value
    pub fn completed_value(&self) -> u64 {
        lock(&self.gpu).completed
    }

    /// Every fence wait so far
    pub fn waits(&self) -> Vec<FenceWait> {
        lock(&self.gpu).waits.clone()
    }

    /// Every fence signal so far
    pub fn signals(&self) -> Vec<u64> {
        lock(&self.gpu).signals.clone()
    }

    /// Every submission so far
    pub fn submissions(&self) -> Vec<Submission> {
        lock(&self.gpu).submissions.clone()
    }

    /// Every constant buffer view written so far
    pub fn constant_buffer_views(&self) -> Vec<(ConstantBufferView, CpuDescriptorHandle)> {
        lock(&self.gpu).constant_buffer_views.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_clears_and_reopens() {
        let mut list = RecordingCommandList::new(7);
        assert!(list.is_closed());

        list.reset().unwrap();
        list.draw_instanced(3, 1, 0, 0);
        assert_eq!(list.commands().len(), 1);
        list.close().unwrap();
        assert!(list.close().is_err());

        list.reset().unwrap();
        assert!(list.commands().is_empty());
        assert_eq!(list.reset_count(), 2);
    }

    #[test]
    fn test_wait_drains_pending_signals_in_order() {
        let backend = RecordingBackend::new();
        let parts = backend.parts(&FrameQueueConfig::new());
        let mut queue = parts.queue;
        let fence = parts.fence;

        queue.signal(&fence, 1).unwrap();
        queue.signal(&fence, 2).unwrap();
        assert_eq!(fence.completed_value(), 0);

        fence.wait_for(0).unwrap();
        fence.wait_for(1).unwrap();
        assert_eq!(fence.completed_value(), 1);

        assert_eq!(
            backend.waits(),
            vec![FenceWait { value: 0, blocked: false }, FenceWait { value: 1, blocked: true }]
        );
    }

    #[test]
    fn test_wait_without_signal_reports_deadlock() {
        let backend = RecordingBackend::new();
        let fence = backend.parts(&FrameQueueConfig::new()).fence;
        assert_eq!(
            fence.wait_for(4),
            Err(BackendError::Deadlock { value: 4, completed: 0 })
        );
    }

    #[test]
    fn test_auto_retire_completes_on_signal() {
        let backend = RecordingBackend::with_auto_retire();
        let parts = backend.parts(&FrameQueueConfig::new());
        let mut queue = parts.queue;
        queue.signal(&parts.fence, 5).unwrap();
        assert_eq!(backend.completed_value(), 5);
    }

    #[test]
    fn test_execute_rejects_open_list() {
        let backend = RecordingBackend::new();
        let mut parts = backend.parts(&FrameQueueConfig::new());
        let mut list = parts.recorders.remove(0);
        list.reset().unwrap();

        assert!(parts.queue.execute(&[&list]).is_err());
        list.close().unwrap();
        parts.queue.execute(&[&list]).unwrap();
        assert_eq!(backend.submissions()[0].lists, vec![0]);
    }

    #[test]
    fn test_upload_write_bounds() {
        let mut memory = HostUploadMemory::new(UPLOAD_BUFFER_ID, 8);
        memory.write(4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(&memory.bytes()[4..], &[1, 2, 3, 4]);
        assert!(matches!(
            memory.write(6, &[0; 4]),
            Err(BackendError::UploadOutOfBounds { offset: 6, len: 4, capacity: 8 })
        ));
    }
}
