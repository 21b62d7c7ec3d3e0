//! GPU backend abstraction
//!
//! The frame queue only talks to the GPU through the traits in this module.
//! Two backends implement them: [`recording`], which logs every call into
//! memory and drives a simulated GPU timeline, and [`vulkan`], built on `ash`.
//!
//! Handles crossing this boundary are plain integer newtypes. A backend maps
//! them onto its own objects (for Vulkan, via `Handle::from_raw`).

pub mod recording;
pub mod vulkan;

use ash::vk;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by a GPU backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Vulkan API call failed
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// A fence wait could never complete
    #[error("waiting for fence value {value} would never complete, completed value is {completed}")]
    Deadlock {
        /// Value waited for
        value: u64,
        /// Value the timeline has reached
        completed: u64,
    },

    /// Upload write outside the mapped buffer
    #[error("upload write of {len} bytes at offset {offset} exceeds capacity {capacity}")]
    UploadOutOfBounds {
        /// Write offset
        offset: u64,
        /// Write length
        len: usize,
        /// Buffer capacity
        capacity: u64,
    },

    /// Operation on a closed or unopened recorder
    #[error("command recorder is {0}")]
    RecorderState(&'static str),

    /// No memory type satisfies an allocation
    #[error("no suitable memory type for {0}")]
    NoSuitableMemory(&'static str),
}

impl From<vk::Result> for BackendError {
    fn from(result: vk::Result) -> Self {
        Self::Api(result)
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

macro_rules! gpu_handle {
    ($($(#[$meta:meta])* $name:ident;)*) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
            pub struct $name(pub u64);
        )*
    };
}

gpu_handle! {
    /// GPU resource (image or buffer) that can take part in a barrier
    ResourceId;
    /// Compiled pipeline state object
    PipelineStateId;
    /// Root signature / pipeline layout
    RootSignatureId;
    /// GPU buffer
    BufferId;
    /// Shader-visible descriptor heap
    DescriptorHeapId;
    /// CPU-side descriptor address
    CpuDescriptorHandle;
    /// GPU-side descriptor address
    GpuDescriptorHandle;
}

impl CpuDescriptorHandle {
    /// Handle `index` descriptors past this one
    pub const fn offset(self, index: u32, increment: u32) -> Self {
        Self(self.0 + index as u64 * increment as u64)
    }
}

impl GpuDescriptorHandle {
    /// Handle `index` descriptors past this one
    pub const fn offset(self, index: u32, increment: u32) -> Self {
        Self(self.0 + index as u64 * increment as u64)
    }
}

/// Usage state of a resource, the subject of transition barriers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceState {
    /// No particular usage
    Common,
    /// Ready for presentation
    Present,
    /// Bound as a color attachment
    RenderTarget,
    /// Bound as a writable depth/stencil attachment
    DepthWrite,
    /// Sampled in a pixel shader
    PixelShaderResource,
    /// Source of a copy
    CopySource,
    /// Destination of a copy
    CopyDest,
}

/// State transition of one resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceBarrier {
    /// Resource being transitioned
    pub resource: ResourceId,
    /// State before the barrier
    pub before: ResourceState,
    /// State after the barrier
    pub after: ResourceState,
}

impl ResourceBarrier {
    /// Create a transition barrier
    pub const fn transition(resource: ResourceId, before: ResourceState, after: ResourceState) -> Self {
        Self { resource, before, after }
    }
}

bitflags! {
    /// Aspects cleared by a depth/stencil clear
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u32 {
        /// Clear depth
        const DEPTH = 0b01;
        /// Clear stencil
        const STENCIL = 0b10;
    }
}

/// Primitive assembly mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveTopology {
    /// Independent points
    PointList,
    /// Independent lines
    LineList,
    /// Connected lines
    LineStrip,
    /// Independent triangles
    TriangleList,
    /// Connected triangles
    TriangleStrip,
}

/// Viewport rectangle and depth range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Left edge
    pub x: f32,
    /// Top edge
    pub y: f32,
    /// Width in pixels
    pub width: f32,
    /// Height in pixels
    pub height: f32,
    /// Near depth
    pub min_depth: f32,
    /// Far depth
    pub max_depth: f32,
}

impl Viewport {
    /// Full-depth viewport covering `width` x `height`
    pub const fn with_size(width: f32, height: f32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width,
            height,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// Scissor rectangle in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScissorRect {
    /// Left edge
    pub left: i32,
    /// Top edge
    pub top: i32,
    /// Right edge, exclusive
    pub right: i32,
    /// Bottom edge, exclusive
    pub bottom: i32,
}

/// Vertex buffer binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexBufferView {
    /// Source buffer
    pub buffer: BufferId,
    /// Byte offset of the first vertex
    pub offset: u64,
    /// Size of the view in bytes
    pub size: u32,
    /// Distance between vertices in bytes
    pub stride: u32,
}

/// Index element width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexFormat {
    /// 16-bit indices
    U16,
    /// 32-bit indices
    U32,
}

/// Index buffer binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexBufferView {
    /// Source buffer
    pub buffer: BufferId,
    /// Byte offset of the first index
    pub offset: u64,
    /// Size of the view in bytes
    pub size: u32,
    /// Index width
    pub format: IndexFormat,
}

/// Constant buffer view written into a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantBufferView {
    /// Buffer holding the constants
    pub buffer: BufferId,
    /// Byte offset, a multiple of 256
    pub offset: u64,
    /// Size in bytes, a multiple of 256
    pub size: u64,
}

/// Address layout of the shader-visible descriptor heap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorHeapLayout {
    /// Heap bound for shader access
    pub heap: DescriptorHeapId,
    /// CPU address of descriptor 0
    pub cpu_base: CpuDescriptorHandle,
    /// GPU address of descriptor 0
    pub gpu_base: GpuDescriptorHandle,
    /// Distance between consecutive descriptors
    pub increment: u32,
    /// Number of descriptors in the heap
    pub capacity: u32,
}

/// GPU timeline fence
pub trait GpuFence {
    /// Highest value the GPU has signaled
    fn completed_value(&self) -> u64;

    /// Block until the GPU has signaled at least `value`
    ///
    /// There is no timeout; a GPU that never signals hangs the caller.
    fn wait_for(&self, value: u64) -> BackendResult<()>;
}

/// Records GPU commands for later submission
///
/// Setter methods only append to the command stream and cannot fail;
/// errors surface from [`close`](Self::close) or at submission.
pub trait CommandRecorder {
    /// Discard previous commands and start recording
    fn reset(&mut self) -> BackendResult<()>;

    /// Finish recording
    fn close(&mut self) -> BackendResult<()>;

    /// Bind the shader-visible descriptor heap
    fn set_descriptor_heap(&mut self, heap: DescriptorHeapId);

    /// Record a batch of state transitions
    fn resource_barrier(&mut self, barriers: &[ResourceBarrier]);

    /// Set the single viewport
    fn set_viewport(&mut self, viewport: &Viewport);

    /// Set the single scissor rectangle
    fn set_scissor_rect(&mut self, rect: &ScissorRect);

    /// Clear a color target
    fn clear_render_target(&mut self, target: CpuDescriptorHandle, color: [f32; 4]);

    /// Clear a depth/stencil target
    fn clear_depth_stencil(&mut self, target: CpuDescriptorHandle, flags: ClearFlags, depth: f32, stencil: u8);

    /// Bind color targets and an optional depth/stencil target
    fn set_render_targets(&mut self, color: &[CpuDescriptorHandle], depth_stencil: Option<CpuDescriptorHandle>);

    /// Bind a root signature, invalidating every table binding
    fn set_root_signature(&mut self, root_signature: RootSignatureId);

    /// Point a root slot at a descriptor table
    fn set_root_descriptor_table(&mut self, slot: u32, table: GpuDescriptorHandle);

    /// Bind a pipeline state object
    fn set_pipeline_state(&mut self, pipeline: PipelineStateId);

    /// Set primitive assembly mode
    fn set_primitive_topology(&mut self, topology: PrimitiveTopology);

    /// Bind vertex buffers starting at `start_slot`; an empty slice unbinds
    fn set_vertex_buffers(&mut self, start_slot: u32, views: &[VertexBufferView]);

    /// Bind or unbind the index buffer
    fn set_index_buffer(&mut self, view: Option<&IndexBufferView>);

    /// Non-indexed draw
    fn draw_instanced(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32);

    /// Indexed draw
    fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    );
}

/// Execution queue
pub trait CommandQueue {
    /// Recorder type the queue consumes
    type Recorder: CommandRecorder;
    /// Fence type the queue signals
    type Fence: GpuFence;

    /// Submit closed recorders for execution
    fn execute(&mut self, recorders: &[&Self::Recorder]) -> BackendResult<()>;

    /// Signal `fence` with `value` once all previously submitted work completes
    fn signal(&mut self, fence: &Self::Fence, value: u64) -> BackendResult<()>;
}

/// Device-side descriptor writes
pub trait DescriptorDevice {
    /// Layout of the shader-visible heap
    fn heap_layout(&self) -> DescriptorHeapLayout;

    /// Write a constant buffer view into `destination`
    fn create_constant_buffer_view(&mut self, view: &ConstantBufferView, destination: CpuDescriptorHandle);
}

/// CPU-writable, GPU-readable memory for transient constants
pub trait UploadMemory {
    /// Buffer backing the memory
    fn buffer(&self) -> BufferId;

    /// Size in bytes
    fn capacity(&self) -> u64;

    /// Copy `data` to `offset`
    fn write(&mut self, offset: u64, data: &[u8]) -> BackendResult<()>;
}

/// Family of types making up one GPU backend
pub trait GpuBackend {
    /// Command recorder
    type Recorder: CommandRecorder;
    /// Timeline fence
    type Fence: GpuFence;
    /// Execution queue
    type Queue: CommandQueue<Recorder = Self::Recorder, Fence = Self::Fence>;
    /// Descriptor device
    type Device: DescriptorDevice;
    /// Upload memory
    type Upload: UploadMemory;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_handle_offset() {
        assert_eq!(CpuDescriptorHandle(64).offset(3, 32), CpuDescriptorHandle(160));
        assert_eq!(GpuDescriptorHandle(0).offset(0, 32), GpuDescriptorHandle(0));
    }

    #[test]
    fn test_clear_flags_combine() {
        let flags = ClearFlags::DEPTH | ClearFlags::STENCIL;
        assert!(flags.contains(ClearFlags::DEPTH));
        assert!(flags.contains(ClearFlags::STENCIL));
        assert!(ClearFlags::empty().is_empty());
    }

    #[test]
    fn test_vk_result_converts() {
        let error: BackendError = vk::Result::ERROR_DEVICE_LOST.into();
        assert_eq!(error, BackendError::Api(vk::Result::ERROR_DEVICE_LOST));
    }
}
