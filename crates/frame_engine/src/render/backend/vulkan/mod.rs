//! Vulkan backend built on `ash`
//!
//! Maps the backend traits onto Vulkan 1.3:
//!
//! - the fence is a timeline semaphore, waited on without timeout
//! - recorders are primary command buffers using dynamic rendering
//! - the shader descriptor heap is one descriptor set holding a bindless
//!   array of uniform buffers; a descriptor table is an index into that
//!   array, handed to shaders through push constants (4 bytes per root slot)
//! - upload memory is a persistently mapped host-visible buffer
//!
//! Engine handles carry raw Vulkan handles (`Handle::as_raw`). Render target
//! and depth views are looked up in an [`AttachmentRegistry`] filled by the
//! owner of the swap chain and framebuffers.

pub mod descriptor;
pub mod fence;
pub mod queue;
pub mod recorder;
pub mod upload;

use std::sync::Arc;

use ash::{vk, Device, Instance};

use super::{
    BackendResult, GpuBackend, IndexFormat, PrimitiveTopology, ResourceState, ScissorRect, Viewport,
};
use crate::core::config::FrameQueueConfig;
use crate::render::frame::FrameQueueParts;

pub use descriptor::BindlessDescriptorDevice;
pub use fence::TimelineFence;
pub use queue::VulkanQueue;
pub use recorder::{AttachmentRegistry, AttachmentView, VulkanCommandList};
pub use upload::MappedUploadBuffer;

/// Logical device and graphics queue the backend records for
#[derive(Clone)]
pub struct DeviceContext {
    /// Instance the device was created from
    pub instance: Instance,
    /// Logical device
    pub device: Device,
    /// Physical device backing `device`
    pub physical_device: vk::PhysicalDevice,
    /// Graphics queue family
    pub queue_family_index: u32,
    /// Graphics queue
    pub queue: vk::Queue,
}

/// Marker type selecting the Vulkan objects
pub struct VulkanBackend;

impl GpuBackend for VulkanBackend {
    type Recorder = VulkanCommandList;
    type Fence = TimelineFence;
    type Queue = VulkanQueue;
    type Device = BindlessDescriptorDevice;
    type Upload = MappedUploadBuffer;
}

impl VulkanBackend {
    /// Create every object a frame queue needs for `config`
    pub fn parts(
        context: &DeviceContext,
        config: &FrameQueueConfig,
        attachments: Arc<AttachmentRegistry>,
    ) -> BackendResult<FrameQueueParts<Self>> {
        log::debug!(
            "Creating Vulkan frame queue parts: {} recorders, {} descriptors",
            config.frame_queue_size,
            config.shader_descriptor_capacity
        );

        let recorders = (0..config.frame_queue_size)
            .map(|_| {
                VulkanCommandList::new(
                    context.device.clone(),
                    context.queue_family_index,
                    Arc::clone(&attachments),
                )
            })
            .collect::<BackendResult<Vec<_>>>()?;

        Ok(FrameQueueParts {
            device: BindlessDescriptorDevice::new(context.device.clone(), config.shader_descriptor_capacity)?,
            queue: VulkanQueue::new(context.device.clone(), context.queue),
            fence: TimelineFence::new(context.device.clone())?,
            upload: MappedUploadBuffer::new(context, config.upload_buffer_size())?,
            recorders,
        })
    }
}

/// Image layout a resource state corresponds to
pub const fn image_layout(state: ResourceState) -> vk::ImageLayout {
    match state {
        ResourceState::Common => vk::ImageLayout::GENERAL,
        ResourceState::Present => vk::ImageLayout::PRESENT_SRC_KHR,
        ResourceState::RenderTarget => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ResourceState::DepthWrite => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ResourceState::PixelShaderResource => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ResourceState::CopySource => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        ResourceState::CopyDest => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    }
}

/// Accesses a resource in `state` may see
pub const fn access_mask(state: ResourceState) -> vk::AccessFlags {
    match state {
        ResourceState::Common => vk::AccessFlags::MEMORY_READ,
        ResourceState::Present => vk::AccessFlags::empty(),
        ResourceState::RenderTarget => vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        ResourceState::DepthWrite => vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ResourceState::PixelShaderResource => vk::AccessFlags::SHADER_READ,
        ResourceState::CopySource => vk::AccessFlags::TRANSFER_READ,
        ResourceState::CopyDest => vk::AccessFlags::TRANSFER_WRITE,
    }
}

/// Pipeline stage that touches a resource in `state`
pub const fn pipeline_stage(state: ResourceState) -> vk::PipelineStageFlags {
    match state {
        ResourceState::Common => vk::PipelineStageFlags::ALL_COMMANDS,
        ResourceState::Present => vk::PipelineStageFlags::BOTTOM_OF_PIPE,
        ResourceState::RenderTarget => vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ResourceState::DepthWrite => vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
        ResourceState::PixelShaderResource => vk::PipelineStageFlags::FRAGMENT_SHADER,
        ResourceState::CopySource | ResourceState::CopyDest => vk::PipelineStageFlags::TRANSFER,
    }
}

/// Image aspect addressed in `state`
pub const fn image_aspect(state: ResourceState) -> vk::ImageAspectFlags {
    match state {
        ResourceState::DepthWrite => vk::ImageAspectFlags::DEPTH,
        _ => vk::ImageAspectFlags::COLOR,
    }
}

/// Vulkan topology for a primitive topology
pub const fn primitive_topology(topology: PrimitiveTopology) -> vk::PrimitiveTopology {
    match topology {
        PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
        PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
        PrimitiveTopology::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
        PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
        PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
    }
}

/// Vulkan index type for an index format
pub const fn index_type(format: IndexFormat) -> vk::IndexType {
    match format {
        IndexFormat::U16 => vk::IndexType::UINT16,
        IndexFormat::U32 => vk::IndexType::UINT32,
    }
}

/// Vulkan viewport
pub fn viewport(viewport: &Viewport) -> vk::Viewport {
    vk::Viewport {
        x: viewport.x,
        y: viewport.y,
        width: viewport.width,
        height: viewport.height,
        min_depth: viewport.min_depth,
        max_depth: viewport.max_depth,
    }
}

/// Vulkan scissor rectangle; inverted rectangles collapse to zero size
pub fn scissor(rect: &ScissorRect) -> vk::Rect2D {
    let extent = |low: i32, high: i32| u32::try_from(high.saturating_sub(low)).unwrap_or(0);
    vk::Rect2D {
        offset: vk::Offset2D {
            x: rect.left,
            y: rect.top,
        },
        extent: vk::Extent2D {
            width: extent(rect.left, rect.right),
            height: extent(rect.top, rect.bottom),
        },
    }
}
