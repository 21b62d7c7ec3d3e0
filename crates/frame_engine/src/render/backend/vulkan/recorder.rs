//! Command buffer recorder
//!
//! Each recorder owns a command pool with one primary command buffer.
//! Render passes use dynamic rendering: clears recorded before
//! `set_render_targets` become `CLEAR` load operations of the rendering
//! scope it opens. Barriers close any open scope first.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use ash::vk::{self, Handle};
use ash::Device;
use log::warn;

use super::{image_aspect, image_layout, access_mask, index_type, pipeline_stage, primitive_topology, scissor, viewport};
use crate::render::backend::{
    BackendError, BackendResult, ClearFlags, CommandRecorder, CpuDescriptorHandle, DescriptorHeapId,
    GpuDescriptorHandle, IndexBufferView, PipelineStateId, PrimitiveTopology, ResourceBarrier, RootSignatureId,
    ScissorRect, VertexBufferView, Viewport,
};

/// Image view standing behind a render target or depth descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentView {
    /// Image the view belongs to
    pub image: vk::Image,
    /// View bound as an attachment
    pub view: vk::ImageView,
    /// Aspects the view covers
    pub aspect: vk::ImageAspectFlags,
}

/// Lookup from descriptor handles to attachment views
///
/// Filled by the owner of the swap chain and framebuffers; shared with every
/// recorder.
#[derive(Debug, Default)]
pub struct AttachmentRegistry {
    views: RwLock<HashMap<CpuDescriptorHandle, AttachmentView>>,
}

impl AttachmentRegistry {
    /// Associate `handle` with `view`, replacing any previous view
    pub fn register(&self, handle: CpuDescriptorHandle, view: AttachmentView) {
        if let Ok(mut views) = self.views.write() {
            views.insert(handle, view);
        }
    }

    /// View registered for `handle`
    pub fn get(&self, handle: CpuDescriptorHandle) -> Option<AttachmentView> {
        self.views.read().ok().and_then(|views| views.get(&handle).copied())
    }
}

/// Primary command buffer implementing [`CommandRecorder`]
pub struct VulkanCommandList {
    device: Device,
    pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    attachments: Arc<AttachmentRegistry>,
    recording: bool,
    rendering: bool,
    descriptor_set: vk::DescriptorSet,
    layout: vk::PipelineLayout,
    render_area: vk::Rect2D,
    color_clears: HashMap<CpuDescriptorHandle, [f32; 4]>,
    depth_clear: Option<(CpuDescriptorHandle, ClearFlags, f32, u8)>,
}

impl VulkanCommandList {
    /// Create a pool on `queue_family_index` and allocate one primary command buffer
    pub fn new(device: Device, queue_family_index: u32, attachments: Arc<AttachmentRegistry>) -> BackendResult<Self> {
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(queue_family_index)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT);
        let pool = unsafe { device.create_command_pool(&pool_info, None)? };

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let command_buffer = match unsafe { device.allocate_command_buffers(&alloc_info) } {
            Ok(buffers) => buffers.first().copied().unwrap_or_default(),
            Err(err) => {
                unsafe { device.destroy_command_pool(pool, None) };
                return Err(err.into());
            }
        };

        Ok(Self {
            device,
            pool,
            command_buffer,
            attachments,
            recording: false,
            rendering: false,
            descriptor_set: vk::DescriptorSet::null(),
            layout: vk::PipelineLayout::null(),
            render_area: vk::Rect2D::default(),
            color_clears: HashMap::new(),
            depth_clear: None,
        })
    }

    /// Get the command buffer handle
    pub fn handle(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    /// Whether commands are being recorded
    pub fn is_recording(&self) -> bool {
        self.recording
    }

    fn end_rendering(&mut self) {
        if self.rendering {
            unsafe { self.device.cmd_end_rendering(self.command_buffer) };
            self.rendering = false;
        }
    }

    fn color_attachment(&mut self, handle: CpuDescriptorHandle) -> Option<vk::RenderingAttachmentInfo> {
        let Some(view) = self.attachments.get(handle) else {
            warn!("No attachment registered for render target {}", handle.0);
            return None;
        };

        let clear = self.color_clears.remove(&handle);
        Some(
            vk::RenderingAttachmentInfo::builder()
                .image_view(view.view)
                .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .load_op(clear.map_or(vk::AttachmentLoadOp::LOAD, |_| vk::AttachmentLoadOp::CLEAR))
                .store_op(vk::AttachmentStoreOp::STORE)
                .clear_value(vk::ClearValue {
                    color: vk::ClearColorValue {
                        float32: clear.unwrap_or_default(),
                    },
                })
                .build(),
        )
    }
}

/// Load operations and clear value for a depth/stencil attachment
fn depth_stencil_ops(
    clear: Option<(ClearFlags, f32, u8)>,
) -> (vk::AttachmentLoadOp, vk::AttachmentLoadOp, vk::ClearValue) {
    let (flags, depth, stencil) = clear.unwrap_or((ClearFlags::empty(), 1.0, 0));
    let load = |flag| {
        if flags.contains(flag) {
            vk::AttachmentLoadOp::CLEAR
        } else {
            vk::AttachmentLoadOp::LOAD
        }
    };
    let value = vk::ClearValue {
        depth_stencil: vk::ClearDepthStencilValue {
            depth,
            stencil: u32::from(stencil),
        },
    };
    (load(ClearFlags::DEPTH), load(ClearFlags::STENCIL), value)
}

/// Image barrier for one engine transition
fn image_barrier(barrier: &ResourceBarrier) -> vk::ImageMemoryBarrier {
    let aspect = image_aspect(barrier.before) | image_aspect(barrier.after);
    // Depth images never take a color aspect.
    let aspect = if aspect.contains(vk::ImageAspectFlags::DEPTH) {
        vk::ImageAspectFlags::DEPTH
    } else {
        aspect
    };

    vk::ImageMemoryBarrier::builder()
        .src_access_mask(access_mask(barrier.before))
        .dst_access_mask(access_mask(barrier.after))
        .old_layout(image_layout(barrier.before))
        .new_layout(image_layout(barrier.after))
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(vk::Image::from_raw(barrier.resource.0))
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level: 0,
            level_count: vk::REMAINING_MIP_LEVELS,
            base_array_layer: 0,
            layer_count: vk::REMAINING_ARRAY_LAYERS,
        })
        .build()
}

impl CommandRecorder for VulkanCommandList {
    fn reset(&mut self) -> BackendResult<()> {
        unsafe {
            self.device
                .reset_command_pool(self.pool, vk::CommandPoolResetFlags::empty())?;
            let begin_info =
                vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            self.device.begin_command_buffer(self.command_buffer, &begin_info)?;
        }

        self.recording = true;
        self.rendering = false;
        self.descriptor_set = vk::DescriptorSet::null();
        self.layout = vk::PipelineLayout::null();
        self.color_clears.clear();
        self.depth_clear = None;
        Ok(())
    }

    fn close(&mut self) -> BackendResult<()> {
        if !self.recording {
            return Err(BackendError::RecorderState("not recording"));
        }
        self.end_rendering();
        if !self.color_clears.is_empty() || self.depth_clear.is_some() {
            warn!("Dropping clears that were never bound as render targets");
        }
        unsafe { self.device.end_command_buffer(self.command_buffer)? };
        self.recording = false;
        Ok(())
    }

    fn set_descriptor_heap(&mut self, heap: DescriptorHeapId) {
        self.descriptor_set = vk::DescriptorSet::from_raw(heap.0);
    }

    fn resource_barrier(&mut self, barriers: &[ResourceBarrier]) {
        self.end_rendering();

        let src_stage = barriers
            .iter()
            .fold(vk::PipelineStageFlags::empty(), |stage, barrier| {
                stage | pipeline_stage(barrier.before)
            });
        let dst_stage = barriers
            .iter()
            .fold(vk::PipelineStageFlags::empty(), |stage, barrier| {
                stage | pipeline_stage(barrier.after)
            });
        let image_barriers: Vec<_> = barriers.iter().map(image_barrier).collect();

        unsafe {
            self.device.cmd_pipeline_barrier(
                self.command_buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &image_barriers,
            );
        }
    }

    fn set_viewport(&mut self, viewport_rect: &Viewport) {
        unsafe {
            self.device
                .cmd_set_viewport(self.command_buffer, 0, &[viewport(viewport_rect)]);
        }
    }

    fn set_scissor_rect(&mut self, rect: &ScissorRect) {
        self.render_area = scissor(rect);
        unsafe {
            self.device
                .cmd_set_scissor(self.command_buffer, 0, &[self.render_area]);
        }
    }

    fn clear_render_target(&mut self, target: CpuDescriptorHandle, color: [f32; 4]) {
        self.color_clears.insert(target, color);
    }

    fn clear_depth_stencil(&mut self, target: CpuDescriptorHandle, flags: ClearFlags, depth: f32, stencil: u8) {
        self.depth_clear = Some((target, flags, depth, stencil));
    }

    fn set_render_targets(&mut self, color: &[CpuDescriptorHandle], depth_stencil: Option<CpuDescriptorHandle>) {
        self.end_rendering();

        let color_attachments: Vec<_> = color
            .iter()
            .filter_map(|&handle| self.color_attachment(handle))
            .collect();

        let depth_attachment = depth_stencil.and_then(|handle| {
            let Some(view) = self.attachments.get(handle) else {
                warn!("No attachment registered for depth target {}", handle.0);
                return None;
            };
            let clear = match self.depth_clear.take() {
                Some((target, flags, depth, stencil)) if target == handle => Some((flags, depth, stencil)),
                other => {
                    self.depth_clear = other;
                    None
                }
            };
            let (depth_load, stencil_load, clear_value) = depth_stencil_ops(clear);
            Some((view, depth_load, stencil_load, clear_value))
        });

        let depth_info = depth_attachment.map(|(view, load, _, clear_value)| {
            vk::RenderingAttachmentInfo::builder()
                .image_view(view.view)
                .image_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                .load_op(load)
                .store_op(vk::AttachmentStoreOp::STORE)
                .clear_value(clear_value)
                .build()
        });
        let stencil_info = depth_attachment
            .filter(|(view, ..)| view.aspect.contains(vk::ImageAspectFlags::STENCIL))
            .map(|(view, _, load, clear_value)| {
                vk::RenderingAttachmentInfo::builder()
                    .image_view(view.view)
                    .image_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                    .load_op(load)
                    .store_op(vk::AttachmentStoreOp::STORE)
                    .clear_value(clear_value)
                    .build()
            });

        let mut rendering_info = vk::RenderingInfo::builder()
            .render_area(self.render_area)
            .layer_count(1)
            .color_attachments(&color_attachments);
        if let Some(depth) = depth_info.as_ref() {
            rendering_info = rendering_info.depth_attachment(depth);
        }
        if let Some(stencil) = stencil_info.as_ref() {
            rendering_info = rendering_info.stencil_attachment(stencil);
        }

        unsafe {
            self.device
                .cmd_begin_rendering(self.command_buffer, &rendering_info);
        }
        self.rendering = true;
    }

    fn set_root_signature(&mut self, root_signature: RootSignatureId) {
        self.layout = vk::PipelineLayout::from_raw(root_signature.0);
        if self.descriptor_set == vk::DescriptorSet::null() {
            return;
        }
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.layout,
                0,
                &[self.descriptor_set],
                &[],
            );
        }
    }

    fn set_root_descriptor_table(&mut self, slot: u32, table: GpuDescriptorHandle) {
        let Ok(index) = u32::try_from(table.0) else {
            warn!("Descriptor table {} does not fit a push constant", table.0);
            return;
        };
        unsafe {
            self.device.cmd_push_constants(
                self.command_buffer,
                self.layout,
                vk::ShaderStageFlags::ALL_GRAPHICS,
                slot * 4,
                &index.to_ne_bytes(),
            );
        }
    }

    fn set_pipeline_state(&mut self, pipeline: PipelineStateId) {
        unsafe {
            self.device.cmd_bind_pipeline(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                vk::Pipeline::from_raw(pipeline.0),
            );
        }
    }

    fn set_primitive_topology(&mut self, topology: PrimitiveTopology) {
        unsafe {
            self.device
                .cmd_set_primitive_topology(self.command_buffer, primitive_topology(topology));
        }
    }

    fn set_vertex_buffers(&mut self, start_slot: u32, views: &[VertexBufferView]) {
        // Vulkan has no unbind; the next draw rebinds what it reads.
        if views.is_empty() {
            return;
        }
        let buffers: Vec<_> = views.iter().map(|view| vk::Buffer::from_raw(view.buffer.0)).collect();
        let offsets: Vec<_> = views.iter().map(|view| view.offset).collect();
        unsafe {
            self.device
                .cmd_bind_vertex_buffers(self.command_buffer, start_slot, &buffers, &offsets);
        }
    }

    fn set_index_buffer(&mut self, view: Option<&IndexBufferView>) {
        let Some(view) = view else {
            return;
        };
        unsafe {
            self.device.cmd_bind_index_buffer(
                self.command_buffer,
                vk::Buffer::from_raw(view.buffer.0),
                view.offset,
                index_type(view.format),
            );
        }
    }

    fn draw_instanced(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        unsafe {
            self.device
                .cmd_draw(self.command_buffer, vertex_count, instance_count, first_vertex, first_instance);
        }
    }

    fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    ) {
        unsafe {
            self.device.cmd_draw_indexed(
                self.command_buffer,
                index_count,
                instance_count,
                first_index,
                base_vertex,
                first_instance,
            );
        }
    }
}

impl Drop for VulkanCommandList {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_command_pool(self.pool, None);
        }
    }
}
