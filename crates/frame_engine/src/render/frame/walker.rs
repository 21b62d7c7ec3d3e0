//! Pass walker
//!
//! Records one frame by walking the active render pipeline:
//!
//! ```text
//! back buffer Present -> RenderTarget
//! for pass:        viewport, scissor
//!   for subpass:   targets + load ops
//!     for queue:   root signature, per-pass tables
//!       for item:  pipeline state, per-instance tables, draw
//!   post-subpass transitions
//! ```
//!
//! Topology and pipeline state are only re-issued when they change within a
//! subpass; table bindings are only re-issued when they change under the
//! current root signature.

use log::trace;

use crate::foundation::collections::MaterialKey;
use crate::foundation::math::CameraData;
use crate::render::backend::{
    ClearFlags, CommandRecorder, CpuDescriptorHandle, DescriptorDevice, PipelineStateId, PrimitiveTopology,
    ResourceBarrier, ResourceId, ResourceState, UploadMemory,
};
use crate::render::binding::{BindingResolver, TableBindings};
use crate::render::error::{FrameResult, SchemaError};
use crate::render::graph::{GraphicsSubpass, LoadOp, RenderGraph, RenderPass};
use crate::render::scene::{
    AssetStore, DrawItem, FlattenedObjects, RenderContent, ShaderSubpassIndex, SubpassKey,
};

use super::ring::BackBufferBinding;

/// Everything a frame draws
#[derive(Debug, Clone, Copy)]
pub struct FrameInputs<'a> {
    /// Precompiled render graph
    pub graph: &'a RenderGraph,
    /// Meshes, materials and shaders
    pub assets: &'a AssetStore,
    /// Contents referenced by draw queues
    pub contents: &'a [RenderContent],
    /// Camera of the frame
    pub camera: CameraData,
}

/// Counts gathered while walking a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WalkSummary {
    /// Passes walked
    pub passes: usize,
    /// Subpasses walked
    pub subpasses: usize,
    /// Draw calls issued
    pub draws: usize,
}

/// Records one frame into a slot's recorder
pub struct PassWalker<'f, R, D, M> {
    recorder: &'f mut R,
    resolver: BindingResolver<'f, D, M>,
    back_buffer: BackBufferBinding,
    solution_id: usize,
    pipeline_id: usize,
    tables: TableBindings,
    render_targets: Vec<CpuDescriptorHandle>,
    barriers: Vec<ResourceBarrier>,
    topology: Option<PrimitiveTopology>,
    pipeline_state: Option<PipelineStateId>,
    summary: WalkSummary,
}

impl<'f, R, D, M> PassWalker<'f, R, D, M>
where
    R: CommandRecorder,
    D: DescriptorDevice,
    M: UploadMemory,
{
    /// Walker for the frame occupying a slot
    pub fn new(
        recorder: &'f mut R,
        resolver: BindingResolver<'f, D, M>,
        back_buffer: BackBufferBinding,
        solution_id: usize,
        pipeline_id: usize,
    ) -> Self {
        Self {
            recorder,
            resolver,
            back_buffer,
            solution_id,
            pipeline_id,
            tables: TableBindings::default(),
            render_targets: Vec::with_capacity(8),
            barriers: Vec::with_capacity(16),
            topology: None,
            pipeline_state: None,
            summary: WalkSummary::default(),
        }
    }

    /// Record every pass of the active pipeline
    pub fn walk(mut self, inputs: &FrameInputs<'_>) -> FrameResult<WalkSummary> {
        let pipeline = inputs
            .graph
            .pipeline(self.solution_id, self.pipeline_id)
            .ok_or(SchemaError::MissingGraphEntry {
                what: "render pipeline",
                index: self.pipeline_id,
            })?;

        self.recorder.resource_barrier(&[ResourceBarrier::transition(
            self.back_buffer.resource,
            ResourceState::Present,
            ResourceState::RenderTarget,
        )]);
        let heap = self.resolver.heap().heap_id();
        self.recorder.set_descriptor_heap(heap);

        for (pass_id, pass) in pipeline.passes.iter().enumerate() {
            trace!("Pass {pass_id}: {} subpasses", pass.subpasses.len());
            self.set_rasterizer_state(pass_id, pass)?;

            for (subpass_id, subpass) in pass.subpasses.iter().enumerate() {
                let key = SubpassKey {
                    solution: self.solution_id,
                    pipeline: self.pipeline_id,
                    pass: pass_id,
                    subpass: subpass_id,
                };
                self.bind_render_targets(inputs.graph, subpass)?;
                self.draw_subpass(key, subpass, inputs)?;
                self.transition_after_subpass(inputs.graph, subpass)?;
                self.summary.subpasses += 1;
            }
            self.summary.passes += 1;
        }

        Ok(self.summary)
    }

    fn set_rasterizer_state(&mut self, pass_id: usize, pass: &RenderPass) -> FrameResult<()> {
        match pass.viewports.as_slice() {
            [] => {}
            [viewport] => self.recorder.set_viewport(viewport),
            viewports => {
                return Err(SchemaError::TooManyViewports {
                    pass: pass_id,
                    count: viewports.len(),
                }
                .into())
            }
        }
        match pass.scissor_rects.as_slice() {
            [] => {}
            [rect] => self.recorder.set_scissor_rect(rect),
            rects => {
                return Err(SchemaError::TooManyScissorRects {
                    pass: pass_id,
                    count: rects.len(),
                }
                .into())
            }
        }
        Ok(())
    }

    fn render_target_view(&self, graph: &RenderGraph, handle: u32) -> FrameResult<CpuDescriptorHandle> {
        if handle == 0 {
            return Ok(self.back_buffer.rtv);
        }
        if handle == self.back_buffer.count {
            return Ok(self.back_buffer.srgb_rtv);
        }
        graph.rtvs.handle(handle).ok_or_else(|| {
            SchemaError::MissingGraphEntry {
                what: "render target view",
                index: handle as usize,
            }
            .into()
        })
    }

    fn framebuffer(&self, graph: &RenderGraph, handle: u32) -> FrameResult<ResourceId> {
        if handle == 0 {
            return Ok(self.back_buffer.resource);
        }
        graph.framebuffer(handle).ok_or_else(|| {
            SchemaError::MissingGraphEntry {
                what: "framebuffer",
                index: handle as usize,
            }
            .into()
        })
    }

    fn bind_render_targets(&mut self, graph: &RenderGraph, subpass: &GraphicsSubpass) -> FrameResult<()> {
        self.render_targets.clear();
        for attachment in &subpass.output_attachments {
            let rtv = self.render_target_view(graph, attachment.descriptor)?;
            match attachment.load_op {
                LoadOp::ClearColor { color } => self.recorder.clear_render_target(rtv, color),
                LoadOp::ClearDepthStencil { .. } => {
                    return Err(SchemaError::DepthClearOnColorTarget(attachment.descriptor).into())
                }
                LoadOp::Load | LoadOp::DontCare => {}
            }
            self.render_targets.push(rtv);
        }

        let depth_stencil = match &subpass.depth_stencil_attachment {
            Some(attachment) => {
                let dsv = graph.dsvs.handle(attachment.descriptor).ok_or(SchemaError::MissingGraphEntry {
                    what: "depth stencil view",
                    index: attachment.descriptor as usize,
                })?;
                match attachment.load_op {
                    LoadOp::ClearColor { .. } => {
                        return Err(SchemaError::ColorClearOnDepthTarget(attachment.descriptor).into())
                    }
                    LoadOp::ClearDepthStencil {
                        clear_depth,
                        clear_stencil,
                        depth,
                        stencil,
                    } => {
                        let mut flags = ClearFlags::empty();
                        flags.set(ClearFlags::DEPTH, clear_depth);
                        flags.set(ClearFlags::STENCIL, clear_stencil);
                        self.recorder.clear_depth_stencil(dsv, flags, depth, stencil);
                    }
                    LoadOp::Load | LoadOp::DontCare => {}
                }
                Some(dsv)
            }
            None => None,
        };

        if !self.render_targets.is_empty() || depth_stencil.is_some() {
            self.recorder.set_render_targets(&self.render_targets, depth_stencil);
        }
        Ok(())
    }

    fn draw_subpass(&mut self, key: SubpassKey, subpass: &GraphicsSubpass, inputs: &FrameInputs<'_>) -> FrameResult<()> {
        self.topology = None;
        self.pipeline_state = None;

        for queue in &subpass.ordered_render_queue {
            self.recorder.set_root_signature(subpass.root_signature);
            self.tables.clear();
            self.resolver
                .bind_pass_collections(&mut *self.recorder, &mut self.tables, subpass, &inputs.camera)?;

            for &content_id in &queue.contents {
                let content = inputs.contents.get(content_id).ok_or(SchemaError::MissingGraphEntry {
                    what: "render content",
                    index: content_id,
                })?;
                for item in &content.items {
                    match item {
                        DrawItem::FullScreenTriangle { material } => {
                            self.draw_full_screen_triangle(key, *material, inputs)?;
                        }
                        DrawItem::ObjectBatch(batch) => self.draw_object_batch(key, batch, inputs)?,
                    }
                }
            }
        }
        Ok(())
    }

    fn set_topology(&mut self, topology: PrimitiveTopology) {
        if self.topology != Some(topology) {
            self.recorder.set_primitive_topology(topology);
            self.topology = Some(topology);
        }
    }

    fn set_pipeline_state(&mut self, pipeline_state: PipelineStateId) {
        if self.pipeline_state != Some(pipeline_state) {
            self.recorder.set_pipeline_state(pipeline_state);
            self.pipeline_state = Some(pipeline_state);
        }
    }

    fn draw_full_screen_triangle(
        &mut self,
        key: SubpassKey,
        material_key: MaterialKey,
        inputs: &FrameInputs<'_>,
    ) -> FrameResult<()> {
        self.set_topology(PrimitiveTopology::TriangleList);
        self.recorder.set_vertex_buffers(0, &[]);
        self.recorder.set_index_buffer(None);

        let material = inputs.assets.material(material_key)?;
        let route = material.route(key)?;
        let queue = inputs.assets.shader(material.shader)?.queue(route)?;

        for (index, shader_subpass) in queue.base_subpasses()?.iter().enumerate() {
            self.set_pipeline_state(shader_subpass.pipeline_state(0)?);
            let data = material.subpass_data(ShaderSubpassIndex::base(route, index))?;
            self.resolver.bind_instance_collections(
                &mut *self.recorder,
                &mut self.tables,
                shader_subpass,
                data,
                &inputs.camera,
                None,
            )?;
            self.recorder.draw_instanced(3, 1, 0, 0);
            self.summary.draws += 1;
        }
        Ok(())
    }

    fn draw_object_batch(
        &mut self,
        key: SubpassKey,
        batch: &FlattenedObjects,
        inputs: &FrameInputs<'_>,
    ) -> FrameResult<()> {
        batch.validate()?;

        for (object_id, renderer) in batch.mesh_renderers.iter().enumerate() {
            let mesh = inputs.assets.mesh(renderer.mesh)?;
            let object = batch.transforms(object_id);

            // Materials beyond the last submesh draw nothing.
            for (&material_key, submesh) in renderer.materials.iter().zip(&mesh.submeshes) {
                let material = inputs.assets.material(material_key)?;
                let route = material.route(key)?;
                let queue = inputs.assets.shader(material.shader)?.queue(route)?;

                self.set_topology(mesh.primitive_topology);
                self.recorder.set_vertex_buffers(0, &mesh.vertex_buffer_views);
                self.recorder.set_index_buffer(mesh.index_buffer_view.as_ref());

                for (index, shader_subpass) in queue.base_subpasses()?.iter().enumerate() {
                    self.set_pipeline_state(shader_subpass.pipeline_state(mesh.layout_id)?);
                    let data = material.subpass_data(ShaderSubpassIndex::base(route, index))?;
                    self.resolver.bind_instance_collections(
                        &mut *self.recorder,
                        &mut self.tables,
                        shader_subpass,
                        data,
                        &inputs.camera,
                        object,
                    )?;
                    self.recorder
                        .draw_indexed_instanced(submesh.index_count, 1, submesh.index_offset, 0, 0);
                    self.summary.draws += 1;
                }
            }
        }
        Ok(())
    }

    fn transition_after_subpass(&mut self, graph: &RenderGraph, subpass: &GraphicsSubpass) -> FrameResult<()> {
        if subpass.post_view_transitions.is_empty() {
            return Ok(());
        }

        self.barriers.clear();
        for transition in &subpass.post_view_transitions {
            let resource = self.framebuffer(graph, transition.framebuffer)?;
            self.barriers
                .push(ResourceBarrier::transition(resource, transition.source, transition.target));
        }
        self.recorder.resource_barrier(&self.barriers);
        Ok(())
    }
}
