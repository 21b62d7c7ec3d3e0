//! Frame queue scenarios over the recording backend

use approx::assert_relative_eq;

use super::*;
use crate::core::config::FrameQueueConfig;
use crate::foundation::collections::{MaterialKey, MeshKey};
use crate::foundation::math::{CameraData, Mat4, Vec3};
use crate::render::backend::recording::{FenceWait, RecordedCommand, RecordingBackend, Submission};
use crate::render::backend::{
    BufferId, CpuDescriptorHandle, GpuDescriptorHandle, IndexBufferView, IndexFormat, PipelineStateId,
    PrimitiveTopology, ResourceBarrier, ResourceId, ResourceState, RootSignatureId, ScissorRect,
    VertexBufferView, Viewport,
};
use crate::render::binding::schema::{
    CollectionIndex, ConstantBufferLayout, ConstantDecl, DescriptorCollection, DescriptorDecl, DescriptorKind,
    DescriptorList, DescriptorRange, DescriptorSource, DescriptorSubrange, EngineData, Persistency,
    UpdateFrequency,
};
use crate::render::error::{FrameError, FrameResult, PreconditionError, SchemaError};
use crate::render::graph::{
    Attachment, DescriptorArray, DrawQueue, GraphicsSubpass, LoadOp, RenderGraph, RenderPass, RenderPipeline,
    RenderSolution, ViewTransition,
};
use crate::render::scene::{
    AssetStore, DrawItem, FlattenedObjects, Material, MaterialSubpassData, Mesh, MeshRenderer, RenderContent,
    ShaderProgram, ShaderQueueIndex, ShaderSubpass, ShaderSubpassIndex, SubpassKey,
};

const BACK_BUFFERS: [ResourceId; 2] = [ResourceId(0x100), ResourceId(0x101)];
const BACK_BUFFER_RTV: CpuDescriptorHandle = CpuDescriptorHandle(0x2000);
const DEPTH_DSV: CpuDescriptorHandle = CpuDescriptorHandle(0x3000);
const ROOT_SIGNATURE: RootSignatureId = RootSignatureId(7);
const PERSISTENT_TABLE: GpuDescriptorHandle = GpuDescriptorHandle(0x8000_0000);
const RECORDING_DESCRIPTOR_SIZE: u64 = 32;

const PASS_SLOT: u32 = 0;
const INSTANCE_SLOT: u32 = 1;
const PERSISTENT_SLOT: u32 = 2;
const INSTANCE_CAPACITY: u32 = 2;

fn config(frames: usize) -> FrameQueueConfig {
    FrameQueueConfig::new()
        .with_frame_queue_size(frames)
        .with_descriptor_heap(256, 96)
        .with_upload_page_size(16 * 1024)
}

fn swap_chain() -> StaticSwapChain {
    StaticSwapChain::new(BACK_BUFFERS.to_vec(), BACK_BUFFER_RTV, 8)
}

fn engine_list(slot: u32, capacity: u32, descriptors: Vec<DescriptorDecl>) -> DescriptorList {
    DescriptorList {
        slot,
        capacity,
        ranges: vec![DescriptorRange {
            subranges: vec![DescriptorSubrange {
                source: DescriptorSource::Engine,
                descriptors,
            }],
        }],
        ..Default::default()
    }
}

fn dynamic_index(update: UpdateFrequency) -> CollectionIndex {
    CollectionIndex::table(Persistency::Dynamic, update)
}

fn constant_layout(update: UpdateFrequency, constants: Vec<ConstantDecl>) -> ConstantBufferLayout {
    ConstantBufferLayout {
        index: dynamic_index(update),
        size: 128,
        constants,
    }
}

fn camera_constants() -> Vec<ConstantDecl> {
    vec![
        ConstantDecl::engine("View", EngineData::View),
        ConstantDecl::engine("Proj", EngineData::Proj),
    ]
}

fn object_constants() -> Vec<ConstantDecl> {
    vec![
        ConstantDecl::engine("WorldView", EngineData::WorldView),
        ConstantDecl::engine("WorldInvT", EngineData::WorldInvT),
    ]
}

/// Single pass, single subpass drawing content 0 into the back buffer
fn subpass(pass_constants: Vec<ConstantDecl>) -> GraphicsSubpass {
    GraphicsSubpass {
        output_attachments: vec![Attachment {
            descriptor: 0,
            load_op: LoadOp::ClearColor {
                color: [0.1, 0.2, 0.3, 1.0],
            },
        }],
        depth_stencil_attachment: Some(Attachment {
            descriptor: 0,
            load_op: LoadOp::ClearDepthStencil {
                clear_depth: true,
                clear_stencil: false,
                depth: 1.0,
                stencil: 0,
            },
        }),
        root_signature: ROOT_SIGNATURE,
        descriptors: vec![DescriptorCollection {
            index: dynamic_index(UpdateFrequency::PerPass),
            resource_view_lists: vec![engine_list(
                PASS_SLOT,
                1,
                vec![DescriptorDecl::new("Camera", DescriptorKind::ConstantBuffer)],
            )],
            sampler_lists: Vec::new(),
        }],
        constant_buffers: vec![constant_layout(UpdateFrequency::PerPass, pass_constants)],
        ordered_render_queue: vec![DrawQueue { contents: vec![0] }],
        post_view_transitions: vec![ViewTransition {
            framebuffer: 0,
            source: ResourceState::RenderTarget,
            target: ResourceState::Present,
        }],
    }
}

fn graph(subpass: GraphicsSubpass) -> RenderGraph {
    RenderGraph {
        solutions: vec![RenderSolution {
            pipelines: vec![RenderPipeline {
                passes: vec![RenderPass {
                    viewports: vec![Viewport::with_size(1280.0, 720.0)],
                    scissor_rects: vec![ScissorRect {
                        left: 0,
                        top: 0,
                        right: 1280,
                        bottom: 720,
                    }],
                    subpasses: vec![subpass],
                }],
                rtv_initial_states: Vec::new(),
            }],
            rtv_sources: Vec::new(),
        }],
        framebuffers: vec![ResourceId(0)],
        rtvs: DescriptorArray::default(),
        dsvs: DescriptorArray {
            cpu_base: DEPTH_DSV,
            increment: 8,
            count: 1,
        },
    }
}

fn route() -> (SubpassKey, ShaderQueueIndex) {
    (
        SubpassKey {
            solution: 0,
            pipeline: 0,
            pass: 0,
            subpass: 0,
        },
        ShaderQueueIndex {
            solution: 0,
            pipeline: 0,
            queue: 0,
        },
    )
}

fn object_shader(state: PipelineStateId, constants: Vec<ConstantDecl>) -> ShaderProgram {
    ShaderProgram::single_queue(vec![ShaderSubpass {
        vertex_layout_index: vec![0],
        states: vec![state],
        constant_buffers: vec![constant_layout(UpdateFrequency::PerInstance, constants)],
        ..Default::default()
    }])
}

fn object_bindings() -> MaterialSubpassData {
    MaterialSubpassData {
        collections: vec![
            DescriptorCollection {
                index: CollectionIndex::table(Persistency::Persistent, UpdateFrequency::PerBatch),
                resource_view_lists: vec![DescriptorList {
                    slot: PERSISTENT_SLOT,
                    capacity: 1,
                    gpu_offset: PERSISTENT_TABLE,
                    ranges: Vec::new(),
                }],
                sampler_lists: Vec::new(),
            },
            DescriptorCollection {
                index: dynamic_index(UpdateFrequency::PerInstance),
                resource_view_lists: vec![engine_list(
                    INSTANCE_SLOT,
                    INSTANCE_CAPACITY,
                    vec![
                        DescriptorDecl::new("Object", DescriptorKind::ConstantBuffer),
                        DescriptorDecl::new("Linear", DescriptorKind::LinearSampler),
                    ],
                )],
                sampler_lists: Vec::new(),
            },
        ],
    }
}

fn cube() -> Mesh {
    Mesh::indexed_triangles(
        VertexBufferView {
            buffer: BufferId(1),
            offset: 0,
            size: 24 * 32,
            stride: 32,
        },
        IndexBufferView {
            buffer: BufferId(2),
            offset: 0,
            size: 36 * 4,
            format: IndexFormat::U32,
        },
        36,
        0,
    )
}

struct Scene {
    graph: RenderGraph,
    assets: AssetStore,
    contents: Vec<RenderContent>,
    camera: CameraData,
}

impl Scene {
    fn new(graph: RenderGraph) -> Self {
        Self {
            graph,
            assets: AssetStore::new(),
            contents: vec![RenderContent::default()],
            camera: CameraData {
                view: Mat4::new_translation(&Vec3::new(0.0, 0.0, -5.0)),
                proj: Mat4::new_scaling(2.0),
            },
        }
    }

    /// Material drawing the object shader with `state`
    fn object_material(&mut self, state: PipelineStateId, constants: Vec<ConstantDecl>) -> MaterialKey {
        let shader = self.assets.insert_shader(object_shader(state, constants));
        let (key, queue) = route();
        self.assets.insert_material(
            Material::new(shader)
                .with_route(key, queue)
                .with_subpass_data(ShaderSubpassIndex::base(queue, 0), object_bindings()),
        )
    }

    fn full_screen_material(&mut self, state: PipelineStateId) -> MaterialKey {
        let shader = self.assets.insert_shader(ShaderProgram::single_queue(vec![ShaderSubpass {
            vertex_layout_index: vec![0],
            states: vec![state],
            ..Default::default()
        }]));
        let (key, queue) = route();
        self.assets.insert_material(
            Material::new(shader)
                .with_route(key, queue)
                .with_subpass_data(ShaderSubpassIndex::base(queue, 0), MaterialSubpassData::default()),
        )
    }

    fn push(&mut self, item: DrawItem) {
        self.contents[0].items.push(item);
    }

    fn batch(&mut self, mesh: MeshKey, materials: &[MaterialKey]) {
        let mut batch = FlattenedObjects::default();
        for (i, &material) in materials.iter().enumerate() {
            batch.push(
                MeshRenderer {
                    mesh,
                    materials: vec![material],
                },
                Mat4::new_translation(&Vec3::new(i as f32, 0.0, 0.0)),
            );
        }
        self.push(DrawItem::ObjectBatch(batch));
    }

    fn inputs(&self) -> FrameInputs<'_> {
        FrameInputs {
            graph: &self.graph,
            assets: &self.assets,
            contents: &self.contents,
            camera: self.camera,
        }
    }
}

/// Scene with one batch of `objects` cubes sharing a material
fn object_scene(objects: usize) -> Scene {
    let mut scene = Scene::new(graph(subpass(camera_constants())));
    let material = scene.object_material(PipelineStateId(42), object_constants());
    let mesh = scene.assets.insert_mesh(cube());
    scene.batch(mesh, &vec![material; objects]);
    scene
}

struct Harness {
    backend: RecordingBackend,
    queue: FrameQueue<RecordingBackend>,
    swap_chain: StaticSwapChain,
}

impl Harness {
    fn new(frames: usize) -> Self {
        Self::with_config(config(frames))
    }

    fn with_config(config: FrameQueueConfig) -> Self {
        let backend = RecordingBackend::new();
        let queue = FrameQueue::new(config.clone(), backend.parts(&config)).unwrap();
        Self {
            backend,
            queue,
            swap_chain: swap_chain(),
        }
    }

    fn frame(&mut self, scene: &Scene) -> FrameResult<FrameHandle> {
        let handle = self.queue.begin_frame(&self.swap_chain)?;
        self.queue.render_frame(handle, &scene.inputs())?;
        self.queue.end_frame(handle)?;
        self.swap_chain.present();
        Ok(handle)
    }

    fn last_submission(&self) -> Submission {
        self.backend.submissions().pop().unwrap()
    }
}

fn is_indexed_draw(command: &RecordedCommand) -> bool {
    matches!(command, RecordedCommand::DrawIndexedInstanced { .. })
}

fn table_binds(submission: &Submission, slot: u32) -> Vec<GpuDescriptorHandle> {
    submission
        .commands
        .iter()
        .filter_map(|command| match command {
            RecordedCommand::SetRootDescriptorTable { slot: bound, table } if *bound == slot => Some(*table),
            _ => None,
        })
        .collect()
}

#[test]
fn test_ring_reuse_waits_for_first_frame() {
    for frames in 2..=4 {
        let mut harness = Harness::new(frames);
        let scene = object_scene(1);

        for _ in 0..=frames {
            harness.frame(&scene).unwrap();
        }

        let waits = harness.backend.waits();
        assert_eq!(waits.len(), frames + 1);
        assert!(waits[..frames].iter().all(|wait| !wait.blocked));
        assert_eq!(waits[frames], FenceWait { value: 1, blocked: true });
        assert_eq!(harness.backend.signals(), (1..=frames as u64 + 1).collect::<Vec<_>>());
        assert_eq!(harness.backend.completed_value(), 1);
    }
}

#[test]
fn test_end_to_end_object_batch() {
    let mut harness = Harness::new(3);
    let scene = object_scene(2);

    let handle = harness.frame(&scene).unwrap();
    assert_eq!(handle.fence_value(), 1);

    let submission = harness.last_submission();
    assert_eq!(submission.lists, vec![handle.index()]);
    assert_eq!(submission.count(is_indexed_draw), 2);
    assert_eq!(submission.count(|command| matches!(command, RecordedCommand::DrawInstanced { .. })), 0);

    // Each draw is directly preceded by its own per-instance table.
    for (position, command) in submission.commands.iter().enumerate() {
        if is_indexed_draw(command) {
            assert!(matches!(
                submission.commands[position - 1],
                RecordedCommand::SetRootDescriptorTable { slot: INSTANCE_SLOT, .. }
            ));
        }
    }
    let instance_tables = table_binds(&submission, INSTANCE_SLOT);
    assert_eq!(instance_tables.len(), 2);
    assert_eq!(
        instance_tables[1].0 - instance_tables[0].0,
        u64::from(INSTANCE_CAPACITY) * RECORDING_DESCRIPTOR_SIZE
    );

    assert_eq!(table_binds(&submission, PERSISTENT_SLOT), vec![PERSISTENT_TABLE]);
    assert_eq!(table_binds(&submission, PASS_SLOT).len(), 1);
    assert_eq!(
        submission.count(|command| matches!(command, RecordedCommand::SetRootSignature(ROOT_SIGNATURE))),
        1
    );

    assert_eq!(
        submission.commands.first(),
        Some(&RecordedCommand::ResourceBarrier(vec![ResourceBarrier::transition(
            BACK_BUFFERS[0],
            ResourceState::Present,
            ResourceState::RenderTarget,
        )]))
    );
    assert_eq!(
        submission.commands.last(),
        Some(&RecordedCommand::ResourceBarrier(vec![ResourceBarrier::transition(
            BACK_BUFFERS[0],
            ResourceState::RenderTarget,
            ResourceState::Present,
        )]))
    );
    assert!(submission.commands.contains(&RecordedCommand::SetRenderTargets {
        color: vec![BACK_BUFFER_RTV],
        depth_stencil: Some(DEPTH_DSV),
    }));
    assert!(submission.commands.contains(&RecordedCommand::DrawIndexedInstanced {
        index_count: 36,
        instance_count: 1,
        first_index: 0,
        base_vertex: 0,
        first_instance: 0,
    }));

    // One camera buffer and one buffer per object.
    assert_eq!(harness.backend.constant_buffer_views().len(), 3);
}

#[test]
fn test_camera_constants_are_uploaded_column_major() {
    let mut harness = Harness::new(2);
    let scene = object_scene(1);
    harness.frame(&scene).unwrap();

    let (camera_view, _) = harness.backend.constant_buffer_views()[0];
    assert_eq!(camera_view.size, 256);
    let bytes = &harness.queue.upload_allocator().memory().bytes()[camera_view.offset as usize..][..128];
    let floats: &[f32] = bytemuck::cast_slice(bytes);
    // View translation, then the projection scale.
    assert_relative_eq!(floats[14], -5.0);
    assert_relative_eq!(floats[16], 2.0);
    assert_relative_eq!(floats[16 + 15], 1.0);
}

#[test]
fn test_full_screen_triangle_draws_without_geometry() {
    let mut harness = Harness::new(2);
    let mut scene = Scene::new(graph(subpass(camera_constants())));
    let material = scene.full_screen_material(PipelineStateId(9));
    scene.push(DrawItem::FullScreenTriangle { material });

    harness.frame(&scene).unwrap();
    let submission = harness.last_submission();

    assert_eq!(submission.count(|command| command.is_draw()), 1);
    assert!(submission.commands.contains(&RecordedCommand::DrawInstanced {
        vertex_count: 3,
        instance_count: 1,
        first_vertex: 0,
        first_instance: 0,
    }));
    assert!(submission.commands.contains(&RecordedCommand::SetVertexBuffers {
        start_slot: 0,
        views: Vec::new(),
    }));
    assert!(submission.commands.contains(&RecordedCommand::SetIndexBuffer(None)));
    assert!(submission.commands.contains(&RecordedCommand::SetPipelineState(PipelineStateId(9))));
}

#[test]
fn test_state_changes_are_coalesced() {
    let mut harness = Harness::new(2);
    let mut scene = Scene::new(graph(subpass(camera_constants())));
    let first = scene.object_material(PipelineStateId(42), object_constants());
    let second = scene.object_material(PipelineStateId(43), object_constants());
    let full_screen = scene.full_screen_material(PipelineStateId(42));
    let mesh = scene.assets.insert_mesh(cube());

    scene.push(DrawItem::FullScreenTriangle { material: full_screen });
    scene.batch(mesh, &[first, first, second, second, first]);

    harness.frame(&scene).unwrap();
    let submission = harness.last_submission();

    let states: Vec<_> = submission
        .commands
        .iter()
        .filter_map(|command| match command {
            RecordedCommand::SetPipelineState(state) => Some(state.0),
            _ => None,
        })
        .collect();
    assert_eq!(states, vec![42, 43, 42]);
    assert_eq!(
        submission.count(|command| matches!(command, RecordedCommand::SetPrimitiveTopology(_))),
        1
    );
    assert!(submission
        .commands
        .contains(&RecordedCommand::SetPrimitiveTopology(PrimitiveTopology::TriangleList)));
    assert_eq!(submission.count(|command| command.is_draw()), 6);
}

#[test]
fn test_in_flight_allocations_never_overlap() {
    let frames = 3;
    let mut harness = Harness::new(frames);
    let scene = object_scene(2);
    let descriptor_span = u64::from(INSTANCE_CAPACITY) * RECORDING_DESCRIPTOR_SIZE;

    let mut history: Vec<(Vec<GpuDescriptorHandle>, Vec<(u64, u64)>)> = Vec::new();
    let mut views_seen = 0;
    for _ in 0..10 {
        harness.frame(&scene).unwrap();

        let tables = table_binds(&harness.last_submission(), INSTANCE_SLOT);
        let views = harness.backend.constant_buffer_views();
        let uploads: Vec<_> = views[views_seen..]
            .iter()
            .map(|(view, _)| (view.offset, view.offset + view.size))
            .collect();
        views_seen = views.len();

        for (older_tables, older_uploads) in history.iter().rev().take(frames - 1) {
            for table in &tables {
                for older in older_tables {
                    assert!(table.0 + descriptor_span <= older.0 || older.0 + descriptor_span <= table.0);
                }
            }
            for &(start, end) in &uploads {
                for &(older_start, older_end) in older_uploads {
                    assert!(end <= older_start || older_end <= start);
                }
            }
        }
        history.push((tables, uploads));
    }
}

#[test]
fn test_per_pass_buffer_rejects_object_semantics() {
    let mut harness = Harness::new(2);
    let mut scene = Scene::new(graph(subpass(vec![ConstantDecl::engine("WorldView", EngineData::WorldView)])));
    let material = scene.full_screen_material(PipelineStateId(1));
    scene.push(DrawItem::FullScreenTriangle { material });

    assert!(matches!(
        harness.frame(&scene),
        Err(FrameError::Schema(SchemaError::ScopeViolation {
            semantic: EngineData::WorldView,
            ..
        }))
    ));
}

#[test]
fn test_per_instance_buffer_rejects_camera_semantics() {
    let mut harness = Harness::new(2);
    let mut scene = Scene::new(graph(subpass(camera_constants())));
    let material = scene.object_material(PipelineStateId(42), vec![ConstantDecl::engine("Proj", EngineData::Proj)]);
    let mesh = scene.assets.insert_mesh(cube());
    scene.batch(mesh, &[material]);

    assert!(matches!(
        harness.frame(&scene),
        Err(FrameError::Schema(SchemaError::ScopeViolation {
            semantic: EngineData::Proj,
            ..
        }))
    ));
}

#[test]
fn test_clear_ops_must_match_attachment_kind() {
    let mut color_subpass = subpass(camera_constants());
    color_subpass.output_attachments[0].load_op = LoadOp::ClearDepthStencil {
        clear_depth: true,
        clear_stencil: true,
        depth: 0.0,
        stencil: 0,
    };
    let mut harness = Harness::new(2);
    assert!(matches!(
        harness.frame(&Scene::new(graph(color_subpass))),
        Err(FrameError::Schema(SchemaError::DepthClearOnColorTarget(0)))
    ));

    let mut depth_subpass = subpass(camera_constants());
    if let Some(depth) = depth_subpass.depth_stencil_attachment.as_mut() {
        depth.load_op = LoadOp::ClearColor { color: [0.0; 4] };
    }
    let mut harness = Harness::new(2);
    assert!(matches!(
        harness.frame(&Scene::new(graph(depth_subpass))),
        Err(FrameError::Schema(SchemaError::ColorClearOnDepthTarget(0)))
    ));
}

#[test]
fn test_more_than_one_viewport_is_rejected() {
    let mut graph = graph(subpass(camera_constants()));
    let pass = &mut graph.solutions[0].pipelines[0].passes[0];
    pass.viewports.push(Viewport::with_size(64.0, 64.0));

    let mut harness = Harness::new(2);
    assert!(matches!(
        harness.frame(&Scene::new(graph)),
        Err(FrameError::Schema(SchemaError::TooManyViewports { pass: 0, count: 2 }))
    ));
}

#[test]
fn test_more_than_one_scissor_rect_faults_queue() {
    let mut graph = graph(subpass(camera_constants()));
    let pass = &mut graph.solutions[0].pipelines[0].passes[0];
    pass.scissor_rects.push(ScissorRect {
        left: 0,
        top: 0,
        right: 64,
        bottom: 64,
    });

    let mut harness = Harness::new(2);
    assert!(matches!(
        harness.frame(&Scene::new(graph)),
        Err(FrameError::Schema(SchemaError::TooManyScissorRects { pass: 0, count: 2 }))
    ));
    assert!(harness.queue.is_faulted());
}

#[test]
fn test_unrouted_material_faults_queue() {
    let mut harness = Harness::new(2);
    let mut scene = Scene::new(graph(subpass(camera_constants())));
    let shader = scene.assets.insert_shader(object_shader(PipelineStateId(5), object_constants()));
    let material = scene.assets.insert_material(Material::new(shader));
    scene.push(DrawItem::FullScreenTriangle { material });

    assert!(matches!(
        harness.frame(&scene),
        Err(FrameError::Schema(SchemaError::MissingSubpassRoute {
            solution: 0,
            pipeline: 0,
            pass: 0,
            subpass: 0,
        }))
    ));
    assert!(harness.queue.is_faulted());
    assert!(harness.backend.submissions().is_empty());
}

#[test]
fn test_upload_page_overflow_faults_queue() {
    // Room for the camera buffer and one object buffer, 256 bytes each.
    let mut harness = Harness::with_config(config(2).with_upload_page_size(512));
    harness.frame(&object_scene(1)).unwrap();

    assert!(matches!(
        harness.frame(&object_scene(2)),
        Err(FrameError::UploadBufferExhausted {
            requested: 256,
            available: 0
        })
    ));
    assert!(harness.queue.is_faulted());
    assert!(matches!(
        harness.queue.begin_frame(&harness.swap_chain),
        Err(FrameError::Faulted(_))
    ));
}

#[test]
fn test_each_draw_allocates_one_instance_table() {
    let mut used = Vec::new();
    for objects in 1..=3 {
        let mut harness = Harness::new(3);
        harness.frame(&object_scene(objects)).unwrap();
        let heap = harness.queue.descriptor_heap();
        used.push(heap.circular_capacity() - heap.circular_available());
    }

    // One camera table for the pass, then one instance table per draw.
    assert_eq!(used[0], 1 + INSTANCE_CAPACITY);
    for pair in used.windows(2) {
        assert_eq!(pair[1] - pair[0], INSTANCE_CAPACITY);
    }
}

#[test]
fn test_failed_frame_faults_queue() {
    let mut harness = Harness::new(2);
    let mut scene = object_scene(1);
    scene.graph.solutions[0].pipelines[0].passes[0].subpasses[0]
        .constant_buffers
        .clear();

    assert!(matches!(
        harness.frame(&scene),
        Err(FrameError::Schema(SchemaError::ConstantBufferNotFound(_)))
    ));
    assert!(harness.queue.is_faulted());
    assert!(matches!(
        harness.queue.begin_frame(&harness.swap_chain),
        Err(FrameError::Faulted(_))
    ));
    // Nothing was submitted for the aborted frame.
    assert!(harness.backend.submissions().is_empty());
}

#[test]
fn test_ragged_batch_is_precondition_error() {
    let mut harness = Harness::new(2);
    let mut scene = object_scene(2);
    if let Some(DrawItem::ObjectBatch(batch)) = scene.contents[0].items.first_mut() {
        batch.world_transform_invs.pop();
    }

    assert!(matches!(
        harness.frame(&scene),
        Err(FrameError::Precondition(PreconditionError::BatchSizeMismatch {
            renderers: 2,
            transforms: 2,
            inverses: 1,
        }))
    ));
}

#[test]
fn test_handle_misuse_is_rejected_without_fault() {
    let mut harness = Harness::new(2);
    let scene = object_scene(1);

    let first = harness.queue.begin_frame(&harness.swap_chain).unwrap();
    assert!(matches!(
        harness.queue.end_frame(first),
        Err(FrameError::Precondition(PreconditionError::InvalidFrameStage { .. }))
    ));
    harness.queue.render_frame(first, &scene.inputs()).unwrap();
    assert!(matches!(
        harness.queue.render_frame(first, &scene.inputs()),
        Err(FrameError::Precondition(PreconditionError::InvalidFrameStage { .. }))
    ));
    harness.queue.end_frame(first).unwrap();

    harness.frame(&scene).unwrap();
    harness.frame(&scene).unwrap();
    assert!(matches!(
        harness.queue.end_frame(first),
        Err(FrameError::Precondition(PreconditionError::StaleFrameHandle {
            handle_fence: 1,
            slot_fence: 3,
            ..
        }))
    ));
    assert!(!harness.queue.is_faulted());
}

#[test]
fn test_unfinished_slot_blocks_reuse() {
    let mut harness = Harness::new(1);
    harness.queue.begin_frame(&harness.swap_chain).unwrap();
    assert!(matches!(
        harness.queue.begin_frame(&harness.swap_chain),
        Err(FrameError::Precondition(PreconditionError::InvalidFrameStage {
            index: 0,
            actual: "recording",
            ..
        }))
    ));
    assert_eq!(harness.backend.waits().len(), 1);
}

#[test]
fn test_missing_surface() {
    let mut harness = Harness::new(2);
    harness.swap_chain.surface = false;
    assert!(matches!(
        harness.queue.begin_frame(&harness.swap_chain),
        Err(FrameError::Precondition(PreconditionError::MissingSurface))
    ));
    assert!(!harness.queue.is_faulted());
    assert!(harness.backend.waits().is_empty());
}

#[test]
fn test_srgb_back_buffer_view() {
    let mut subpass = subpass(camera_constants());
    subpass.output_attachments[0].descriptor = BACK_BUFFERS.len() as u32;
    subpass.depth_stencil_attachment = None;

    let mut harness = Harness::new(2);
    harness.frame(&Scene::new(graph(subpass))).unwrap();
    assert!(harness.last_submission().commands.contains(&RecordedCommand::SetRenderTargets {
        color: vec![BACK_BUFFER_RTV.offset(2, 8)],
        depth_stencil: None,
    }));
}

#[test]
fn test_init_pipeline_transitions_initial_states() {
    let mut graph = graph(subpass(camera_constants()));
    graph.framebuffers.push(ResourceId(0x500));
    graph.solutions[0].rtv_sources = vec![0, 1];
    graph.solutions[0].pipelines[0].rtv_initial_states =
        vec![ResourceState::RenderTarget, ResourceState::PixelShaderResource];

    let mut harness = Harness::new(2);
    harness.queue.init_pipeline(&harness.swap_chain, &graph).unwrap();

    let submissions = harness.backend.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(
        submissions[0].commands,
        vec![RecordedCommand::ResourceBarrier(vec![ResourceBarrier::transition(
            ResourceId(0x500),
            ResourceState::RenderTarget,
            ResourceState::PixelShaderResource,
        )])]
    );
    assert_eq!(harness.backend.signals(), vec![1]);
    assert_eq!(harness.queue.next_fence_value(), 2);
}

#[test]
fn test_recorder_count_must_match_config() {
    let backend = RecordingBackend::new();
    let mut parts = backend.parts(&config(3));
    parts.recorders.pop();
    assert!(matches!(
        FrameQueue::new(config(3), parts),
        Err(FrameError::Precondition(PreconditionError::RecorderCountMismatch {
            expected: 3,
            actual: 2,
        }))
    ));

    assert!(matches!(
        FrameQueue::new(config(0), backend.parts(&config(0))),
        Err(FrameError::InvalidConfig(_))
    ));
}
