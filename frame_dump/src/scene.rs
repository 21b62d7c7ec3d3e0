//! Demo scene: one pass clearing the back buffer, drawing a full-screen
//! triangle and a small batch of cubes

use frame_engine::prelude::*;
use frame_engine::render::backend::{
    BufferId, CpuDescriptorHandle, IndexBufferView, IndexFormat, PipelineStateId, ResourceId, ResourceState,
    RootSignatureId, ScissorRect, VertexBufferView, Viewport,
};
use frame_engine::render::binding::schema::{
    CollectionIndex, ConstantBufferLayout, ConstantDecl, DescriptorCollection, DescriptorDecl, DescriptorKind,
    DescriptorList, DescriptorRange, DescriptorSource, DescriptorSubrange, EngineData, Persistency,
    UpdateFrequency,
};
use frame_engine::render::graph::{
    Attachment, DescriptorArray, DrawQueue, GraphicsSubpass, LoadOp, RenderPass, RenderPipeline, RenderSolution,
    ViewTransition,
};
use frame_engine::render::scene::{
    FlattenedObjects, Material, MaterialSubpassData, Mesh, MeshRenderer, ShaderProgram, ShaderQueueIndex,
    ShaderSubpass, ShaderSubpassIndex, SubpassKey,
};

/// Back buffer width
pub const WIDTH: u32 = 1280;
/// Back buffer height
pub const HEIGHT: u32 = 720;

/// Swap chain images
pub const BACK_BUFFERS: [ResourceId; 3] = [ResourceId(0x100), ResourceId(0x101), ResourceId(0x102)];
/// First back buffer view
pub const BACK_BUFFER_RTV: CpuDescriptorHandle = CpuDescriptorHandle(0x2000);
const GBUFFER: ResourceId = ResourceId(0x200);
const DEPTH_DSV: CpuDescriptorHandle = CpuDescriptorHandle(0x3000);
const ROOT_SIGNATURE: RootSignatureId = RootSignatureId(1);
const BACKGROUND_STATE: PipelineStateId = PipelineStateId(10);
const CUBE_STATE: PipelineStateId = PipelineStateId(11);

const CAMERA_SLOT: u32 = 0;
const OBJECT_SLOT: u32 = 1;
const CONSTANT_BUFFER_SIZE: u32 = 256;

fn dynamic(update: UpdateFrequency) -> CollectionIndex {
    CollectionIndex::table(Persistency::Dynamic, update)
}

fn engine_list(slot: u32, capacity: u32, name: &str) -> DescriptorList {
    DescriptorList {
        slot,
        capacity,
        ranges: vec![DescriptorRange {
            subranges: vec![DescriptorSubrange {
                source: DescriptorSource::Engine,
                descriptors: vec![DescriptorDecl::new(name, DescriptorKind::ConstantBuffer)],
            }],
        }],
        ..Default::default()
    }
}

/// Graph with a single solution, pipeline and pass
pub fn demo_graph() -> RenderGraph {
    let subpass = GraphicsSubpass {
        output_attachments: vec![Attachment {
            descriptor: 0,
            load_op: LoadOp::ClearColor {
                color: [0.02, 0.02, 0.05, 1.0],
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
            index: dynamic(UpdateFrequency::PerPass),
            resource_view_lists: vec![engine_list(CAMERA_SLOT, 1, "Camera")],
            sampler_lists: Vec::new(),
        }],
        constant_buffers: vec![ConstantBufferLayout {
            index: dynamic(UpdateFrequency::PerPass),
            size: CONSTANT_BUFFER_SIZE,
            constants: vec![
                ConstantDecl::engine("View", EngineData::View),
                ConstantDecl::engine("Proj", EngineData::Proj),
            ],
        }],
        ordered_render_queue: vec![DrawQueue { contents: vec![0] }],
        post_view_transitions: vec![ViewTransition {
            framebuffer: 0,
            source: ResourceState::RenderTarget,
            target: ResourceState::Present,
        }],
    };

    #[allow(clippy::cast_precision_loss)]
    let viewport = Viewport::with_size(WIDTH as f32, HEIGHT as f32);
    RenderGraph {
        solutions: vec![RenderSolution {
            pipelines: vec![RenderPipeline {
                passes: vec![RenderPass {
                    viewports: vec![viewport],
                    scissor_rects: vec![ScissorRect {
                        left: 0,
                        top: 0,
                        right: i32::try_from(WIDTH).unwrap_or(i32::MAX),
                        bottom: i32::try_from(HEIGHT).unwrap_or(i32::MAX),
                    }],
                    subpasses: vec![subpass],
                }],
                rtv_initial_states: vec![ResourceState::RenderTarget, ResourceState::PixelShaderResource],
            }],
            rtv_sources: vec![0, 1],
        }],
        framebuffers: vec![ResourceId(0), GBUFFER],
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

/// Assets and draw content for [`demo_graph`]
pub struct DemoScene {
    /// Meshes, materials and shaders
    pub assets: AssetStore,
    /// Content drawn by the single draw queue
    pub contents: Vec<RenderContent>,
    /// Camera looking at the row of cubes
    pub camera: CameraData,
}

impl DemoScene {
    /// Background triangle followed by `cubes` cubes in a row
    pub fn new(cubes: usize) -> Self {
        let mut assets = AssetStore::new();
        let (key, queue) = route();

        let background_shader = assets.insert_shader(ShaderProgram::single_queue(vec![ShaderSubpass {
            vertex_layout_index: vec![0],
            states: vec![BACKGROUND_STATE],
            ..Default::default()
        }]));
        let background = assets.insert_material(
            Material::new(background_shader)
                .with_route(key, queue)
                .with_subpass_data(ShaderSubpassIndex::base(queue, 0), MaterialSubpassData::default()),
        );

        let cube_shader = assets.insert_shader(ShaderProgram::single_queue(vec![ShaderSubpass {
            vertex_layout_index: vec![0],
            states: vec![CUBE_STATE],
            constant_buffers: vec![ConstantBufferLayout {
                index: dynamic(UpdateFrequency::PerInstance),
                size: CONSTANT_BUFFER_SIZE,
                constants: vec![
                    ConstantDecl::engine("WorldView", EngineData::WorldView),
                    ConstantDecl::engine("WorldInvT", EngineData::WorldInvT),
                ],
            }],
            ..Default::default()
        }]));
        let cube_material = assets.insert_material(
            Material::new(cube_shader).with_route(key, queue).with_subpass_data(
                ShaderSubpassIndex::base(queue, 0),
                MaterialSubpassData {
                    collections: vec![DescriptorCollection {
                        index: dynamic(UpdateFrequency::PerInstance),
                        resource_view_lists: vec![engine_list(OBJECT_SLOT, 1, "Object")],
                        sampler_lists: Vec::new(),
                    }],
                },
            ),
        );

        let mesh = assets.insert_mesh(cube());
        let mut batch = FlattenedObjects::default();
        for i in 0..cubes {
            #[allow(clippy::cast_precision_loss)]
            let x = i as f32 * 2.5;
            batch.push(
                MeshRenderer {
                    mesh,
                    materials: vec![cube_material],
                },
                Mat4::new_translation(&Vec3::new(x, 0.0, 0.0)),
            );
        }

        #[allow(clippy::cast_precision_loss)]
        let aspect = WIDTH as f32 / HEIGHT as f32;
        Self {
            assets,
            contents: vec![RenderContent::new(vec![
                DrawItem::FullScreenTriangle { material: background },
                DrawItem::ObjectBatch(batch),
            ])],
            camera: CameraData::look_at(
                Vec3::new(0.0, 3.0, 10.0),
                Vec3::zeros(),
                Vec3::y(),
                std::f32::consts::FRAC_PI_4,
                aspect,
                0.1,
                100.0,
            ),
        }
    }

    /// Per-frame inputs drawing `graph`
    pub fn inputs<'a>(&'a self, graph: &'a RenderGraph) -> FrameInputs<'a> {
        FrameInputs {
            graph,
            assets: &self.assets,
            contents: &self.contents,
            camera: self.camera,
        }
    }
}
