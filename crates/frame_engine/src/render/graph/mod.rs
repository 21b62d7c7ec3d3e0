//! Precompiled render graph
//!
//! Plain serde data produced offline: solutions hold pipelines, pipelines
//! hold passes, passes hold subpasses, and each subpass lists its targets,
//! binding schema, draw queues and trailing state transitions. The frame
//! queue only reads it.

use serde::{Deserialize, Serialize};

use super::backend::{
    CpuDescriptorHandle, ResourceId, ResourceState, RootSignatureId, ScissorRect, Viewport,
};
use super::binding::schema::{ConstantBufferLayout, DescriptorCollection};
use crate::config::Config;

/// A contiguous array of descriptors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DescriptorArray {
    /// Address of the first descriptor
    pub cpu_base: CpuDescriptorHandle,
    /// Distance between descriptors
    pub increment: u32,
    /// Number of descriptors
    pub count: u32,
}

impl DescriptorArray {
    /// Handle of descriptor `index`, if it exists
    pub fn handle(&self, index: u32) -> Option<CpuDescriptorHandle> {
        (index < self.count).then(|| self.cpu_base.offset(index, self.increment))
    }
}

/// What happens to an attachment when the subpass starts
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum LoadOp {
    /// Keep the contents
    #[default]
    Load,
    /// Contents are undefined
    DontCare,
    /// Clear a color target
    ClearColor {
        /// RGBA clear value
        color: [f32; 4],
    },
    /// Clear a depth/stencil target
    ClearDepthStencil {
        /// Clear the depth aspect
        clear_depth: bool,
        /// Clear the stencil aspect
        clear_stencil: bool,
        /// Depth clear value
        depth: f32,
        /// Stencil clear value
        stencil: u8,
    },
}

/// Render target or depth/stencil view used by a subpass
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Attachment {
    /// View handle
    pub descriptor: u32,
    /// Load operation
    pub load_op: LoadOp,
}

/// State transition applied after a subpass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewTransition {
    /// Framebuffer handle; 0 names the active back buffer
    pub framebuffer: u32,
    /// State before
    pub source: ResourceState,
    /// State after
    pub target: ResourceState,
}

/// Ordered list of content indices drawn with one root signature
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DrawQueue {
    /// Indices into the frame's render contents
    pub contents: Vec<usize>,
}

/// Unit of rendering state inside a pass
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphicsSubpass {
    /// Color attachments
    pub output_attachments: Vec<Attachment>,
    /// Depth/stencil attachment
    pub depth_stencil_attachment: Option<Attachment>,
    /// Root signature of every queue in the subpass
    pub root_signature: RootSignatureId,
    /// Per-pass binding schema
    pub descriptors: Vec<DescriptorCollection>,
    /// Per-pass constant buffer layouts
    pub constant_buffers: Vec<ConstantBufferLayout>,
    /// Draw queues in submission order
    pub ordered_render_queue: Vec<DrawQueue>,
    /// Transitions recorded after the last draw
    pub post_view_transitions: Vec<ViewTransition>,
}

/// Pass with a shared viewport and scissor
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RenderPass {
    /// At most one viewport
    pub viewports: Vec<Viewport>,
    /// At most one scissor rectangle
    pub scissor_rects: Vec<ScissorRect>,
    /// Subpasses in order
    pub subpasses: Vec<GraphicsSubpass>,
}

/// Ordered passes plus the initial state of every render target
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RenderPipeline {
    /// Passes in order
    pub passes: Vec<RenderPass>,
    /// State render target `k` must be in before the first frame
    pub rtv_initial_states: Vec<ResourceState>,
}

/// Set of pipelines sharing render target sources
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RenderSolution {
    /// Pipelines of the solution
    pub pipelines: Vec<RenderPipeline>,
    /// Framebuffer handle backing render target `k`
    pub rtv_sources: Vec<u32>,
}

/// Root of the precompiled render graph
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RenderGraph {
    /// Render solutions
    pub solutions: Vec<RenderSolution>,
    /// Framebuffer resources by handle
    pub framebuffers: Vec<ResourceId>,
    /// Render target views by handle
    pub rtvs: DescriptorArray,
    /// Depth/stencil views by handle
    pub dsvs: DescriptorArray,
}

impl Config for RenderGraph {}

impl RenderGraph {
    /// Solution `solution`
    pub fn solution(&self, solution: usize) -> Option<&RenderSolution> {
        self.solutions.get(solution)
    }

    /// Pipeline `pipeline` of solution `solution`
    pub fn pipeline(&self, solution: usize, pipeline: usize) -> Option<&RenderPipeline> {
        self.solution(solution)?.pipelines.get(pipeline)
    }

    /// Framebuffer resource by handle
    pub fn framebuffer(&self, handle: u32) -> Option<ResourceId> {
        self.framebuffers.get(handle as usize).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_array_handles() {
        let rtvs = DescriptorArray {
            cpu_base: CpuDescriptorHandle(100),
            increment: 8,
            count: 3,
        };
        assert_eq!(rtvs.handle(0), Some(CpuDescriptorHandle(100)));
        assert_eq!(rtvs.handle(2), Some(CpuDescriptorHandle(116)));
        assert_eq!(rtvs.handle(3), None);
    }

    #[test]
    fn test_graph_lookup() {
        let graph = RenderGraph {
            solutions: vec![RenderSolution {
                pipelines: vec![RenderPipeline::default()],
                rtv_sources: vec![2],
            }],
            framebuffers: vec![ResourceId(10), ResourceId(11), ResourceId(12)],
            ..Default::default()
        };
        assert!(graph.pipeline(0, 0).is_some());
        assert!(graph.pipeline(0, 1).is_none());
        assert!(graph.pipeline(1, 0).is_none());
        assert_eq!(graph.framebuffer(2), Some(ResourceId(12)));
    }

    #[test]
    fn test_graph_ron_round_trip() {
        let graph = RenderGraph {
            solutions: vec![RenderSolution {
                pipelines: vec![RenderPipeline {
                    passes: vec![RenderPass {
                        viewports: vec![Viewport::with_size(1280.0, 720.0)],
                        subpasses: vec![GraphicsSubpass {
                            output_attachments: vec![Attachment {
                                descriptor: 0,
                                load_op: LoadOp::ClearColor { color: [0.0, 0.0, 0.0, 1.0] },
                            }],
                            post_view_transitions: vec![ViewTransition {
                                framebuffer: 0,
                                source: ResourceState::RenderTarget,
                                target: ResourceState::Present,
                            }],
                            ..Default::default()
                        }],
                        ..Default::default()
                    }],
                    rtv_initial_states: vec![ResourceState::Common],
                }],
                rtv_sources: vec![0],
            }],
            ..Default::default()
        };

        let text = ron::to_string(&graph).unwrap();
        let parsed: RenderGraph = ron::from_str(&text).unwrap();
        assert_eq!(parsed, graph);
    }
}
