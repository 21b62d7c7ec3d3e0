//! Compiled shader programs
//!
//! The shader builder emits one tree per program, indexed by
//! solution → pipeline → queue → level → variant → subpass. The frame queue
//! always draws level 0, variant 0.

use crate::render::backend::PipelineStateId;
use crate::render::binding::schema::ConstantBufferLayout;
use crate::render::error::SchemaError;

/// Shader-side queue address a material routes a render subpass to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderQueueIndex {
    /// Shader solution
    pub solution: usize,
    /// Shader pipeline
    pub pipeline: usize,
    /// Shader queue
    pub queue: usize,
}

/// Full address of one compiled shader subpass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderSubpassIndex {
    /// Shader solution
    pub solution: usize,
    /// Shader pipeline
    pub pipeline: usize,
    /// Shader queue
    pub queue: usize,
    /// Level of detail
    pub level: usize,
    /// Variant
    pub variant: usize,
    /// Subpass
    pub subpass: usize,
}

impl ShaderSubpassIndex {
    /// Subpass `subpass` of level 0, variant 0 in `queue`
    pub const fn base(queue: ShaderQueueIndex, subpass: usize) -> Self {
        Self {
            solution: queue.solution,
            pipeline: queue.pipeline,
            queue: queue.queue,
            level: 0,
            variant: 0,
            subpass,
        }
    }
}

/// One compiled subpass of a shader program
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShaderSubpass {
    /// Compiled byte code
    pub program: Vec<u8>,
    /// Maps a mesh layout id to an index into `states`
    pub vertex_layout_index: Vec<usize>,
    /// Pipeline state per vertex layout
    pub states: Vec<PipelineStateId>,
    /// Per-instance constant buffer layouts
    pub constant_buffers: Vec<ConstantBufferLayout>,
}

impl ShaderSubpass {
    /// Pipeline state compiled for vertex layout `layout_id`
    pub fn pipeline_state(&self, layout_id: usize) -> Result<PipelineStateId, SchemaError> {
        let state = *self
            .vertex_layout_index
            .get(layout_id)
            .ok_or(SchemaError::MissingShaderEntry {
                what: "vertex layout",
                index: layout_id,
            })?;
        self.states.get(state).copied().ok_or(SchemaError::MissingShaderEntry {
            what: "pipeline state",
            index: state,
        })
    }
}

/// Subpasses compiled for one variant
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShaderVariant {
    /// Subpasses in draw order
    pub subpasses: Vec<ShaderSubpass>,
}

/// Variants of one level of detail
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShaderLevel {
    /// Variants
    pub variants: Vec<ShaderVariant>,
}

/// Levels compiled for one queue
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShaderQueue {
    /// Levels of detail
    pub levels: Vec<ShaderLevel>,
}

impl ShaderQueue {
    /// Subpasses of level 0, variant 0
    pub fn base_subpasses(&self) -> Result<&[ShaderSubpass], SchemaError> {
        let level = self.levels.first().ok_or(SchemaError::MissingShaderEntry {
            what: "level",
            index: 0,
        })?;
        let variant = level.variants.first().ok_or(SchemaError::MissingShaderEntry {
            what: "variant",
            index: 0,
        })?;
        Ok(&variant.subpasses)
    }
}

/// Queues of one shader pipeline
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShaderPipeline {
    /// Queues
    pub queues: Vec<ShaderQueue>,
}

/// Pipelines of one shader solution
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShaderSolution {
    /// Pipelines
    pub pipelines: Vec<ShaderPipeline>,
}

/// Compiled shader program
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShaderProgram {
    /// Solutions
    pub solutions: Vec<ShaderSolution>,
}

impl ShaderProgram {
    /// Program with a single solution, pipeline and queue drawing `subpasses`
    pub fn single_queue(subpasses: Vec<ShaderSubpass>) -> Self {
        Self {
            solutions: vec![ShaderSolution {
                pipelines: vec![ShaderPipeline {
                    queues: vec![ShaderQueue {
                        levels: vec![ShaderLevel {
                            variants: vec![ShaderVariant { subpasses }],
                        }],
                    }],
                }],
            }],
        }
    }

    /// Queue at `index`
    pub fn queue(&self, index: ShaderQueueIndex) -> Result<&ShaderQueue, SchemaError> {
        let solution = self.solutions.get(index.solution).ok_or(SchemaError::MissingShaderEntry {
            what: "solution",
            index: index.solution,
        })?;
        let pipeline = solution.pipelines.get(index.pipeline).ok_or(SchemaError::MissingShaderEntry {
            what: "pipeline",
            index: index.pipeline,
        })?;
        pipeline.queues.get(index.queue).ok_or(SchemaError::MissingShaderEntry {
            what: "queue",
            index: index.queue,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_state_through_layout_index() {
        let subpass = ShaderSubpass {
            vertex_layout_index: vec![1, 0],
            states: vec![PipelineStateId(10), PipelineStateId(20)],
            ..Default::default()
        };
        assert_eq!(subpass.pipeline_state(0), Ok(PipelineStateId(20)));
        assert_eq!(subpass.pipeline_state(1), Ok(PipelineStateId(10)));
        assert!(subpass.pipeline_state(2).is_err());
    }

    #[test]
    fn test_queue_lookup() {
        let program = ShaderProgram::single_queue(vec![ShaderSubpass::default()]);
        let index = ShaderQueueIndex {
            solution: 0,
            pipeline: 0,
            queue: 0,
        };
        assert_eq!(program.queue(index).unwrap().base_subpasses().unwrap().len(), 1);
        assert!(matches!(
            program.queue(ShaderQueueIndex { queue: 1, ..index }),
            Err(SchemaError::MissingShaderEntry { what: "queue", index: 1 })
        ));
        assert!(ShaderQueue::default().base_subpasses().is_err());
    }
}
