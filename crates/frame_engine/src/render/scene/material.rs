//! Materials
//!
//! A material does not bind anything by itself. It names a shader program,
//! routes each render subpass to a queue of that program, and carries the
//! binding schema for every compiled shader subpass it draws with.

use std::collections::HashMap;

use crate::foundation::collections::ShaderKey;
use crate::render::binding::schema::DescriptorCollection;
use crate::render::error::SchemaError;

use super::shader::{ShaderQueueIndex, ShaderSubpassIndex};

/// Address of a subpass in the render graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubpassKey {
    /// Render solution
    pub solution: usize,
    /// Render pipeline
    pub pipeline: usize,
    /// Pass
    pub pass: usize,
    /// Subpass
    pub subpass: usize,
}

/// Binding schema of one shader subpass as seen by a material
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MaterialSubpassData {
    /// Collections in bind order
    pub collections: Vec<DescriptorCollection>,
}

/// Shader routing and binding data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Material {
    /// Shader program drawn with
    pub shader: ShaderKey,
    /// Render subpass to shader queue routing
    pub subpass_routes: HashMap<SubpassKey, ShaderQueueIndex>,
    /// Binding schema per shader subpass
    pub subpass_data: HashMap<ShaderSubpassIndex, MaterialSubpassData>,
}

impl Material {
    /// Material with no routes
    pub fn new(shader: ShaderKey) -> Self {
        Self {
            shader,
            subpass_routes: HashMap::new(),
            subpass_data: HashMap::new(),
        }
    }

    /// Route render subpass `key` to `queue`
    pub fn with_route(mut self, key: SubpassKey, queue: ShaderQueueIndex) -> Self {
        self.subpass_routes.insert(key, queue);
        self
    }

    /// Attach the binding schema of shader subpass `index`
    pub fn with_subpass_data(mut self, index: ShaderSubpassIndex, data: MaterialSubpassData) -> Self {
        self.subpass_data.insert(index, data);
        self
    }

    /// Shader queue drawn in render subpass `key`
    pub fn route(&self, key: SubpassKey) -> Result<ShaderQueueIndex, SchemaError> {
        self.subpass_routes
            .get(&key)
            .copied()
            .ok_or(SchemaError::MissingSubpassRoute {
                solution: key.solution,
                pipeline: key.pipeline,
                pass: key.pass,
                subpass: key.subpass,
            })
    }

    /// Binding schema of shader subpass `index`
    pub fn subpass_data(&self, index: ShaderSubpassIndex) -> Result<&MaterialSubpassData, SchemaError> {
        self.subpass_data.get(&index).ok_or_else(|| SchemaError::MissingAsset {
            what: format!("material subpass data for {index:?}"),
        })
    }
}
