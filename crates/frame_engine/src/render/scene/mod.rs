//! Scene inputs consumed by the pass walker
//!
//! Meshes, materials and shader programs are loaded elsewhere and handed to
//! the frame queue through an [`AssetStore`]. Draw items refer to them by
//! slot map keys.

pub mod content;
pub mod material;
pub mod mesh;
pub mod shader;

pub use content::{DrawItem, FlattenedObjects, MeshRenderer, RenderContent};
pub use material::{Material, MaterialSubpassData, SubpassKey};
pub use mesh::{Mesh, SubMesh};
pub use shader::{ShaderProgram, ShaderQueueIndex, ShaderSubpass, ShaderSubpassIndex};

use crate::foundation::collections::{MaterialKey, MeshKey, ShaderKey, SlotMap};
use crate::render::error::SchemaError;

/// Arena of every asset a frame may reference
#[derive(Debug, Default)]
pub struct AssetStore {
    meshes: SlotMap<MeshKey, Mesh>,
    materials: SlotMap<MaterialKey, Material>,
    shaders: SlotMap<ShaderKey, ShaderProgram>,
}

impl AssetStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mesh
    pub fn insert_mesh(&mut self, mesh: Mesh) -> MeshKey {
        self.meshes.insert(mesh)
    }

    /// Add a material
    pub fn insert_material(&mut self, material: Material) -> MaterialKey {
        self.materials.insert(material)
    }

    /// Add a shader program
    pub fn insert_shader(&mut self, shader: ShaderProgram) -> ShaderKey {
        self.shaders.insert(shader)
    }

    /// Look up a mesh
    pub fn mesh(&self, key: MeshKey) -> Result<&Mesh, SchemaError> {
        self.meshes.get(key).ok_or_else(|| SchemaError::MissingAsset {
            what: format!("mesh {key:?}"),
        })
    }

    /// Look up a material
    pub fn material(&self, key: MaterialKey) -> Result<&Material, SchemaError> {
        self.materials.get(key).ok_or_else(|| SchemaError::MissingAsset {
            what: format!("material {key:?}"),
        })
    }

    /// Look up a shader program
    pub fn shader(&self, key: ShaderKey) -> Result<&ShaderProgram, SchemaError> {
        self.shaders.get(key).ok_or_else(|| SchemaError::MissingAsset {
            what: format!("shader {key:?}"),
        })
    }
}
