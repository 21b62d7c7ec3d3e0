//! Per-frame draw contents

use crate::foundation::collections::{MaterialKey, MeshKey};
use crate::foundation::math::Mat4;
use crate::render::binding::dispatch::ObjectTransforms;
use crate::render::error::PreconditionError;

/// Mesh drawn with one material per submesh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshRenderer {
    /// Mesh to draw
    pub mesh: MeshKey,
    /// Material `i` draws submesh `i`
    pub materials: Vec<MaterialKey>,
}

/// Object batch in structure-of-arrays form
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FlattenedObjects {
    /// Renderer of each object
    pub mesh_renderers: Vec<MeshRenderer>,
    /// World transform of each object
    pub world_transforms: Vec<Mat4>,
    /// Inverse transpose of each world transform
    pub world_transform_invs: Vec<Mat4>,
}

impl FlattenedObjects {
    /// Append an object, deriving its inverse transpose
    ///
    /// A singular world matrix gets an identity normal transform.
    pub fn push(&mut self, renderer: MeshRenderer, world: Mat4) {
        let inv_t = world.try_inverse().map_or_else(Mat4::identity, |inverse| inverse.transpose());
        self.mesh_renderers.push(renderer);
        self.world_transforms.push(world);
        self.world_transform_invs.push(inv_t);
    }

    /// Number of objects
    pub fn len(&self) -> usize {
        self.mesh_renderers.len()
    }

    /// Whether the batch is empty
    pub fn is_empty(&self) -> bool {
        self.mesh_renderers.is_empty()
    }

    /// Check the three arrays agree in length
    pub fn validate(&self) -> Result<(), PreconditionError> {
        let renderers = self.mesh_renderers.len();
        if self.world_transforms.len() != renderers || self.world_transform_invs.len() != renderers {
            return Err(PreconditionError::BatchSizeMismatch {
                renderers,
                transforms: self.world_transforms.len(),
                inverses: self.world_transform_invs.len(),
            });
        }
        Ok(())
    }

    /// Transforms of object `index`
    pub fn transforms(&self, index: usize) -> Option<ObjectTransforms<'_>> {
        Some(ObjectTransforms {
            world: self.world_transforms.get(index)?,
            world_inv_t: self.world_transform_invs.get(index)?,
        })
    }
}

/// One entry of a draw queue's content
#[derive(Debug, Clone, PartialEq)]
pub enum DrawItem {
    /// Screen-covering triangle generated in the vertex shader
    FullScreenTriangle {
        /// Material drawn with
        material: MaterialKey,
    },
    /// Meshes with per-object transforms
    ObjectBatch(FlattenedObjects),
}

/// Draw items referenced by one draw queue entry
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderContent {
    /// Items in draw order
    pub items: Vec<DrawItem>,
}

impl RenderContent {
    /// Content holding `items`
    pub fn new(items: Vec<DrawItem>) -> Self {
        Self { items }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use approx::assert_relative_eq;
    use slotmap::SlotMap;

    #[test]
    fn test_push_derives_inverse_transpose() {
        let mut meshes: SlotMap<MeshKey, ()> = SlotMap::with_key();
        let mesh = meshes.insert(());
        let world = Mat4::new_nonuniform_scaling(&Vec3::new(2.0, 4.0, 1.0));

        let mut batch = FlattenedObjects::default();
        batch.push(MeshRenderer { mesh, materials: Vec::new() }, world);

        assert_eq!(batch.len(), 1);
        assert!(batch.validate().is_ok());
        let transforms = batch.transforms(0).unwrap();
        assert_relative_eq!(transforms.world_inv_t[(0, 0)], 0.5);
        assert_relative_eq!(transforms.world_inv_t[(1, 1)], 0.25);
        assert!(batch.transforms(1).is_none());
    }

    #[test]
    fn test_validate_rejects_ragged_batch() {
        let mut batch = FlattenedObjects::default();
        batch.world_transforms.push(Mat4::identity());
        assert_eq!(
            batch.validate(),
            Err(PreconditionError::BatchSizeMismatch {
                renderers: 0,
                transforms: 1,
                inverses: 0,
            })
        );
    }
}
