//! Dispatch tables for descriptor declarations and constant semantics

use crate::foundation::math::{CameraData, Mat4};
use crate::render::error::{ConstantScope, FrameResult, PreconditionError, SchemaError};

use super::schema::{ConstantDecl, DescriptorDecl, DescriptorKind, DescriptorSource, EngineData};

/// What the resolver does for one descriptor declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorAction {
    /// Fill a constant buffer and write a view for it
    WriteConstantBuffer,
    /// Nothing to write; the descriptor is static
    Skip,
}

/// Look up the action for a declaration
///
/// Texture, render-target and material sources have no per-frame writer,
/// so they are rejected rather than left unbound.
pub fn descriptor_action(source: DescriptorSource, decl: &DescriptorDecl) -> Result<DescriptorAction, SchemaError> {
    use DescriptorKind::{ConstantBuffer, LinearSampler, PointSampler, Unspecified};
    use DescriptorSource::Engine;

    match (source, decl.kind) {
        (Engine, ConstantBuffer) => Ok(DescriptorAction::WriteConstantBuffer),
        (Engine, PointSampler | LinearSampler) => Ok(DescriptorAction::Skip),
        (Engine, Unspecified) => Err(SchemaError::UnspecifiedDescriptor {
            name: decl.name.clone(),
        }),
        (data_source, kind) => Err(SchemaError::UnsupportedDescriptor {
            data_source,
            kind,
            name: decl.name.clone(),
        }),
    }
}

/// Transforms of the object a per-instance buffer is written for
#[derive(Debug, Clone, Copy)]
pub struct ObjectTransforms<'a> {
    /// Object to world
    pub world: &'a Mat4,
    /// Inverse transpose of `world`
    pub world_inv_t: &'a Mat4,
}

/// Matrix for one constant of a buffer resolved in `scope`
///
/// Pass scope accepts `Proj` and `View`; instance scope accepts
/// `WorldView` and `WorldInvT` and needs `object`.
pub fn constant_matrix(
    scope: ConstantScope,
    constant: &ConstantDecl,
    camera: &CameraData,
    object: Option<ObjectTransforms<'_>>,
) -> FrameResult<Mat4> {
    if constant.source != DescriptorSource::Engine {
        return Err(SchemaError::UnsupportedConstantSource {
            data_source: constant.source,
            constant: constant.name.clone(),
        }
        .into());
    }

    let require_object = || {
        object.ok_or_else(|| PreconditionError::MissingObjectBatch {
            constant: constant.name.clone(),
        })
    };

    match (scope, constant.data) {
        (_, EngineData::Unspecified) => Err(SchemaError::UnspecifiedConstant {
            constant: constant.name.clone(),
        }
        .into()),
        (ConstantScope::PerPass, EngineData::Proj) => Ok(camera.proj),
        (ConstantScope::PerPass, EngineData::View) => Ok(camera.view),
        (ConstantScope::PerInstance, EngineData::WorldView) => Ok(camera.view * require_object()?.world),
        (ConstantScope::PerInstance, EngineData::WorldInvT) => Ok(*require_object()?.world_inv_t),
        (scope, semantic) => Err(SchemaError::ScopeViolation {
            semantic,
            scope,
            constant: constant.name.clone(),
        }
        .into()),
    }
}
