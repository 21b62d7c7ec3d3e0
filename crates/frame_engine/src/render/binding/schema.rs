//! Shader resource binding schema
//!
//! Emitted by the shader builder next to each compiled subpass. A subpass
//! declares an ordered list of [`DescriptorCollection`]s; each collection
//! says how long its bindings live ([`Persistency`]), how often its data
//! changes ([`UpdateFrequency`]) and what kind of root parameter it is.

use serde::{Deserialize, Serialize};

use crate::render::backend::GpuDescriptorHandle;

/// Lifetime of a collection's descriptor tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Persistency {
    /// Tables live in the persistent heap region at a precomputed offset
    Persistent,
    /// Tables are rebuilt in the circular region on every use
    Dynamic,
}

/// How often a collection's contents may change, finest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UpdateFrequency {
    /// Every draw
    PerInstance,
    /// Every batch
    PerBatch,
    /// Every pass
    PerPass,
    /// Every frame
    PerFrame,
}

/// Root signature parameter kind of a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RootParameterKind {
    /// Descriptor table
    Table,
    /// Inline root constants
    Constants,
    /// Root constant buffer view
    ConstantBufferView,
    /// Root unordered access view
    UnorderedAccessView,
    /// Root shader resource view
    ShaderResourceView,
    /// Sampler baked into the root signature
    StaticSampler,
}

/// Identity of a collection; constant buffer layouts are matched against it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionIndex {
    /// Table lifetime
    pub persistency: Persistency,
    /// Update frequency
    pub update: UpdateFrequency,
    /// Root parameter kind
    pub kind: RootParameterKind,
}

impl CollectionIndex {
    /// Descriptor-table collection
    pub const fn table(persistency: Persistency, update: UpdateFrequency) -> Self {
        Self {
            persistency,
            update,
            kind: RootParameterKind::Table,
        }
    }
}

impl std::fmt::Display for CollectionIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}/{:?}/{:?}", self.persistency, self.update, self.kind)
    }
}

/// Where a descriptor's data comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DescriptorSource {
    /// Supplied by the engine each frame
    Engine,
    /// An earlier pass's render target
    RenderTarget,
    /// The material's own resources
    Material,
}

/// What a descriptor slot holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DescriptorKind {
    /// Constant buffer view
    ConstantBuffer,
    /// Main texture
    MainTex,
    /// Point-filtered sampler
    PointSampler,
    /// Linearly filtered sampler
    LinearSampler,
    /// Not declared
    Unspecified,
}

/// One named descriptor declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorDecl {
    /// Shader-side name
    pub name: String,
    /// Kind of view
    pub kind: DescriptorKind,
}

impl DescriptorDecl {
    /// Create a declaration
    pub fn new(name: impl Into<String>, kind: DescriptorKind) -> Self {
        Self { name: name.into(), kind }
    }
}

/// Declarations sharing a source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorSubrange {
    /// Data source of every declaration
    pub source: DescriptorSource,
    /// Declarations in table order
    pub descriptors: Vec<DescriptorDecl>,
}

/// Contiguous range of a descriptor table
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DescriptorRange {
    /// Subranges in table order
    pub subranges: Vec<DescriptorSubrange>,
}

/// Descriptor table bound to one root slot
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DescriptorList {
    /// Root slot
    pub slot: u32,
    /// Descriptors reserved for the table
    pub capacity: u32,
    /// Precomputed table start for persistent collections
    pub gpu_offset: GpuDescriptorHandle,
    /// Ranges in table order
    pub ranges: Vec<DescriptorRange>,
}

impl DescriptorList {
    /// Every declaration in table order with its source
    pub fn declarations(&self) -> impl Iterator<Item = (DescriptorSource, &DescriptorDecl)> {
        self.ranges
            .iter()
            .flat_map(|range| range.subranges.iter())
            .flat_map(|subrange| subrange.descriptors.iter().map(move |decl| (subrange.source, decl)))
    }
}

/// Group of descriptor tables sharing lifetime and update frequency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorCollection {
    /// Identity of the collection
    pub index: CollectionIndex,
    /// Constant buffer, texture and buffer view tables
    pub resource_view_lists: Vec<DescriptorList>,
    /// Sampler tables
    pub sampler_lists: Vec<DescriptorList>,
}

/// Engine-supplied constant semantic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineData {
    /// Not declared
    Unspecified,
    /// Projection matrix
    Proj,
    /// View matrix
    View,
    /// View matrix times the object's world matrix
    WorldView,
    /// Inverse transpose of the object's world matrix
    WorldInvT,
}

/// One named constant in a constant buffer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstantDecl {
    /// Shader-side name
    pub name: String,
    /// Data source
    pub source: DescriptorSource,
    /// Semantic of engine-sourced data
    pub data: EngineData,
}

impl ConstantDecl {
    /// Engine-sourced constant
    pub fn engine(name: impl Into<String>, data: EngineData) -> Self {
        Self {
            name: name.into(),
            source: DescriptorSource::Engine,
            data,
        }
    }
}

/// Layout of a constant buffer belonging to a collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstantBufferLayout {
    /// Collection the buffer belongs to
    pub index: CollectionIndex,
    /// Declared size in bytes
    pub size: u32,
    /// Constants in memory order
    pub constants: Vec<ConstantDecl>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_frequency_order() {
        assert!(UpdateFrequency::PerInstance < UpdateFrequency::PerBatch);
        assert!(UpdateFrequency::PerBatch < UpdateFrequency::PerPass);
        assert!(UpdateFrequency::PerPass < UpdateFrequency::PerFrame);
    }

    #[test]
    fn test_declarations_flatten_in_order() {
        let list = DescriptorList {
            slot: 1,
            capacity: 3,
            gpu_offset: GpuDescriptorHandle::default(),
            ranges: vec![
                DescriptorRange {
                    subranges: vec![DescriptorSubrange {
                        source: DescriptorSource::Engine,
                        descriptors: vec![DescriptorDecl::new("Object", DescriptorKind::ConstantBuffer)],
                    }],
                },
                DescriptorRange {
                    subranges: vec![DescriptorSubrange {
                        source: DescriptorSource::Material,
                        descriptors: vec![
                            DescriptorDecl::new("Albedo", DescriptorKind::MainTex),
                            DescriptorDecl::new("Linear", DescriptorKind::LinearSampler),
                        ],
                    }],
                },
            ],
        };

        let names: Vec<_> = list
            .declarations()
            .map(|(source, decl)| (source, decl.name.as_str()))
            .collect();
        assert_eq!(
            names,
            vec![
                (DescriptorSource::Engine, "Object"),
                (DescriptorSource::Material, "Albedo"),
                (DescriptorSource::Material, "Linear"),
            ]
        );
    }
}
