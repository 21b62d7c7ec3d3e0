//! Frame construction errors
//!
//! Two classes of failure abort a frame. Schema errors mean an asset or a
//! pipeline description is malformed; precondition errors mean the caller
//! handed the frame queue something it cannot work with. Neither is retried.

use thiserror::Error;

use super::backend::BackendError;
use super::binding::schema::{
    DescriptorKind, DescriptorSource, EngineData, RootParameterKind, UpdateFrequency,
};

/// Scope a constant buffer is resolved in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstantScope {
    /// Shared by every draw of a render queue
    PerPass,
    /// Written once per draw
    PerInstance,
}

impl std::fmt::Display for ConstantScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PerPass => write!(f, "per-pass"),
            Self::PerInstance => write!(f, "per-instance"),
        }
    }
}

/// Malformed binding schema or pipeline description
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    /// A constant semantic was used outside the scope it belongs to
    #[error("{semantic:?} cannot be {scope} (constant '{constant}')")]
    ScopeViolation {
        /// Offending semantic
        semantic: EngineData,
        /// Scope the buffer was resolved in
        scope: ConstantScope,
        /// Constant name from the layout
        constant: String,
    },

    /// Engine-sourced constant without a semantic
    #[error("engine source constant '{constant}' has no data semantic")]
    UnspecifiedConstant {
        /// Constant name from the layout
        constant: String,
    },

    /// Constant sourced from somewhere other than the engine
    #[error("dynamic constant '{constant}' cannot be {data_source:?} source")]
    UnsupportedConstantSource {
        /// Declared source
        data_source: DescriptorSource,
        /// Constant name from the layout
        constant: String,
    },

    /// Descriptor combination the resolver does not write
    #[error("{data_source:?} {kind:?} descriptor '{name}' is not supported in a dynamic table")]
    UnsupportedDescriptor {
        /// Declared source
        data_source: DescriptorSource,
        /// Declared kind
        kind: DescriptorKind,
        /// Descriptor name
        name: String,
    },

    /// Engine descriptor without a kind
    #[error("engine source descriptor '{name}' has no kind")]
    UnspecifiedDescriptor {
        /// Descriptor name
        name: String,
    },

    /// Sampler lists can only be bound persistently
    #[error("dynamic sampler list at slot {slot} is not supported")]
    DynamicSamplerList {
        /// Root slot of the list
        slot: u32,
    },

    /// Pass-level collections cannot carry sampler lists
    #[error("sampler list at slot {slot} in a per-pass collection is not supported")]
    PassSamplerList {
        /// Root slot of the list
        slot: u32,
    },

    /// Root parameter kinds other than descriptor tables
    #[error("root parameter {0:?} is not supported")]
    UnsupportedRootParameter(RootParameterKind),

    /// A per-instance dynamic collection declared a pass-level update frequency
    #[error("dynamic per-instance collection must update below PerPass, found {0:?}")]
    UpdateFrequencyTooCoarse(UpdateFrequency),

    /// Dynamic list without descriptor ranges
    #[error("descriptor list at slot {slot} has no ranges")]
    EmptyDescriptorList {
        /// Root slot of the list
        slot: u32,
    },

    /// Dynamic list without capacity
    #[error("descriptor list at slot {slot} has zero capacity")]
    ZeroCapacityList {
        /// Root slot of the list
        slot: u32,
    },

    /// A list declares more descriptors than its capacity
    #[error("descriptor list at slot {slot} declares more than {capacity} descriptors")]
    ListCapacityExceeded {
        /// Root slot of the list
        slot: u32,
        /// Declared capacity
        capacity: u32,
    },

    /// No constant-buffer layout matches a collection
    #[error("constant buffer not found for collection {0}")]
    ConstantBufferNotFound(String),

    /// Constant-buffer layout with zero size
    #[error("constant buffer for collection {0} has zero size")]
    EmptyConstantBuffer(String),

    /// Constants do not fit the declared buffer size
    #[error("constant '{constant}' overflows a {size} byte constant buffer")]
    ConstantBufferOverflow {
        /// Constant name from the layout
        constant: String,
        /// Aligned buffer size
        size: u64,
    },

    /// Circular allocation request that can never succeed
    #[error("circular descriptor allocation of {requested} exceeds per-frame capacity {capacity}")]
    InvalidCircularAllocation {
        /// Requested descriptor count
        requested: u32,
        /// Per-generation capacity
        capacity: u32,
    },

    /// Descriptor index past the end of its table
    #[error("descriptor index {index} out of range for table of {count}")]
    DescriptorIndexOutOfRange {
        /// Requested index
        index: u32,
        /// Table size
        count: u32,
    },

    /// Clear-depth-stencil load op on a color attachment
    #[error("render target view {0} should not use clear depth stencil")]
    DepthClearOnColorTarget(u32),

    /// Clear-color load op on the depth/stencil attachment
    #[error("depth stencil view {0} should not use clear color")]
    ColorClearOnDepthTarget(u32),

    /// More than one viewport on a pass
    #[error("pass {pass} declares {count} viewports, only one is supported")]
    TooManyViewports {
        /// Pass index
        pass: usize,
        /// Declared count
        count: usize,
    },

    /// More than one scissor rectangle on a pass
    #[error("pass {pass} declares {count} scissor rects, only one is supported")]
    TooManyScissorRects {
        /// Pass index
        pass: usize,
        /// Declared count
        count: usize,
    },

    /// Pipeline description references something that does not exist
    #[error("render graph has no {what} at index {index}")]
    MissingGraphEntry {
        /// Kind of entry
        what: &'static str,
        /// Requested index
        index: usize,
    },

    /// Asset lookup failure
    #[error("missing {what}")]
    MissingAsset {
        /// Description of the asset
        what: String,
    },

    /// Material has no route for a render subpass
    #[error("material has no shader route for solution {solution}, pipeline {pipeline}, pass {pass}, subpass {subpass}")]
    MissingSubpassRoute {
        /// Render solution index
        solution: usize,
        /// Render pipeline index
        pipeline: usize,
        /// Pass index
        pass: usize,
        /// Subpass index
        subpass: usize,
    },

    /// Shader tree lookup failure
    #[error("shader program has no {what} at index {index}")]
    MissingShaderEntry {
        /// Kind of entry
        what: &'static str,
        /// Requested index
        index: usize,
    },
}

/// Caller handed the frame queue unusable input
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreconditionError {
    /// Swap chain without a native surface
    #[error("swap chain has no native surface")]
    MissingSurface,

    /// Per-instance semantics requested without object data
    #[error("object batch is required for per-instance constant '{constant}'")]
    MissingObjectBatch {
        /// Constant name from the layout
        constant: String,
    },

    /// Object batch arrays disagree in length
    #[error("object batch has {renderers} renderers but {transforms} transforms and {inverses} inverse transforms")]
    BatchSizeMismatch {
        /// Mesh renderer count
        renderers: usize,
        /// World transform count
        transforms: usize,
        /// Inverse-transpose count
        inverses: usize,
    },

    /// Frame handle from an earlier occupancy of the slot
    #[error("frame handle for fence {handle_fence} is stale, slot {index} now holds fence {slot_fence}")]
    StaleFrameHandle {
        /// Ring index
        index: usize,
        /// Fence value the handle was issued with
        handle_fence: u64,
        /// Fence value currently stored in the slot
        slot_fence: u64,
    },

    /// Operation called out of order
    #[error("frame slot {index} is {actual}, expected {expected}")]
    InvalidFrameStage {
        /// Ring index
        index: usize,
        /// Required stage
        expected: &'static str,
        /// Current stage
        actual: &'static str,
    },

    /// Wrong number of recorders handed to the frame queue
    #[error("frame queue of size {expected} was given {actual} command recorders")]
    RecorderCountMismatch {
        /// Configured ring size
        expected: usize,
        /// Recorders supplied
        actual: usize,
    },
}

/// Any failure while building or submitting a frame
#[derive(Error, Debug)]
pub enum FrameError {
    /// Malformed schema or pipeline description
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Unusable input
    #[error("precondition violated: {0}")]
    Precondition(#[from] PreconditionError),

    /// GPU API failure
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// The frame generation ran out of circular descriptors
    #[error("descriptor heap exhausted: requested {requested}, {available} left this frame")]
    DescriptorHeapExhausted {
        /// Requested descriptor count
        requested: u32,
        /// Descriptors left in the generation
        available: u32,
    },

    /// The persistent heap region ran out of descriptors
    #[error("persistent descriptor region exhausted: requested {requested}, {available} left")]
    PersistentRegionExhausted {
        /// Requested descriptor count
        requested: u32,
        /// Descriptors left
        available: u32,
    },

    /// The frame generation ran out of upload memory
    #[error("upload buffer exhausted: requested {requested} bytes, {available} left this frame")]
    UploadBufferExhausted {
        /// Requested bytes including alignment
        requested: u64,
        /// Bytes left in the page
        available: u64,
    },

    /// Configuration rejected at construction
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An earlier frame aborted; its slot will never retire
    #[error("frame queue faulted by an earlier frame: {0}")]
    Faulted(String),
}

/// Result type for frame operations
pub type FrameResult<T> = Result<T, FrameError>;
