//! Rendering core
//!
//! Backend abstraction, render graph and scene data, binding resolution and
//! the frame queue that ties them together.

pub mod backend;
pub mod binding;
pub mod error;
pub mod frame;
pub mod graph;
pub mod scene;

pub use error::{ConstantScope, FrameError, FrameResult, PreconditionError, SchemaError};
