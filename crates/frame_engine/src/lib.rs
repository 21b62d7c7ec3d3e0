//! # Frame Engine
//!
//! Per-frame GPU command recording for a real-time renderer.
//!
//! ## Features
//!
//! - **Frame Ring**: A small ring of in-flight frames synchronized against the GPU timeline
//! - **Descriptor Heaps**: Persistent and circular (per-frame) descriptor regions
//! - **Upload Arenas**: Frame-scoped linear staging memory for constant data
//! - **Binding Resolution**: Descriptor tables built from a data-described shader binding schema
//! - **Pass Walking**: Render-graph traversal with coalesced pipeline state and transitions
//! - **Backends**: A recording backend for headless runs and a Vulkan backend built on `ash`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use frame_engine::prelude::*;
//! use frame_engine::render::backend::recording::RecordingBackend;
//!
//! fn run(
//!     swap_chain: &StaticSwapChain,
//!     inputs: &FrameInputs<'_>,
//! ) -> Result<(), FrameError> {
//!     let config = FrameQueueConfig::default();
//!     let backend = RecordingBackend::new();
//!     let mut queue = FrameQueue::new(config.clone(), backend.parts(&config))?;
//!
//!     queue.init_pipeline(swap_chain, inputs.graph)?;
//!     let frame = queue.begin_frame(swap_chain)?;
//!     queue.render_frame(frame, inputs)?;
//!     queue.end_frame(frame)?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

// Core engine modules
pub mod core;

pub mod config;
pub mod foundation;
pub mod render;

/// Common imports for frame engine users
pub mod prelude {
    pub use crate::{
        core::config::{ApplicationConfig, FrameQueueConfig, LoggingConfig},
        foundation::math::{CameraData, Mat4, Vec3},
        render::{
            backend::{CommandQueue, CommandRecorder, DescriptorDevice, GpuBackend, GpuFence, UploadMemory},
            frame::{FrameHandle, FrameInputs, FrameQueue, FrameQueueParts, StaticSwapChain, SwapChain},
            graph::RenderGraph,
            scene::{AssetStore, DrawItem, RenderContent},
            FrameError, FrameResult,
        },
    };
}
