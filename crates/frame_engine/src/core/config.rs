//! # Unified Configuration System
//!
//! Configuration for the frame engine: how many frames may be in flight, how
//! the shader-visible descriptor heap is partitioned, how much upload memory
//! each frame gets, and how verbose logging is.
//!
//! ## Configuration Categories
//!
//! - **Frame Queue Config**: Ring size, descriptor heap layout, upload pages
//! - **Logging Config**: Log filter handed to `env_logger`
//! - **Application Config**: Top-level bundle persisted through [`Config`]

use serde::{Deserialize, Serialize};

pub use crate::config::{Config, ConfigError};

/// Default number of frames the producer may run ahead of the GPU
pub const DEFAULT_FRAME_QUEUE_SIZE: usize = 3;

/// Upper bound on frames in flight
pub const MAX_FRAME_QUEUE_SIZE: usize = 8;

/// Constant buffer views must start on this boundary
pub const CONSTANT_BUFFER_ALIGNMENT: u64 = 256;

/// # Frame Queue Configuration
///
/// Sizes every resource the frame queue preallocates at start-up. Nothing in
/// the frame queue grows after construction, so these numbers are hard limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameQueueConfig {
    /// Number of frame slots in the ring (frames in flight)
    pub frame_queue_size: usize,
    /// Total descriptors in the shader-visible heap
    pub shader_descriptor_capacity: u32,
    /// Descriptors at the end of the heap reserved for per-frame allocations,
    /// split evenly across the frame slots
    pub shader_descriptor_circular_reserve: u32,
    /// Bytes of upload memory available to a single frame
    pub upload_page_size: u64,
}

impl FrameQueueConfig {
    /// Create a configuration with the default layout
    pub fn new() -> Self {
        Self {
            frame_queue_size: DEFAULT_FRAME_QUEUE_SIZE,
            shader_descriptor_capacity: 4096,
            shader_descriptor_circular_reserve: 1536,
            upload_page_size: 1 << 20,
        }
    }

    /// Set the number of frame slots
    pub fn with_frame_queue_size(mut self, frames: usize) -> Self {
        self.frame_queue_size = frames;
        self
    }

    /// Set the descriptor heap capacity and its circular reserve
    pub fn with_descriptor_heap(mut self, capacity: u32, circular_reserve: u32) -> Self {
        self.shader_descriptor_capacity = capacity;
        self.shader_descriptor_circular_reserve = circular_reserve;
        self
    }

    /// Set the upload page size of a single frame
    pub fn with_upload_page_size(mut self, bytes: u64) -> Self {
        self.upload_page_size = bytes;
        self
    }

    /// Descriptors a single frame generation may allocate from the circular region
    pub fn circular_descriptors_per_frame(&self) -> u32 {
        let frames = u32::try_from(self.frame_queue_size).unwrap_or(u32::MAX).max(1);
        self.shader_descriptor_circular_reserve / frames
    }

    /// Descriptors left for persistent tables
    pub fn persistent_descriptor_capacity(&self) -> u32 {
        self.shader_descriptor_capacity
            .saturating_sub(self.shader_descriptor_circular_reserve)
    }

    /// Total upload memory the frame queue needs
    pub fn upload_buffer_size(&self) -> u64 {
        self.upload_page_size * self.frame_queue_size as u64
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.frame_queue_size == 0 {
            return Err("Frame queue size must be at least 1".to_string());
        }

        if self.frame_queue_size > MAX_FRAME_QUEUE_SIZE {
            return Err(format!(
                "Frame queue size should not exceed {MAX_FRAME_QUEUE_SIZE}, got {}",
                self.frame_queue_size
            ));
        }

        if self.shader_descriptor_circular_reserve > self.shader_descriptor_capacity {
            return Err(format!(
                "Circular descriptor reserve ({}) exceeds heap capacity ({})",
                self.shader_descriptor_circular_reserve, self.shader_descriptor_capacity
            ));
        }

        if self.circular_descriptors_per_frame() == 0 {
            return Err(format!(
                "Circular descriptor reserve ({}) is too small for {} frames",
                self.shader_descriptor_circular_reserve, self.frame_queue_size
            ));
        }

        if self.upload_page_size < CONSTANT_BUFFER_ALIGNMENT {
            return Err(format!(
                "Upload page size must hold at least one constant buffer ({CONSTANT_BUFFER_ALIGNMENT} bytes)"
            ));
        }

        Ok(())
    }
}

impl Default for FrameQueueConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// # Logging Configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter string in `env_logger` syntax, e.g. `info` or `frame_engine=trace`
    pub level: String,
}

impl LoggingConfig {
    /// Create a logging configuration at the given filter
    pub fn new(level: impl Into<String>) -> Self {
        Self { level: level.into() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::new("info")
    }
}

/// # Complete Application Configuration
///
/// Top-level configuration; this is what tools load from disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Frame queue configuration
    pub frame_queue: FrameQueueConfig,
}

impl ApplicationConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), String> {
        self.frame_queue.validate()
    }
}

impl Config for ApplicationConfig {}
