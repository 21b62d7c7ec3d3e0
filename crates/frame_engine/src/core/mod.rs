//! # Core Module
//!
//! Shared configuration types used by every other subsystem.

pub mod config;

pub use config::{
    ApplicationConfig,
    Config,
    ConfigError,
    FrameQueueConfig,
    LoggingConfig,
};
