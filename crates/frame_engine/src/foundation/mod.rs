//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the engine:
//! - Math types and matrix byte packing
//! - Arena handles for assets
//! - Logging setup

pub mod collections;
pub mod logging;
pub mod math;
