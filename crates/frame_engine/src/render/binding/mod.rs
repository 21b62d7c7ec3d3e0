//! Shader resource binding
//!
//! [`schema`] describes what a shader subpass expects to find bound,
//! [`dispatch`] maps each declaration and constant to the work it needs,
//! and [`resolver`] performs that work against the frame's descriptor heap
//! and upload arena.

pub mod dispatch;
pub mod resolver;
pub mod schema;

pub use resolver::{BindingResolver, TableBindings};
