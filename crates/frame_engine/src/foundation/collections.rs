//! Arena handles
//!
//! Assets consumed by the frame queue live in slot maps so that draw items
//! can refer to them by small copyable keys.

pub use slotmap::{new_key_type, SlotMap};

new_key_type! {
    /// Handle to a mesh in an [`AssetStore`](crate::render::scene::AssetStore)
    pub struct MeshKey;

    /// Handle to a material in an [`AssetStore`](crate::render::scene::AssetStore)
    pub struct MaterialKey;

    /// Handle to a compiled shader program in an [`AssetStore`](crate::render::scene::AssetStore)
    pub struct ShaderKey;
}
