//! Math utilities and types
//!
//! Provides the matrix types the binding resolver copies into constant
//! buffers, plus the small integer helpers used for GPU alignment.

pub use nalgebra::{Matrix4, Point3, Vector3};
use serde::{Deserialize, Serialize};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// Size in bytes of one matrix as written into a constant buffer
pub const MATRIX_SIZE: usize = std::mem::size_of::<[f32; 16]>();

/// Column-major bytes of a matrix, the layout shaders read
pub fn matrix_bytes(matrix: &Mat4) -> &[u8] {
    bytemuck::cast_slice(matrix.as_slice())
}

/// Round `value` up to the next multiple of `alignment`
///
/// `alignment` must be a power of two.
pub const fn align_up(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

/// Camera matrices for one frame
///
/// Pass-scope constant buffers read these directly; instance-scope buffers
/// combine the view matrix with each object's world transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraData {
    /// World to view transform
    pub view: Mat4,
    /// View to clip transform
    pub proj: Mat4,
}

impl CameraData {
    /// Create camera data from explicit matrices
    pub const fn new(view: Mat4, proj: Mat4) -> Self {
        Self { view, proj }
    }

    /// Right-handed look-at camera with a perspective projection
    pub fn look_at(eye: Vec3, target: Vec3, up: Vec3, fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        let view = Mat4::look_at_rh(&Point3::from(eye), &Point3::from(target), &up);
        let proj = Mat4::new_perspective(aspect, fov_y, near, far);
        Self { view, proj }
    }
}

impl Default for CameraData {
    fn default() -> Self {
        Self {
            view: Mat4::identity(),
            proj: Mat4::identity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 256), 0);
        assert_eq!(align_up(1, 256), 256);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(257, 256), 512);
        assert_eq!(align_up(130, 4), 132);
    }

    #[test]
    fn test_matrix_bytes_are_column_major() {
        let translation = Mat4::new_translation(&Vec3::new(1.0, 2.0, 3.0));
        let bytes = matrix_bytes(&translation);
        assert_eq!(bytes.len(), MATRIX_SIZE);

        let floats: &[f32] = bytemuck::cast_slice(bytes);
        // Translation lives in the last column, i.e. the last four floats.
        assert_relative_eq!(floats[12], 1.0);
        assert_relative_eq!(floats[13], 2.0);
        assert_relative_eq!(floats[14], 3.0);
        assert_relative_eq!(floats[15], 1.0);
    }

    #[test]
    fn test_look_at_moves_eye_to_origin() {
        let camera = CameraData::look_at(
            Vec3::new(0.0, 0.0, 5.0),
            Vec3::zeros(),
            Vec3::y(),
            std::f32::consts::FRAC_PI_4,
            16.0 / 9.0,
            0.25,
            512.0,
        );
        let eye = camera.view.transform_point(&Point3::new(0.0, 0.0, 5.0));
        assert_relative_eq!(eye.coords.norm(), 0.0, epsilon = 1e-5);
    }
}
