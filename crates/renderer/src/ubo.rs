//! Uniform buffer object definitions for shaders.
//!
//! These structures must match the shader uniform buffer layouts exactly.
//! All structures use `#[repr(C)]` for predictable memory layout and
//! implement `Pod` and `Zeroable` for safe byte casting.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

/// Per-object uniform data.
///
/// One of these lives in each uniform-ring region; the vertex shader reads
/// it through a dynamic uniform binding.
///
/// # Memory Layout
///
/// - Offset 0: model matrix (64 bytes)
/// - Offset 64: model-view-projection matrix (64 bytes)
/// - Total size: 128 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct ObjectUniforms {
    /// Model matrix (object to world space).
    pub model: Mat4,
    /// Combined model-view-projection matrix.
    pub mvp: Mat4,
}

impl ObjectUniforms {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Creates uniforms from a model matrix and the camera's
    /// view-projection matrix.
    #[inline]
    pub fn new(model: Mat4, view_projection: Mat4) -> Self {
        Self {
            model,
            mvp: view_projection * model,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_object_uniforms_size() {
        // 2 Mat4 (2 * 64) = 128 bytes
        assert_eq!(ObjectUniforms::SIZE, 128);
    }

    #[test]
    fn test_object_uniforms_alignment() {
        // Mat4 requires 16-byte alignment for GPU layouts
        assert_eq!(std::mem::align_of::<ObjectUniforms>(), 16);
    }

    #[test]
    fn test_object_uniforms_new() {
        let model = Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0));
        let view_projection = Mat4::from_scale(Vec3::splat(2.0));

        let uniforms = ObjectUniforms::new(model, view_projection);

        assert_eq!(uniforms.model, model);
        assert_eq!(uniforms.mvp, view_projection * model);
    }

    #[test]
    fn test_object_uniforms_bytes() {
        let uniforms = ObjectUniforms::default();
        let bytes: &[u8] = bytemuck::bytes_of(&uniforms);
        assert_eq!(bytes.len(), ObjectUniforms::SIZE);
    }
}
