//! Transform component for scene objects.

use glam::{Mat4, Quat, Vec3};

/// A transform representing position, rotation, and scale.
#[derive(Clone, Debug)]
pub struct Transform {
    /// Position in world space
    pub position: Vec3,
    /// Rotation as a quaternion
    pub rotation: Quat,
    /// Scale factor
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    /// Create a new transform at the origin.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transform with the given position.
    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    /// Create a transform with the given rotation.
    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    /// Create a transform with the given scale.
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Apply an additional rotation around the world Y axis.
    ///
    /// Used for the fixed scene's turntable animation.
    pub fn rotate_y(&mut self, radians: f32) {
        self.rotation = Quat::from_rotation_y(radians) * self.rotation;
    }

    /// Get the transformation matrix.
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_matrix() {
        let transform = Transform::new();
        assert_eq!(transform.matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn test_translation() {
        let transform = Transform::new().with_position(Vec3::new(1.0, 2.0, 3.0));
        let point = transform.matrix().transform_point3(Vec3::ZERO);
        assert!((point - Vec3::new(1.0, 2.0, 3.0)).length() < 1e-6);
    }

    #[test]
    fn test_rotate_y_accumulates() {
        let mut transform = Transform::new();
        transform.rotate_y(std::f32::consts::FRAC_PI_2);
        transform.rotate_y(std::f32::consts::FRAC_PI_2);

        // Two quarter turns rotate +X to -X
        let rotated = transform.matrix().transform_vector3(Vec3::X);
        assert!((rotated - Vec3::NEG_X).length() < 1e-5);
    }

    #[test]
    fn test_scale() {
        let transform = Transform::new().with_scale(Vec3::splat(2.0));
        let scaled = transform.matrix().transform_vector3(Vec3::X);
        assert!((scaled - Vec3::new(2.0, 0.0, 0.0)).length() < 1e-6);
    }
}
