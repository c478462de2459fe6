//! Camera for rendering the scene.

use glam::{Mat4, Quat, Vec3};

/// A perspective camera.
#[derive(Clone, Debug)]
pub struct Camera {
    /// Camera position in world space
    pub position: Vec3,
    /// Camera rotation
    pub rotation: Quat,
    /// Vertical field of view in radians
    pub fov_y: f32,
    /// Aspect ratio (width / height)
    pub aspect: f32,
    /// Near clip plane distance
    pub near: f32,
    /// Far clip plane distance
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            rotation: Quat::IDENTITY,
            fov_y: 45.0_f32.to_radians(),
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 100.0,
        }
    }
}

impl Camera {
    /// Create a new camera with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the perspective projection parameters.
    pub fn set_perspective(&mut self, fov_y: f32, aspect: f32, near: f32, far: f32) {
        self.fov_y = fov_y;
        self.aspect = aspect;
        self.near = near;
        self.far = far;
    }

    /// Get the view matrix.
    pub fn view_matrix(&self) -> Mat4 {
        let forward = self.rotation * Vec3::NEG_Z;
        let target = self.position + forward;
        Mat4::look_at_rh(self.position, target, Vec3::Y)
    }

    /// Get the projection matrix (with Vulkan Y-flip).
    pub fn projection_matrix(&self) -> Mat4 {
        let mut proj = Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far);
        // Flip Y for Vulkan clip space
        proj.y_axis.y *= -1.0;
        proj
    }

    /// Get the view-projection matrix.
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Orient the camera toward a target position.
    pub fn look_at(&mut self, target: Vec3) {
        let direction = target - self.position;
        if direction.length_squared() > 0.0 {
            self.rotation = Quat::from_rotation_arc(Vec3::NEG_Z, direction.normalize());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_matrix_moves_world_opposite_to_camera() {
        let mut camera = Camera::new();
        camera.position = Vec3::new(0.0, 0.0, 5.0);
        camera.look_at(Vec3::ZERO);

        // A point at the origin should end up 5 units in front of the camera
        let view = camera.view_matrix();
        let transformed = view.transform_point3(Vec3::ZERO);
        assert!((transformed.z - (-5.0)).abs() < 1e-5);
    }

    #[test]
    fn test_projection_flips_y() {
        let camera = Camera::new();
        let proj = camera.projection_matrix();
        assert!(proj.y_axis.y < 0.0);
    }

    #[test]
    fn test_look_at_points_forward() {
        let mut camera = Camera::new();
        camera.position = Vec3::new(-5.0, 3.0, -10.0);
        camera.look_at(Vec3::ZERO);

        let forward = camera.rotation * Vec3::NEG_Z;
        let expected = (Vec3::ZERO - camera.position).normalize();
        assert!((forward - expected).length() < 1e-5);
    }
}
