//! Orbit camera for the virtual viewpoint
//!
//! The camera orbits the origin of the lookalike sphere. Inside the sphere
//! its distance shrinks to an epsilon so it effectively sits at the center;
//! outside it orbits at the configured distance. The point-at operations
//! mirror the original's camera buttons.

use glam::{DVec3, Mat4, Vec3};

/// Virtual camera in spherical coordinates around the origin
pub struct OrbitCamera {
    /// Horizontal angle (yaw) in radians
    yaw: f32,
    /// Vertical angle (pitch) in radians
    pitch: f32,
    /// Distance from the origin
    distance: f32,
    /// Aspect ratio (width/height) for projection
    aspect: f32,
    /// Vertical field of view in degrees
    fov_y_deg: f32,
    /// Far plane margin beyond the outside orbit distance
    far: f32,
}

impl OrbitCamera {
    pub fn new(outside_distance: f32) -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.0,
            distance: 0.001,
            aspect: 16.0 / 9.0,
            fov_y_deg: 68.0,
            far: outside_distance + 1.1,
        }
    }

    /// Eye position on the orbit sphere
    pub fn eye_position(&self) -> Vec3 {
        self.eye_direction() * self.distance
    }

    /// Unit direction from origin to eye
    pub fn eye_direction(&self) -> Vec3 {
        Vec3::new(
            self.pitch.cos() * self.yaw.sin(),
            self.pitch.sin(),
            self.pitch.cos() * self.yaw.cos(),
        )
    }

    /// View matrix looking at the origin
    pub fn view_matrix(&self) -> Mat4 {
        let eye = self.eye_position();
        // keep a stable up vector away from the poles
        let up = if self.pitch.abs() > std::f32::consts::FRAC_PI_2 - 1e-3 {
            Vec3::Z
        } else {
            Vec3::Y
        };
        Mat4::look_at_rh(eye, Vec3::ZERO, up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y_deg.to_radians(), self.aspect, 1e-4, self.far)
    }

    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Orbit with a mouse drag
    pub fn on_mouse_drag(&mut self, delta: (f32, f32), sensitivity: f32) {
        self.yaw -= delta.0 * sensitivity;
        self.pitch = (self.pitch + delta.1 * sensitivity).clamp(-1.55, 1.55);
    }

    /// Distance driven by the position ramp
    pub fn set_distance(&mut self, distance: f32) {
        self.distance = distance.max(1e-6);
    }

    pub fn distance(&self) -> f32 {
        self.distance
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect;
    }

    pub fn set_fov_y_deg(&mut self, fov: f32) {
        self.fov_y_deg = fov.clamp(1.0, 179.0);
    }

    /// Place the eye along a direction, keeping the current distance
    pub fn set_eye_direction(&mut self, dir: Vec3) {
        let dir = dir.normalize_or_zero();
        if dir == Vec3::ZERO {
            return;
        }
        self.pitch = dir.y.clamp(-1.0, 1.0).asin();
        self.yaw = dir.x.atan2(dir.z);
    }

    /// Look along -z (eye on +z)
    pub fn point_forward(&mut self) {
        self.set_eye_direction(Vec3::Z);
    }

    /// Look along +z (eye on -z)
    pub fn point_backward(&mut self) {
        self.set_eye_direction(-Vec3::Z);
    }

    /// Look along the velocity direction; no-op when beta is zero
    pub fn point_beta(&mut self, beta: DVec3) -> bool {
        if beta.length_squared() == 0.0 {
            return false;
        }
        self.set_eye_direction(-beta.as_vec3());
        true
    }

    /// Look against the velocity direction
    pub fn point_minus_beta(&mut self, beta: DVec3) -> bool {
        if beta.length_squared() == 0.0 {
            return false;
        }
        self.set_eye_direction(beta.as_vec3());
        true
    }

    /// Eye on beta rotated +/- 90 degrees about the y axis
    pub fn point_beta_rotated(&mut self, beta: DVec3, clockwise: bool) -> bool {
        if beta.length_squared() == 0.0 {
            return false;
        }
        let angle = if clockwise {
            -std::f64::consts::FRAC_PI_2
        } else {
            std::f64::consts::FRAC_PI_2
        };
        let rotated = glam::DMat3::from_rotation_y(angle) * beta;
        self.set_eye_direction(rotated.as_vec3());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: Vec3, b: Vec3) {
        assert!((a - b).length() < 1e-5, "{:?} != {:?}", a, b);
    }

    #[test]
    fn test_point_forward_puts_eye_on_plus_z() {
        let mut camera = OrbitCamera::new(4.0);
        camera.set_distance(4.0);
        camera.point_forward();
        assert_close(camera.eye_position(), Vec3::new(0.0, 0.0, 4.0));
    }

    #[test]
    fn test_point_backward_puts_eye_on_minus_z() {
        let mut camera = OrbitCamera::new(4.0);
        camera.set_distance(2.0);
        camera.point_backward();
        assert_close(camera.eye_position(), Vec3::new(0.0, 0.0, -2.0));
    }

    #[test]
    fn test_point_beta_looks_along_beta() {
        let mut camera = OrbitCamera::new(4.0);
        camera.set_distance(1.0);
        assert!(camera.point_beta(DVec3::new(0.5, 0.0, 0.0)));
        assert_close(camera.eye_position(), Vec3::new(-1.0, 0.0, 0.0));
    }

    #[test]
    fn test_point_beta_rejects_zero_velocity() {
        let mut camera = OrbitCamera::new(4.0);
        assert!(!camera.point_beta(DVec3::ZERO));
    }

    #[test]
    fn test_point_beta_rotated_quarter_turn() {
        let mut camera = OrbitCamera::new(4.0);
        camera.set_distance(1.0);
        assert!(camera.point_beta_rotated(DVec3::new(0.0, 0.0, 0.5), true));
        // RotY(-90) maps +z onto -x
        assert_close(camera.eye_position(), Vec3::new(-1.0, 0.0, 0.0));
    }
}
