//! Velocity input resolution
//!
//! Converts the active input mode into the canonical velocity vector read by
//! the boost engine. Manual mode is a pass-through from the sliders;
//! sensor mode runs a small state machine:
//!
//!   Inactive -> AwaitingFirstSample -> Tracking
//!
//! The first sample after activation is latched as the zero-reference and
//! fixes a scene-frame reference velocity; every later tick rotates that
//! reference back into the camera frame with the current device pose. A drag
//! on a control handle overrides the reference direction while tracking.

pub mod frames;

use glam::DVec3;

use crate::error::SensorError;
use crate::sensors::{OrientationSample, RawOrientationSample};
use crate::session::SessionState;
use frames::{
    camera_to_real, canvas_to_device, cartesian_to_spherical, device_to_canvas, real_to_camera,
    spherical_to_cartesian,
};

/// Stand-in for an exactly zero speed, which would make the reference
/// direction undefined
pub const EPSILON_SPEED: f64 = 0.01;

/// Direction picked by dragging a control handle, camera-local spherical frame
#[derive(Debug, Clone, Copy)]
pub struct DragGestureState {
    /// Polar angle from +y, in [0, pi]
    pub theta: f64,
    /// Azimuth around y, normalized into [0, 2*pi)
    pub phi: f64,
    /// True while a handle is being dragged
    pub active: bool,
}

impl Default for DragGestureState {
    fn default() -> Self {
        Self {
            theta: std::f64::consts::FRAC_PI_2,
            phi: std::f64::consts::PI,
            active: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SensorPhase {
    Inactive,
    AwaitingFirstSample,
    Tracking,
}

/// Resolves manual or sensor input into the session's velocity vector
pub struct VelocityResolver {
    phase: SensorPhase,
    initial: Option<OrientationSample>,
    current: OrientationSample,
    /// Scene-frame reference velocity latched at activation
    reference: DVec3,
    /// Configured scalar speed, never exactly zero
    speed: f64,
    drag: DragGestureState,
}

impl VelocityResolver {
    pub fn new(speed: f64) -> Self {
        Self {
            phase: SensorPhase::Inactive,
            initial: None,
            current: OrientationSample::default(),
            reference: DVec3::ZERO,
            speed: sanitize_speed(speed),
            drag: DragGestureState::default(),
        }
    }

    /// True in sensor-driven mode (awaiting or tracking)
    pub fn is_active(&self) -> bool {
        self.phase != SensorPhase::Inactive
    }

    /// True once the first sample has been latched
    pub fn is_tracking(&self) -> bool {
        self.phase == SensorPhase::Tracking
    }

    /// Enter sensor mode; idempotent
    pub fn start(&mut self) {
        if self.is_active() {
            return;
        }
        self.initial = None;
        self.current = OrientationSample::default();
        self.phase = SensorPhase::AwaitingFirstSample;
        log::info!("sensor mode started, waiting for first orientation sample");
    }

    /// Leave sensor mode and restore the last manually-set velocity
    pub fn stop(&mut self, session: &mut SessionState) {
        if !self.is_active() {
            return;
        }
        self.phase = SensorPhase::Inactive;
        self.current = OrientationSample::default();
        self.initial = None;
        self.drag.active = false;
        session.beta = session.stored_beta;
        log::info!("sensor mode stopped, manual velocity restored");
    }

    /// Feed one raw sample from the sensor source
    ///
    /// Samples arriving while inactive are ignored. Invalid samples surface
    /// as errors so the caller can fall back to manual mode.
    pub fn on_sample(&mut self, raw: RawOrientationSample) -> Result<(), SensorError> {
        if self.phase == SensorPhase::Inactive {
            return Ok(());
        }
        let sample = raw.validate()?;

        if self.phase == SensorPhase::AwaitingFirstSample {
            self.initial = Some(sample);
            self.reference = camera_to_real(&sample, DVec3::new(0.0, 0.0, -self.speed));
            self.phase = SensorPhase::Tracking;
            log::info!(
                "latched initial orientation alpha={:.1} beta={:.1} gamma={:.1}",
                sample.alpha,
                sample.beta,
                sample.gamma
            );
        }
        self.current = sample;
        Ok(())
    }

    /// Change the configured scalar speed, rescaling the latched reference
    ///
    /// Zero is replaced by a small epsilon; crossing zero flips the
    /// reference direction so the velocity inverts smoothly.
    pub fn set_speed(&mut self, new_speed: f64) {
        let old_speed = self.speed;
        let new_speed = sanitize_speed(new_speed);

        if self.phase == SensorPhase::Tracking {
            let len = self.reference.length();
            if len > 0.0 {
                let same_sign = (new_speed >= 0.0) == (old_speed >= 0.0);
                let scale = if same_sign {
                    new_speed.abs() / len
                } else {
                    -new_speed.abs() / len
                };
                self.reference *= scale;
            }
        }
        self.speed = new_speed;
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn begin_drag(&mut self) {
        self.drag.active = true;
    }

    /// Update the drag direction; phi may come in negative straight from atan2
    pub fn update_drag(&mut self, theta: f64, phi: f64) {
        self.drag.theta = theta;
        self.drag.phi = if phi < 0.0 {
            phi + std::f64::consts::TAU
        } else {
            phi
        };
    }

    pub fn end_drag(&mut self) {
        self.drag.active = false;
    }

    pub fn drag(&self) -> &DragGestureState {
        &self.drag
    }

    /// The latched zero-reference sample, if tracking
    pub fn initial_sample(&self) -> Option<&OrientationSample> {
        self.initial.as_ref()
    }

    /// The scene-frame reference velocity
    pub fn reference(&self) -> DVec3 {
        self.reference
    }

    /// Per-tick resolution into `session.beta`
    ///
    /// Called exactly once per render tick; reads whatever sample and drag
    /// state are current at that instant.
    pub fn resolve(&mut self, session: &mut SessionState) {
        match self.phase {
            SensorPhase::Inactive => {
                // manual pass-through
                session.beta = session.stored_beta;
            }
            SensorPhase::AwaitingFirstSample => {
                // nothing to derive yet; keep whatever velocity is current
            }
            SensorPhase::Tracking => {
                if self.drag.active {
                    // drag overrides the reference direction
                    let canvas =
                        spherical_to_cartesian(self.drag.theta, self.drag.phi, self.speed.abs());
                    let device = canvas_to_device(session.screen_orientation, canvas);
                    self.reference = camera_to_real(&self.current, device);
                }

                let device = real_to_camera(&self.current, self.reference);
                session.beta = device_to_canvas(session.screen_orientation, device);

                // keep the handle direction in sync with the derived velocity
                if session.beta.length_squared() > 0.0 {
                    let (theta, phi) = cartesian_to_spherical(session.beta);
                    self.drag.theta = theta;
                    self.drag.phi = phi;
                }
            }
        }
    }
}

fn sanitize_speed(speed: f64) -> f64 {
    if speed == 0.0 {
        EPSILON_SPEED
    } else {
        speed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::velocity::frames::ScreenOrientation;

    fn session() -> SessionState {
        SessionState::default()
    }

    fn assert_vec_eq(a: DVec3, b: DVec3) {
        assert!((a - b).length() < 1e-12, "{:?} != {:?}", a, b);
    }

    #[test]
    fn test_manual_mode_passes_stored_velocity_through() {
        let mut resolver = VelocityResolver::new(0.5);
        let mut session = session();
        session.stored_beta = DVec3::new(0.1, 0.2, 0.3);

        resolver.resolve(&mut session);
        assert_vec_eq(session.beta, DVec3::new(0.1, 0.2, 0.3));
    }

    #[test]
    fn test_start_is_idempotent() {
        let mut resolver = VelocityResolver::new(0.5);
        resolver.start();
        resolver
            .on_sample(RawOrientationSample::new(1.0, 2.0, 3.0))
            .unwrap();
        assert!(resolver.is_tracking());

        // a second start must not drop the latched reference
        resolver.start();
        assert!(resolver.is_tracking());
        assert!(resolver.initial_sample().is_some());
    }

    #[test]
    fn test_first_sample_latches_reference() {
        let mut resolver = VelocityResolver::new(0.5);
        resolver.start();
        assert!(resolver.is_active());
        assert!(!resolver.is_tracking());

        let sample = OrientationSample::new(10.0, 20.0, 30.0);
        resolver
            .on_sample(RawOrientationSample::new(10.0, 20.0, 30.0))
            .unwrap();

        assert!(resolver.is_tracking());
        let expected = camera_to_real(&sample, DVec3::new(0.0, 0.0, -0.5));
        assert_vec_eq(resolver.reference(), expected);
        assert_eq!(resolver.initial_sample(), Some(&sample));
    }

    #[test]
    fn test_identical_sample_keeps_velocity_stable() {
        let mut resolver = VelocityResolver::new(0.5);
        let mut session = session();
        resolver.start();

        let raw = RawOrientationSample::new(10.0, 20.0, 30.0);
        resolver.on_sample(raw).unwrap();
        resolver.resolve(&mut session);
        let first = session.beta;
        assert!((first.length() - 0.5).abs() < 1e-12);

        resolver.on_sample(raw).unwrap();
        resolver.resolve(&mut session);
        assert_vec_eq(session.beta, first);
    }

    #[test]
    fn test_unmoved_device_points_backwards() {
        // with the device held in its latched pose, the velocity is the
        // latched (0, 0, -speed) mapped straight back
        let mut resolver = VelocityResolver::new(0.5);
        let mut session = session();
        resolver.start();
        resolver
            .on_sample(RawOrientationSample::new(40.0, -25.0, 80.0))
            .unwrap();
        resolver.resolve(&mut session);
        assert_vec_eq(session.beta, DVec3::new(0.0, 0.0, -0.5));
    }

    #[test]
    fn test_stop_restores_manual_velocity() {
        let mut resolver = VelocityResolver::new(0.5);
        let mut session = session();
        session.stored_beta = DVec3::new(0.25, 0.0, -0.1);

        resolver.start();
        resolver
            .on_sample(RawOrientationSample::new(10.0, 20.0, 30.0))
            .unwrap();
        resolver.resolve(&mut session);
        assert!((session.beta - session.stored_beta).length() > 1e-6);

        resolver.stop(&mut session);
        assert!(!resolver.is_active());
        assert_vec_eq(session.beta, DVec3::new(0.25, 0.0, -0.1));

        // samples after stop are ignored
        resolver
            .on_sample(RawOrientationSample::new(99.0, 99.0, 99.0))
            .unwrap();
        resolver.resolve(&mut session);
        assert_vec_eq(session.beta, DVec3::new(0.25, 0.0, -0.1));
    }

    #[test]
    fn test_invalid_sample_surfaces_error() {
        let mut resolver = VelocityResolver::new(0.5);
        resolver.start();
        let err = resolver.on_sample(RawOrientationSample::default());
        assert!(matches!(err, Err(SensorError::PermissionDenied)));
    }

    #[test]
    fn test_zero_speed_becomes_epsilon() {
        let mut resolver = VelocityResolver::new(0.5);
        resolver.set_speed(0.0);
        assert!((resolver.speed() - EPSILON_SPEED).abs() < 1e-15);
    }

    #[test]
    fn test_speed_change_rescales_reference() {
        let mut resolver = VelocityResolver::new(0.5);
        resolver.start();
        resolver
            .on_sample(RawOrientationSample::new(10.0, 20.0, 30.0))
            .unwrap();
        let dir = resolver.reference().normalize();

        resolver.set_speed(0.8);
        assert!((resolver.reference().length() - 0.8).abs() < 1e-12);
        assert_vec_eq(resolver.reference().normalize(), dir);
    }

    #[test]
    fn test_speed_sign_flip_inverts_reference() {
        let mut resolver = VelocityResolver::new(0.5);
        resolver.start();
        resolver
            .on_sample(RawOrientationSample::new(10.0, 20.0, 30.0))
            .unwrap();
        let dir = resolver.reference().normalize();

        resolver.set_speed(-0.3);
        assert!((resolver.reference().length() - 0.3).abs() < 1e-12);
        assert_vec_eq(resolver.reference().normalize(), -dir);
    }

    #[test]
    fn test_drag_overrides_direction_while_tracking() {
        let mut resolver = VelocityResolver::new(0.5);
        let mut session = session();
        resolver.start();
        resolver
            .on_sample(RawOrientationSample::new(0.0, 0.0, 0.0))
            .unwrap();

        resolver.begin_drag();
        // point straight up in the camera frame
        resolver.update_drag(0.0, 0.0);
        resolver.resolve(&mut session);
        assert_vec_eq(session.beta, DVec3::new(0.0, 0.5, 0.0));
        resolver.end_drag();

        // after release the reference keeps the dragged direction
        resolver.resolve(&mut session);
        assert_vec_eq(session.beta, DVec3::new(0.0, 0.5, 0.0));
    }

    #[test]
    fn test_drag_phi_normalization() {
        let mut resolver = VelocityResolver::new(0.5);
        resolver.update_drag(1.0, -0.5);
        assert!((resolver.drag().phi - (std::f64::consts::TAU - 0.5)).abs() < 1e-12);
    }

    #[test]
    fn test_drag_round_trip_in_landscape() {
        // the drag direction must survive the canvas -> device -> scene ->
        // device -> canvas round trip in any screen orientation
        let mut resolver = VelocityResolver::new(0.5);
        let mut session = session();
        session.screen_orientation = ScreenOrientation::LeftLandscape;

        resolver.start();
        resolver
            .on_sample(RawOrientationSample::new(15.0, -30.0, 45.0))
            .unwrap();

        resolver.begin_drag();
        resolver.update_drag(1.2, 2.5);
        resolver.resolve(&mut session);

        let expected = spherical_to_cartesian(1.2, 2.5, 0.5);
        assert_vec_eq(session.beta, expected);
    }

    #[test]
    fn test_handle_angles_track_sensor_velocity() {
        let mut resolver = VelocityResolver::new(0.5);
        let mut session = session();
        resolver.start();
        resolver
            .on_sample(RawOrientationSample::new(25.0, 10.0, -5.0))
            .unwrap();
        resolver.resolve(&mut session);

        let (theta, phi) = cartesian_to_spherical(session.beta);
        assert!((resolver.drag().theta - theta).abs() < 1e-12);
        assert!((resolver.drag().phi - phi).abs() < 1e-12);
    }
}
