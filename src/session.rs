//! Session state and the per-frame controller
//!
//! All shared mutable state lives in one `SessionState` owned by the
//! `ViewfinderController`; the input paths and the boost engine read and
//! write it through the controller, and the renderer consumes one
//! `FrameOutput` per tick. No ambient globals.

use glam::{DMat4, DVec3};

use crate::animation::Ramp;
use crate::boost::{BoostEngine, TransformKind};
use crate::config::ViewfinderConfig;
use crate::error::SensorError;
use crate::render::fov::FovSettings;
use crate::sensors::RawOrientationSample;
use crate::velocity::frames::ScreenOrientation;
use crate::velocity::VelocityResolver;

/// Where the virtual camera sits relative to the lookalike sphere
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CameraPosition {
    #[default]
    InsideSphere,
    OutsideSphere,
}

impl CameraPosition {
    pub fn name(&self) -> &'static str {
        match self {
            CameraPosition::InsideSphere => "inside lookalike sphere",
            CameraPosition::OutsideSphere => "outside lookalike sphere",
        }
    }

    fn toggled(&self) -> Self {
        match self {
            CameraPosition::InsideSphere => CameraPosition::OutsideSphere,
            CameraPosition::OutsideSphere => CameraPosition::InsideSphere,
        }
    }
}

/// Shared state of one viewfinder session
#[derive(Debug, Clone)]
pub struct SessionState {
    /// Live velocity vector, read by the boost engine each tick
    pub beta: DVec3,
    /// Last manually-set velocity, restored when sensor mode stops
    pub stored_beta: DVec3,
    pub transform: TransformKind,
    pub screen_orientation: ScreenOrientation,
    pub camera_position: CameraPosition,
    pub show_circles: bool,
    /// Whether the velocity-direction control handles are enabled
    pub direction_control: bool,
    pub fov: FovSettings,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            beta: DVec3::ZERO,
            stored_beta: DVec3::ZERO,
            transform: TransformKind::Lorentz,
            screen_orientation: ScreenOrientation::Portrait,
            camera_position: CameraPosition::InsideSphere,
            show_circles: false,
            direction_control: true,
            fov: FovSettings::default(),
        }
    }
}

/// Everything the renderer needs for one frame
#[derive(Debug, Clone, Copy)]
pub struct FrameOutput {
    /// Model matrix for the lookalike sphere
    pub distortion: DMat4,
    /// Rotation-only model matrix for the reference circles
    pub circles_orientation: DMat4,
    /// Superluminal warning, rendered as the shader tint
    pub warning: bool,
    /// Virtual camera orbit distance
    pub camera_distance: f64,
    /// Orbit radius of the control handles
    pub control_radius: f64,
    /// Visual radius of the control handles
    pub control_size: f64,
    /// Unit velocity direction for handle placement, if defined
    pub handle_direction: Option<DVec3>,
}

/// Position-toggle transition time, seconds
const POSITION_RAMP_DURATION: f64 = 2.0;
/// Inside-camera distance epsilon (exactly zero breaks the view matrix)
const INSIDE_CAMERA_DISTANCE: f64 = 1e-6;
/// Control-handle orbital radius inside / outside
const CONTROL_RADIUS_INSIDE: f64 = 0.2;
const CONTROL_RADIUS_OUTSIDE: f64 = 2.0;
/// Control-handle visual size inside / outside
const CONTROL_SIZE_INSIDE: f64 = 0.005;
const CONTROL_SIZE_OUTSIDE: f64 = 0.07;

/// Owns the session state and runs the per-tick numeric pipeline
pub struct ViewfinderController {
    session: SessionState,
    engine: BoostEngine,
    resolver: VelocityResolver,
    outside_distance: f64,

    camera_distance: f64,
    control_radius: f64,
    control_size: f64,
    camera_ramp: Option<Ramp>,
    radius_ramp: Option<Ramp>,
    size_ramp: Option<Ramp>,
}

impl ViewfinderController {
    pub fn new(config: &ViewfinderConfig) -> Self {
        let session = SessionState {
            transform: config.transformation,
            fov: config.fov,
            ..SessionState::default()
        };
        Self {
            session,
            engine: BoostEngine::new(),
            resolver: VelocityResolver::new(config.default_speed),
            outside_distance: config.camera_outside_distance,
            camera_distance: 0.001,
            control_radius: CONTROL_RADIUS_INSIDE,
            control_size: CONTROL_SIZE_INSIDE,
            camera_ramp: None,
            radius_ramp: None,
            size_ramp: None,
        }
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SessionState {
        &mut self.session
    }

    pub fn resolver(&self) -> &VelocityResolver {
        &self.resolver
    }

    pub fn resolver_mut(&mut self) -> &mut VelocityResolver {
        &mut self.resolver
    }

    /// Manual slider write for one velocity component
    ///
    /// The value is always stored; while sensor mode is active it only takes
    /// effect once sensor mode stops.
    pub fn set_beta_component(&mut self, axis: usize, value: f64) {
        self.session.stored_beta[axis] = value;
        self.session.beta[axis] = value;
        if self.resolver.is_active() {
            log::info!("sensor mode active; slider value applies after stop");
        }
    }

    pub fn set_transform(&mut self, kind: TransformKind) {
        self.session.transform = kind;
    }

    /// Start sensor-driven velocity input; idempotent
    pub fn start_sensor(&mut self) {
        self.resolver.start();
    }

    /// Stop sensor mode, restoring the manual velocity
    pub fn stop_sensor(&mut self) {
        self.resolver.stop(&mut self.session);
    }

    /// Forward one raw orientation sample
    ///
    /// On an invalid sample the sensor mode is stopped and the error is
    /// returned so the caller can detach the source and fall back to manual.
    pub fn on_orientation_sample(&mut self, raw: RawOrientationSample) -> Result<(), SensorError> {
        match self.resolver.on_sample(raw) {
            Ok(()) => Ok(()),
            Err(e) => {
                log::warn!("{e}; falling back to manual velocity control");
                self.resolver.stop(&mut self.session);
                Err(e)
            }
        }
    }

    /// Toggle inside/outside camera position, starting the eased transitions
    pub fn toggle_camera_position(&mut self, now: f64) {
        let target = self.session.camera_position.toggled();
        self.session.camera_position = target;

        let (camera_target, radius_target, size_target) = match target {
            CameraPosition::InsideSphere => {
                (INSIDE_CAMERA_DISTANCE, CONTROL_RADIUS_INSIDE, CONTROL_SIZE_INSIDE)
            }
            CameraPosition::OutsideSphere => {
                (self.outside_distance, CONTROL_RADIUS_OUTSIDE, CONTROL_SIZE_OUTSIDE)
            }
        };

        self.camera_ramp = Some(Ramp::new(
            self.camera_distance,
            camera_target,
            now,
            POSITION_RAMP_DURATION,
        ));
        self.radius_ramp = Some(Ramp::new(
            self.control_radius,
            radius_target,
            now,
            POSITION_RAMP_DURATION,
        ));
        self.size_ramp = Some(Ramp::new(
            self.control_size,
            size_target,
            now,
            POSITION_RAMP_DURATION,
        ));

        log::info!("moving camera {}", target.name());
    }

    /// Run one tick of the numeric pipeline at time `now` (seconds)
    pub fn tick(&mut self, now: f64) -> FrameOutput {
        // input resolution first, then the transform, then the ramps
        self.resolver.resolve(&mut self.session);

        let transform = self
            .engine
            .update(self.session.beta, self.session.transform);

        if let Some(ramp) = &mut self.camera_ramp {
            self.camera_distance = ramp.sample(now);
            if ramp.is_finished() {
                self.camera_ramp = None;
            }
        }
        if let Some(ramp) = &mut self.radius_ramp {
            self.control_radius = ramp.sample(now);
            if ramp.is_finished() {
                self.radius_ramp = None;
            }
        }
        if let Some(ramp) = &mut self.size_ramp {
            self.control_size = ramp.sample(now);
            if ramp.is_finished() {
                self.size_ramp = None;
            }
        }

        let handle_direction = if self.session.beta.length_squared() > 0.0 {
            Some(self.session.beta.normalize())
        } else {
            None
        };

        FrameOutput {
            distortion: transform.distortion,
            circles_orientation: transform.circles_orientation,
            warning: self.engine.warning(),
            camera_distance: self.camera_distance,
            control_radius: self.control_radius,
            control_size: self.control_size,
            handle_direction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DMat4;

    fn controller() -> ViewfinderController {
        ViewfinderController::new(&ViewfinderConfig::default())
    }

    fn assert_mat_eq(a: DMat4, b: DMat4) {
        let (a, b) = (a.to_cols_array(), b.to_cols_array());
        for i in 0..16 {
            assert!((a[i] - b[i]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_rest_tick_outputs_identity() {
        let mut c = controller();
        let out = c.tick(0.0);
        assert!(!out.warning);
        assert_mat_eq(out.distortion, DMat4::IDENTITY);
        assert_mat_eq(out.circles_orientation, DMat4::IDENTITY);
        assert!(out.handle_direction.is_none());
    }

    #[test]
    fn test_manual_sliders_drive_the_transform() {
        let mut c = controller();
        c.set_beta_component(2, 0.5);
        c.set_transform(TransformKind::Galilean);

        let out = c.tick(0.0);
        assert!(!out.warning);
        assert_mat_eq(
            out.distortion,
            DMat4::from_translation(DVec3::new(0.0, 0.0, 0.5)),
        );
        assert_eq!(out.handle_direction, Some(DVec3::Z));
    }

    #[test]
    fn test_superluminal_sliders_raise_warning_and_recover() {
        let mut c = controller();
        c.set_beta_component(0, 0.8);
        let good = c.tick(0.0);

        c.set_beta_component(1, 0.8);
        let bad = c.tick(0.1);
        assert!(bad.warning);
        assert_eq!(
            good.distortion.to_cols_array(),
            bad.distortion.to_cols_array()
        );

        c.set_beta_component(1, 0.0);
        let recovered = c.tick(0.2);
        assert!(!recovered.warning);
    }

    #[test]
    fn test_position_toggle_ramps_to_outside_targets() {
        let mut c = controller();
        c.toggle_camera_position(0.0);
        assert_eq!(c.session().camera_position, CameraPosition::OutsideSphere);

        // mid-ramp: strictly between the endpoints
        let mid = c.tick(1.0);
        assert!(mid.camera_distance > 0.001 && mid.camera_distance < 4.0);
        assert!(mid.control_radius > 0.2 && mid.control_radius < 2.0);

        // settled
        let done = c.tick(3.0);
        assert!((done.camera_distance - 4.0).abs() < 1e-9);
        assert!((done.control_radius - 2.0).abs() < 1e-9);
        assert!((done.control_size - 0.07).abs() < 1e-9);
    }

    #[test]
    fn test_position_toggle_back_ramps_to_inside_targets() {
        let mut c = controller();
        c.toggle_camera_position(0.0);
        c.tick(3.0);
        c.toggle_camera_position(4.0);

        let done = c.tick(10.0);
        assert_eq!(c.session().camera_position, CameraPosition::InsideSphere);
        assert!((done.camera_distance - 1e-6).abs() < 1e-9);
        assert!((done.control_radius - 0.2).abs() < 1e-9);
        assert!((done.control_size - 0.005).abs() < 1e-9);
    }

    #[test]
    fn test_sensor_cycle_restores_manual_velocity() {
        let mut c = controller();
        c.set_beta_component(0, 0.3);

        c.start_sensor();
        c.on_orientation_sample(RawOrientationSample::new(10.0, 20.0, 30.0))
            .unwrap();
        let tracking = c.tick(0.0);
        assert!((tracking.distortion.to_cols_array()[12..15]
            .iter()
            .map(|v| v * v)
            .sum::<f64>()
            .sqrt()
            - 0.5)
            .abs()
            < 1e-9);

        c.stop_sensor();
        let out = c.tick(0.1);
        assert_eq!(c.session().beta, DVec3::new(0.3, 0.0, 0.0));
        assert!(!out.warning);
    }

    #[test]
    fn test_invalid_sample_falls_back_to_manual() {
        let mut c = controller();
        c.set_beta_component(0, 0.2);
        c.start_sensor();

        let err = c.on_orientation_sample(RawOrientationSample::default());
        assert!(err.is_err());
        assert!(!c.resolver().is_active());

        c.tick(0.0);
        assert_eq!(c.session().beta, DVec3::new(0.2, 0.0, 0.0));
    }
}
