//! Reference-frame rotations and screen-orientation axis remapping
//!
//! The orientation sensor reports the device pose as three Euler-like angles
//! in degrees. `camera_to_real` carries a vector from the device camera frame
//! into the scene ("real") frame; `real_to_camera` is its exact inverse.
//!
//! The render canvas does not rotate with the physical device, so camera-frame
//! components must additionally be permuted per screen orientation. The sign
//! tables are taken from empirical device behavior; the drag-input table and
//! the beta-output table are mutual inverses.

use glam::{DMat3, DVec3};
use serde::{Deserialize, Serialize};

use crate::sensors::OrientationSample;

/// How the render canvas is rotated relative to the physical device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScreenOrientation {
    #[default]
    Portrait,
    LeftLandscape,
    RightLandscape,
    Unknown,
}

impl ScreenOrientation {
    /// Human-readable name for UI display
    pub fn name(&self) -> &'static str {
        match self {
            ScreenOrientation::Portrait => "Portrait",
            ScreenOrientation::LeftLandscape => "Left landscape",
            ScreenOrientation::RightLandscape => "Right landscape",
            ScreenOrientation::Unknown => "Unknown",
        }
    }

    /// All selectable orientations
    pub fn all() -> &'static [ScreenOrientation] {
        &[
            ScreenOrientation::Portrait,
            ScreenOrientation::LeftLandscape,
            ScreenOrientation::RightLandscape,
        ]
    }
}

/// Rotation from the device camera frame into the scene frame:
/// RotZ(alpha) . RotX(beta) . RotY(gamma), angles in degrees
pub fn camera_to_real(sample: &OrientationSample, v: DVec3) -> DVec3 {
    let m = DMat3::from_rotation_z(sample.alpha.to_radians())
        * DMat3::from_rotation_x(sample.beta.to_radians())
        * DMat3::from_rotation_y(sample.gamma.to_radians());
    m * v
}

/// Inverse rotation, scene frame back into the device camera frame:
/// RotY(-gamma) . RotX(-beta) . RotZ(-alpha)
pub fn real_to_camera(sample: &OrientationSample, v: DVec3) -> DVec3 {
    let m = DMat3::from_rotation_y(-sample.gamma.to_radians())
        * DMat3::from_rotation_x(-sample.beta.to_radians())
        * DMat3::from_rotation_z(-sample.alpha.to_radians());
    m * v
}

/// Remap a canvas-frame vector (from a drag gesture) into device-frame axes
pub fn canvas_to_device(orientation: ScreenOrientation, v: DVec3) -> DVec3 {
    match orientation {
        ScreenOrientation::Portrait | ScreenOrientation::Unknown => v,
        ScreenOrientation::LeftLandscape => DVec3::new(v.y, -v.x, v.z),
        ScreenOrientation::RightLandscape => DVec3::new(-v.y, v.x, v.z),
    }
}

/// Remap a device-frame vector into canvas-frame beta components
pub fn device_to_canvas(orientation: ScreenOrientation, v: DVec3) -> DVec3 {
    match orientation {
        ScreenOrientation::Portrait | ScreenOrientation::Unknown => v,
        ScreenOrientation::LeftLandscape => DVec3::new(-v.y, v.x, v.z),
        ScreenOrientation::RightLandscape => DVec3::new(v.y, -v.x, v.z),
    }
}

/// Camera-frame spherical direction to Cartesian, scaled by `magnitude`
///
/// theta is the polar angle from +y, phi the azimuth around y measured from
/// +z towards +x, matching the drag-gesture convention.
pub fn spherical_to_cartesian(theta: f64, phi: f64, magnitude: f64) -> DVec3 {
    DVec3::new(
        magnitude * theta.sin() * phi.sin(),
        magnitude * theta.cos(),
        magnitude * theta.sin() * phi.cos(),
    )
}

/// Cartesian direction back to the drag (theta, phi) convention
///
/// Returns phi normalized into [0, 2*pi).
pub fn cartesian_to_spherical(dir: DVec3) -> (f64, f64) {
    let len = dir.length();
    let theta = if len > 0.0 {
        (dir.y / len).clamp(-1.0, 1.0).acos()
    } else {
        0.0
    };
    let mut phi = dir.x.atan2(dir.z);
    if phi < 0.0 {
        phi += std::f64::consts::TAU;
    }
    (theta, phi)
}
