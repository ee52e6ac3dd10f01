//! Boost transform engine
//!
//! Builds the 4x4 matrix that warps the lookalike sphere's geometry to
//! simulate a boost with velocity beta (in units of c), plus the
//! rotation-only matrix that orients the reference-circle overlays.
//!
//! The construction first rotates the velocity direction onto the local +z
//! axis, where the boost is a plain translation along z (plus a perpendicular
//! 1/gamma contraction for the Lorentz case), then rotates back:
//!
//!   D = RotY(phi) . RotX(theta) . Translate(0,0,beta) . Scale(1/g,1/g,1) . RotX(-theta) . RotY(-phi)

use glam::{DMat4, DVec3};
use serde::{Deserialize, Serialize};

/// Which boost transformation distorts the sphere
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransformKind {
    /// Relativistic boost with the perpendicular 1/gamma contraction
    #[default]
    Lorentz,
    /// Non-relativistic limit, translation only
    Galilean,
}

impl TransformKind {
    /// Human-readable name for UI display
    pub fn name(&self) -> &'static str {
        match self {
            TransformKind::Lorentz => "Lorentz",
            TransformKind::Galilean => "Galilean",
        }
    }

    /// All selectable kinds
    pub fn all() -> &'static [TransformKind] {
        &[TransformKind::Lorentz, TransformKind::Galilean]
    }
}

/// Result of one boost-transform update
#[derive(Debug, Clone, Copy)]
pub struct BoostTransform {
    /// Model matrix for the lookalike sphere
    pub distortion: DMat4,
    /// Rotation-only model matrix for the reference circles
    pub circles_orientation: DMat4,
    /// False when the input was superluminal and the matrices are stale
    pub valid: bool,
}

/// Computes and retains the sphere distortion matrix
///
/// The engine owns the last valid matrices: superluminal input leaves them
/// untouched and raises a sticky warning that clears once |beta| < 1 again.
pub struct BoostEngine {
    distortion: DMat4,
    circles_orientation: DMat4,
    warning: bool,
}

impl Default for BoostEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl BoostEngine {
    /// New engine at rest (identity matrices)
    pub fn new() -> Self {
        Self {
            distortion: DMat4::IDENTITY,
            circles_orientation: DMat4::IDENTITY,
            warning: false,
        }
    }

    /// Recompute the transform for the given velocity
    ///
    /// Call once per render tick. When `beta` is superluminal the previous
    /// matrices are returned unchanged with `valid == false`.
    pub fn update(&mut self, beta: DVec3, kind: TransformKind) -> BoostTransform {
        let beta2 = beta.length_squared();

        if beta2 >= 1.0 {
            if !self.warning {
                log::warn!(
                    "superluminal velocity |beta| = {:.3}; keeping last valid transform",
                    beta2.sqrt()
                );
            }
            self.warning = true;
            return BoostTransform {
                distortion: self.distortion,
                circles_orientation: self.circles_orientation,
                valid: false,
            };
        }

        let speed = beta2.sqrt();
        let one_over_gamma = (1.0 - beta2).sqrt();

        let (theta, phi) = if speed == 0.0 {
            // rest frame
            (0.0, 0.0)
        } else {
            // asin argument is within [-1, 1] up to rounding since
            // |beta_y| <= |beta|; clamp the last ulp away
            let theta = (-beta.y / speed).clamp(-1.0, 1.0).asin();
            let phi = std::f64::consts::PI + (-beta.x).atan2(-beta.z);
            (theta, phi)
        };

        // alignment rotation carrying the local +z axis onto the velocity axis
        let align = DMat4::from_rotation_y(phi) * DMat4::from_rotation_x(theta);
        let align_inv = DMat4::from_rotation_x(-theta) * DMat4::from_rotation_y(-phi);

        let mut boosted = align * DMat4::from_translation(DVec3::new(0.0, 0.0, speed));
        if kind == TransformKind::Lorentz {
            boosted *= DMat4::from_scale(DVec3::new(one_over_gamma, one_over_gamma, 1.0));
        }

        self.distortion = boosted * align_inv;
        self.circles_orientation = align;

        if self.warning {
            self.warning = false;
            log::info!("velocity back below c; transform updating again");
        }

        BoostTransform {
            distortion: self.distortion,
            circles_orientation: self.circles_orientation,
            valid: true,
        }
    }

    /// Last distortion matrix (valid or retained)
    pub fn distortion(&self) -> DMat4 {
        self.distortion
    }

    /// Last circles-orientation matrix
    pub fn circles_orientation(&self) -> DMat4 {
        self.circles_orientation
    }

    /// Sticky superluminal warning flag
    pub fn warning(&self) -> bool {
        self.warning
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-12;

    fn assert_mat_eq(a: DMat4, b: DMat4) {
        let (a, b) = (a.to_cols_array(), b.to_cols_array());
        for i in 0..16 {
            assert!(
                (a[i] - b[i]).abs() < EPS,
                "matrix entry {} differs: {} vs {}",
                i,
                a[i],
                b[i]
            );
        }
    }

    #[test]
    fn test_rest_frame_is_identity() {
        let mut engine = BoostEngine::new();
        let out = engine.update(DVec3::ZERO, TransformKind::Lorentz);
        assert!(out.valid);
        assert_mat_eq(out.distortion, DMat4::IDENTITY);
        assert_mat_eq(out.circles_orientation, DMat4::IDENTITY);
    }

    #[test]
    fn test_galilean_z_boost_is_pure_translation() {
        let mut engine = BoostEngine::new();
        let out = engine.update(DVec3::new(0.0, 0.0, 0.5), TransformKind::Galilean);
        assert!(out.valid);
        assert_mat_eq(out.distortion, DMat4::from_translation(DVec3::new(0.0, 0.0, 0.5)));
    }

    #[test]
    fn test_lorentz_z_boost_adds_perpendicular_contraction() {
        let mut engine = BoostEngine::new();
        let out = engine.update(DVec3::new(0.0, 0.0, 0.6), TransformKind::Lorentz);
        let expected = DMat4::from_translation(DVec3::new(0.0, 0.0, 0.6))
            * DMat4::from_scale(DVec3::new(0.8, 0.8, 1.0));
        assert_mat_eq(out.distortion, expected);
    }

    #[test]
    fn test_lorentz_x_boost_decomposition() {
        let mut engine = BoostEngine::new();
        let out = engine.update(DVec3::new(0.6, 0.0, 0.0), TransformKind::Lorentz);
        assert!(out.valid);

        // 1/gamma = 0.8; the closed form rotated into the x axis
        let phi = std::f64::consts::FRAC_PI_2;
        let expected = DMat4::from_rotation_y(phi)
            * DMat4::from_translation(DVec3::new(0.0, 0.0, 0.6))
            * DMat4::from_scale(DVec3::new(0.8, 0.8, 1.0))
            * DMat4::from_rotation_y(-phi);
        assert_mat_eq(out.distortion, expected);

        // translation column points along +x by beta
        let translation = out.distortion.w_axis;
        assert!((translation.x - 0.6).abs() < EPS);
        assert!(translation.y.abs() < EPS);
        assert!(translation.z.abs() < EPS);

        // perpendicular axes contract by 0.8, the parallel axis does not
        let ey = out.distortion.transform_vector3(DVec3::Y);
        assert!((ey.length() - 0.8).abs() < EPS);
        let ex = out.distortion.transform_vector3(DVec3::X);
        assert!((ex.length() - 1.0).abs() < EPS);
    }

    #[test]
    fn test_alignment_rotation_maps_z_onto_beta() {
        let mut engine = BoostEngine::new();
        let beta = DVec3::new(0.3, -0.2, 0.4);
        let out = engine.update(beta, TransformKind::Lorentz);
        let mapped = out.circles_orientation.transform_vector3(DVec3::Z);
        let expected = beta.normalize();
        assert!((mapped - expected).length() < 1e-12);
    }

    #[test]
    fn test_circles_matrix_is_rotation_only() {
        let mut engine = BoostEngine::new();
        let out = engine.update(DVec3::new(0.2, 0.3, -0.4), TransformKind::Lorentz);
        // no translation
        let w = out.circles_orientation.w_axis;
        assert!(w.x.abs() < EPS && w.y.abs() < EPS && w.z.abs() < EPS);
        // orthonormal basis
        for axis in [DVec3::X, DVec3::Y, DVec3::Z] {
            let len = out.circles_orientation.transform_vector3(axis).length();
            assert!((len - 1.0).abs() < EPS);
        }
    }

    #[test]
    fn test_superluminal_input_retains_previous_matrices() {
        let mut engine = BoostEngine::new();
        let good = engine.update(DVec3::new(0.3, 0.0, 0.0), TransformKind::Lorentz);

        let bad = engine.update(DVec3::new(0.9, 0.9, 0.9), TransformKind::Lorentz);
        assert!(!bad.valid);
        assert!(engine.warning());
        // bit-identical retention
        assert_eq!(
            good.distortion.to_cols_array(),
            bad.distortion.to_cols_array()
        );
        assert_eq!(
            good.circles_orientation.to_cols_array(),
            bad.circles_orientation.to_cols_array()
        );

        // warning stays up across repeated bad input
        let bad2 = engine.update(DVec3::new(1.0, 0.0, 0.0), TransformKind::Lorentz);
        assert!(!bad2.valid);
        assert!(engine.warning());

        // and clears on recovery
        let recovered = engine.update(DVec3::new(0.1, 0.0, 0.0), TransformKind::Lorentz);
        assert!(recovered.valid);
        assert!(!engine.warning());
    }

    #[test]
    fn test_boundary_speed_is_rejected() {
        let mut engine = BoostEngine::new();
        let out = engine.update(DVec3::new(1.0, 0.0, 0.0), TransformKind::Galilean);
        assert!(!out.valid);
        assert_mat_eq(out.distortion, DMat4::IDENTITY);
    }
}
