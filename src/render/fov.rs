//! Field-of-view mapping for the feed textures and the virtual camera
//!
//! Each feed FOV is the larger of the feed's horizontal and vertical FOV;
//! the tangent-half-FOV pair handed to the shader depends on the feed's
//! aspect ratio. The screen FOV setting works the same way for the window.

use serde::{Deserialize, Serialize};

/// FOV configuration, all in degrees
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FovSettings {
    /// User-facing feed FOV
    pub user: f64,
    /// Environment-facing feed FOV
    pub env: f64,
    /// Screen FOV (horizontal or vertical, whichever is larger)
    pub screen: f64,
}

impl Default for FovSettings {
    fn default() -> Self {
        // Nokia XR20 camera specs, as in the original
        Self {
            user: 67.3,
            env: 68.3,
            screen: 68.0,
        }
    }
}

/// Tangent-half-FOV pair (horizontal, vertical) for a feed
///
/// `fov_deg` applies to the larger dimension: for a landscape feed the
/// vertical term shrinks by the aspect ratio, for a portrait feed the
/// horizontal one does.
pub fn tan_half_fov(fov_deg: f64, aspect: f64) -> (f64, f64) {
    let t = (0.5 * fov_deg.to_radians()).tan();
    if aspect > 1.0 {
        (t, t / aspect)
    } else {
        (t * aspect, t)
    }
}

/// Vertical FOV of the window camera, in degrees
///
/// The screen FOV names the window's larger dimension; perspective
/// projection wants the vertical FOV.
pub fn vertical_fov_deg(fov_screen_deg: f64, window_aspect: f64) -> f64 {
    if window_aspect > 1.0 {
        let half = (0.5 * fov_screen_deg.to_radians()).tan() / window_aspect;
        2.0 * half.atan().to_degrees()
    } else {
        fov_screen_deg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_landscape_feed_divides_vertical() {
        let (h, v) = tan_half_fov(90.0, 2.0);
        assert!((h - 1.0).abs() < 1e-12);
        assert!((v - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_portrait_feed_multiplies_horizontal() {
        let (h, v) = tan_half_fov(90.0, 0.5);
        assert!((h - 0.5).abs() < 1e-12);
        assert!((v - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_square_feed_is_symmetric() {
        let (h, v) = tan_half_fov(68.0, 1.0);
        assert!((h - v).abs() < 1e-12);
    }

    #[test]
    fn test_vertical_fov_passthrough_in_portrait_window() {
        assert!((vertical_fov_deg(68.0, 0.75) - 68.0).abs() < 1e-12);
    }

    #[test]
    fn test_vertical_fov_shrinks_in_landscape_window() {
        let v = vertical_fov_deg(90.0, 2.0);
        // tan(45 deg) / 2 = 0.5 -> 2 * atan(0.5)
        let expected = 2.0 * 0.5f64.atan().to_degrees();
        assert!((v - expected).abs() < 1e-9);
        assert!(v < 90.0);
    }
}
