//! Placeholder feed textures
//!
//! Live video capture is out of scope, so the two "camera feeds" mapped onto
//! the lookalike sphere are static images: either loaded from disk or
//! procedurally generated test cards (gradient, grid and scattered stars)
//! that make the boost distortion easy to see.

use std::path::Path;

use image::{Rgba, RgbaImage};
use rand::Rng;

/// Which feed a texture stands in for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedVariant {
    /// User-facing camera (warm test card)
    User,
    /// Environment-facing camera (cool test card)
    Env,
}

/// Load a feed image from disk, falling back to a procedural test card
pub fn load_or_placeholder(path: Option<&Path>, variant: FeedVariant) -> RgbaImage {
    if let Some(path) = path {
        match image::open(path) {
            Ok(img) => {
                log::info!("loaded {:?} feed image from {}", variant, path.display());
                return img.to_rgba8();
            }
            Err(e) => {
                log::warn!(
                    "failed to load feed image {}: {}; using test card",
                    path.display(),
                    e
                );
            }
        }
    }
    test_card(variant)
}

/// Aspect ratio (width / height) of a feed image
pub fn aspect_ratio(image: &RgbaImage) -> f64 {
    image.width() as f64 / image.height() as f64
}

/// Procedural test card, 4:3 like a typical phone feed
pub fn test_card(variant: FeedVariant) -> RgbaImage {
    const WIDTH: u32 = 1024;
    const HEIGHT: u32 = 768;
    const GRID_STEP: u32 = 64;

    let (base, grid): ([f32; 3], [u8; 3]) = match variant {
        FeedVariant::User => ([0.35, 0.12, 0.10], [255, 180, 120]),
        FeedVariant::Env => ([0.08, 0.14, 0.35], [120, 200, 255]),
    };

    let mut img = RgbaImage::new(WIDTH, HEIGHT);
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let fade = 0.4 + 0.6 * (y as f32 / HEIGHT as f32);
        let on_grid = x % GRID_STEP == 0 || y % GRID_STEP == 0;
        *pixel = if on_grid {
            Rgba([grid[0], grid[1], grid[2], 255])
        } else {
            Rgba([
                (base[0] * fade * 255.0) as u8,
                (base[1] * fade * 255.0) as u8,
                (base[2] * fade * 255.0) as u8,
                255,
            ])
        };
    }

    // scatter a few stars so rotation is visible even between grid lines
    let mut rng = rand::rng();
    for _ in 0..400 {
        let x = rng.random_range(0..WIDTH);
        let y = rng.random_range(0..HEIGHT);
        let brightness = rng.random_range(180..=255u16) as u8;
        img.put_pixel(x, y, Rgba([brightness, brightness, brightness, 255]));
    }

    img
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_test_card_dimensions_and_aspect() {
        let card = test_card(FeedVariant::Env);
        assert_eq!(card.dimensions(), (1024, 768));
        assert!((aspect_ratio(&card) - 4.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_file_falls_back_to_test_card() {
        let img = load_or_placeholder(
            Some(Path::new("/nonexistent/feed.png")),
            FeedVariant::User,
        );
        assert_eq!(img.dimensions(), (1024, 768));
    }

    #[test]
    fn test_variants_differ() {
        let user = test_card(FeedVariant::User);
        let env = test_card(FeedVariant::Env);
        // compare an off-grid, off-star corner region statistically
        let u: u32 = (1..20).map(|i| user.get_pixel(i, 1).0[0] as u32).sum();
        let e: u32 = (1..20).map(|i| env.get_pixel(i, 1).0[0] as u32).sum();
        assert!(u > e, "user card should be warmer than env card");
    }
}
