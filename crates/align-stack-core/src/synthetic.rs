//! Deterministic synthetic scenes for tests and benchmarks.
//!
//! Every generator is a pure function of its arguments; the random ones take
//! an explicit seed.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::{warp_gray, GrayImage, Homography};

/// Background level of [`textured_scene`].
pub const SCENE_BACKGROUND: u8 = 96;

/// Random overlapping rectangles on a flat background.
///
/// Rectangle levels avoid a band around the background so that rectangle
/// edges always carry strong contrast. Roughly one rectangle per 150 pixels
/// of area gives dense, non-repeating corner structure.
pub fn textured_scene(width: usize, height: usize, seed: u64) -> GrayImage {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut img = GrayImage::filled(width, height, SCENE_BACKGROUND);
    if width < 8 || height < 8 {
        return img;
    }

    let count = (width * height) / 150;
    for _ in 0..count {
        let rw = rng.random_range(4..=24).min(width);
        let rh = rng.random_range(4..=24).min(height);
        let x0 = rng.random_range(0..=width - rw);
        let y0 = rng.random_range(0..=height - rh);
        let level: u8 = if rng.random_bool(0.5) {
            rng.random_range(0..=50)
        } else {
            rng.random_range(150..=255)
        };
        for y in y0..y0 + rh {
            img.data[y * width + x0..y * width + x0 + rw].fill(level);
        }
    }
    img
}

/// Checkerboard-like grid of `period / 2` squares. Every corner looks alike.
pub fn periodic_squares(width: usize, height: usize, period: usize, fg: u8, bg: u8) -> GrayImage {
    let half = (period / 2).max(1);
    let period = period.max(2);
    GrayImage::from_fn(width, height, |x, y| {
        if x % period < half && y % period < half {
            fg
        } else {
            bg
        }
    })
}

/// Move image content by `(dx, dy)` pixels. Uncovered pixels get `fill`.
pub fn translate(img: &GrayImage, dx: f64, dy: f64, fill: u8) -> GrayImage {
    let src_from_dst = Homography::scale_translation(1.0, -dx, -dy);
    warp_gray(&img.view(), &src_from_dst, img.width, img.height, fill)
}

/// Rotate image content by `theta` radians about the image centre.
///
/// A content point `p` lands at `R(theta) p`; the map back from the rotated
/// image to the original is therefore a rotation by `-theta`.
pub fn rotate_about_center(img: &GrayImage, theta: f64, fill: u8) -> GrayImage {
    let cx = (img.width as f64 - 1.0) * 0.5;
    let cy = (img.height as f64 - 1.0) * 0.5;
    let src_from_dst = Homography::rotation_about(-theta, cx, cy);
    warp_gray(&img.view(), &src_from_dst, img.width, img.height, fill)
}
