//! Steered BRIEF descriptors.
//!
//! 256 intensity comparisons between point pairs inside a disk of radius
//! [`PATTERN_RADIUS`], rotated by the keypoint orientation and sampled on a
//! box-blurred image.

use std::sync::OnceLock;

use align_stack_core::GrayImageView;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::Keypoint;

/// Radius of the sampling disk, pixels.
pub const PATTERN_RADIUS: i32 = 12;

const PATTERN_SEED: u64 = 0x0b71_ef5e_ed00_0256;

/// 256-bit binary descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Descriptor(pub [u64; 4]);

impl Descriptor {
    pub const BITS: usize = 256;

    pub fn zeros() -> Self {
        Self([0; 4])
    }

    #[inline]
    pub fn hamming(&self, other: &Self) -> u32 {
        (self.0[0] ^ other.0[0]).count_ones()
            + (self.0[1] ^ other.0[1]).count_ones()
            + (self.0[2] ^ other.0[2]).count_ones()
            + (self.0[3] ^ other.0[3]).count_ones()
    }

    #[inline]
    pub fn bit(&self, i: usize) -> bool {
        (self.0[i / 64] >> (i % 64)) & 1 == 1
    }

    #[inline]
    fn set_bit(&mut self, i: usize) {
        self.0[i / 64] |= 1u64 << (i % 64);
    }
}

/// Canonical (unrotated) test pairs `(x1, y1, x2, y2)`.
pub(crate) fn pattern() -> &'static [(i8, i8, i8, i8); 256] {
    static PATTERN: OnceLock<[(i8, i8, i8, i8); 256]> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let mut rng = ChaCha8Rng::seed_from_u64(PATTERN_SEED);
        let disk_point = |rng: &mut ChaCha8Rng| loop {
            let x = rng.random_range(-PATTERN_RADIUS..=PATTERN_RADIUS);
            let y = rng.random_range(-PATTERN_RADIUS..=PATTERN_RADIUS);
            if x * x + y * y <= PATTERN_RADIUS * PATTERN_RADIUS {
                return (x as i8, y as i8);
            }
        };
        std::array::from_fn(|_| loop {
            let a = disk_point(&mut rng);
            let b = disk_point(&mut rng);
            if a != b {
                break (a.0, a.1, b.0, b.1);
            }
        })
    })
}

/// Describe `kp` on the (already blurred) image.
///
/// The caller guarantees the keypoint lies at least `PATTERN_RADIUS + 1`
/// pixels from every edge.
pub(crate) fn describe(smoothed: &GrayImageView<'_>, kp: &Keypoint) -> Descriptor {
    let (s, c) = kp.orientation.sin_cos();
    let cx = kp.x.round() as i32;
    let cy = kp.y.round() as i32;

    let sample = |dx: i8, dy: i8| -> u8 {
        let (dx, dy) = (dx as f32, dy as f32);
        let rx = (c * dx - s * dy).round() as i32;
        let ry = (s * dx + c * dy).round() as i32;
        smoothed.at((cx + rx) as usize, (cy + ry) as usize)
    };

    let mut desc = Descriptor::zeros();
    for (i, &(x1, y1, x2, y2)) in pattern().iter().enumerate() {
        if sample(x1, y1) < sample(x2, y2) {
            desc.set_bit(i);
        }
    }
    desc
}

/// Intensity-centroid orientation in radians over a disk of `radius`.
pub(crate) fn orientation(smoothed: &GrayImageView<'_>, x: usize, y: usize, radius: i32) -> f32 {
    let mut m10 = 0i64;
    let mut m01 = 0i64;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy > radius * radius {
                continue;
            }
            let v = smoothed.at((x as i32 + dx) as usize, (y as i32 + dy) as usize) as i64;
            m10 += dx as i64 * v;
            m01 += dy as i64 * v;
        }
    }
    (m01 as f64).atan2(m10 as f64) as f32
}
