//! FAST-9 keypoints gated by a Harris non-maximum suppression mask.
//!
//! A pixel becomes a keypoint when
//! - it is a strict local maximum of the whole-image Harris response within
//!   `nms_radius` (equal responses resolve to the earlier raster position),
//! - its Harris response is positive,
//! - the FAST-9 segment test passes at the sensitivity-derived threshold on
//!   the pixel or one of its eight neighbours,
//! - it lies at least `border` pixels from every edge.
//!
//! With `normalize_contrast` the frame is min-max stretched first, so dim
//! exposures are judged on their own contrast.
//!
//! The first two conditions do not depend on sensitivity and the segment
//! test only accepts more pixels as the threshold falls, so the keypoint
//! count never decreases when sensitivity rises.

use align_stack_core::{box_blur, normalize_min_max, GrayImageView};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::descriptor::{describe, orientation, PATTERN_RADIUS};
use crate::{Descriptor, DetectorParams};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FeatureError {
    #[error("no keypoints detected")]
    NoKeypoints,
    #[error("sensitivity must be a finite value in [0, 1], got {0}")]
    InvalidSensitivity(f32),
}

/// Detected keypoint in pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    /// Detection scale; single-scale detection always reports 1.
    pub scale: f32,
    /// Intensity-centroid angle, radians.
    pub orientation: f32,
    /// Harris response.
    pub response: f32,
}

/// Keypoints and their descriptors; `descriptors[i]` belongs to `keypoints[i]`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Features {
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Vec<Descriptor>,
}

impl Features {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

// Bresenham circle of radius 3, clockwise from the top.
const CIRCLE: [(i32, i32); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

#[derive(Clone, Debug, Default)]
pub struct FeatureDetector {
    params: DetectorParams,
}

impl FeatureDetector {
    pub fn new(params: DetectorParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &DetectorParams {
        &self.params
    }

    /// Detect and describe keypoints on a gray image.
    ///
    /// Output is ordered by descending response, ties by ascending raster
    /// position, and capped at `max_features`.
    #[cfg_attr(
        feature = "tracing",
        instrument(
            level = "debug",
            skip(self, img),
            fields(width = img.width, height = img.height)
        )
    )]
    pub fn detect(
        &self,
        img: &GrayImageView<'_>,
        sensitivity: f32,
    ) -> Result<Features, FeatureError> {
        if !sensitivity.is_finite() || !(0.0..=1.0).contains(&sensitivity) {
            return Err(FeatureError::InvalidSensitivity(sensitivity));
        }
        let p = &self.params;
        let border = p.border.max(PATTERN_RADIUS as usize + 1);
        if img.width <= 2 * border || img.height <= 2 * border {
            return Err(FeatureError::NoKeypoints);
        }

        let stretched = p.normalize_contrast.then(|| normalize_min_max(img));
        let view = stretched.as_ref().map_or(*img, |s| s.view());
        let img = &view;

        let threshold = p.fast_threshold(sensitivity);
        let response = harris_response(img, p.harris_radius, p.harris_k);
        let (w, h) = (img.width, img.height);

        let mut found: Vec<(usize, usize, f32)> = (border..h - border)
            .into_par_iter()
            .flat_map_iter(|y| {
                let response = &response;
                (border..w - border).filter_map(move |x| {
                    let r = response[y * w + x];
                    let keep = r > 0.0
                        && is_local_max(response, w, h, x, y, p.nms_radius)
                        && passes_segment_test_near(img, x, y, threshold);
                    keep.then_some((x, y, r as f32))
                })
            })
            .collect();

        found.sort_by(|a, b| {
            b.2.total_cmp(&a.2)
                .then_with(|| (a.1, a.0).cmp(&(b.1, b.0)))
        });
        found.truncate(p.max_features);

        if found.is_empty() {
            log::debug!("no keypoints at threshold {threshold}");
            return Err(FeatureError::NoKeypoints);
        }

        let smoothed = box_blur(img, p.blur_radius);
        let sv = smoothed.view();
        let keypoints: Vec<Keypoint> = found
            .iter()
            .map(|&(x, y, r)| Keypoint {
                x: x as f32,
                y: y as f32,
                scale: 1.0,
                orientation: orientation(&sv, x, y, PATTERN_RADIUS),
                response: r,
            })
            .collect();
        let descriptors = keypoints.iter().map(|kp| describe(&sv, kp)).collect();

        log::debug!(
            "{} keypoints (threshold {threshold}, sensitivity {sensitivity:.2})",
            keypoints.len()
        );
        Ok(Features {
            keypoints,
            descriptors,
        })
    }
}

/// Harris response `det(M) - k * trace(M)^2` at every pixel.
///
/// Gradients are integer central differences with clamped edges and the
/// structure tensor sums run over a `(2r+1)^2` clamped window, so equal
/// neighbourhoods give bit-identical responses.
fn harris_response(img: &GrayImageView<'_>, radius: usize, k: f64) -> Vec<f64> {
    let (w, h) = (img.width, img.height);
    let px = |x: usize, y: usize| img.data[y * w + x] as i64;

    let mut grads = vec![[0i64; 3]; w * h];
    grads
        .par_chunks_mut(w)
        .enumerate()
        .for_each(|(y, row)| {
            let (yu, yd) = (y.saturating_sub(1), (y + 1).min(h - 1));
            for (x, g) in row.iter_mut().enumerate() {
                let (xl, xr) = (x.saturating_sub(1), (x + 1).min(w - 1));
                let ix = px(xr, y) - px(xl, y);
                let iy = px(x, yd) - px(x, yu);
                *g = [ix * ix, iy * iy, ix * iy];
            }
        });

    let r = radius as isize;
    let clamp = |v: isize, hi: usize| v.clamp(0, hi as isize - 1) as usize;

    let mut horizontal = vec![[0i64; 3]; w * h];
    horizontal
        .par_chunks_mut(w)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, acc) in row.iter_mut().enumerate() {
                for dx in -r..=r {
                    let g = grads[y * w + clamp(x as isize + dx, w)];
                    acc[0] += g[0];
                    acc[1] += g[1];
                    acc[2] += g[2];
                }
            }
        });

    let mut out = vec![0.0f64; w * h];
    out.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        for (x, o) in row.iter_mut().enumerate() {
            let mut s = [0i64; 3];
            for dy in -r..=r {
                let g = horizontal[clamp(y as isize + dy, h) * w + x];
                s[0] += g[0];
                s[1] += g[1];
                s[2] += g[2];
            }
            let (sxx, syy, sxy) = (s[0] as f64, s[1] as f64, s[2] as f64);
            let trace = sxx + syy;
            *o = sxx * syy - sxy * sxy - k * trace * trace;
        }
    });
    out
}

fn is_local_max(response: &[f64], w: usize, h: usize, x: usize, y: usize, radius: usize) -> bool {
    let v = response[y * w + x];
    let (y0, y1) = (y.saturating_sub(radius), (y + radius).min(h - 1));
    let (x0, x1) = (x.saturating_sub(radius), (x + radius).min(w - 1));
    for ny in y0..=y1 {
        for nx in x0..=x1 {
            if nx == x && ny == y {
                continue;
            }
            let q = response[ny * w + nx];
            let earlier = (ny, nx) < (y, x);
            if q > v || (q == v && earlier) {
                return false;
            }
        }
    }
    true
}

/// Harris maxima of a clean corner sit a pixel inside the segment-test
/// apex, so the test is accepted anywhere in the 3x3 block.
fn passes_segment_test_near(img: &GrayImageView<'_>, x: usize, y: usize, t: u8) -> bool {
    (y - 1..=y + 1).any(|ny| (x - 1..=x + 1).any(|nx| is_fast_corner(img, nx, ny, t)))
}

/// FAST-9: nine contiguous circle pixels all brighter than `c + t` or all
/// darker than `c - t`. The caller keeps `(x, y)` three pixels inside.
fn is_fast_corner(img: &GrayImageView<'_>, x: usize, y: usize, t: u8) -> bool {
    let c = img.at(x, y) as i16;
    let t = t as i16;
    let ring: [i16; 16] = std::array::from_fn(|i| {
        let (dx, dy) = CIRCLE[i];
        img.at((x as i32 + dx) as usize, (y as i32 + dy) as usize) as i16
    });

    // Any 9-arc covers at least two of the four compass points.
    let compass = [ring[0], ring[4], ring[8], ring[12]];
    let bright = compass.iter().filter(|&&v| v > c + t).count();
    let dark = compass.iter().filter(|&&v| v < c - t).count();
    if bright < 2 && dark < 2 {
        return false;
    }

    longest_run(&ring, |v| v > c + t) >= 9 || longest_run(&ring, |v| v < c - t) >= 9
}

fn longest_run(ring: &[i16; 16], pred: impl Fn(i16) -> bool) -> usize {
    let mut run = 0;
    let mut best = 0;
    // Two laps handle arcs that wrap past index 15.
    for i in 0..32 {
        if pred(ring[i % 16]) {
            run += 1;
            best = best.max(run);
        } else {
            run = 0;
        }
    }
    best.min(16)
}

#[cfg(test)]
mod tests {
    use super::*;
    use align_stack_core::{synthetic, GrayImage};

    #[test]
    fn flat_image_has_no_keypoints() {
        let img = GrayImage::filled(96, 96, 128);
        let det = FeatureDetector::default();
        assert_eq!(det.detect(&img.view(), 1.0), Err(FeatureError::NoKeypoints));
    }

    #[test]
    fn tiny_image_has_no_keypoints() {
        let img = synthetic::textured_scene(30, 30, 1);
        let det = FeatureDetector::default();
        assert_eq!(det.detect(&img.view(), 1.0), Err(FeatureError::NoKeypoints));
    }

    #[test]
    fn rejects_out_of_range_sensitivity() {
        let img = GrayImage::filled(64, 64, 0);
        let det = FeatureDetector::default();
        assert!(matches!(
            det.detect(&img.view(), 1.5),
            Err(FeatureError::InvalidSensitivity(_))
        ));
        assert!(matches!(
            det.detect(&img.view(), f32::NAN),
            Err(FeatureError::InvalidSensitivity(_))
        ));
    }

    #[test]
    fn finds_the_corners_of_a_bright_square() {
        let img = GrayImage::from_fn(80, 80, |x, y| {
            if (30..50).contains(&x) && (30..50).contains(&y) {
                220
            } else {
                30
            }
        });
        let det = FeatureDetector::default();
        let f = det.detect(&img.view(), 0.5).unwrap();
        assert_eq!(f.keypoints.len(), f.descriptors.len());
        for corner in [(30.0, 30.0), (49.0, 30.0), (30.0, 49.0), (49.0, 49.0)] {
            assert!(
                f.keypoints
                    .iter()
                    .any(|k| (k.x - corner.0).abs() <= 2.0 && (k.y - corner.1).abs() <= 2.0),
                "no keypoint near {corner:?}: {:?}",
                f.keypoints
            );
        }
    }

    #[test]
    fn dim_frames_are_stretched_before_detection() {
        let dim = GrayImage::from_fn(80, 80, |x, y| {
            if (30..50).contains(&x) && (30..50).contains(&y) {
                22
            } else {
                3
            }
        });
        let det = FeatureDetector::default();
        let f = det.detect(&dim.view(), 0.5).unwrap();
        assert!(f.len() >= 4);

        let raw = FeatureDetector::new(DetectorParams {
            normalize_contrast: false,
            ..DetectorParams::default()
        });
        assert_eq!(raw.detect(&dim.view(), 0.5), Err(FeatureError::NoKeypoints));
    }

    #[test]
    fn output_is_sorted_and_capped() {
        let img = synthetic::textured_scene(160, 120, 5);
        let det = FeatureDetector::new(DetectorParams {
            max_features: 40,
            ..DetectorParams::default()
        });
        let f = det.detect(&img.view(), 1.0).unwrap();
        assert_eq!(f.len(), 40);
        for pair in f.keypoints.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert!(
                a.response > b.response
                    || (a.response == b.response && (a.y, a.x) < (b.y, b.x))
            );
        }
    }

    #[test]
    fn segment_test_accepts_wrapping_arcs() {
        let mut ring = [0i16; 16];
        for i in [12, 13, 14, 15, 0, 1, 2, 3, 4] {
            ring[i] = 1;
        }
        assert_eq!(longest_run(&ring, |v| v == 1), 9);
        assert_eq!(longest_run(&[1; 16], |v| v == 1), 16);
    }
}
