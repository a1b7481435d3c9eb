//! RANSAC homography estimation over matched keypoints.
//!
//! The estimated transform maps candidate pixel coordinates onto reference
//! pixel coordinates.

use align_stack_core::{fit_homography, fit_scale_translation, homography_from_4pt, Homography};
use align_stack_features::{Keypoint, Match};
use nalgebra::Point2;
use rand_chacha::ChaCha8Rng;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{AlignError, RansacParams};

/// Transform family fitted by RANSAC.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MotionModel {
    /// Full 8-DOF homography from 4-point samples.
    Projective,
    /// `[[s, 0, tx], [0, s, ty], [0, 0, 1]]` from 2-point samples.
    ScaleTranslation,
}

impl MotionModel {
    pub fn for_rotation(allow_rotation: bool) -> Self {
        if allow_rotation {
            MotionModel::Projective
        } else {
            MotionModel::ScaleTranslation
        }
    }

    pub fn sample_size(self) -> usize {
        match self {
            MotionModel::Projective => 4,
            MotionModel::ScaleTranslation => 2,
        }
    }

    fn fit_minimal(self, src: &[Point2<f32>], dst: &[Point2<f32>]) -> Option<Homography> {
        match self {
            MotionModel::Projective => {
                let s: &[Point2<f32>; 4] = src.try_into().ok()?;
                let d: &[Point2<f32>; 4] = dst.try_into().ok()?;
                homography_from_4pt(s, d)
            }
            MotionModel::ScaleTranslation => fit_scale_translation(src, dst),
        }
    }

    fn refit(self, src: &[Point2<f32>], dst: &[Point2<f32>]) -> Option<Homography> {
        match self {
            MotionModel::Projective => fit_homography(src, dst),
            MotionModel::ScaleTranslation => fit_scale_translation(src, dst),
        }
    }
}

/// Accepted model with its support.
#[derive(Clone, Debug, PartialEq)]
pub struct Estimate {
    pub homography: Homography,
    /// Indices into the match slice that agree with `homography`.
    pub inliers: Vec<usize>,
}

impl Estimate {
    pub fn inlier_count(&self) -> usize {
        self.inliers.len()
    }
}

#[derive(Clone, Debug, Default)]
pub struct HomographyEstimator {
    params: RansacParams,
}

impl HomographyEstimator {
    pub fn new(params: RansacParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &RansacParams {
        &self.params
    }

    /// Robustly fit a candidate-to-reference transform.
    ///
    /// Fails with `InsufficientMatches` below `min_matches`, with
    /// `DegenerateHomography` when no sample yields a model or the winning
    /// support cannot be refitted, and with `Internal` when a match points
    /// outside the keypoint slices or at non-finite coordinates.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(matches = matches.len()))
    )]
    pub fn estimate(
        &self,
        matches: &[Match],
        reference: &[Keypoint],
        candidate: &[Keypoint],
        min_matches: usize,
        allow_rotation: bool,
        rng: &mut ChaCha8Rng,
    ) -> Result<Estimate, AlignError> {
        if matches.len() < min_matches {
            return Err(AlignError::InsufficientMatches {
                found: matches.len(),
                required: min_matches,
            });
        }

        let model = MotionModel::for_rotation(allow_rotation);
        let k = model.sample_size();
        let n = matches.len();
        if n < k {
            return Err(AlignError::DegenerateHomography);
        }

        let mut src = Vec::with_capacity(n);
        let mut dst = Vec::with_capacity(n);
        for m in matches {
            let (Some(c), Some(r)) = (
                candidate.get(m.candidate_idx),
                reference.get(m.reference_idx),
            ) else {
                return Err(AlignError::Internal(format!(
                    "match ({}, {}) out of keypoint range",
                    m.reference_idx, m.candidate_idx
                )));
            };
            if ![c.x, c.y, r.x, r.y].iter().all(|v| v.is_finite()) {
                return Err(AlignError::Internal(format!(
                    "match ({}, {}) has non-finite coordinates",
                    m.reference_idx, m.candidate_idx
                )));
            }
            src.push(Point2::new(c.x, c.y));
            dst.push(Point2::new(r.x, r.y));
        }

        let threshold = self.params.inlier_threshold;
        let mut best: Option<(Homography, usize)> = None;
        let mut budget = self.params.max_iterations.max(1);
        let mut iteration = 0;
        let mut sample_src = Vec::with_capacity(k);
        let mut sample_dst = Vec::with_capacity(k);

        while iteration < budget {
            iteration += 1;

            let picks = rand::seq::index::sample(rng, n, k);
            sample_src.clear();
            sample_dst.clear();
            for i in picks.iter() {
                sample_src.push(src[i]);
                sample_dst.push(dst[i]);
            }
            if is_degenerate_sample(&sample_src) || is_degenerate_sample(&sample_dst) {
                continue;
            }
            let Some(h) = model.fit_minimal(&sample_src, &sample_dst) else {
                continue;
            };
            let count = count_inliers(&h, &src, &dst, threshold);
            if best.as_ref().is_none_or(|(_, c)| count > *c) {
                best = Some((h, count));
                let w = count as f64 / n as f64;
                budget = adaptive_iterations(w, k, self.params.confidence)
                    .min(self.params.max_iterations)
                    .max(iteration);
            }
        }

        let Some((sample_h, sample_count)) = best else {
            log::debug!("no usable sample in {iteration} iterations");
            return Err(AlignError::DegenerateHomography);
        };
        if sample_count < k {
            return Err(AlignError::DegenerateHomography);
        }

        let support = inlier_indices(&sample_h, &src, &dst, threshold);
        let in_src: Vec<Point2<f32>> = support.iter().map(|&i| src[i]).collect();
        let in_dst: Vec<Point2<f32>> = support.iter().map(|&i| dst[i]).collect();
        let refined = model
            .refit(&in_src, &in_dst)
            .ok_or(AlignError::DegenerateHomography)?;

        let inliers = inlier_indices(&refined, &src, &dst, threshold);
        log::debug!(
            "{:?}: {} of {n} inliers after {iteration} iterations",
            model,
            inliers.len()
        );
        if inliers.len() < k {
            return Err(AlignError::DegenerateHomography);
        }
        Ok(Estimate {
            homography: refined,
            inliers,
        })
    }
}

/// `ceil(log(1 - confidence) / log(1 - w^k))`, at least 1.
pub(crate) fn adaptive_iterations(
    inlier_ratio: f64,
    sample_size: usize,
    confidence: f64,
) -> usize {
    if inlier_ratio <= 0.0 {
        return usize::MAX;
    }
    if inlier_ratio >= 1.0 {
        return 1;
    }
    let w_k = inlier_ratio.powi(sample_size as i32);
    let log_outlier = (1.0 - w_k).ln();
    if log_outlier >= 0.0 {
        return usize::MAX;
    }
    let log_conf = (1.0 - confidence.clamp(0.0, 1.0 - 1e-12)).ln();
    ((log_conf / log_outlier).ceil() as usize).max(1)
}

#[inline]
fn reprojection_error(h: &Homography, s: Point2<f32>, d: Point2<f32>) -> Option<f64> {
    let (x, y) = h.project(s.x as f64, s.y as f64)?;
    let dx = x - d.x as f64;
    let dy = y - d.y as f64;
    Some((dx * dx + dy * dy).sqrt())
}

fn count_inliers(
    h: &Homography,
    src: &[Point2<f32>],
    dst: &[Point2<f32>],
    threshold: f64,
) -> usize {
    src.iter()
        .zip(dst)
        .filter(|(s, d)| reprojection_error(h, **s, **d).is_some_and(|e| e <= threshold))
        .count()
}

fn inlier_indices(
    h: &Homography,
    src: &[Point2<f32>],
    dst: &[Point2<f32>],
    threshold: f64,
) -> Vec<usize> {
    src.iter()
        .zip(dst)
        .enumerate()
        .filter(|(_, (s, d))| reprojection_error(h, **s, **d).is_some_and(|e| e <= threshold))
        .map(|(i, _)| i)
        .collect()
}

/// Coincident points, or any three (nearly) on one line.
fn is_degenerate_sample(pts: &[Point2<f32>]) -> bool {
    const MIN_SEPARATION: f32 = 1.0;
    const MIN_SINE: f32 = 0.01;

    for i in 0..pts.len() {
        for j in i + 1..pts.len() {
            if (pts[i] - pts[j]).norm() < MIN_SEPARATION {
                return true;
            }
        }
    }
    for i in 0..pts.len() {
        for j in i + 1..pts.len() {
            for l in j + 1..pts.len() {
                let a = pts[j] - pts[i];
                let b = pts[l] - pts[i];
                let cross = a.x * b.y - a.y * b.x;
                if cross.abs() <= MIN_SINE * a.norm() * b.norm() {
                    return true;
                }
            }
        }
    }
    false
}
