use align_stack_features::{DetectorParams, MatcherMethod, MatcherParams};
use serde::{Deserialize, Serialize};

use crate::AlignError;

/// RANSAC configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacParams {
    /// Reprojection error (pixels) below which a match counts as an inlier.
    pub inlier_threshold: f64,
    /// Probability of drawing at least one outlier-free sample.
    pub confidence: f64,
    /// Hard cap on sampled hypotheses.
    pub max_iterations: usize,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            inlier_threshold: 3.0,
            confidence: 0.995,
            max_iterations: 2000,
        }
    }
}

/// Engine-wide configuration, fixed for the lifetime of an orchestrator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub detector: DetectorParams,
    pub matcher: MatcherParams,
    pub ransac: RansacParams,
    /// Worker threads for candidate pipelines; `None` uses all cores.
    pub workers: Option<usize>,
    /// Reuse features of path sources across invocations.
    ///
    /// Entries are keyed by path and sensitivity only and live until
    /// [`AlignmentOrchestrator::clear_cache`](crate::AlignmentOrchestrator::clear_cache).
    /// Nothing is evicted, and a file rewritten in place keeps its old
    /// features until the cache is cleared.
    pub cache_features: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            detector: DetectorParams::default(),
            matcher: MatcherParams::default(),
            ransac: RansacParams::default(),
            workers: None,
            cache_features: true,
        }
    }
}

/// Per-invocation alignment parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignParams {
    /// Index of the reference frame in the source list.
    pub reference_index: usize,
    /// `0` keeps only the strongest corners, `1` keeps the faintest too.
    pub feature_sensitivity: f32,
    /// Candidates with fewer ratio-tested matches are skipped.
    pub min_matches: usize,
    /// `false` restricts the model to uniform scale plus translation.
    pub allow_rotation: bool,
    pub matcher_method: MatcherMethod,
    /// Base seed for RANSAC sampling.
    pub seed: u64,
}

impl Default for AlignParams {
    fn default() -> Self {
        Self {
            reference_index: 0,
            feature_sensitivity: 0.5,
            min_matches: 10,
            allow_rotation: true,
            matcher_method: MatcherMethod::Auto,
            seed: 0,
        }
    }
}

impl AlignParams {
    /// Check the parameters against a batch of `frame_count` sources.
    pub fn validate(&self, frame_count: usize) -> Result<(), AlignError> {
        if frame_count == 0 {
            return Err(AlignError::InvalidParameter {
                name: "sources",
                reason: "at least one frame is required".into(),
            });
        }
        if self.reference_index >= frame_count {
            return Err(AlignError::InvalidParameter {
                name: "reference_index",
                reason: format!(
                    "{} is out of range for {frame_count} frames",
                    self.reference_index
                ),
            });
        }
        let s = self.feature_sensitivity;
        if !s.is_finite() || !(0.0..=1.0).contains(&s) {
            return Err(AlignError::InvalidParameter {
                name: "feature_sensitivity",
                reason: format!("{s} is not in [0, 1]"),
            });
        }
        if self.min_matches < 4 {
            return Err(AlignError::InvalidParameter {
                name: "min_matches",
                reason: format!("{} is below 4", self.min_matches),
            });
        }
        Ok(())
    }

    /// RANSAC seed for the frame at `index`; independent of scheduling.
    pub fn seed_for(&self, index: usize) -> u64 {
        self.seed ^ (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
    }
}
