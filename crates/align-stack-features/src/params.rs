use serde::{Deserialize, Serialize};

/// Keypoint detector configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorParams {
    /// Upper bound on keypoints kept per frame (strongest first).
    pub max_features: usize,
    /// FAST threshold used at sensitivity 0.
    pub fast_threshold_max: u8,
    /// FAST threshold used at sensitivity 1.
    pub fast_threshold_min: u8,
    /// Half-size of the Harris non-maximum suppression window.
    pub nms_radius: usize,
    /// Half-size of the Harris structure-tensor window (2 gives 5x5).
    pub harris_radius: usize,
    /// Harris `k` in `det(M) - k * trace(M)^2`.
    pub harris_k: f64,
    /// Keypoints closer than this to any image edge are dropped.
    ///
    /// Must leave room for the descriptor disk and the orientation patch.
    pub border: usize,
    /// Box-blur radius applied before orientation and descriptor sampling.
    pub blur_radius: usize,
    /// Stretch the frame to the full 8-bit range before detection, so the
    /// FAST threshold is relative to the frame's own contrast.
    pub normalize_contrast: bool,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            max_features: 1000,
            fast_threshold_max: 60,
            fast_threshold_min: 5,
            nms_radius: 3,
            harris_radius: 2,
            harris_k: 0.04,
            border: 16,
            blur_radius: 2,
            normalize_contrast: true,
        }
    }
}

impl DetectorParams {
    /// FAST intensity threshold for a sensitivity in `[0, 1]`.
    ///
    /// Non-increasing in `sensitivity`: a lower threshold accepts a superset
    /// of segment-test corners.
    pub fn fast_threshold(&self, sensitivity: f32) -> u8 {
        let hi = self.fast_threshold_max as f64;
        let lo = self.fast_threshold_min.min(self.fast_threshold_max) as f64;
        let s = (sensitivity as f64).clamp(0.0, 1.0);
        (hi - s * (hi - lo)).round().clamp(0.0, 255.0) as u8
    }
}

/// Multi-probe LSH index layout used by the approximate matcher.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LshParams {
    /// Number of independent hash tables.
    pub tables: usize,
    /// Descriptor bits per hash key (clamped to `1..=32`).
    pub key_bits: usize,
    /// Probe every bucket whose key is within this Hamming distance.
    pub probe_level: usize,
}

impl Default for LshParams {
    fn default() -> Self {
        Self {
            tables: 12,
            key_bits: 20,
            probe_level: 2,
        }
    }
}

/// Descriptor matching configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherParams {
    /// Keep a match only if `nearest < ratio * second_nearest`.
    pub ratio: f32,
    /// Combined descriptor count at which `auto` switches to the
    /// approximate matcher.
    pub crossover: usize,
    pub lsh: LshParams,
}

impl Default for MatcherParams {
    fn default() -> Self {
        Self {
            ratio: 0.75,
            crossover: 500,
            lsh: LshParams::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_falls_with_sensitivity() {
        let p = DetectorParams::default();
        assert_eq!(p.fast_threshold(0.0), 60);
        assert_eq!(p.fast_threshold(1.0), 5);
        assert_eq!(p.fast_threshold(0.5), 33);
        let mut prev = u8::MAX;
        for i in 0..=100 {
            let t = p.fast_threshold(i as f32 / 100.0);
            assert!(t <= prev);
            prev = t;
        }
    }

    #[test]
    fn partial_json_fills_defaults() {
        let p: MatcherParams = serde_json::from_str(r#"{"ratio": 0.6}"#).unwrap();
        assert_eq!(p.ratio, 0.6);
        assert_eq!(p.crossover, 500);
        assert_eq!(p.lsh, LshParams::default());
    }
}
