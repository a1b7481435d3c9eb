//! Per-invocation outcomes and the JSON report derived from them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use align_stack_core::{Frame, FrameRole, Homography};
use align_stack_features::MatchStrategy;
use serde::{Deserialize, Serialize};

use crate::{AlignError, SkipReason};

/// Lifecycle of the latest align invocation on an orchestrator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    #[default]
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl BatchState {
    /// Terminal state for a finished invocation.
    pub fn after<T>(outcome: &Result<T, AlignError>) -> Self {
        match outcome {
            Ok(_) => BatchState::Completed,
            Err(AlignError::Cancelled) => BatchState::Cancelled,
            Err(_) => BatchState::Failed,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AlignmentStatus {
    Aligned { homography: Homography },
    Skipped { reason: SkipReason },
}

/// Outcome for one candidate frame.
#[derive(Clone, Debug, PartialEq)]
pub struct AlignmentResult {
    /// Position in the source list.
    pub index: usize,
    pub path: PathBuf,
    pub status: AlignmentStatus,
    pub inlier_count: usize,
    pub match_count: usize,
    /// Decoded frame, kept for a later stack.
    pub frame: Option<Arc<Frame>>,
}

impl AlignmentResult {
    pub fn is_aligned(&self) -> bool {
        matches!(self.status, AlignmentStatus::Aligned { .. })
    }

    pub fn homography(&self) -> Option<&Homography> {
        match &self.status {
            AlignmentStatus::Aligned { homography } => Some(homography),
            AlignmentStatus::Skipped { .. } => None,
        }
    }

    pub fn skip_reason(&self) -> Option<&SkipReason> {
        match &self.status {
            AlignmentStatus::Aligned { .. } => None,
            AlignmentStatus::Skipped { reason } => Some(reason),
        }
    }
}

/// Everything one align invocation produced.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchResult {
    pub reference_index: usize,
    pub reference_path: PathBuf,
    pub reference: Arc<Frame>,
    pub reference_features: usize,
    /// Candidates in input order; the reference is not among them.
    pub results: Vec<AlignmentResult>,
    pub method_used: MatchStrategy,
    /// Ratio-test survivors required per candidate.
    pub min_matches: usize,
}

impl BatchResult {
    pub fn aligned(&self) -> impl Iterator<Item = &AlignmentResult> {
        self.results.iter().filter(|r| r.is_aligned())
    }

    pub fn aligned_paths(&self) -> Vec<PathBuf> {
        self.aligned().map(|r| r.path.clone()).collect()
    }

    pub fn skipped_paths(&self) -> Vec<PathBuf> {
        self.results
            .iter()
            .filter(|r| !r.is_aligned())
            .map(|r| r.path.clone())
            .collect()
    }

    /// Role of the source at `index` in this invocation.
    pub fn role(&self, index: usize) -> FrameRole {
        if index == self.reference_index {
            FrameRole::Reference
        } else {
            FrameRole::Candidate
        }
    }

    pub fn report(&self) -> AlignmentReport {
        let mut debug_info = Vec::with_capacity(self.results.len() + 1);
        debug_info.push(format!(
            "reference #{} {}: {} features, matcher {}",
            self.reference_index,
            self.reference_path.display(),
            self.reference_features,
            self.method_used
        ));
        for r in &self.results {
            debug_info.push(describe(r, self.min_matches));
        }
        AlignmentReport {
            aligned: self.aligned_paths(),
            skipped: self.skipped_paths(),
            method_used: self.method_used.as_str().to_string(),
            debug_info,
        }
    }
}

fn describe(r: &AlignmentResult, min_matches: usize) -> String {
    let head = format!(
        "#{} {}: {} matches (need {min_matches})",
        r.index,
        r.path.display(),
        r.match_count
    );
    match r.skip_reason() {
        None => format!("{head}, {} inliers, aligned", r.inlier_count),
        Some(reason) => format!("{head}, skipped: {reason}"),
    }
}

/// JSON summary handed to front-ends.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignmentReport {
    pub aligned: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    pub method_used: String,
    pub debug_info: Vec<String>,
}

impl AlignmentReport {
    pub fn is_aligned(&self, path: &Path) -> bool {
        self.aligned.iter().any(|p| p == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use align_stack_core::GrayImage;

    fn result(index: usize, status: AlignmentStatus) -> AlignmentResult {
        AlignmentResult {
            index,
            path: PathBuf::from(format!("f{index}.png")),
            status,
            inlier_count: if index == 1 { 40 } else { 0 },
            match_count: if index == 1 { 52 } else { 3 },
            frame: None,
        }
    }

    fn batch() -> BatchResult {
        let reference = Arc::new(Frame::from_gray("f0.png", GrayImage::filled(4, 4, 0)).unwrap());
        BatchResult {
            reference_index: 0,
            reference_path: PathBuf::from("f0.png"),
            reference,
            reference_features: 500,
            results: vec![
                result(
                    1,
                    AlignmentStatus::Aligned {
                        homography: Homography::identity(),
                    },
                ),
                result(
                    2,
                    AlignmentStatus::Skipped {
                        reason: SkipReason::InsufficientMatches {
                            found: 3,
                            required: 10,
                        },
                    },
                ),
            ],
            method_used: MatchStrategy::BruteForce,
            min_matches: 10,
        }
    }

    #[test]
    fn paths_are_partitioned_by_status() {
        let b = batch();
        assert_eq!(b.aligned_paths(), vec![PathBuf::from("f1.png")]);
        assert_eq!(b.skipped_paths(), vec![PathBuf::from("f2.png")]);
        assert_eq!(b.role(0), FrameRole::Reference);
        assert_eq!(b.role(2), FrameRole::Candidate);
        assert!(b.results[0].homography().is_some());
        assert!(b.results[1].homography().is_none());
    }

    #[test]
    fn report_carries_debug_lines() {
        let report = batch().report();
        assert_eq!(report.method_used, "brute_force");
        assert!(report.is_aligned(Path::new("f1.png")));
        assert_eq!(report.debug_info.len(), 3);
        assert!(report.debug_info[0].contains("500 features"));
        assert!(report.debug_info[1].contains("40 inliers"));
        assert!(report.debug_info[2].contains("insufficient matches (3 < 10)"));
    }

    #[test]
    fn report_json_shape() {
        let v: serde_json::Value = serde_json::to_value(batch().report()).unwrap();
        assert_eq!(v["aligned"][0], "f1.png");
        assert_eq!(v["skipped"][0], "f2.png");
        assert_eq!(v["method_used"], "brute_force");
        assert!(v["debug_info"].is_array());
    }
}
