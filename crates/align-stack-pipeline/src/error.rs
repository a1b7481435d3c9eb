use std::path::PathBuf;

use align_stack_core::FrameError;
use align_stack_features::FeatureError;
use serde::{Deserialize, Serialize};

/// Failure to turn a source file into a [`Frame`](align_stack_core::Frame).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("cannot read {}: {message}", .path.display())]
    Io { path: PathBuf, message: String },
    #[error("cannot decode {}: {message}", .path.display())]
    Format { path: PathBuf, message: String },
    #[error("no decoder available for {}", .path.display())]
    Unsupported { path: PathBuf },
    #[error(transparent)]
    Frame(#[from] FrameError),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AlignError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("no keypoints detected")]
    InsufficientFeatures,
    #[error("{found} matches found, {required} required")]
    InsufficientMatches { found: usize, required: usize },
    #[error("matches do not constrain a homography")]
    DegenerateHomography,
    #[error("alignment cancelled")]
    Cancelled,
    #[error("internal error: {0}")]
    Internal(String),
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),
}

impl From<FeatureError> for AlignError {
    fn from(err: FeatureError) -> Self {
        match err {
            FeatureError::NoKeypoints => AlignError::InsufficientFeatures,
            FeatureError::InvalidSensitivity(s) => AlignError::InvalidParameter {
                name: "feature_sensitivity",
                reason: format!("{s} is not in [0, 1]"),
            },
        }
    }
}

/// Why a candidate was left out of the stack.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    Decode { message: String },
    InsufficientFeatures,
    InsufficientMatches { found: usize, required: usize },
    DegenerateHomography,
}

impl SkipReason {
    /// Candidate-local failures map to a skip reason; anything else must
    /// propagate.
    pub fn from_error(err: &AlignError) -> Option<Self> {
        match err {
            AlignError::Decode(e) => Some(SkipReason::Decode {
                message: e.to_string(),
            }),
            AlignError::InsufficientFeatures => Some(SkipReason::InsufficientFeatures),
            AlignError::InsufficientMatches { found, required } => {
                Some(SkipReason::InsufficientMatches {
                    found: *found,
                    required: *required,
                })
            }
            AlignError::DegenerateHomography => Some(SkipReason::DegenerateHomography),
            _ => None,
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Decode { message } => write!(f, "decode error: {message}"),
            SkipReason::InsufficientFeatures => f.write_str("insufficient features"),
            SkipReason::InsufficientMatches { found, required } => {
                write!(f, "insufficient matches ({found} < {required})")
            }
            SkipReason::DegenerateHomography => f.write_str("degenerate homography"),
        }
    }
}
