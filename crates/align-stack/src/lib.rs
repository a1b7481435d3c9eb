//! High-level facade crate for the `align-stack-*` workspace.
//!
//! This crate provides:
//! - re-exports of the detector, matcher and pipeline crates
//! - (feature-gated) conversions between `image` buffers and frames, and
//!   saving stacked results
//! - the `align-stack` command-line tool (feature `cli`)
//!
//! ## Quickstart
//!
//! ```no_run
//! use align_stack::{AlignParams, AlignmentOrchestrator, CombineRule, EngineConfig, FrameSource};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = AlignmentOrchestrator::new(EngineConfig::default())?;
//! let sources: Vec<FrameSource> = ["m31_1.png", "m31_2.png", "m31_3.png"]
//!     .iter()
//!     .map(|p| FrameSource::Path(p.into()))
//!     .collect();
//!
//! let batch = engine.align(&sources, &AlignParams::default())?;
//! for path in batch.skipped_paths() {
//!     println!("skipped {}", path.display());
//! }
//! let stacked = engine.stack(&batch, CombineRule::Median)?;
//! align_stack::image_io::save_stack(&stacked, "stacked.png")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `align_stack::core`: frames, gray images, homographies, synthetic scenes.
//! - `align_stack::features`: keypoint detection, descriptors, matching.
//! - `align_stack::pipeline`: RANSAC, warping, merging, the orchestrator.
//! - `align_stack::image_io` (feature `image`): `image` crate interop.

pub use align_stack_core as core;
pub use align_stack_features as features;
pub use align_stack_pipeline as pipeline;

pub use align_stack_core::{Frame, FrameRole, Homography};
pub use align_stack_features::{MatchStrategy, MatcherMethod};
pub use align_stack_pipeline::{
    AlignError, AlignParams, AlignmentOrchestrator, AlignmentReport, AlignmentStatus,
    BatchResult, BatchState, CombineRule, EngineConfig, FrameSource, SkipReason, StackResult,
};

#[cfg(feature = "image")]
pub mod image_io;
