//! Robust alignment and stacking of frames against a reference.
//!
//! [`AlignmentOrchestrator::align`] classifies every candidate as aligned
//! (with a candidate-to-reference [`Homography`](align_stack_core::Homography))
//! or skipped (with a [`SkipReason`]). [`AlignmentOrchestrator::stack`] then
//! warps the aligned frames into the reference grid and merges them.
//!
//! ```no_run
//! use align_stack_pipeline::{
//!     AlignParams, AlignmentOrchestrator, CombineRule, EngineConfig, FrameSource,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = AlignmentOrchestrator::new(EngineConfig::default())?;
//! let sources: Vec<FrameSource> = ["a.png", "b.png", "c.png"]
//!     .iter()
//!     .map(|p| FrameSource::Path(p.into()))
//!     .collect();
//! let batch = engine.align(&sources, &AlignParams::default())?;
//! println!("{}", serde_json::to_string_pretty(&batch.report())?);
//! let stacked = engine.stack(&batch, CombineRule::Median)?;
//! println!("{}x{}", stacked.width, stacked.height);
//! # Ok(())
//! # }
//! ```

mod cache;
mod decode;
mod error;
mod estimator;
mod io;
mod merge;
mod orchestrator;
mod params;
mod result;
mod warp;

pub use cache::FeatureCache;
#[cfg(feature = "image")]
pub use decode::{frame_from_image, ImageFileDecoder};
pub use decode::{FrameDecoder, FrameSource, NoDecoder};
pub use error::{AlignError, DecodeError, SkipReason};
pub use estimator::{Estimate, HomographyEstimator, MotionModel};
pub use io::ConfigError;
pub use merge::{CombineRule, StackMerger, StackResult};
pub use orchestrator::AlignmentOrchestrator;
pub use params::{AlignParams, EngineConfig, RansacParams};
pub use result::{AlignmentReport, AlignmentResult, AlignmentStatus, BatchResult, BatchState};
pub use warp::{ImageWarper, WarpedFrame};
