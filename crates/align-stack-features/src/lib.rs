//! Keypoint detection, binary descriptors and descriptor matching.
//!
//! ```no_run
//! use align_stack_core::synthetic::textured_scene;
//! use align_stack_features::{DescriptorMatcher, FeatureDetector, MatcherMethod};
//!
//! let a = textured_scene(320, 240, 1);
//! let detector = FeatureDetector::default();
//! let fa = detector.detect(&a.view(), 0.5).unwrap();
//! let fb = detector.detect(&a.view(), 0.5).unwrap();
//!
//! let matcher = DescriptorMatcher::default();
//! let strategy = MatcherMethod::Auto.resolve(fa.len() + fb.len(), 500);
//! let matches = matcher.match_descriptors(&fa.descriptors, &fb.descriptors, strategy);
//! println!("{} matches via {strategy}", matches.len());
//! ```

mod descriptor;
mod detector;
mod lsh;
mod matcher;
mod params;

pub use descriptor::{Descriptor, PATTERN_RADIUS};
pub use detector::{FeatureDetector, FeatureError, Features, Keypoint};
pub use lsh::{LshIndex, Neighbour};
pub use matcher::{DescriptorMatcher, Match, MatchStrategy, MatcherMethod};
pub use params::{DetectorParams, LshParams, MatcherParams};
