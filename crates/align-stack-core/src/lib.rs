//! Core types shared by the alignment crates.
//!
//! Frames and gray images, bilinear sampling, homographies and their
//! closed-form fits, a small stderr logger, and deterministic synthetic
//! scenes used by tests and benchmarks. Nothing here knows about features
//! or matching.

mod frame;
mod homography;
mod image;
mod logger;
pub mod synthetic;

pub use frame::{Frame, FrameError, FrameRole};
pub use homography::{
    fit_homography, fit_scale_translation, homography_from_4pt, warp_gray, Homography,
};
pub use image::{
    box_blur, normalize_min_max, sample_bilinear, sample_bilinear_u8, GrayImage, GrayImageView,
};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
