//! Resampling aligned candidates into the reference grid.

use align_stack_core::{Frame, Homography};
use rayon::prelude::*;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::AlignError;

/// Candidate resampled onto the reference pixel grid.
///
/// `valid[y * width + x]` is false where the reference pixel maps outside
/// the candidate; those samples are zero and must not be combined.
#[derive(Clone, Debug, PartialEq)]
pub struct WarpedFrame {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    pub data: Vec<f32>,
    pub valid: Vec<bool>,
}

impl WarpedFrame {
    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|&&v| v).count()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ImageWarper;

impl ImageWarper {
    /// Warp `candidate` into a `width x height` reference grid.
    ///
    /// `homography` maps candidate coordinates to reference coordinates;
    /// each output pixel is pulled through its inverse and sampled
    /// bilinearly. Rows are filled in parallel.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, candidate, homography))
    )]
    pub fn warp(
        &self,
        candidate: &Frame,
        homography: &Homography,
        width: usize,
        height: usize,
    ) -> Result<WarpedFrame, AlignError> {
        let inv = homography
            .inverse()
            .filter(Homography::is_finite)
            .ok_or_else(|| AlignError::Internal("homography is not invertible".into()))?;

        let c = candidate.channels() as usize;
        let (cw, ch) = candidate.dimensions();
        let src = candidate.data();
        let mut data = vec![0.0f32; width * height * c];
        let mut valid = vec![false; width * height];
        if width == 0 || height == 0 {
            return Ok(WarpedFrame {
                width,
                height,
                channels: c,
                data,
                valid,
            });
        }

        data.par_chunks_mut(width * c)
            .zip(valid.par_chunks_mut(width))
            .enumerate()
            .for_each(|(y, (row, row_valid))| {
                for x in 0..width {
                    let Some((sx, sy)) = inv.project(x as f64, y as f64) else {
                        continue;
                    };
                    if !(sx >= 0.0 && sy >= 0.0 && sx <= (cw - 1) as f64 && sy <= (ch - 1) as f64)
                    {
                        continue;
                    }
                    sample_into(src, cw, ch, c, sx, sy, &mut row[x * c..(x + 1) * c]);
                    row_valid[x] = true;
                }
            });

        Ok(WarpedFrame {
            width,
            height,
            channels: c,
            data,
            valid,
        })
    }
}

/// Bilinear sample of every channel at an in-bounds position.
#[inline]
fn sample_into(
    src: &[u8],
    w: usize,
    h: usize,
    c: usize,
    x: f64,
    y: f64,
    out: &mut [f32],
) {
    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = (x - x0 as f64) as f32;
    let fy = (y - y0 as f64) as f32;

    for (k, o) in out.iter_mut().enumerate() {
        let p = |xx: usize, yy: usize| src[(yy * w + xx) * c + k] as f32;
        let a = p(x0, y0) + fx * (p(x1, y0) - p(x0, y0));
        let b = p(x0, y1) + fx * (p(x1, y1) - p(x0, y1));
        *o = a + fy * (b - a);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use align_stack_core::GrayImage;
    use nalgebra::Matrix3;

    fn ramp(w: usize, h: usize) -> Frame {
        Frame::from_gray("ramp", GrayImage::from_fn(w, h, |x, y| (x * 10 + y) as u8)).unwrap()
    }

    #[test]
    fn identity_copies_every_pixel() {
        let f = ramp(12, 9);
        let out = ImageWarper.warp(&f, &Homography::identity(), 12, 9).unwrap();
        assert_eq!(out.valid_count(), 12 * 9);
        for (a, &b) in out.data.iter().zip(f.data()) {
            assert_eq!(*a, b as f32);
        }
    }

    #[test]
    fn shifted_candidate_marks_uncovered_pixels() {
        let f = ramp(12, 9);
        // Candidate content sits 2 px right of the reference: ref = cand - 2.
        let h = Homography::scale_translation(1.0, -2.0, 0.0);
        let out = ImageWarper.warp(&f, &h, 12, 9).unwrap();
        for y in 0..9 {
            for x in 0..12 {
                let i = y * 12 + x;
                if x < 10 {
                    assert!(out.valid[i]);
                    assert_eq!(out.data[i], f.data()[y * 12 + x + 2] as f32);
                } else {
                    assert!(!out.valid[i]);
                    assert_eq!(out.data[i], 0.0);
                }
            }
        }
    }

    #[test]
    fn half_pixel_shift_interpolates() {
        let f = ramp(8, 4);
        let h = Homography::scale_translation(1.0, -0.5, 0.0);
        let out = ImageWarper.warp(&f, &h, 8, 4).unwrap();
        // Pixel (0, 0) reads candidate (0.5, 0): halfway between 0 and 10.
        assert_eq!(out.data[0], 5.0);
        assert!(!out.valid[7]);
    }

    #[test]
    fn multi_channel_frames_keep_their_layout() {
        let f = ramp(6, 5).convert_channels(3).unwrap();
        let out = ImageWarper.warp(&f, &Homography::identity(), 6, 5).unwrap();
        assert_eq!(out.channels, 3);
        assert_eq!(out.data.len(), 6 * 5 * 3);
        assert_eq!(out.data[3 * 4], f.data()[3 * 4] as f32);
    }

    #[test]
    fn singular_homography_is_internal_error() {
        let h = Homography::new(Matrix3::zeros());
        let err = ImageWarper.warp(&ramp(4, 4), &h, 4, 4).unwrap_err();
        assert!(matches!(err, AlignError::Internal(_)));
    }
}
