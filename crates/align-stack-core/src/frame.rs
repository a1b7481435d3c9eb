//! Decoded frames.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{GrayImage, GrayImageView};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame has zero size ({width}x{height})")]
    Empty { width: usize, height: usize },
    #[error("unsupported channel count {0}, expected 1, 3 or 4")]
    UnsupportedChannels(u8),
    #[error("buffer holds {actual} bytes, {expected} expected")]
    BufferSize { expected: usize, actual: usize },
}

/// Role of a frame within one alignment invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameRole {
    Reference,
    Candidate,
}

/// Decoded 8-bit image, row-major with interleaved channels.
///
/// Immutable once built; share it as `Arc<Frame>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    path: PathBuf,
    width: usize,
    height: usize,
    channels: u8,
    data: Vec<u8>,
}

impl Frame {
    pub fn new(
        path: impl Into<PathBuf>,
        width: usize,
        height: usize,
        channels: u8,
        data: Vec<u8>,
    ) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::Empty { width, height });
        }
        if !matches!(channels, 1 | 3 | 4) {
            return Err(FrameError::UnsupportedChannels(channels));
        }
        let expected = width * height * channels as usize;
        if data.len() != expected {
            return Err(FrameError::BufferSize {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            path: path.into(),
            width,
            height,
            channels,
            data,
        })
    }

    /// Single-channel frame that takes ownership of a gray image buffer.
    pub fn from_gray(path: impl Into<PathBuf>, img: GrayImage) -> Result<Self, FrameError> {
        Self::new(path, img.width, img.height, 1, img.data)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Luma plane (ITU-R 601 weights); alpha is ignored.
    pub fn to_gray(&self) -> GrayImage {
        let data = match self.channels {
            1 => self.data.clone(),
            c => self
                .data
                .chunks_exact(c as usize)
                .map(|px| luma(px[0], px[1], px[2]))
                .collect(),
        };
        GrayImage {
            width: self.width,
            height: self.height,
            data,
        }
    }

    /// Borrow the buffer as a gray view. Only valid for single-channel frames.
    pub fn gray_view(&self) -> Option<GrayImageView<'_>> {
        (self.channels == 1).then_some(GrayImageView {
            width: self.width,
            height: self.height,
            data: &self.data,
        })
    }

    /// Copy of this frame with `channels` interleaved samples per pixel.
    ///
    /// Gray expands by replication, colour collapses to luma, alpha is set
    /// to opaque when added and dropped when removed.
    pub fn convert_channels(&self, channels: u8) -> Result<Frame, FrameError> {
        if channels == self.channels {
            return Ok(self.clone());
        }
        if !matches!(channels, 1 | 3 | 4) {
            return Err(FrameError::UnsupportedChannels(channels));
        }
        if channels == 1 {
            return Frame::from_gray(self.path.clone(), self.to_gray());
        }

        let src_c = self.channels as usize;
        let dst_c = channels as usize;
        let mut data = Vec::with_capacity(self.width * self.height * dst_c);
        for px in self.data.chunks_exact(src_c) {
            let (r, g, b) = if src_c == 1 {
                (px[0], px[0], px[0])
            } else {
                (px[0], px[1], px[2])
            };
            data.extend_from_slice(&[r, g, b]);
            if dst_c == 4 {
                data.push(if src_c == 4 { px[3] } else { u8::MAX });
            }
        }
        Frame::new(self.path.clone(), self.width, self.height, channels, data)
    }
}

#[inline]
fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((299 * r as u32 + 587 * g as u32 + 114 * b as u32 + 500) / 1000) as u8
}
