//! Frame sources and decoders.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use align_stack_core::Frame;
#[cfg(feature = "image")]
use align_stack_core::FrameError;

use crate::DecodeError;

/// Turns a file into a [`Frame`]. Implementations are shared across worker
/// threads.
pub trait FrameDecoder: Send + Sync {
    fn decode(&self, path: &Path) -> Result<Frame, DecodeError>;
}

/// One input of an align call.
#[derive(Clone, Debug, PartialEq)]
pub enum FrameSource {
    /// Decoded lazily by the worker that processes it.
    Path(PathBuf),
    /// Already decoded by the caller.
    Decoded(Arc<Frame>),
}

impl FrameSource {
    pub fn path(&self) -> &Path {
        match self {
            FrameSource::Path(p) => p,
            FrameSource::Decoded(f) => f.path(),
        }
    }

    pub(crate) fn load(&self, decoder: &dyn FrameDecoder) -> Result<Arc<Frame>, DecodeError> {
        match self {
            FrameSource::Path(p) => decoder.decode(p).map(Arc::new),
            FrameSource::Decoded(f) => Ok(Arc::clone(f)),
        }
    }
}

impl From<PathBuf> for FrameSource {
    fn from(p: PathBuf) -> Self {
        FrameSource::Path(p)
    }
}

impl From<&Path> for FrameSource {
    fn from(p: &Path) -> Self {
        FrameSource::Path(p.to_path_buf())
    }
}

impl From<Frame> for FrameSource {
    fn from(f: Frame) -> Self {
        FrameSource::Decoded(Arc::new(f))
    }
}

/// Decoder for anything the `image` crate reads; see [`frame_from_image`]
/// for the channel layout.
#[cfg(feature = "image")]
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageFileDecoder;

#[cfg(feature = "image")]
impl FrameDecoder for ImageFileDecoder {
    fn decode(&self, path: &Path) -> Result<Frame, DecodeError> {
        let img = image::open(path).map_err(|e| match e {
            image::ImageError::IoError(io) => DecodeError::Io {
                path: path.to_path_buf(),
                message: io.to_string(),
            },
            other => DecodeError::Format {
                path: path.to_path_buf(),
                message: other.to_string(),
            },
        })?;
        Ok(frame_from_image(path, img)?)
    }
}

/// Convert a decoded image into a [`Frame`].
///
/// Gray and gray-alpha become one channel, RGB three, everything with alpha
/// four.
#[cfg(feature = "image")]
pub fn frame_from_image(
    path: impl Into<PathBuf>,
    img: image::DynamicImage,
) -> Result<Frame, FrameError> {
    let (w, h) = (img.width() as usize, img.height() as usize);
    let (channels, data) = match img.color().channel_count() {
        1 | 2 => (1, img.into_luma8().into_raw()),
        3 => (3, img.into_rgb8().into_raw()),
        _ => (4, img.into_rgba8().into_raw()),
    };
    Frame::new(path, w, h, channels, data)
}

/// Decoder that refuses every path; for callers that only pass decoded
/// frames.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoDecoder;

impl FrameDecoder for NoDecoder {
    fn decode(&self, path: &Path) -> Result<Frame, DecodeError> {
        Err(DecodeError::Unsupported {
            path: path.to_path_buf(),
        })
    }
}
