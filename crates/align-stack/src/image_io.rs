use std::path::Path;

use ::image::{DynamicImage, GrayImage, RgbImage, RgbaImage};

use crate::StackResult;

pub use align_stack_pipeline::frame_from_image;

#[derive(thiserror::Error, Debug)]
pub enum ImageIoError {
    #[error("stack buffer does not fit {width}x{height} with {channels} channels")]
    InvalidBuffer {
        width: usize,
        height: usize,
        channels: usize,
    },

    #[error(transparent)]
    Image(#[from] ::image::ImageError),
}

/// Stacked samples rounded to 8 bits in an image of matching layout.
pub fn stack_to_image(stack: &StackResult) -> Result<DynamicImage, ImageIoError> {
    let invalid = || ImageIoError::InvalidBuffer {
        width: stack.width,
        height: stack.height,
        channels: stack.channels,
    };
    let (w, h) = (stack.width as u32, stack.height as u32);
    let data = stack.to_u8();
    let img = match stack.channels {
        1 => DynamicImage::ImageLuma8(GrayImage::from_raw(w, h, data).ok_or_else(invalid)?),
        3 => DynamicImage::ImageRgb8(RgbImage::from_raw(w, h, data).ok_or_else(invalid)?),
        4 => DynamicImage::ImageRgba8(RgbaImage::from_raw(w, h, data).ok_or_else(invalid)?),
        _ => return Err(invalid()),
    };
    Ok(img)
}

/// Write a stacked result; the format follows the file extension.
pub fn save_stack(stack: &StackResult, path: impl AsRef<Path>) -> Result<(), ImageIoError> {
    stack_to_image(stack)?.save(path.as_ref())?;
    log::debug!("wrote stack to {}", path.as_ref().display());
    Ok(())
}
