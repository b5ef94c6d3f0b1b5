//! Image decoding for callers that start from encoded bytes.
//!
//! The segmentation stages operate on an already decoded [`RgbImage`];
//! this helper is the thin codec boundary in front of them.

use crate::types::{GrayImage, PipelineError, RgbImage};

/// Decode raw image bytes into an 8-bit RGB image.
///
/// Supports whatever the `image` crate was built with (PNG, JPEG, BMP,
/// WebP). Grayscale inputs are expanded to three equal channels and
/// alpha is dropped.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt.
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let img = image::load_from_memory(bytes)?;
    Ok(img.to_rgb8())
}

/// Decode raw image bytes into a single-channel image.
///
/// Used for ground-truth and predicted masks, which are compared after
/// binarization so any 8-bit encoding is accepted.
///
/// # Errors
///
/// Same as [`decode_rgb`].
pub fn decode_gray(bytes: &[u8]) -> Result<GrayImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let img = image::load_from_memory(bytes)?;
    Ok(img.to_luma8())
}
