//! Morphological cleanup of the fused mask.
//!
//! A closing pass (dilate, then erode) fills small gaps inside shadow
//! regions; an optional opening pass (erode, then dilate) strips
//! isolated speckle. Closing runs first so that genuinely small regions
//! are consolidated before an opening could erase them.
//!
//! The structuring element is an ellipse inscribed in a `k x k` square,
//! built row by row so that a 3x3 element is a plus shape and larger
//! elements approach a disk. Dilation and erosion are delegated to
//! [`imageproc::morphology`].
//!
//! This is stage 4 of the pipeline.

use image::Luma;
use imageproc::morphology::{Mask as StructuringElement, grayscale_dilate, grayscale_erode};

use crate::types::{BACKGROUND, FOREGROUND, GrayImage, Mask, PipelineConfig, PipelineError, ensure_binary};

/// Check that `size` is a usable structuring element size.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `size` is zero, even, or
/// larger than [`PipelineConfig::MAX_KERNEL_SIZE`].
pub fn check_kernel_size(size: u32) -> Result<(), PipelineError> {
    if size == 0 || size % 2 == 0 {
        return Err(PipelineError::InvalidConfig(format!(
            "morph_kernel_size must be a positive odd integer, got {size}"
        )));
    }
    if size > PipelineConfig::MAX_KERNEL_SIZE {
        return Err(PipelineError::InvalidConfig(format!(
            "morph_kernel_size must be at most {}, got {size}",
            PipelineConfig::MAX_KERNEL_SIZE
        )));
    }
    Ok(())
}

/// Raster of the elliptical structuring element of side `size`.
///
/// Row `y` covers the columns within `round(r * sqrt(1 - (y - r)^2 / r^2))`
/// of the center, where `r = size / 2`.
///
/// # Errors
///
/// Same as [`check_kernel_size`].
pub fn elliptical_element_image(size: u32) -> Result<GrayImage, PipelineError> {
    check_kernel_size(size)?;
    let r = f64::from(size / 2);
    let inv_r2 = if r > 0.0 { 1.0 / (r * r) } else { 0.0 };
    Ok(GrayImage::from_fn(size, size, |x, y| {
        let dy = f64::from(y) - r;
        let half_width = (r * (r.mul_add(r, -dy * dy) * inv_r2).sqrt()).round();
        if (f64::from(x) - r).abs() <= half_width {
            Luma([FOREGROUND])
        } else {
            Luma([BACKGROUND])
        }
    }))
}

/// The elliptical structuring element of side `size`, centered.
fn elliptical_element(size: u32) -> Result<StructuringElement, PipelineError> {
    let image = elliptical_element_image(size)?;
    let center = u8::try_from(size / 2).map_err(|_| {
        PipelineError::InvalidConfig(format!("morph_kernel_size {size} is too large"))
    })?;
    Ok(StructuringElement::from_image(&image, center, center))
}

/// Close `mask` `iterations` times, then optionally open it once.
///
/// Closing applies `iterations` dilations followed by the same number
/// of erosions. With `iterations == 0` and `open == false` the mask is
/// returned unchanged.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] for an unusable
/// `kernel_size` and [`PipelineError::NonBinaryMask`] if `mask` is not
/// binary.
pub fn clean(
    mask: &Mask,
    kernel_size: u32,
    iterations: u32,
    open: bool,
) -> Result<Mask, PipelineError> {
    let element = elliptical_element(kernel_size)?;
    ensure_binary(mask)?;

    let mut cleaned = mask.clone();
    for _ in 0..iterations {
        cleaned = grayscale_dilate(&cleaned, &element);
    }
    for _ in 0..iterations {
        cleaned = grayscale_erode(&cleaned, &element);
    }
    if open {
        cleaned = grayscale_erode(&cleaned, &element);
        cleaned = grayscale_dilate(&cleaned, &element);
    }
    Ok(cleaned)
}
