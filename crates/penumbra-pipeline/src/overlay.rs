//! Translucent highlight of a mask over the original image.
//!
//! Only foreground pixels are blended; background pixels are copied
//! through untouched so colors outside the detected regions are never
//! shifted.
//!
//! This is stage 6 of the pipeline.

use image::Rgb;

use crate::types::{FOREGROUND, Mask, PipelineError, RgbImage, ensure_binary, ensure_same_dimensions};

/// Blend `tint` into `original` wherever `mask` is foreground.
///
/// Each channel becomes `original * (1 - alpha) + tint * alpha`,
/// rounded to the nearest integer. `alpha` is clamped to `0.0..=1.0`
/// (NaN is treated as `0.0`).
///
/// # Errors
///
/// Returns [`PipelineError::DimensionMismatch`] if `mask` and
/// `original` differ in size and [`PipelineError::NonBinaryMask`] if
/// `mask` is not binary.
pub fn composite(
    original: &RgbImage,
    mask: &Mask,
    tint: Rgb<u8>,
    alpha: f32,
) -> Result<RgbImage, PipelineError> {
    ensure_same_dimensions(original, mask)?;
    ensure_binary(mask)?;
    let alpha = clamp_alpha(alpha);

    let mut result = original.clone();
    for (pixel, m) in result.pixels_mut().zip(mask.pixels()) {
        if m.0[0] != FOREGROUND {
            continue;
        }
        for (channel, &t) in pixel.0.iter_mut().zip(&tint.0) {
            *channel = blend(*channel, t, alpha);
        }
    }
    Ok(result)
}

/// Clamp `alpha` to `0.0..=1.0`, mapping NaN to `0.0`.
#[must_use]
pub fn clamp_alpha(alpha: f32) -> f32 {
    if alpha.is_nan() {
        0.0
    } else {
        alpha.clamp(0.0, 1.0)
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn blend(base: u8, tint: u8, alpha: f32) -> u8 {
    f32::from(tint)
        .mul_add(alpha, f32::from(base) * (1.0 - alpha))
        .round()
        .clamp(0.0, 255.0) as u8
}
