//! Auxiliary color channels used as shadow cues.
//!
//! Two single-channel rasters are derived from the RGB input:
//!
//! - **value**: the V channel of HSV, `max(R, G, B)`. Range preserving.
//! - **lightness**: the L\* channel of CIE LAB (D65, sRGB transfer
//!   curve), scaled from `0..=100` to `0..=255` as 8-bit LAB images
//!   conventionally store it.
//!
//! This is stage 1 of the pipeline.

use image::Luma;

use crate::types::{Dimensions, GrayImage, PipelineError, RgbImage};

/// CIE threshold between the linear and cube-root segments of `f(t)`.
const LAB_EPSILON: f32 = 0.008_856;

/// Slope of the linear segment (`(29/3)^3`).
const LAB_KAPPA: f32 = 903.3;

/// Luminance weights of the linear sRGB primaries (D65).
const LUMA_R: f32 = 0.212_671;
const LUMA_G: f32 = 0.715_160;
const LUMA_B: f32 = 0.072_169;

/// The derived cue channels of one input image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorFeatures {
    /// HSV value channel.
    pub value: GrayImage,
    /// 8-bit LAB lightness channel.
    pub lightness: GrayImage,
}

/// Derive the value and lightness channels of `image`.
///
/// Both outputs have the dimensions of the input.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyImage`] if the image has zero width or
/// height.
pub fn extract(image: &RgbImage) -> Result<ColorFeatures, PipelineError> {
    let dimensions = Dimensions::of(image);
    if dimensions.is_empty() {
        return Err(PipelineError::EmptyImage(dimensions));
    }

    let lut = linear_lut();
    let value = GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b] = image.get_pixel(x, y).0;
        Luma([r.max(g).max(b)])
    });
    let lightness = GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b] = image.get_pixel(x, y).0;
        Luma([lightness_from_linear(
            lut[usize::from(r)],
            lut[usize::from(g)],
            lut[usize::from(b)],
        )])
    });

    Ok(ColorFeatures { value, lightness })
}

/// Linearized sRGB value for every 8-bit code.
fn linear_lut() -> [f32; 256] {
    std::array::from_fn(|i| srgb_to_linear(u8::try_from(i).unwrap_or(u8::MAX)))
}

/// Inverse sRGB transfer function, `0..=255` to `0.0..=1.0`.
fn srgb_to_linear(code: u8) -> f32 {
    let c = f32::from(code) / 255.0;
    if c <= 0.040_45 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn lightness_from_linear(r: f32, g: f32, b: f32) -> u8 {
    let y = LUMA_B.mul_add(b, LUMA_R.mul_add(r, LUMA_G * g));
    let l = if y > LAB_EPSILON {
        116.0f32.mul_add(y.cbrt(), -16.0)
    } else {
        LAB_KAPPA * y
    };
    (l * 255.0 / 100.0).round().clamp(0.0, 255.0) as u8
}
