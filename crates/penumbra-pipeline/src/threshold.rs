//! Inverse thresholding of a cue channel into a binary mask.
//!
//! Dark pixels are the target class, so a pixel becomes foreground when
//! its sample is *at or below* the limit. Callers that want bright
//! regions must invert the channel themselves.
//!
//! This is stage 2 of the pipeline.

use image::Luma;

use crate::types::{BACKGROUND, FOREGROUND, GrayImage, Mask};

/// Threshold `channel` so that `channel[p] <= limit` becomes foreground.
///
/// `limit` is clamped to `0..=255`; any integer is accepted.
#[must_use = "returns the cue mask"]
pub fn threshold_dark(channel: &GrayImage, limit: i32) -> Mask {
    let limit = clamp_limit(limit);
    GrayImage::from_fn(channel.width(), channel.height(), |x, y| {
        if channel.get_pixel(x, y).0[0] <= limit {
            Luma([FOREGROUND])
        } else {
            Luma([BACKGROUND])
        }
    })
}

/// Clamp an integer threshold into the 8-bit sample range.
#[must_use]
pub fn clamp_limit(limit: i32) -> u8 {
    u8::try_from(limit.clamp(0, i32::from(u8::MAX))).unwrap_or(u8::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::count_foreground;

    fn uniform(value: u8) -> GrayImage {
        GrayImage::from_fn(100, 100, |_, _| Luma([value]))
    }

    #[test]
    fn mid_gray_below_limit_is_all_foreground() {
        let mask = threshold_dark(&uniform(128), 150);
        assert_eq!(count_foreground(&mask), 100 * 100);
        assert!(mask.pixels().all(|p| p.0[0] == FOREGROUND));
    }

    #[test]
    fn mid_gray_above_limit_is_all_background() {
        let mask = threshold_dark(&uniform(128), 50);
        assert_eq!(count_foreground(&mask), 0);
    }

    #[test]
    fn limit_is_inclusive() {
        let mask = threshold_dark(&uniform(128), 128);
        assert_eq!(count_foreground(&mask), 100 * 100);
        let mask = threshold_dark(&uniform(128), 127);
        assert_eq!(count_foreground(&mask), 0);
    }

    #[test]
    fn out_of_range_limits_are_clamped() {
        assert_eq!(clamp_limit(-20), 0);
        assert_eq!(clamp_limit(300), 255);
        assert_eq!(clamp_limit(42), 42);

        // 300 behaves as 255: everything is dark enough.
        let mask = threshold_dark(&uniform(255), 300);
        assert_eq!(count_foreground(&mask), 100 * 100);

        // -5 behaves as 0: only pure black survives.
        let mut img = uniform(1);
        img.put_pixel(3, 4, Luma([0]));
        let mask = threshold_dark(&img, -5);
        assert_eq!(count_foreground(&mask), 1);
        assert_eq!(mask.get_pixel(3, 4).0[0], FOREGROUND);
    }

    #[test]
    fn output_is_binary_with_input_dimensions() {
        let img = GrayImage::from_fn(13, 7, |x, y| Luma([u8::try_from(x * 19 + y).unwrap_or(0)]));
        let mask = threshold_dark(&img, 100);
        assert_eq!(mask.dimensions(), (13, 7));
        assert!(mask.pixels().all(|p| p.0[0] == FOREGROUND || p.0[0] == BACKGROUND));
    }
}
