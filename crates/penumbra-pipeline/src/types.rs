//! Shared types for the penumbra segmentation pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Re-export `GrayImage` so downstream crates can reference
/// single-channel rasters and masks without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbImage` so downstream crates can reference the
/// color input and the overlay without depending on `image` directly.
pub use image::RgbImage;

/// A binary single-channel image whose samples are `0` or `255`.
///
/// Masks always share the width and height of the image they were
/// derived from. Every stage that consumes a mask checks both
/// properties and reports violations instead of correcting them.
pub type Mask = GrayImage;

/// Sample value of a foreground mask pixel.
pub const FOREGROUND: u8 = 255;

/// Sample value of a background mask pixel.
pub const BACKGROUND: u8 = 0;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Dimensions of any `image` buffer.
    #[must_use]
    pub fn of<P, C>(image: &image::ImageBuffer<P, C>) -> Self
    where
        P: image::Pixel,
        C: std::ops::Deref<Target = [P::Subpixel]>,
    {
        Self {
            width: image.width(),
            height: image.height(),
        }
    }

    /// Total pixel count (`width * height`).
    #[must_use]
    pub fn pixel_count(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Returns `true` if either side is zero.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// How cue masks are combined into one candidate mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FuseOp {
    /// Foreground where any cue fires (logical OR).
    ///
    /// A genuine shadow may satisfy only one cue, e.g. visible in
    /// brightness but not in lightness.
    #[default]
    Union,
    /// Foreground only where every cue fires (logical AND).
    Intersection,
}

impl fmt::Display for FuseOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Union => f.write_str("union"),
            Self::Intersection => f.write_str("intersection"),
        }
    }
}

/// Configuration for the segmentation pipeline.
///
/// Owned by the caller and passed into every invocation; no stage keeps
/// configuration between calls.
///
/// Threshold and alpha values are clamped into range when used.
/// Structural parameters (kernel size, minimum area) are checked by
/// [`validate`](Self::validate) and rejected with
/// [`PipelineError::InvalidConfig`] when out of range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Inclusive upper bound on the HSV value channel for a pixel to be
    /// considered dark. Clamped to `0..=255`.
    pub value_threshold: i32,

    /// Inclusive upper bound on the 8-bit LAB lightness channel.
    /// Clamped to `0..=255`.
    pub lightness_threshold: i32,

    /// How the value and lightness cues are combined.
    pub fuse_op: FuseOp,

    /// Side length of the elliptical structuring element. Must be odd,
    /// at least 1 and at most [`MAX_KERNEL_SIZE`](Self::MAX_KERNEL_SIZE).
    pub morph_kernel_size: u32,

    /// Number of dilations (then erosions) in the closing pass.
    /// Zero disables closing.
    pub morph_iterations: u32,

    /// Whether a single opening pass follows the closing.
    pub open_after_close: bool,

    /// Regions whose area is less than or equal to this are discarded.
    pub min_region_area: f64,

    /// Highlight color blended onto foreground pixels of the overlay.
    pub overlay_tint: [u8; 3],

    /// Overlay blend weight of the tint. Clamped to `0.0..=1.0`.
    pub overlay_alpha: f32,
}

impl PipelineConfig {
    /// Default HSV value threshold.
    pub const DEFAULT_VALUE_THRESHOLD: i32 = 80;
    /// Default LAB lightness threshold (the 8-bit lightness of an RGB
    /// gray with value 80).
    pub const DEFAULT_LIGHTNESS_THRESHOLD: i32 = 87;
    /// Default cue fusion.
    pub const DEFAULT_FUSE_OP: FuseOp = FuseOp::Union;
    /// Default structuring element size.
    pub const DEFAULT_MORPH_KERNEL_SIZE: u32 = 7;
    /// Default closing iterations.
    pub const DEFAULT_MORPH_ITERATIONS: u32 = 1;
    /// Default minimum region area in pixels.
    pub const DEFAULT_MIN_REGION_AREA: f64 = 500.0;
    /// Default overlay tint (pure red).
    pub const DEFAULT_OVERLAY_TINT: [u8; 3] = [255, 0, 0];
    /// Default overlay alpha.
    pub const DEFAULT_OVERLAY_ALPHA: f32 = 0.3;

    /// Largest accepted structuring element size.
    pub const MAX_KERNEL_SIZE: u32 = 255;

    /// Check the structural parameters.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if the kernel size is
    /// even, zero or larger than [`MAX_KERNEL_SIZE`](Self::MAX_KERNEL_SIZE),
    /// or if `min_region_area` is negative or not finite.
    pub fn validate(&self) -> Result<(), PipelineError> {
        crate::morphology::check_kernel_size(self.morph_kernel_size)?;
        if !self.min_region_area.is_finite() || self.min_region_area < 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "min_region_area must be a finite value >= 0, got {}",
                self.min_region_area
            )));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            value_threshold: Self::DEFAULT_VALUE_THRESHOLD,
            lightness_threshold: Self::DEFAULT_LIGHTNESS_THRESHOLD,
            fuse_op: Self::DEFAULT_FUSE_OP,
            morph_kernel_size: Self::DEFAULT_MORPH_KERNEL_SIZE,
            morph_iterations: Self::DEFAULT_MORPH_ITERATIONS,
            open_after_close: true,
            min_region_area: Self::DEFAULT_MIN_REGION_AREA,
            overlay_tint: Self::DEFAULT_OVERLAY_TINT,
            overlay_alpha: Self::DEFAULT_OVERLAY_ALPHA,
        }
    }
}

/// Result of running the pipeline with every intermediate preserved.
///
/// Each field captures the output of one stage, in pipeline order.
/// Used for debug snapshots and diagnostics.
#[derive(Debug, Clone)]
pub struct StagedResult {
    /// Input color image.
    pub original: RgbImage,
    /// Stage 1: HSV value channel.
    pub value: GrayImage,
    /// Stage 1: 8-bit LAB lightness channel.
    pub lightness: GrayImage,
    /// Stage 2: dark-value cue mask.
    pub value_mask: Mask,
    /// Stage 2: dark-lightness cue mask.
    pub lightness_mask: Mask,
    /// Stage 3: fused candidate mask.
    pub fused: Mask,
    /// Stage 4: morphologically cleaned mask.
    pub cleaned: Mask,
    /// Stage 5: area-filtered final mask.
    pub filtered: Mask,
    /// Number of regions kept by the area filter.
    pub regions_kept: usize,
    /// Number of regions discarded by the area filter.
    pub regions_dropped: usize,
    /// Stage 6: translucent highlight of the final mask.
    pub overlay: RgbImage,
    /// Input dimensions in pixels.
    pub dimensions: Dimensions,
}

impl StagedResult {
    /// The final mask.
    #[must_use]
    pub const fn mask(&self) -> &Mask {
        &self.filtered
    }

    /// Every stage image paired with its snapshot file stem, in
    /// pipeline order.
    #[must_use]
    pub fn snapshots(&self) -> Vec<Snapshot<'_>> {
        vec![
            Snapshot::gray("step1_value", &self.value),
            Snapshot::gray("step1_lightness", &self.lightness),
            Snapshot::gray("step2_value_mask", &self.value_mask),
            Snapshot::gray("step2_lightness_mask", &self.lightness_mask),
            Snapshot::gray("step3_fused", &self.fused),
            Snapshot::gray("step4_cleaned", &self.cleaned),
            Snapshot::gray("step5_area_filtered", &self.filtered),
            Snapshot::rgb("step6_overlay", &self.overlay),
        ]
    }
}

/// One named stage image of a [`StagedResult`].
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
    /// File stem for the snapshot (no extension).
    pub name: &'static str,
    /// The stage image.
    pub image: SnapshotImage<'a>,
}

/// Borrowed raster of a [`Snapshot`].
#[derive(Debug, Clone, Copy)]
pub enum SnapshotImage<'a> {
    /// Single-channel raster (feature channel or mask).
    Gray(&'a GrayImage),
    /// Three-channel raster (overlay).
    Rgb(&'a RgbImage),
}

impl<'a> Snapshot<'a> {
    const fn gray(name: &'static str, image: &'a GrayImage) -> Self {
        Self {
            name,
            image: SnapshotImage::Gray(image),
        }
    }

    const fn rgb(name: &'static str, image: &'a RgbImage) -> Self {
        Self {
            name,
            image: SnapshotImage::Rgb(image),
        }
    }
}

/// Errors that can occur during pipeline processing.
///
/// Every variant except [`ImageDecode`](Self::ImageDecode) is an
/// invalid-input error: detected before any stage produces output and
/// recoverable by skipping the offending item.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// The image has zero width or height.
    #[error("image has zero width or height ({0})")]
    EmptyImage(Dimensions),

    /// Two rasters that must share dimensions do not.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimensions of the reference raster.
        expected: Dimensions,
        /// Dimensions of the offending raster.
        actual: Dimensions,
    },

    /// A mask contains a sample other than 0 or 255.
    #[error("mask is not binary: found sample value {value} at ({x}, {y})")]
    NonBinaryMask {
        /// The offending sample.
        value: u8,
        /// Column of the first offending pixel.
        x: u32,
        /// Row of the first offending pixel.
        y: u32,
    },

    /// Mask fusion was given no masks.
    #[error("no masks to fuse")]
    NoMasks,

    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),
}

impl PipelineError {
    /// Whether this error reports invalid caller input (as opposed to an
    /// undecodable image).
    #[must_use]
    pub const fn is_invalid_input(&self) -> bool {
        !matches!(self, Self::ImageDecode(_))
    }
}

/// Check that `actual` has the same dimensions as `expected`.
pub(crate) fn ensure_same_dimensions<P, Q, C, D>(
    expected: &image::ImageBuffer<P, C>,
    actual: &image::ImageBuffer<Q, D>,
) -> Result<Dimensions, PipelineError>
where
    P: image::Pixel,
    Q: image::Pixel,
    C: std::ops::Deref<Target = [P::Subpixel]>,
    D: std::ops::Deref<Target = [Q::Subpixel]>,
{
    let expected = Dimensions::of(expected);
    let actual = Dimensions::of(actual);
    if expected == actual {
        Ok(expected)
    } else {
        Err(PipelineError::DimensionMismatch { expected, actual })
    }
}

/// Check that every sample of `mask` is [`FOREGROUND`] or [`BACKGROUND`].
pub(crate) fn ensure_binary(mask: &Mask) -> Result<(), PipelineError> {
    match mask
        .enumerate_pixels()
        .find(|(_, _, p)| p.0[0] != FOREGROUND && p.0[0] != BACKGROUND)
    {
        Some((x, y, p)) => Err(PipelineError::NonBinaryMask { value: p.0[0], x, y }),
        None => Ok(()),
    }
}

/// Count foreground (non-zero) pixels.
#[must_use]
pub fn count_foreground(mask: &GrayImage) -> u64 {
    mask.as_raw().iter().map(|&v| u64::from(v != 0)).sum()
}
