//! Incremental pipeline: advance stage-by-stage, inspecting each
//! intermediate result before continuing.
//!
//! Unlike [`crate::process_staged`] which runs the entire pipeline in one
//! call, [`Pipeline`] lets the caller drive execution one step at a time:
//!
//! ```rust
//! # use penumbra_pipeline::{Pipeline, PipelineConfig, PipelineError, RgbImage};
//! # fn run(image: RgbImage) -> Result<(), PipelineError> {
//! let staged = Pipeline::new(image, PipelineConfig::default())
//!     .extract()?
//!     .threshold()
//!     .fuse()?
//!     .clean()?
//!     .filter()?
//!     .composite()?
//!     .into_result();
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next state, which
//! wraps the previous one. Accessors on every state expose that stage's
//! output, and the accessors of earlier stages stay reachable through
//! [`previous`](Thresholded::previous)-style methods.
//!
//! The configuration is validated once, when leaving [`Pending`]. Later
//! stages still return `Result` because they re-check their own input
//! invariants; with a validated configuration they do not fail.

use image::Rgb;

use crate::color::ColorFeatures;
use crate::region::AreaFilterResult;
use crate::types::{
    Dimensions, GrayImage, Mask, PipelineConfig, PipelineError, RgbImage, StagedResult,
};

/// Entry point for the incremental pipeline.
///
/// ```rust
/// # use penumbra_pipeline::{Pipeline, PipelineConfig, RgbImage};
/// let pending = Pipeline::new(RgbImage::new(4, 4), PipelineConfig::default());
/// assert_eq!(pending.original().width(), 4);
/// ```
pub struct Pipeline;

impl Pipeline {
    /// Create a new pipeline over `original` with `config`.
    ///
    /// No processing is performed until [`Pending::extract`] is called.
    #[allow(clippy::new_ret_no_self)]
    pub const fn new(original: RgbImage, config: PipelineConfig) -> Pending {
        Pending { config, original }
    }
}

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Pipeline state before any processing has occurred.
#[must_use = "pipeline stages are consumed by advancing; call .extract() to continue"]
pub struct Pending {
    config: PipelineConfig,
    original: RgbImage,
}

impl Pending {
    /// The input image.
    #[must_use]
    pub const fn original(&self) -> &RgbImage {
        &self.original
    }

    /// Validate the configuration, derive the value and lightness
    /// channels and advance to [`Extracted`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] for an unusable
    /// configuration and [`PipelineError::EmptyImage`] for an image
    /// with zero width or height.
    pub fn extract(self) -> Result<Extracted, PipelineError> {
        self.config.validate()?;
        let features = crate::color::extract(&self.original)?;
        Ok(Extracted {
            dimensions: Dimensions::of(&self.original),
            config: self.config,
            original: self.original,
            features,
        })
    }
}

// ───────────────────────── Stage 1: Extracted ────────────────────────

/// Pipeline state after color feature extraction.
#[must_use = "pipeline stages are consumed by advancing; call .threshold() to continue"]
pub struct Extracted {
    config: PipelineConfig,
    original: RgbImage,
    dimensions: Dimensions,
    features: ColorFeatures,
}

impl Extracted {
    /// HSV value channel.
    #[must_use]
    pub const fn value(&self) -> &GrayImage {
        &self.features.value
    }

    /// 8-bit LAB lightness channel.
    #[must_use]
    pub const fn lightness(&self) -> &GrayImage {
        &self.features.lightness
    }

    /// Input dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Threshold both channels and advance to [`Thresholded`].
    pub fn threshold(self) -> Thresholded {
        let value_mask =
            crate::threshold::threshold_dark(&self.features.value, self.config.value_threshold);
        let lightness_mask = crate::threshold::threshold_dark(
            &self.features.lightness,
            self.config.lightness_threshold,
        );
        Thresholded {
            previous: self,
            value_mask,
            lightness_mask,
        }
    }
}

// ───────────────────────── Stage 2: Thresholded ──────────────────────

/// Pipeline state after thresholding the cue channels.
#[must_use = "pipeline stages are consumed by advancing; call .fuse() to continue"]
pub struct Thresholded {
    previous: Extracted,
    value_mask: Mask,
    lightness_mask: Mask,
}

impl Thresholded {
    /// The extraction stage this one was derived from.
    #[must_use]
    pub const fn previous(&self) -> &Extracted {
        &self.previous
    }

    /// Dark-value cue mask.
    #[must_use]
    pub const fn value_mask(&self) -> &Mask {
        &self.value_mask
    }

    /// Dark-lightness cue mask.
    #[must_use]
    pub const fn lightness_mask(&self) -> &Mask {
        &self.lightness_mask
    }

    /// Fuse the cue masks and advance to [`Fused`].
    ///
    /// # Errors
    ///
    /// Propagates [`crate::fuse::fuse`] errors.
    pub fn fuse(self) -> Result<Fused, PipelineError> {
        let fused = crate::fuse::fuse(
            &[&self.value_mask, &self.lightness_mask],
            self.previous.config.fuse_op,
        )?;
        Ok(Fused {
            previous: self,
            fused,
        })
    }
}

// ───────────────────────── Stage 3: Fused ────────────────────────────

/// Pipeline state after cue fusion.
#[must_use = "pipeline stages are consumed by advancing; call .clean() to continue"]
pub struct Fused {
    previous: Thresholded,
    fused: Mask,
}

impl Fused {
    /// The thresholding stage this one was derived from.
    #[must_use]
    pub const fn previous(&self) -> &Thresholded {
        &self.previous
    }

    /// Fused candidate mask.
    #[must_use]
    pub const fn fused(&self) -> &Mask {
        &self.fused
    }

    /// Apply morphological cleanup and advance to [`Cleaned`].
    ///
    /// # Errors
    ///
    /// Propagates [`crate::morphology::clean`] errors.
    pub fn clean(self) -> Result<Cleaned, PipelineError> {
        let config = &self.previous.previous.config;
        let cleaned = crate::morphology::clean(
            &self.fused,
            config.morph_kernel_size,
            config.morph_iterations,
            config.open_after_close,
        )?;
        Ok(Cleaned {
            previous: self,
            cleaned,
        })
    }
}

// ───────────────────────── Stage 4: Cleaned ──────────────────────────

/// Pipeline state after morphological cleanup.
#[must_use = "pipeline stages are consumed by advancing; call .filter() to continue"]
pub struct Cleaned {
    previous: Fused,
    cleaned: Mask,
}

impl Cleaned {
    /// The fusion stage this one was derived from.
    #[must_use]
    pub const fn previous(&self) -> &Fused {
        &self.previous
    }

    /// Cleaned mask.
    #[must_use]
    pub const fn cleaned(&self) -> &Mask {
        &self.cleaned
    }

    /// Drop small regions and advance to [`Filtered`].
    ///
    /// # Errors
    ///
    /// Propagates [`crate::region::filter_by_area`] errors.
    pub fn filter(self) -> Result<Filtered, PipelineError> {
        let min_area = self.config().min_region_area;
        let filtered = crate::region::filter_by_area(&self.cleaned, min_area)?;
        Ok(Filtered {
            previous: self,
            filtered,
        })
    }

    const fn config(&self) -> &PipelineConfig {
        &self.previous.previous.previous.config
    }
}

// ───────────────────────── Stage 5: Filtered ─────────────────────────

/// Pipeline state after the area filter. Its mask is the final mask.
#[must_use = "pipeline stages are consumed by advancing; call .composite() to continue"]
pub struct Filtered {
    previous: Cleaned,
    filtered: AreaFilterResult,
}

impl Filtered {
    /// The cleanup stage this one was derived from.
    #[must_use]
    pub const fn previous(&self) -> &Cleaned {
        &self.previous
    }

    /// Final mask.
    #[must_use]
    pub const fn mask(&self) -> &Mask {
        &self.filtered.mask
    }

    /// Number of regions kept.
    #[must_use]
    pub const fn regions_kept(&self) -> usize {
        self.filtered.kept
    }

    /// Number of regions discarded.
    #[must_use]
    pub const fn regions_dropped(&self) -> usize {
        self.filtered.dropped
    }

    /// Blend the final mask over the input and advance to [`Composited`].
    ///
    /// # Errors
    ///
    /// Propagates [`crate::overlay::composite`] errors.
    pub fn composite(self) -> Result<Composited, PipelineError> {
        let extracted = &self.previous.previous.previous.previous;
        let overlay = crate::overlay::composite(
            &extracted.original,
            &self.filtered.mask,
            Rgb(extracted.config.overlay_tint),
            extracted.config.overlay_alpha,
        )?;
        Ok(Composited {
            previous: self,
            overlay,
        })
    }
}

// ───────────────────────── Stage 6: Composited ───────────────────────

/// Terminal pipeline state.
#[must_use = "call .into_result() to extract the StagedResult"]
pub struct Composited {
    previous: Filtered,
    overlay: RgbImage,
}

impl Composited {
    /// The area-filter stage this one was derived from.
    #[must_use]
    pub const fn previous(&self) -> &Filtered {
        &self.previous
    }

    /// Translucent highlight of the final mask.
    #[must_use]
    pub const fn overlay(&self) -> &RgbImage {
        &self.overlay
    }

    /// Unwrap every intermediate into a [`StagedResult`].
    #[must_use]
    pub fn into_result(self) -> StagedResult {
        let Filtered {
            previous: cleaned_stage,
            filtered,
        } = self.previous;
        let Cleaned {
            previous: fused_stage,
            cleaned,
        } = cleaned_stage;
        let Fused {
            previous: thresholded,
            fused,
        } = fused_stage;
        let Thresholded {
            previous: extracted,
            value_mask,
            lightness_mask,
        } = thresholded;
        let Extracted {
            original,
            dimensions,
            features,
            ..
        } = extracted;

        StagedResult {
            original,
            value: features.value,
            lightness: features.lightness,
            value_mask,
            lightness_mask,
            fused,
            cleaned,
            filtered: filtered.mask,
            regions_kept: filtered.kept,
            regions_dropped: filtered.dropped,
            overlay: self.overlay,
            dimensions,
        }
    }
}
