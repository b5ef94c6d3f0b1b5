//! penumbra-pipeline: Pure shadow segmentation pipeline (sans-IO).
//!
//! Turns a color image into a binary mask of dark (shadow) regions
//! through:
//! color features -> cue thresholds -> fusion -> morphology ->
//! area filter -> overlay.
//!
//! It also scores predicted masks against ground truth, either as
//! filled regions ([`evaluate_region_mask`]) or as lines with a
//! one-pixel tolerance ([`evaluate_edge_mask`]).
//!
//! This crate has **no I/O dependencies**. It operates on in-memory
//! rasters and byte slices and returns structured data. Reading and
//! writing files lives in the `penumbra` binary.

pub mod color;
pub mod decode;
pub mod diagnostics;
pub mod evaluate;
pub mod fuse;
pub mod morphology;
pub mod overlay;
pub mod pipeline;
pub mod region;
pub mod threshold;
pub mod types;

pub use decode::{decode_gray, decode_rgb};
pub use evaluate::{
    EdgeScores, EvaluationReport, Metrics, RegionScores, evaluate_edge_mask, evaluate_region_mask,
};
pub use pipeline::Pipeline;
pub use region::{Region, extract_regions};
pub use types::{
    BACKGROUND, Dimensions, FOREGROUND, FuseOp, GrayImage, Mask, PipelineConfig, PipelineError,
    RgbImage, StagedResult,
};

/// Run the full segmentation pipeline and return the final mask.
///
/// # Pipeline steps
///
/// 1. Extract the HSV value and LAB lightness channels
/// 2. Threshold each channel for dark pixels (inclusive limit)
/// 3. Fuse the two cue masks (union or intersection)
/// 4. Close the fused mask, then optionally open it once
/// 5. Drop connected regions whose area does not exceed the minimum
///
/// The overlay step is skipped; use [`process_staged`] for it.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `config` fails
/// [`PipelineConfig::validate`] and [`PipelineError::EmptyImage`] if
/// `image` has zero width or height. Both are detected before any stage
/// runs.
pub fn process(image: &RgbImage, config: &PipelineConfig) -> Result<Mask, PipelineError> {
    let filtered = Pipeline::new(image.clone(), config.clone())
        .extract()?
        .threshold()
        .fuse()?
        .clean()?
        .filter()?;
    Ok(filtered.mask().clone())
}

/// Run the full pipeline, keeping every intermediate and the overlay.
///
/// # Errors
///
/// Same as [`process`].
pub fn process_staged(
    image: &RgbImage,
    config: &PipelineConfig,
) -> Result<StagedResult, PipelineError> {
    Ok(Pipeline::new(image.clone(), config.clone())
        .extract()?
        .threshold()
        .fuse()?
        .clean()?
        .filter()?
        .composite()?
        .into_result())
}
