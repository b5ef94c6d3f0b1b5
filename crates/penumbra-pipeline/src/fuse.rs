//! Combining cue masks into one candidate mask.
//!
//! This is stage 3 of the pipeline.

use crate::types::{
    BACKGROUND, FOREGROUND, FuseOp, Mask, PipelineError, ensure_binary, ensure_same_dimensions,
};

/// Combine `masks` pixel-wise with `op`.
///
/// A single mask is returned unchanged regardless of `op`.
///
/// # Errors
///
/// Returns [`PipelineError::NoMasks`] if `masks` is empty,
/// [`PipelineError::DimensionMismatch`] if the masks differ in size and
/// [`PipelineError::NonBinaryMask`] if any mask holds a value other than
/// 0 or 255.
pub fn fuse(masks: &[&Mask], op: FuseOp) -> Result<Mask, PipelineError> {
    let (first, rest) = masks.split_first().ok_or(PipelineError::NoMasks)?;
    ensure_binary(first)?;
    for mask in rest {
        ensure_same_dimensions(first, mask)?;
        ensure_binary(mask)?;
    }

    let mut fused = (*first).clone();
    for mask in rest {
        for (out, &sample) in fused.iter_mut().zip(mask.as_raw()) {
            let hit = match op {
                FuseOp::Union => *out == FOREGROUND || sample == FOREGROUND,
                FuseOp::Intersection => *out == FOREGROUND && sample == FOREGROUND,
            };
            *out = if hit { FOREGROUND } else { BACKGROUND };
        }
    }
    Ok(fused)
}
