//! Scoring predicted masks against ground truth.
//!
//! Two conventions are kept as separate operations because their edge
//! cases differ:
//!
//! - [`evaluate_region_mask`]: pixel accuracy and IoU for filled region
//!   masks. An empty union scores an IoU of `0.0`, so an all-background
//!   predictor is never rewarded for an all-background ground truth.
//! - [`evaluate_edge_mask`]: precision, recall and F1 for line masks.
//!   Each side is matched against the other dilated once with a 3x3
//!   square, which tolerates one-pixel misalignment.
//!
//! Both binarize their inputs at [`BINARIZE_LEVEL`] first, so any 8-bit
//! mask encoding is accepted.
//!
//! [`EvaluationReport`] implements the batch protocol: failed pairs are
//! recorded as skipped and excluded from the averages.

use imageproc::morphology::{Mask as StructuringElement, grayscale_dilate};
use serde::{Deserialize, Serialize};

use crate::types::{
    BACKGROUND, Dimensions, FOREGROUND, GrayImage, PipelineError, ensure_same_dimensions,
};

/// Samples strictly above this level count as foreground.
pub const BINARIZE_LEVEL: u8 = 127;

/// Pixel accuracy and intersection-over-union of a region mask.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionScores {
    /// Fraction of pixels on which prediction and ground truth agree.
    pub pixel_accuracy: f64,
    /// `|intersection| / |union|`, or `0.0` for an empty union.
    pub iou: f64,
}

/// Tolerant precision, recall and F1 of an edge mask.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeScores {
    /// Matched predicted pixels over all predicted pixels.
    pub precision: f64,
    /// Matched ground-truth pixels over all ground-truth pixels.
    pub recall: f64,
    /// Harmonic mean of precision and recall.
    pub f1: f64,
}

/// A set of named scalar metrics that can be tabulated and averaged.
pub trait Metrics: Copy {
    /// Column headings, in the order of [`values`](Self::values).
    const COLUMNS: &'static [&'static str];

    /// Metric values in column order.
    fn values(&self) -> Vec<f64>;

    /// Arithmetic mean of each metric, or `None` for an empty slice.
    fn mean(items: &[Self]) -> Option<Self>;
}

#[allow(clippy::cast_precision_loss)]
fn mean_of<T>(items: &[T], field: impl Fn(&T) -> f64) -> f64 {
    items.iter().map(field).sum::<f64>() / items.len() as f64
}

impl Metrics for RegionScores {
    const COLUMNS: &'static [&'static str] = &["Pixel_Accuracy", "IoU"];

    fn values(&self) -> Vec<f64> {
        vec![self.pixel_accuracy, self.iou]
    }

    fn mean(items: &[Self]) -> Option<Self> {
        if items.is_empty() {
            return None;
        }
        Some(Self {
            pixel_accuracy: mean_of(items, |s| s.pixel_accuracy),
            iou: mean_of(items, |s| s.iou),
        })
    }
}

impl Metrics for EdgeScores {
    const COLUMNS: &'static [&'static str] = &["Precision", "Recall", "F1-Score"];

    fn values(&self) -> Vec<f64> {
        vec![self.precision, self.recall, self.f1]
    }

    fn mean(items: &[Self]) -> Option<Self> {
        if items.is_empty() {
            return None;
        }
        Some(Self {
            precision: mean_of(items, |s| s.precision),
            recall: mean_of(items, |s| s.recall),
            f1: mean_of(items, |s| s.f1),
        })
    }
}

/// Binarize at [`BINARIZE_LEVEL`]: above becomes 255, the rest 0.
#[must_use = "returns the binarized mask"]
pub fn binarize(image: &GrayImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        if image.get_pixel(x, y).0[0] > BINARIZE_LEVEL {
            image::Luma([FOREGROUND])
        } else {
            image::Luma([BACKGROUND])
        }
    })
}

fn check_pair(ground_truth: &GrayImage, predicted: &GrayImage) -> Result<Dimensions, PipelineError> {
    let dimensions = ensure_same_dimensions(ground_truth, predicted)?;
    if dimensions.is_empty() {
        return Err(PipelineError::EmptyImage(dimensions));
    }
    Ok(dimensions)
}

/// Ratio that is `0.0` when the denominator is zero.
#[allow(clippy::cast_precision_loss)]
fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Score a predicted region mask against its ground truth.
///
/// # Errors
///
/// Returns [`PipelineError::DimensionMismatch`] if the masks differ in
/// size and [`PipelineError::EmptyImage`] if they have no pixels.
pub fn evaluate_region_mask(
    ground_truth: &GrayImage,
    predicted: &GrayImage,
) -> Result<RegionScores, PipelineError> {
    let dimensions = check_pair(ground_truth, predicted)?;

    let mut intersection = 0u64;
    let mut union = 0u64;
    for (&g, &p) in ground_truth.as_raw().iter().zip(predicted.as_raw()) {
        let g = g > BINARIZE_LEVEL;
        let p = p > BINARIZE_LEVEL;
        intersection += u64::from(g && p);
        union += u64::from(g || p);
    }

    let total = dimensions.pixel_count();
    let agreement = intersection + (total - union);
    Ok(RegionScores {
        pixel_accuracy: ratio(agreement, total),
        iou: ratio(intersection, union),
    })
}

/// Score a predicted edge mask against its ground truth with a
/// one-pixel tolerance.
///
/// A predicted pixel matches when it falls on the ground truth dilated
/// by a 3x3 square, and a ground-truth pixel matches when it falls on
/// the equally dilated prediction. Precision is the matched share of
/// predicted pixels and recall the matched share of ground-truth
/// pixels, so both stay within `[0, 1]`. Any metric with a zero
/// denominator is `0.0`.
///
/// # Errors
///
/// Returns [`PipelineError::DimensionMismatch`] if the masks differ in
/// size and [`PipelineError::EmptyImage`] if they have no pixels.
pub fn evaluate_edge_mask(
    ground_truth: &GrayImage,
    predicted: &GrayImage,
) -> Result<EdgeScores, PipelineError> {
    check_pair(ground_truth, predicted)?;

    let tolerance = StructuringElement::square(1);
    let gt = binarize(ground_truth);
    let pred = binarize(predicted);
    let tolerant_gt = grayscale_dilate(&gt, &tolerance);
    let tolerant_pred = grayscale_dilate(&pred, &tolerance);

    let mut matched_pred = 0u64;
    let mut matched_gt = 0u64;
    let mut predicted_total = 0u64;
    let mut gt_total = 0u64;
    for (((&g, &p), &tg), &tp) in gt
        .as_raw()
        .iter()
        .zip(pred.as_raw())
        .zip(tolerant_gt.as_raw())
        .zip(tolerant_pred.as_raw())
    {
        let g = g == FOREGROUND;
        let p = p == FOREGROUND;
        predicted_total += u64::from(p);
        gt_total += u64::from(g);
        matched_pred += u64::from(p && tg == FOREGROUND);
        matched_gt += u64::from(g && tp == FOREGROUND);
    }

    let precision = ratio(matched_pred, predicted_total);
    let recall = ratio(matched_gt, gt_total);
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };
    Ok(EdgeScores {
        precision,
        recall,
        f1,
    })
}

/// Scores of one successfully evaluated pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluated<S> {
    /// Row name, usually the ground-truth file name.
    pub name: String,
    /// The pair's scores.
    pub scores: S,
}

/// A pair that could not be evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skipped {
    /// Row name of the pair.
    pub name: String,
    /// Why the pair was skipped.
    pub reason: String,
}

/// Per-pair scores of one batch run plus the pairs that were skipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport<S> {
    /// Successfully evaluated pairs, in input order.
    pub entries: Vec<Evaluated<S>>,
    /// Pairs excluded from the report, in input order.
    pub skipped: Vec<Skipped>,
}

impl<S> Default for EvaluationReport<S> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

impl<S: Metrics> EvaluationReport<S> {
    /// Build a report from per-pair outcomes, preserving their order.
    pub fn from_results<N, E>(results: impl IntoIterator<Item = (N, Result<S, E>)>) -> Self
    where
        N: Into<String>,
        E: std::fmt::Display,
    {
        let mut report = Self::default();
        for (name, result) in results {
            report.record(name, result);
        }
        report
    }

    /// Append one pair outcome.
    pub fn record<E: std::fmt::Display>(&mut self, name: impl Into<String>, result: Result<S, E>) {
        let name = name.into();
        match result {
            Ok(scores) => self.entries.push(Evaluated { name, scores }),
            Err(e) => self.skipped.push(Skipped {
                name,
                reason: e.to_string(),
            }),
        }
    }

    /// Mean of every metric over the evaluated pairs only, or `None`
    /// if no pair was evaluated.
    #[must_use]
    pub fn average(&self) -> Option<S> {
        let scores: Vec<S> = self.entries.iter().map(|e| e.scores).collect();
        S::mean(&scores)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::Luma;

    use super::*;

    const EPS: f64 = 1e-12;

    fn square(size: u32, x0: u32, y0: u32, side: u32) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            if (x0..x0 + side).contains(&x) && (y0..y0 + side).contains(&y) {
                Luma([FOREGROUND])
            } else {
                Luma([BACKGROUND])
            }
        })
    }

    #[test]
    fn self_comparison_is_perfect() {
        let m = square(50, 10, 10, 20);
        let scores = evaluate_region_mask(&m, &m).unwrap();
        assert!((scores.iou - 1.0).abs() < EPS);
        assert!((scores.pixel_accuracy - 1.0).abs() < EPS);
    }

    #[test]
    fn empty_versus_empty_scores_zero_iou() {
        let m = GrayImage::new(50, 50);
        let scores = evaluate_region_mask(&m, &m).unwrap();
        assert!(scores.iou.abs() < EPS);
        assert!((scores.pixel_accuracy - 1.0).abs() < EPS);
    }

    #[test]
    fn diagonal_shift_by_five() {
        // 20x20 squares at (0,0) and (5,5): overlap 15x15 = 225,
        // union 400 + 400 - 225 = 575.
        let gt = square(50, 0, 0, 20);
        let pred = square(50, 5, 5, 20);
        let scores = evaluate_region_mask(&gt, &pred).unwrap();
        assert!((scores.iou - 225.0 / 575.0).abs() < EPS);
        // Agreement: 225 overlap + (2500 - 575) shared background.
        assert!((scores.pixel_accuracy - 2150.0 / 2500.0).abs() < EPS);
    }

    #[test]
    fn horizontal_shift_by_five() {
        // Overlap 15x20 = 300, union 500.
        let gt = square(50, 0, 0, 20);
        let pred = GrayImage::from_fn(50, 50, |x, y| {
            Luma([if (5..25).contains(&x) && y < 20 { FOREGROUND } else { BACKGROUND }])
        });
        let scores = evaluate_region_mask(&gt, &pred).unwrap();
        assert!((scores.iou - 0.6).abs() < EPS);
        assert!((scores.pixel_accuracy - 2300.0 / 2500.0).abs() < EPS);
    }

    #[test]
    fn soft_masks_are_binarized_at_midpoint() {
        let gt = GrayImage::from_fn(2, 1, |x, _| Luma([if x == 0 { 128 } else { 127 }]));
        let pred = GrayImage::from_fn(2, 1, |x, _| Luma([if x == 0 { 255 } else { 0 }]));
        let scores = evaluate_region_mask(&gt, &pred).unwrap();
        assert!((scores.iou - 1.0).abs() < EPS);
    }

    #[test]
    fn region_dimension_mismatch_is_rejected() {
        let a = GrayImage::new(10, 10);
        let b = GrayImage::new(10, 11);
        assert!(matches!(
            evaluate_region_mask(&a, &b),
            Err(PipelineError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            evaluate_edge_mask(&a, &b),
            Err(PipelineError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn zero_sized_pair_is_rejected() {
        let a = GrayImage::new(0, 0);
        assert!(matches!(
            evaluate_region_mask(&a, &a),
            Err(PipelineError::EmptyImage(_))
        ));
    }

    fn vertical_line(x0: u32) -> GrayImage {
        GrayImage::from_fn(20, 20, |x, y| {
            Luma([if x == x0 && (2..18).contains(&y) { FOREGROUND } else { BACKGROUND }])
        })
    }

    #[test]
    fn edge_off_by_one_is_fully_matched() {
        let gt = vertical_line(10);
        let pred = vertical_line(11);
        let scores = evaluate_edge_mask(&gt, &pred).unwrap();
        assert!((scores.precision - 1.0).abs() < EPS);
        assert!((scores.recall - 1.0).abs() < EPS);
        assert!((scores.f1 - 1.0).abs() < EPS);
    }

    #[test]
    fn edge_off_by_two_is_unmatched() {
        let gt = vertical_line(10);
        let pred = vertical_line(12);
        let scores = evaluate_edge_mask(&gt, &pred).unwrap();
        assert!(scores.precision.abs() < EPS);
        assert!(scores.recall.abs() < EPS);
        assert!(scores.f1.abs() < EPS);
    }

    #[test]
    fn edge_partial_prediction() {
        // 8 of 16 predicted pixels sit on the line, the rest far away.
        // The dilated on-line run (y 1..=10) reaches 9 ground-truth rows.
        let gt = vertical_line(10);
        let pred = GrayImage::from_fn(20, 20, |x, y| {
            let on_line = x == 10 && (2..10).contains(&y);
            let far = x == 0 && (0..8).contains(&y);
            Luma([if on_line || far { FOREGROUND } else { BACKGROUND }])
        });
        let scores = evaluate_edge_mask(&gt, &pred).unwrap();
        assert!((scores.precision - 0.5).abs() < EPS);
        assert!((scores.recall - 9.0 / 16.0).abs() < EPS);
        assert!((scores.f1 - 9.0 / 17.0).abs() < EPS);
    }

    #[test]
    fn edge_empty_prediction_scores_zero() {
        let gt = vertical_line(10);
        let pred = GrayImage::new(20, 20);
        let scores = evaluate_edge_mask(&gt, &pred).unwrap();
        assert!(scores.precision.abs() < EPS);
        assert!(scores.recall.abs() < EPS);
        assert!(scores.f1.abs() < EPS);
    }

    #[test]
    fn thick_partial_band_recalls_only_covered_rows() {
        // A three-pixel-wide band over rows 2..8 of a 16-pixel line.
        // Dilated, it reaches rows 1..=8, covering 7 ground-truth pixels.
        let gt = vertical_line(10);
        let pred = GrayImage::from_fn(20, 20, |x, y| {
            Luma([if (9..=11).contains(&x) && (2..8).contains(&y) { FOREGROUND } else { BACKGROUND }])
        });
        let scores = evaluate_edge_mask(&gt, &pred).unwrap();
        assert!((scores.precision - 1.0).abs() < EPS);
        assert!((scores.recall - 7.0 / 16.0).abs() < EPS);
        assert!((scores.f1 - 14.0 / 23.0).abs() < EPS);
    }

    #[test]
    fn thick_full_band_scores_at_most_one() {
        let gt = vertical_line(10);
        let pred = GrayImage::from_fn(20, 20, |x, y| {
            Luma([if (9..=11).contains(&x) && (2..18).contains(&y) { FOREGROUND } else { BACKGROUND }])
        });
        let scores = evaluate_edge_mask(&gt, &pred).unwrap();
        assert!((scores.precision - 1.0).abs() < EPS);
        assert!((scores.recall - 1.0).abs() < EPS);
    }

    #[test]
    fn report_averages_only_successful_pairs() {
        let results: Vec<(&str, Result<RegionScores, PipelineError>)> = vec![
            (
                "a.png",
                Ok(RegionScores {
                    pixel_accuracy: 1.0,
                    iou: 0.5,
                }),
            ),
            ("b.png", Err(PipelineError::NoMasks)),
            (
                "c.png",
                Ok(RegionScores {
                    pixel_accuracy: 0.5,
                    iou: 0.25,
                }),
            ),
        ];
        let report = EvaluationReport::from_results(results);
        assert_eq!(report.entries.len(), 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].name, "b.png");
        assert_eq!(report.entries[1].name, "c.png");

        let avg = report.average().unwrap();
        assert!((avg.pixel_accuracy - 0.75).abs() < EPS);
        assert!((avg.iou - 0.375).abs() < EPS);
    }

    #[test]
    fn report_without_successes_has_no_average() {
        let mut report = EvaluationReport::<EdgeScores>::default();
        report.record("x", Err::<EdgeScores, _>("broken"));
        assert!(report.average().is_none());
        assert_eq!(report.skipped[0].reason, "broken");
    }

    #[test]
    fn columns_match_values() {
        let r = RegionScores {
            pixel_accuracy: 0.1,
            iou: 0.2,
        };
        assert_eq!(RegionScores::COLUMNS.len(), r.values().len());
        let e = EdgeScores {
            precision: 0.1,
            recall: 0.2,
            f1: 0.3,
        };
        assert_eq!(EdgeScores::COLUMNS.len(), e.values().len());
    }
}
