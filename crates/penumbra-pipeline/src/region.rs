//! Connected regions of a mask and minimum-area filtering.
//!
//! A region is everything enclosed by one external boundary of the
//! mask: its 8-connected foreground pixels plus any holes they
//! surround (and anything nested inside those holes). Internal
//! structure never influences the area decision, so holes are filled
//! before regions are measured, and kept regions are written back
//! filled.
//!
//! Labelling uses [`imageproc::region_labelling::connected_components`];
//! boundaries are traced with [`imageproc::contours::find_contours`].
//!
//! This is stage 5 of the pipeline.

use image::Luma;
use imageproc::contours::{BorderType, find_contours};
use imageproc::point::Point;
use imageproc::region_labelling::{Connectivity, connected_components};
use serde::{Deserialize, Serialize};

use crate::types::{BACKGROUND, FOREGROUND, Mask, PipelineError, ensure_binary};

/// Axis-aligned pixel bounds of a region, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    /// Leftmost column.
    pub min_x: u32,
    /// Topmost row.
    pub min_y: u32,
    /// Rightmost column.
    pub max_x: u32,
    /// Bottom row.
    pub max_y: u32,
}

/// One externally bounded region of a mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    /// Label of the region in the filled mask, starting at 1.
    pub label: u32,
    /// Pixel count, holes included.
    pub area: u32,
    /// Pixel bounds.
    pub bounds: Bounds,
    /// Ordered external boundary points.
    pub contour: Vec<Point<u32>>,
}

/// Outcome of [`filter_by_area`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AreaFilterResult {
    /// Mask holding the kept regions, filled.
    pub mask: Mask,
    /// Number of regions kept.
    pub kept: usize,
    /// Number of regions discarded.
    pub dropped: usize,
}

/// Region labels of a hole-filled mask plus per-label statistics.
struct Labelled {
    labels: image::ImageBuffer<Luma<u32>, Vec<u32>>,
    /// Indexed by label; entry 0 is unused background.
    areas: Vec<u32>,
    bounds: Vec<Option<Bounds>>,
}

/// Fill every background area not connected to the image border.
///
/// Background connectivity is 4-neighbour, the dual of the
/// 8-neighbour foreground connectivity, so diagonal foreground steps
/// close a boundary.
fn fill_holes(mask: &Mask) -> Mask {
    let inverted = Mask::from_fn(mask.width(), mask.height(), |x, y| {
        Luma([!mask.get_pixel(x, y).0[0]])
    });
    let background = connected_components(&inverted, Connectivity::Four, Luma([BACKGROUND]));

    let (w, h) = mask.dimensions();
    let mut outside = vec![false; label_capacity(&background)];
    let border = (0..w)
        .flat_map(|x| [(x, 0), (x, h - 1)])
        .chain((0..h).flat_map(|y| [(0, y), (w - 1, y)]));
    for (x, y) in border {
        let label = background.get_pixel(x, y).0[0];
        if label != 0 {
            outside[label as usize] = true;
        }
    }

    Mask::from_fn(w, h, |x, y| {
        let label = background.get_pixel(x, y).0[0];
        if label != 0 && outside[label as usize] {
            Luma([BACKGROUND])
        } else {
            Luma([FOREGROUND])
        }
    })
}

fn label_capacity(labels: &image::ImageBuffer<Luma<u32>, Vec<u32>>) -> usize {
    labels.as_raw().iter().copied().max().unwrap_or(0) as usize + 1
}

fn label_filled(filled: &Mask) -> Labelled {
    let labels = connected_components(filled, Connectivity::Eight, Luma([BACKGROUND]));
    let capacity = label_capacity(&labels);
    let mut areas = vec![0u32; capacity];
    let mut bounds: Vec<Option<Bounds>> = vec![None; capacity];

    for (x, y, label) in labels.enumerate_pixels() {
        let label = label.0[0] as usize;
        if label == 0 {
            continue;
        }
        areas[label] += 1;
        bounds[label] = Some(match bounds[label] {
            Some(b) => Bounds {
                min_x: b.min_x.min(x),
                min_y: b.min_y.min(y),
                max_x: b.max_x.max(x),
                max_y: b.max_y.max(y),
            },
            None => Bounds {
                min_x: x,
                min_y: y,
                max_x: x,
                max_y: y,
            },
        });
    }

    Labelled {
        labels,
        areas,
        bounds,
    }
}

/// Extract every externally bounded region of `mask`, ordered by label
/// (raster order of each region's first pixel).
///
/// # Errors
///
/// Returns [`PipelineError::NonBinaryMask`] if `mask` is not binary.
pub fn extract_regions(mask: &Mask) -> Result<Vec<Region>, PipelineError> {
    ensure_binary(mask)?;
    if mask.width() == 0 || mask.height() == 0 {
        return Ok(Vec::new());
    }

    let filled = fill_holes(mask);
    let labelled = label_filled(&filled);

    let mut contours: Vec<Option<Vec<Point<u32>>>> = vec![None; labelled.areas.len()];
    for contour in find_contours::<u32>(&filled) {
        if contour.border_type != BorderType::Outer || contour.parent.is_some() {
            continue;
        }
        let Some(first) = contour.points.first() else {
            continue;
        };
        let label = labelled.labels.get_pixel(first.x, first.y).0[0] as usize;
        if label != 0 && contours[label].is_none() {
            contours[label] = Some(contour.points);
        }
    }

    Ok(labelled
        .bounds
        .iter()
        .enumerate()
        .filter_map(|(label, bounds)| {
            let bounds = (*bounds)?;
            Some(Region {
                label: u32::try_from(label).ok()?,
                area: labelled.areas[label],
                bounds,
                contour: contours[label].take().unwrap_or_default(),
            })
        })
        .collect())
}

/// Keep only regions whose area is strictly greater than `min_area`.
///
/// Kept regions are written as filled foreground; everything else
/// becomes background. A region whose area equals `min_area` is
/// discarded.
///
/// # Errors
///
/// Returns [`PipelineError::NonBinaryMask`] if `mask` is not binary and
/// [`PipelineError::InvalidConfig`] if `min_area` is negative or not
/// finite.
pub fn filter_by_area(mask: &Mask, min_area: f64) -> Result<AreaFilterResult, PipelineError> {
    if !min_area.is_finite() || min_area < 0.0 {
        return Err(PipelineError::InvalidConfig(format!(
            "min_region_area must be a finite value >= 0, got {min_area}"
        )));
    }
    ensure_binary(mask)?;
    if mask.width() == 0 || mask.height() == 0 {
        return Ok(AreaFilterResult {
            mask: mask.clone(),
            kept: 0,
            dropped: 0,
        });
    }

    let filled = fill_holes(mask);
    let labelled = label_filled(&filled);
    let keep: Vec<bool> = labelled
        .areas
        .iter()
        .enumerate()
        .map(|(label, &area)| label != 0 && f64::from(area) > min_area)
        .collect();
    let total = labelled.areas.iter().filter(|&&a| a > 0).count();
    let kept = keep.iter().filter(|&&k| k).count();

    let mask = Mask::from_fn(mask.width(), mask.height(), |x, y| {
        if keep[labelled.labels.get_pixel(x, y).0[0] as usize] {
            Luma([FOREGROUND])
        } else {
            Luma([BACKGROUND])
        }
    });

    Ok(AreaFilterResult {
        mask,
        kept,
        dropped: total - kept,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::count_foreground;

    fn rect(mask: &mut Mask, x0: u32, y0: u32, w: u32, h: u32) {
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                mask.put_pixel(x, y, Luma([FOREGROUND]));
            }
        }
    }

    /// Rasterized disk of integer radius centered in a 64x64 mask.
    fn disk(radius: i64) -> Mask {
        Mask::from_fn(64, 64, |x, y| {
            let dx = i64::from(x) - 32;
            let dy = i64::from(y) - 32;
            if dx * dx + dy * dy <= radius * radius {
                Luma([FOREGROUND])
            } else {
                Luma([BACKGROUND])
            }
        })
    }

    #[test]
    fn region_of_exact_threshold_area_is_dropped() {
        let mask = disk(8);
        let area = count_foreground(&mask);
        #[allow(clippy::cast_precision_loss)]
        let result = filter_by_area(&mask, area as f64).unwrap();
        assert_eq!(count_foreground(&result.mask), 0);
        assert_eq!(result.kept, 0);
        assert_eq!(result.dropped, 1);
    }

    #[test]
    fn region_one_pixel_above_threshold_is_kept() {
        let mut mask = disk(8);
        let area = count_foreground(&mask);
        // Grow the disk by one pixel at its rightmost point.
        mask.put_pixel(41, 32, Luma([FOREGROUND]));
        assert_eq!(count_foreground(&mask), area + 1);

        #[allow(clippy::cast_precision_loss)]
        let result = filter_by_area(&mask, area as f64).unwrap();
        assert_eq!(result.mask, mask);
        assert_eq!(result.kept, 1);
    }

    #[test]
    fn small_regions_are_removed_and_large_ones_kept() {
        let mut mask = Mask::new(50, 50);
        rect(&mut mask, 2, 2, 3, 3); // area 9
        rect(&mut mask, 20, 20, 10, 10); // area 100
        let result = filter_by_area(&mask, 50.0).unwrap();
        assert_eq!(result.kept, 1);
        assert_eq!(result.dropped, 1);
        assert_eq!(result.mask.get_pixel(3, 3).0[0], BACKGROUND);
        assert_eq!(result.mask.get_pixel(25, 25).0[0], FOREGROUND);
        assert_eq!(count_foreground(&result.mask), 100);
    }

    #[test]
    fn holes_count_toward_area_and_are_filled() {
        let mut mask = Mask::new(30, 30);
        rect(&mut mask, 5, 5, 10, 10);
        // Punch a 4x4 hole: 84 foreground pixels enclosing 16 hole pixels.
        for y in 8..12 {
            for x in 8..12 {
                mask.put_pixel(x, y, Luma([BACKGROUND]));
            }
        }
        assert_eq!(count_foreground(&mask), 84);

        let result = filter_by_area(&mask, 90.0).unwrap();
        assert_eq!(result.kept, 1);
        assert_eq!(count_foreground(&result.mask), 100);
        assert_eq!(result.mask.get_pixel(9, 9).0[0], FOREGROUND);
    }

    #[test]
    fn nested_island_belongs_to_enclosing_region() {
        let mut mask = Mask::new(40, 40);
        rect(&mut mask, 5, 5, 20, 20);
        for y in 8..22 {
            for x in 8..22 {
                mask.put_pixel(x, y, Luma([BACKGROUND]));
            }
        }
        rect(&mut mask, 13, 13, 3, 3); // island inside the hole
        let regions = extract_regions(&mask).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].area, 400);
    }

    #[test]
    fn diagonal_pixels_are_one_region() {
        let mut mask = Mask::new(10, 10);
        mask.put_pixel(3, 3, Luma([FOREGROUND]));
        mask.put_pixel(4, 4, Luma([FOREGROUND]));
        let regions = extract_regions(&mask).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].area, 2);
    }

    #[test]
    fn zero_threshold_keeps_everything_and_is_idempotent() {
        let mut mask = Mask::new(30, 30);
        rect(&mut mask, 0, 0, 1, 1);
        rect(&mut mask, 10, 10, 5, 2);
        rect(&mut mask, 20, 3, 4, 4);
        let once = filter_by_area(&mask, 0.0).unwrap();
        assert_eq!(once.mask, mask);
        let twice = filter_by_area(&once.mask, 0.0).unwrap();
        assert_eq!(twice.mask, once.mask);
    }

    #[test]
    fn regions_report_area_bounds_and_contour() {
        let mut mask = Mask::new(20, 20);
        rect(&mut mask, 2, 3, 4, 5);
        rect(&mut mask, 12, 12, 2, 2);
        let regions = extract_regions(&mask).unwrap();
        assert_eq!(regions.len(), 2);

        let first = &regions[0];
        assert_eq!(first.label, 1);
        assert_eq!(first.area, 20);
        assert_eq!(
            first.bounds,
            Bounds {
                min_x: 2,
                min_y: 3,
                max_x: 5,
                max_y: 7
            }
        );
        assert!(!first.contour.is_empty());
        for p in &first.contour {
            assert!((2..=5).contains(&p.x) && (3..=7).contains(&p.y));
        }

        assert_eq!(regions[1].area, 4);
    }

    #[test]
    fn empty_mask_has_no_regions() {
        let mask = Mask::new(10, 10);
        assert!(extract_regions(&mask).unwrap().is_empty());
        let result = filter_by_area(&mask, 0.0).unwrap();
        assert_eq!(result.kept, 0);
        assert_eq!(result.dropped, 0);
    }

    #[test]
    fn full_mask_is_one_region() {
        let mask = Mask::from_fn(8, 8, |_, _| Luma([FOREGROUND]));
        let regions = extract_regions(&mask).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].area, 64);
    }

    #[test]
    fn negative_min_area_is_rejected() {
        let mask = Mask::new(4, 4);
        assert!(matches!(
            filter_by_area(&mask, -1.0),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn non_binary_mask_is_rejected() {
        let mut mask = Mask::new(4, 4);
        mask.put_pixel(1, 1, Luma([200]));
        assert!(matches!(
            filter_by_area(&mask, 0.0),
            Err(PipelineError::NonBinaryMask { .. })
        ));
        assert!(extract_regions(&mask).is_err());
    }
}
