//! Pipeline diagnostics: timing, pixel counts and region counts for each
//! stage.
//!
//! [`process_staged_with_diagnostics`] runs the pipeline stage by stage
//! and records one [`StageDiagnostics`] per stage. The crate never logs;
//! callers print [`PipelineDiagnostics::report`] or serialize the struct.
//!
//! Time is read through the [`Clock`] trait so this crate has no
//! platform-specific timer dependency. Durations are serialized as
//! fractional seconds (`f64`), since `std::time::Duration` does not
//! implement serde traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pipeline::Pipeline;
use crate::region::{Bounds, extract_regions};
use crate::types::{FuseOp, PipelineConfig, PipelineError, RgbImage, StagedResult, count_foreground};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom("duration seconds must be finite and non-negative")
        })
    }
}

/// Monotonic time source used to measure stage durations.
pub trait Clock {
    /// Opaque point in time.
    type Instant;

    /// Current instant.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// Diagnostics collected from a single pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Stage 1: value and lightness extraction.
    pub extract: StageDiagnostics,
    /// Stage 2: cue thresholding.
    pub threshold: StageDiagnostics,
    /// Stage 3: cue fusion.
    pub fuse: StageDiagnostics,
    /// Stage 4: morphological cleanup.
    pub clean: StageDiagnostics,
    /// Stage 5: region area filter.
    pub filter: StageDiagnostics,
    /// Stage 6: overlay compositing.
    pub overlay: StageDiagnostics,
    /// Total wall-clock duration of the run (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary of the final mask.
    pub summary: PipelineSummary,
    /// Regions of the final mask, ordered by label.
    pub regions: Vec<RegionRecord>,
}

/// One region of the final mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionRecord {
    /// Region label, starting at 1.
    pub label: u32,
    /// Pixel count, holes included.
    pub area: u32,
    /// Pixel bounds.
    pub bounds: Bounds,
    /// Number of points on the external contour.
    pub contour_points: usize,
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Color feature extraction.
    Extract {
        /// Image width in pixels.
        width: u32,
        /// Image height in pixels.
        height: u32,
        /// Mean of the value channel.
        mean_value: f64,
        /// Mean of the lightness channel.
        mean_lightness: f64,
    },
    /// Cue thresholding.
    Threshold {
        /// Value limit after clamping.
        value_limit: u8,
        /// Lightness limit after clamping.
        lightness_limit: u8,
        /// Foreground pixels in the value cue mask.
        value_foreground: u64,
        /// Foreground pixels in the lightness cue mask.
        lightness_foreground: u64,
    },
    /// Cue fusion.
    Fuse {
        /// Set operation used.
        op: FuseOp,
        /// Foreground pixels after fusion.
        foreground: u64,
    },
    /// Morphological cleanup.
    Clean {
        /// Structuring element side length.
        kernel_size: u32,
        /// Closing iterations.
        iterations: u32,
        /// Whether an opening pass followed the closing.
        opened: bool,
        /// Foreground pixels before cleanup.
        foreground_before: u64,
        /// Foreground pixels after cleanup.
        foreground_after: u64,
    },
    /// Region area filter.
    Filter {
        /// Area threshold (exclusive).
        min_area: f64,
        /// Regions kept.
        regions_kept: usize,
        /// Regions discarded.
        regions_dropped: usize,
        /// Foreground pixels in the final mask.
        foreground: u64,
    },
    /// Overlay compositing.
    Overlay {
        /// Tint color.
        tint: [u8; 3],
        /// Blend weight after clamping.
        alpha: f32,
    },
}

/// Summary of the final mask.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Image width in pixels.
    pub image_width: u32,
    /// Image height in pixels.
    pub image_height: u32,
    /// Total pixel count.
    pub pixel_count: u64,
    /// Foreground pixels in the final mask.
    pub foreground_pixels: u64,
    /// Regions kept by the area filter.
    pub regions_kept: usize,
    /// Regions discarded by the area filter.
    pub regions_dropped: usize,
    /// Share of the image covered by the final mask, in percent.
    pub coverage_percent: f64,
}

impl PipelineDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Pipeline Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{} ({} pixels)",
            self.summary.image_width, self.summary.image_height, self.summary.pixel_count,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<12} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        let stages = [
            ("Extract", &self.extract),
            ("Threshold", &self.threshold),
            ("Fuse", &self.fuse),
            ("Clean", &self.clean),
            ("Filter", &self.filter),
            ("Overlay", &self.overlay),
        ];
        for (name, diag) in stages {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<12} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        lines.push(format!(
            "Regions kept: {}  |  dropped: {}  |  coverage: {:.2}%",
            self.summary.regions_kept, self.summary.regions_dropped, self.summary.coverage_percent,
        ));
        for region in &self.regions {
            let b = region.bounds;
            lines.push(format!(
                "  region {}: area={} bounds=({},{})-({},{}) contour={} pts",
                region.label, region.area, b.min_x, b.min_y, b.max_x, b.max_y, region.contour_points,
            ));
        }

        lines.join("\n")
    }
}

fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Extract {
            width,
            height,
            mean_value,
            mean_lightness,
        } => format!("{width}x{height} mean_v={mean_value:.1} mean_l={mean_lightness:.1}"),
        StageMetrics::Threshold {
            value_limit,
            lightness_limit,
            value_foreground,
            lightness_foreground,
        } => format!(
            "v<={value_limit} ({value_foreground} px) l<={lightness_limit} ({lightness_foreground} px)"
        ),
        StageMetrics::Fuse { op, foreground } => format!("{op} -> {foreground} px"),
        StageMetrics::Clean {
            kernel_size,
            iterations,
            opened,
            foreground_before,
            foreground_after,
        } => {
            let open = if *opened { " +open" } else { "" };
            format!("k={kernel_size} x{iterations}{open} {foreground_before}->{foreground_after} px")
        }
        StageMetrics::Filter {
            min_area,
            regions_kept,
            regions_dropped,
            foreground,
        } => format!(
            "area>{min_area} kept={regions_kept} dropped={regions_dropped} -> {foreground} px"
        ),
        StageMetrics::Overlay { tint, alpha } => {
            format!("tint=({},{},{}) alpha={alpha:.2}", tint[0], tint[1], tint[2])
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean(image: &image::GrayImage) -> f64 {
    let samples = image.as_raw();
    if samples.is_empty() {
        return 0.0;
    }
    let sum: u64 = samples.iter().map(|&v| u64::from(v)).sum();
    sum as f64 / samples.len() as f64
}

#[allow(clippy::cast_precision_loss)]
fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Time one stage: run `f`, then return its output with the elapsed
/// duration.
fn timed<C: Clock, T>(
    clock: &C,
    f: impl FnOnce() -> Result<T, PipelineError>,
) -> Result<(T, Duration), PipelineError> {
    let start = clock.now();
    let out = f()?;
    Ok((out, clock.elapsed(&start)))
}

/// Run the full pipeline on `image`, recording per-stage diagnostics.
///
/// # Errors
///
/// Same as [`crate::process_staged`].
pub fn process_staged_with_diagnostics<C: Clock>(
    image: &RgbImage,
    config: &PipelineConfig,
    clock: &C,
) -> Result<(StagedResult, PipelineDiagnostics), PipelineError> {
    let run_start = clock.now();

    let (extracted, extract_time) = timed(clock, || {
        Pipeline::new(image.clone(), config.clone()).extract()
    })?;
    let dims = extracted.dimensions();
    let extract = StageDiagnostics {
        duration: extract_time,
        metrics: StageMetrics::Extract {
            width: dims.width,
            height: dims.height,
            mean_value: mean(extracted.value()),
            mean_lightness: mean(extracted.lightness()),
        },
    };

    let (thresholded, threshold_time) = timed(clock, || Ok(extracted.threshold()))?;
    let threshold = StageDiagnostics {
        duration: threshold_time,
        metrics: StageMetrics::Threshold {
            value_limit: crate::threshold::clamp_limit(config.value_threshold),
            lightness_limit: crate::threshold::clamp_limit(config.lightness_threshold),
            value_foreground: count_foreground(thresholded.value_mask()),
            lightness_foreground: count_foreground(thresholded.lightness_mask()),
        },
    };

    let (fused, fuse_time) = timed(clock, || thresholded.fuse())?;
    let fused_foreground = count_foreground(fused.fused());
    let fuse = StageDiagnostics {
        duration: fuse_time,
        metrics: StageMetrics::Fuse {
            op: config.fuse_op,
            foreground: fused_foreground,
        },
    };

    let (cleaned, clean_time) = timed(clock, || fused.clean())?;
    let clean = StageDiagnostics {
        duration: clean_time,
        metrics: StageMetrics::Clean {
            kernel_size: config.morph_kernel_size,
            iterations: config.morph_iterations,
            opened: config.open_after_close,
            foreground_before: fused_foreground,
            foreground_after: count_foreground(cleaned.cleaned()),
        },
    };

    let (filtered, filter_time) = timed(clock, || cleaned.filter())?;
    let final_foreground = count_foreground(filtered.mask());
    let regions = extract_regions(filtered.mask())?
        .into_iter()
        .map(|region| RegionRecord {
            label: region.label,
            area: region.area,
            bounds: region.bounds,
            contour_points: region.contour.len(),
        })
        .collect();
    let filter = StageDiagnostics {
        duration: filter_time,
        metrics: StageMetrics::Filter {
            min_area: config.min_region_area,
            regions_kept: filtered.regions_kept(),
            regions_dropped: filtered.regions_dropped(),
            foreground: final_foreground,
        },
    };

    let (composited, overlay_time) = timed(clock, || filtered.composite())?;
    let overlay = StageDiagnostics {
        duration: overlay_time,
        metrics: StageMetrics::Overlay {
            tint: config.overlay_tint,
            alpha: crate::overlay::clamp_alpha(config.overlay_alpha),
        },
    };

    let staged = composited.into_result();
    let total_duration = clock.elapsed(&run_start);

    let summary = PipelineSummary {
        image_width: dims.width,
        image_height: dims.height,
        pixel_count: dims.pixel_count(),
        foreground_pixels: final_foreground,
        regions_kept: staged.regions_kept,
        regions_dropped: staged.regions_dropped,
        coverage_percent: percent(final_foreground, dims.pixel_count()),
    };

    Ok((
        staged,
        PipelineDiagnostics {
            extract,
            threshold,
            fuse,
            clean,
            filter,
            overlay,
            total_duration,
            summary,
            regions,
        },
    ))
}
