//! penumbra: command-line shadow segmentation and mask evaluation.
//!
//! Subcommands:
//!
//! - `segment`: run the pipeline on one image, print per-stage
//!   diagnostics and optionally write the mask, the overlay and a debug
//!   snapshot per stage
//! - `batch`: segment every image in a directory in parallel
//! - `evaluate`: score predicted region masks against ground truth and
//!   write a `File,Pixel_Accuracy,IoU` CSV report
//! - `evaluate-edges`: same for line masks, with tolerant
//!   `File,Precision,Recall,F1-Score` scoring
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin penumbra -- segment photo.jpg --debug-dir debug/
//! cargo run --release --bin penumbra -- evaluate gt.txt pred.txt report.csv
//! ```
//!
//! Reports go to stdout, logs to stderr. Set `RUST_LOG` to change the
//! log level (default `info`).

#![allow(clippy::print_stdout)]

mod error;
mod files;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand, ValueEnum};
use penumbra_pipeline::diagnostics::{Clock, PipelineDiagnostics, process_staged_with_diagnostics};
use penumbra_pipeline::{
    EvaluationReport, FuseOp, GrayImage, Metrics, PipelineConfig, PipelineError, StagedResult,
};
use rayon::prelude::*;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::CliError;

/// Shadow region segmentation and mask evaluation.
#[derive(Parser)]
#[command(name = "penumbra", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Segment one image and print per-stage diagnostics.
    Segment(SegmentArgs),
    /// Segment every image in a directory.
    Batch(BatchArgs),
    /// Score predicted region masks against ground truth (pixel accuracy, IoU).
    Evaluate(EvaluateArgs),
    /// Score predicted line masks against ground truth (precision, recall, F1).
    EvaluateEdges(EvaluateArgs),
}

#[derive(Args)]
struct SegmentArgs {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    #[command(flatten)]
    config: ConfigArgs,

    /// Write the final mask to this file.
    #[arg(long)]
    mask_out: Option<PathBuf>,

    /// Write the overlay to this file.
    #[arg(long)]
    overlay_out: Option<PathBuf>,

    /// Write one PNG per pipeline stage into this directory.
    #[arg(long)]
    debug_dir: Option<PathBuf>,

    /// Output diagnostics as JSON instead of a human-readable report.
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct BatchArgs {
    /// Directory holding the input images (.jpg, .jpeg, .png, .bmp).
    input_dir: PathBuf,

    /// Each image's stage snapshots go to `<OUTPUT_DIR>/<stem>/`.
    #[arg(long, default_value = "debug_output")]
    output_dir: PathBuf,

    #[command(flatten)]
    config: ConfigArgs,

    /// Worker threads (defaults to one per core).
    #[arg(long)]
    jobs: Option<usize>,
}

#[derive(Args)]
struct EvaluateArgs {
    /// Text file listing ground-truth mask paths, one per line.
    ground_truth_list: PathBuf,

    /// Text file listing predicted mask paths, one per line, in the
    /// same order.
    predicted_list: PathBuf,

    /// Where to write the CSV report.
    report: PathBuf,

    /// Worker threads (defaults to one per core).
    #[arg(long)]
    jobs: Option<usize>,
}

/// Pipeline parameters shared by `segment` and `batch`.
#[derive(Args)]
struct ConfigArgs {
    /// Inclusive HSV value limit for dark pixels (clamped to 0-255).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_VALUE_THRESHOLD, allow_negative_numbers = true)]
    value_threshold: i32,

    /// Inclusive LAB lightness limit for dark pixels (clamped to 0-255).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_LIGHTNESS_THRESHOLD, allow_negative_numbers = true)]
    lightness_threshold: i32,

    /// How the two cue masks are combined.
    #[arg(long, value_enum, default_value_t = Fuse::Union)]
    fuse: Fuse,

    /// Elliptical structuring element size (odd).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_MORPH_KERNEL_SIZE)]
    kernel_size: u32,

    /// Closing iterations.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_MORPH_ITERATIONS)]
    iterations: u32,

    /// Skip the opening pass after closing.
    #[arg(long)]
    no_open: bool,

    /// Regions with an area at or below this many pixels are dropped.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_MIN_REGION_AREA)]
    min_area: f64,

    /// Overlay tint as `R,G,B`.
    #[arg(long, default_value = "255,0,0", value_parser = parse_tint)]
    tint: [u8; 3],

    /// Overlay tint weight (clamped to 0-1).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_OVERLAY_ALPHA)]
    alpha: f32,

    /// Full pipeline config as a JSON string.
    ///
    /// When provided, all other pipeline parameter flags are ignored.
    /// Missing fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,
}

/// Cue fusion selection.
#[derive(Clone, Copy, ValueEnum)]
enum Fuse {
    /// Foreground where either cue fires.
    Union,
    /// Foreground only where both cues fire.
    Intersection,
}

fn parse_tint(s: &str) -> Result<[u8; 3], String> {
    let channels: Vec<&str> = s.split(',').map(str::trim).collect();
    let [r, g, b] = channels.as_slice() else {
        return Err(format!("expected R,G,B, got {s:?}"));
    };
    let channel = |c: &str| {
        c.parse::<u8>()
            .map_err(|e| format!("invalid tint channel {c:?}: {e}"))
    };
    Ok([channel(r)?, channel(g)?, channel(b)?])
}

/// Build a [`PipelineConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored. The result is validated
/// either way.
fn config_from_cli(args: &ConfigArgs) -> Result<PipelineConfig, CliError> {
    let config = if let Some(ref json) = args.config_json {
        serde_json::from_str(json)?
    } else {
        PipelineConfig {
            value_threshold: args.value_threshold,
            lightness_threshold: args.lightness_threshold,
            fuse_op: match args.fuse {
                Fuse::Union => FuseOp::Union,
                Fuse::Intersection => FuseOp::Intersection,
            },
            morph_kernel_size: args.kernel_size,
            morph_iterations: args.iterations,
            open_after_close: !args.no_open,
            min_region_area: args.min_area,
            overlay_tint: args.tint,
            overlay_alpha: args.alpha,
        }
    };
    config.validate().map_err(CliError::Config)?;
    Ok(config)
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Segment(args) => segment(&args),
        Command::Batch(args) => batch(&args),
        Command::Evaluate(args) => {
            evaluate(&args, penumbra_pipeline::evaluate_region_mask)
        }
        Command::EvaluateEdges(args) => {
            evaluate(&args, penumbra_pipeline::evaluate_edge_mask)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

// ───────────────────────────── segment ───────────────────────────────

fn segment(args: &SegmentArgs) -> Result<(), CliError> {
    let config = config_from_cli(&args.config)?;
    let image = files::load_rgb(&args.image_path)?;
    info!(
        image = %args.image_path.display(),
        width = image.width(),
        height = image.height(),
        "segmenting"
    );
    debug!(?config, "pipeline config");

    let (staged, diagnostics) = process_staged_with_diagnostics(&image, &config, &StdClock)
        .map_err(CliError::pipeline(&args.image_path))?;
    for region in &diagnostics.regions {
        debug!(label = region.label, area = region.area, "region kept");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&diagnostics)?);
    } else {
        println!("{}", diagnostics.report());
    }

    if let Some(ref path) = args.mask_out {
        files::save_gray(staged.mask(), path)?;
        info!(path = %path.display(), "mask written");
    }
    if let Some(ref path) = args.overlay_out {
        files::save_rgb(&staged.overlay, path)?;
        info!(path = %path.display(), "overlay written");
    }
    if let Some(ref dir) = args.debug_dir {
        let written = files::write_snapshots(dir, &staged)?;
        info!(dir = %dir.display(), count = written.len(), "debug snapshots written");
    }
    Ok(())
}

// ────────────────────────────── batch ────────────────────────────────

/// Outcome of one successfully segmented batch image.
struct BatchItem {
    name: String,
    coverage_percent: f64,
    regions: usize,
}

fn segment_into(
    path: &Path,
    output_dir: &Path,
    config: &PipelineConfig,
) -> Result<BatchItem, CliError> {
    let image = files::load_rgb(path)?;
    let (staged, diagnostics): (StagedResult, PipelineDiagnostics) =
        process_staged_with_diagnostics(&image, config, &StdClock)
            .map_err(CliError::pipeline(path))?;
    files::write_snapshots(&output_dir.join(files::stem(path)), &staged)?;
    debug!(
        image = %path.display(),
        ms = diagnostics.total_duration.as_secs_f64() * 1000.0,
        "segmented"
    );
    Ok(BatchItem {
        name: files::display_name(path),
        coverage_percent: diagnostics.summary.coverage_percent,
        regions: diagnostics.summary.regions_kept,
    })
}

fn batch(args: &BatchArgs) -> Result<(), CliError> {
    let config = config_from_cli(&args.config)?;
    let images = files::collect_images(&args.input_dir)?;
    if images.is_empty() {
        warn!(dir = %args.input_dir.display(), "no images found");
        return Ok(());
    }
    info!(
        count = images.len(),
        output = %args.output_dir.display(),
        "batch segmentation"
    );

    let results: Vec<Result<BatchItem, CliError>> = with_jobs(args.jobs, || {
        images
            .par_iter()
            .map(|path| segment_into(path, &args.output_dir, &config))
            .collect()
    })?;

    let mut processed = 0usize;
    for result in results {
        match result {
            Ok(item) => {
                processed += 1;
                println!(
                    "{}: shadow coverage {:.2}% ({} regions)",
                    item.name, item.coverage_percent, item.regions
                );
            }
            Err(e) => warn!("skipping image: {e}"),
        }
    }
    println!("Processed {processed}/{} images", images.len());
    Ok(())
}

// ──────────────────────────── evaluate ───────────────────────────────

/// Run `f` on a dedicated pool of `jobs` threads, or on the global pool.
fn with_jobs<T: Send>(jobs: Option<usize>, f: impl FnOnce() -> T + Send) -> Result<T, CliError> {
    match jobs {
        Some(n) => Ok(rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build()?
            .install(f)),
        None => Ok(f()),
    }
}

/// Score every pair in parallel; results keep the list order.
fn evaluate_pairs<S, F>(pairs: &[(PathBuf, PathBuf)], score: F) -> EvaluationReport<S>
where
    S: Metrics + Send,
    F: Fn(&GrayImage, &GrayImage) -> Result<S, PipelineError> + Sync,
{
    let results: Vec<(String, Result<S, CliError>)> = pairs
        .par_iter()
        .map(|(ground_truth, predicted)| {
            let result = files::load_gray(ground_truth).and_then(|gt| {
                let pred = files::load_gray(predicted)?;
                score(&gt, &pred).map_err(CliError::pipeline(predicted))
            });
            (files::display_name(ground_truth), result)
        })
        .collect();

    for (name, result) in &results {
        if let Err(e) = result {
            warn!(pair = %name, "skipping pair: {e}");
        }
    }
    EvaluationReport::from_results(results)
}

fn evaluate<S, F>(args: &EvaluateArgs, score: F) -> Result<(), CliError>
where
    S: Metrics + Send,
    F: Fn(&GrayImage, &GrayImage) -> Result<S, PipelineError> + Sync + Send,
{
    let pairs = files::read_pairs(&args.ground_truth_list, &args.predicted_list)?;
    info!(pairs = pairs.len(), "evaluating");

    let report = with_jobs(args.jobs, || evaluate_pairs(&pairs, score))?;
    files::write_text(&args.report, &penumbra_report::to_csv(&report))?;

    info!(report = %args.report.display(), "report written");
    println!("{}", penumbra_report::summary_line(&report));
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fs;

    use image::Luma;
    use penumbra_pipeline::{BACKGROUND, FOREGROUND, RegionScores};

    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("penumbra").chain(args.iter().copied())).unwrap()
    }

    fn config_args(args: &[&str]) -> ConfigArgs {
        let mut full = vec!["segment", "img.png"];
        full.extend_from_slice(args);
        match parse(&full).command {
            Command::Segment(segment) => segment.config,
            _ => unreachable!(),
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn default_flags_give_default_config() {
        let config = config_from_cli(&config_args(&[])).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn flags_override_defaults() {
        let config = config_from_cli(&config_args(&[
            "--fuse",
            "intersection",
            "--kernel-size",
            "5",
            "--no-open",
            "--tint",
            "0, 255,0",
            "--value-threshold",
            "-5",
        ]))
        .unwrap();
        assert_eq!(config.fuse_op, FuseOp::Intersection);
        assert_eq!(config.morph_kernel_size, 5);
        assert!(!config.open_after_close);
        assert_eq!(config.overlay_tint, [0, 255, 0]);
        assert_eq!(config.value_threshold, -5);
    }

    #[test]
    fn config_json_wins_over_flags() {
        let config = config_from_cli(&config_args(&[
            "--kernel-size",
            "9",
            "--config-json",
            r#"{"morph_kernel_size": 3, "fuse_op": "Intersection"}"#,
        ]))
        .unwrap();
        assert_eq!(config.morph_kernel_size, 3);
        assert_eq!(config.fuse_op, FuseOp::Intersection);
        assert_eq!(
            config.value_threshold,
            PipelineConfig::DEFAULT_VALUE_THRESHOLD
        );
    }

    #[test]
    fn even_kernel_flag_is_rejected() {
        let err = config_from_cli(&config_args(&["--kernel-size", "4"])).unwrap_err();
        assert!(matches!(err, CliError::Config(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn bad_tint_is_rejected() {
        assert!(parse_tint("1,2").is_err());
        assert!(parse_tint("1,2,300").is_err());
        assert_eq!(parse_tint("1,2,3").unwrap(), [1, 2, 3]);
    }

    fn square_mask(offset: u32) -> GrayImage {
        GrayImage::from_fn(50, 50, |x, y| {
            let inside = (offset..offset + 20).contains(&x) && (offset..offset + 20).contains(&y);
            Luma([if inside { FOREGROUND } else { BACKGROUND }])
        })
    }

    #[test]
    fn evaluate_writes_report_and_skips_bad_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        files::save_gray(&square_mask(0), &root.join("gt1.png")).unwrap();
        files::save_gray(&square_mask(0), &root.join("pred1.png")).unwrap();
        files::save_gray(&square_mask(0), &root.join("gt2.png")).unwrap();
        files::save_gray(&square_mask(5), &root.join("pred2.png")).unwrap();
        files::save_gray(&GrayImage::new(10, 10), &root.join("gt3.png")).unwrap();
        files::save_gray(&square_mask(0), &root.join("pred3.png")).unwrap();

        let list = |names: &[&str]| {
            names
                .iter()
                .map(|n| root.join(n).display().to_string())
                .collect::<Vec<_>>()
                .join("\n\n")
        };
        let gt_list = root.join("gt.txt");
        let pred_list = root.join("pred.txt");
        fs::write(&gt_list, list(&["gt1.png", "gt2.png", "gt3.png", "missing.png"])).unwrap();
        fs::write(&pred_list, list(&["pred1.png", "pred2.png", "pred3.png", "pred1.png"])).unwrap();

        let args = EvaluateArgs {
            ground_truth_list: gt_list,
            predicted_list: pred_list,
            report: root.join("out/report.csv"),
            jobs: Some(2),
        };
        evaluate(&args, penumbra_pipeline::evaluate_region_mask).unwrap();

        let csv = fs::read_to_string(root.join("out/report.csv")).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "File,Pixel_Accuracy,IoU");
        assert_eq!(lines[1], "gt1.png,1,1");
        let iou2 = 225.0 / 575.0;
        assert_eq!(lines[2], format!("gt2.png,0.86,{iou2}"));
        let expected = RegionScores::mean(&[
            RegionScores {
                pixel_accuracy: 1.0,
                iou: 1.0,
            },
            RegionScores {
                pixel_accuracy: 0.86,
                iou: iou2,
            },
        ])
        .unwrap();
        assert_eq!(
            lines[3],
            format!("Average,{},{}", expected.pixel_accuracy, expected.iou)
        );
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn evaluate_edges_uses_edge_columns() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        files::save_gray(&square_mask(0), &root.join("gt.png")).unwrap();
        files::save_gray(&square_mask(0), &root.join("pred.png")).unwrap();
        fs::write(root.join("gt.txt"), root.join("gt.png").display().to_string()).unwrap();
        fs::write(root.join("pred.txt"), root.join("pred.png").display().to_string()).unwrap();

        let args = EvaluateArgs {
            ground_truth_list: root.join("gt.txt"),
            predicted_list: root.join("pred.txt"),
            report: root.join("edges.csv"),
            jobs: None,
        };
        evaluate(&args, penumbra_pipeline::evaluate_edge_mask).unwrap();
        let csv = fs::read_to_string(root.join("edges.csv")).unwrap();
        assert_eq!(
            csv,
            "File,Precision,Recall,F1-Score\ngt.png,1,1,1\nAverage,1,1,1\n"
        );
    }

    #[test]
    fn evaluate_with_mismatched_lists_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("gt.txt"), "a.png\nb.png\n").unwrap();
        fs::write(root.join("pred.txt"), "a.png\n").unwrap();
        let args = EvaluateArgs {
            ground_truth_list: root.join("gt.txt"),
            predicted_list: root.join("pred.txt"),
            report: root.join("report.csv"),
            jobs: None,
        };
        let err = evaluate(&args, penumbra_pipeline::evaluate_region_mask).unwrap_err();
        assert!(matches!(err, CliError::ListMismatch { .. }));
        assert!(!root.join("report.csv").exists());
    }

    fn dark_square_scene() -> penumbra_pipeline::RgbImage {
        penumbra_pipeline::RgbImage::from_fn(64, 64, |x, y| {
            if (16..48).contains(&x) && (16..48).contains(&y) {
                image::Rgb([20, 20, 20])
            } else {
                image::Rgb([230, 230, 230])
            }
        })
    }

    #[test]
    fn segment_writes_mask_overlay_and_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let input = root.join("scene.png");
        files::save_rgb(&dark_square_scene(), &input).unwrap();

        let cli = parse(&[
            "segment",
            input.to_str().unwrap(),
            "--mask-out",
            root.join("mask.png").to_str().unwrap(),
            "--overlay-out",
            root.join("overlay.png").to_str().unwrap(),
            "--debug-dir",
            root.join("debug").to_str().unwrap(),
        ]);
        let Command::Segment(args) = cli.command else {
            unreachable!()
        };
        segment(&args).unwrap();

        let mask = files::load_gray(&root.join("mask.png")).unwrap();
        assert_eq!(mask.get_pixel(32, 32).0[0], FOREGROUND);
        assert_eq!(mask.get_pixel(2, 2).0[0], BACKGROUND);
        assert!(root.join("overlay.png").is_file());
        for stage in [
            "step1_value",
            "step1_lightness",
            "step2_value_mask",
            "step2_lightness_mask",
            "step3_fused",
            "step4_cleaned",
            "step5_area_filtered",
            "step6_overlay",
        ] {
            assert!(
                root.join("debug").join(format!("{stage}.png")).is_file(),
                "missing {stage}"
            );
        }
    }

    #[test]
    fn batch_segments_each_image_into_its_own_directory() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        let output = dir.path().join("out");
        fs::create_dir(&input).unwrap();
        files::save_rgb(&dark_square_scene(), &input.join("one.png")).unwrap();
        files::save_rgb(&dark_square_scene(), &input.join("two.BMP")).unwrap();
        fs::write(input.join("broken.jpg"), b"not an image").unwrap();
        fs::write(input.join("notes.txt"), b"ignored").unwrap();

        let cli = parse(&[
            "batch",
            input.to_str().unwrap(),
            "--output-dir",
            output.to_str().unwrap(),
            "--jobs",
            "2",
        ]);
        let Command::Batch(args) = cli.command else {
            unreachable!()
        };
        batch(&args).unwrap();

        assert!(output.join("one/step5_area_filtered.png").is_file());
        assert!(output.join("two/step6_overlay.png").is_file());
        assert!(!output.join("broken").exists());
        assert!(!output.join("notes").exists());
    }
}
