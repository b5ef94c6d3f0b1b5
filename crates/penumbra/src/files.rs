//! Filesystem side of the CLI: loading images and list files, finding
//! batch inputs and writing masks, overlays and snapshots.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use penumbra_pipeline::types::{SnapshotImage, StagedResult};
use penumbra_pipeline::{GrayImage, RgbImage};

use crate::error::CliError;

/// Extensions picked up by batch segmentation (case-insensitive).
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

/// Read and decode a color image.
pub fn load_rgb(path: &Path) -> Result<RgbImage, CliError> {
    let bytes = fs::read(path).map_err(CliError::io(path))?;
    penumbra_pipeline::decode_rgb(&bytes).map_err(CliError::pipeline(path))
}

/// Read and decode a single-channel image (ground truth or prediction).
pub fn load_gray(path: &Path) -> Result<GrayImage, CliError> {
    let bytes = fs::read(path).map_err(CliError::io(path))?;
    penumbra_pipeline::decode_gray(&bytes).map_err(CliError::pipeline(path))
}

/// Parse list-file text: one path per line, surrounding whitespace
/// trimmed, blank lines ignored.
pub fn parse_list(text: &str) -> Vec<PathBuf> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect()
}

/// Read a list file.
pub fn read_list(path: &Path) -> Result<Vec<PathBuf>, CliError> {
    let text = fs::read_to_string(path).map_err(CliError::io(path))?;
    Ok(parse_list(&text))
}

/// Read both list files and pair their entries line by line.
///
/// # Errors
///
/// Returns [`CliError::ListMismatch`] if the lists differ in length.
pub fn read_pairs(
    ground_truth_list: &Path,
    predicted_list: &Path,
) -> Result<Vec<(PathBuf, PathBuf)>, CliError> {
    let ground_truth = read_list(ground_truth_list)?;
    let predicted = read_list(predicted_list)?;
    if ground_truth.len() != predicted.len() {
        return Err(CliError::ListMismatch {
            ground_truth_path: ground_truth_list.to_path_buf(),
            ground_truth: ground_truth.len(),
            predicted_path: predicted_list.to_path_buf(),
            predicted: predicted.len(),
        });
    }
    Ok(ground_truth.into_iter().zip(predicted).collect())
}

/// Whether `path` has one of [`IMAGE_EXTENSIONS`].
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)))
}

/// Supported images directly inside `dir`, sorted by path.
pub fn collect_images(dir: &Path) -> Result<Vec<PathBuf>, CliError> {
    let mut images = Vec::new();
    for entry in fs::read_dir(dir).map_err(CliError::io(dir))? {
        let path = entry.map_err(CliError::io(dir))?.path();
        if path.is_file() && is_supported_image(&path) {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

/// File name of `path` for report rows and log lines.
pub fn display_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |name| name.to_string_lossy().into_owned(),
    )
}

/// File stem of `path`, used to name per-image output directories.
pub fn stem(path: &Path) -> String {
    path.file_stem().map_or_else(
        || "image".to_string(),
        |s| s.to_string_lossy().into_owned(),
    )
}

/// Encode a single-channel image; the format follows the extension.
pub fn save_gray(image: &GrayImage, path: &Path) -> Result<(), CliError> {
    image.save(path).map_err(CliError::encode(path))
}

/// Encode a color image; the format follows the extension.
pub fn save_rgb(image: &RgbImage, path: &Path) -> Result<(), CliError> {
    image.save(path).map_err(CliError::encode(path))
}

/// Write every stage image of `staged` as `<dir>/<stage>.png`.
///
/// Returns the written paths in pipeline order.
pub fn write_snapshots(dir: &Path, staged: &StagedResult) -> Result<Vec<PathBuf>, CliError> {
    fs::create_dir_all(dir).map_err(CliError::io(dir))?;
    let mut written = Vec::new();
    for snapshot in staged.snapshots() {
        let path = dir.join(format!("{}.png", snapshot.name));
        match snapshot.image {
            SnapshotImage::Gray(image) => save_gray(image, &path)?,
            SnapshotImage::Rgb(image) => save_rgb(image, &path)?,
        }
        written.push(path);
    }
    Ok(written)
}

/// Write `text` to `path`, creating parent directories as needed.
pub fn write_text(path: &Path, text: &str) -> Result<(), CliError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(CliError::io(parent))?;
    }
    fs::write(path, text).map_err(CliError::io(path))
}
