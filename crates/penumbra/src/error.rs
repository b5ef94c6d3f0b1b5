use std::path::PathBuf;

use penumbra_pipeline::PipelineError;

/// Errors surfaced by the `penumbra` commands.
///
/// Pipeline errors for a single batch item are logged and skipped by
/// the batch commands; everything else aborts the command.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Reading or writing a file or directory failed.
    #[error("{}: {source}", path.display())]
    Io {
        /// The file or directory involved.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The pipeline rejected an input.
    #[error("{}: {source}", path.display())]
    Pipeline {
        /// The input being processed.
        path: PathBuf,
        /// Underlying error.
        source: PipelineError,
    },

    /// The configuration is invalid.
    #[error(transparent)]
    Config(PipelineError),

    /// Encoding an output image failed.
    #[error("failed to write {}: {source}", path.display())]
    Encode {
        /// The output file.
        path: PathBuf,
        /// Underlying error.
        source: image::ImageError,
    },

    /// JSON parsing or serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The ground-truth and prediction lists have different lengths.
    #[error(
        "list length mismatch: {} has {ground_truth} entries but {} has {predicted}",
        ground_truth_path.display(),
        predicted_path.display()
    )]
    ListMismatch {
        /// Ground-truth list file.
        ground_truth_path: PathBuf,
        /// Number of ground-truth entries.
        ground_truth: usize,
        /// Prediction list file.
        predicted_path: PathBuf,
        /// Number of prediction entries.
        predicted: usize,
    },

    /// The worker pool could not be started.
    #[error("failed to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl CliError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }

    pub(crate) fn pipeline(path: impl Into<PathBuf>) -> impl FnOnce(PipelineError) -> Self {
        let path = path.into();
        move |source| Self::Pipeline { path, source }
    }

    pub(crate) fn encode(path: impl Into<PathBuf>) -> impl FnOnce(image::ImageError) -> Self {
        let path = path.into();
        move |source| Self::Encode { path, source }
    }
}
