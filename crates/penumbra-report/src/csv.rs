//! CSV export of batch evaluation reports.
//!
//! The table has a `File` column followed by one column per metric:
//!
//! ```text
//! File,Pixel_Accuracy,IoU
//! img_001.png,0.97,0.81
//! img_002.png,0.92,0.64
//! Average,0.945,0.725
//! ```
//!
//! Edge reports use the columns `Precision,Recall,F1-Score` instead.
//! The `Average` row holds the arithmetic mean of each metric over the
//! evaluated rows and is omitted when no pair was evaluated. Skipped
//! pairs never appear in the table.
//!
//! Numbers use Rust's shortest round-trip formatting. Lines end with
//! `\n`, including the last one. File names containing a comma, a
//! double quote or a line break are quoted, with embedded quotes
//! doubled.
//!
//! This is a pure function with no I/O; it returns a `String`.

use std::fmt::Write;

use penumbra_pipeline::{EvaluationReport, Metrics};

/// Label of the aggregate row.
pub const AVERAGE_LABEL: &str = "Average";

/// Serialize `report` into CSV text.
///
/// # Examples
///
/// ```
/// use penumbra_pipeline::{EvaluationReport, RegionScores};
///
/// let mut report = EvaluationReport::default();
/// report.record(
///     "a.png",
///     Ok::<_, String>(RegionScores { pixel_accuracy: 1.0, iou: 0.5 }),
/// );
/// let csv = penumbra_report::to_csv(&report);
/// assert_eq!(csv, "File,Pixel_Accuracy,IoU\na.png,1,0.5\nAverage,1,0.5\n");
/// ```
#[must_use]
pub fn to_csv<S: Metrics>(report: &EvaluationReport<S>) -> String {
    let mut out = String::new();

    out.push_str("File");
    for column in S::COLUMNS {
        out.push(',');
        out.push_str(column);
    }
    out.push('\n');

    for entry in &report.entries {
        write_row(&mut out, &escape(&entry.name), &entry.scores);
    }
    if let Some(average) = report.average() {
        write_row(&mut out, AVERAGE_LABEL, &average);
    }
    out
}

fn write_row<S: Metrics>(out: &mut String, name: &str, scores: &S) {
    out.push_str(name);
    for value in scores.values() {
        // Writing to a String cannot fail.
        let _ = write!(out, ",{value}");
    }
    out.push('\n');
}

fn escape(field: &str) -> std::borrow::Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\"")).into()
    } else {
        field.into()
    }
}

/// One-line human summary of `report`, e.g.
/// `3 evaluated, 1 skipped | Pixel_Accuracy=0.9500 IoU=0.7250`.
#[must_use]
pub fn summary_line<S: Metrics>(report: &EvaluationReport<S>) -> String {
    let mut line = format!(
        "{} evaluated, {} skipped",
        report.entries.len(),
        report.skipped.len()
    );
    if let Some(average) = report.average() {
        line.push_str(" |");
        for (column, value) in S::COLUMNS.iter().zip(average.values()) {
            let _ = write!(line, " {column}={value:.4}");
        }
    }
    line
}
