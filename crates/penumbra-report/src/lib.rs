//! penumbra-report: Pure report serializers (sans-IO)
//!
//! Renders [`EvaluationReport`](penumbra_pipeline::EvaluationReport)s
//! into text. Currently supports the CSV table written by batch
//! evaluation runs and a one-line console summary.

pub mod csv;

pub use csv::{summary_line, to_csv};
