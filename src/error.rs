//! Pipeline error type.

use thiserror::Error;

/// Errors surfaced by the chart pipeline.
///
/// Malformed or missing upstream data never produces an error; entries are
/// skipped and the result degrades to partial or empty output. The only
/// failure is a caller passing parameters the pipeline cannot honor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// A caller-supplied parameter is out of range.
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
}
