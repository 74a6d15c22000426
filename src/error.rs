use thiserror::Error;

/// Error taxonomy from spec.md §7.
///
/// `Schema` and `Semantic` errors are non-retryable: the substrate should
/// terminal-fail the job on the first attempt. `Transient` errors are
/// retried per the queue's backoff policy.
#[derive(Debug, Error, Clone)]
pub enum PipelineError {
    #[error("schema error: {0}")]
    Schema(String),

    #[error("transient error: {0}")]
    Transient(String),

    #[error("semantic error: {0}")]
    Semantic(String),
}

impl PipelineError {
    /// Whether the queue substrate should retry a job that failed with this
    /// error (§7: schema and semantic errors are never retried).
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::Transient(_))
    }
}
