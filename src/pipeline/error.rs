use thiserror::Error;

/// Caller-visible engine failures.
///
/// Everything else (index loss, rerank timeouts, cache outages, iteration
/// exhaustion) is absorbed into degradation flags on the response; only
/// invalid input and total budget exhaustion surface as errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or empty query. Not retryable as-is.
    #[error("invalid request: {message}")]
    Validation {
        /// What was wrong with the request.
        message: String,
    },

    /// Neither index produced a ranking in time.
    #[error("no index available: {message}")]
    IndexUnavailable {
        /// Error message.
        message: String,
    },

    /// The total budget elapsed before even the minimal single-index path
    /// completed.
    #[error("pipeline budget exhausted before a minimal result was available")]
    PipelineTimeout,
}
