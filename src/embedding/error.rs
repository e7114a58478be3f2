use thiserror::Error;

#[derive(Debug, Error)]
/// Errors returned by the embedding client.
pub enum EmbeddingError {
    /// The HTTP call failed (connect, send, or non-2xx status).
    #[error("embedding request failed: {message}")]
    RequestFailed {
        /// Error message.
        message: String,
    },

    /// The service answered with a payload this engine cannot interpret.
    #[error("embedding service returned an invalid response: {message}")]
    InvalidResponse {
        /// Error message.
        message: String,
    },

    /// The returned vector has the wrong dimension.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Configured dimension.
        expected: usize,
        /// Dimension received.
        actual: usize,
    },
}
