use thiserror::Error;

#[derive(Debug, Error)]
/// Errors returned by the cross-encoder transport.
pub enum RerankError {
    /// The HTTP call failed (connect, send, or non-2xx status).
    #[error("rerank request failed: {message}")]
    RequestFailed {
        /// Error message.
        message: String,
    },

    /// The service answered with a payload this engine cannot interpret.
    #[error("rerank service returned an invalid response: {message}")]
    InvalidResponse {
        /// Error message.
        message: String,
    },

    /// The service returned a score count that does not match the batch.
    #[error("rerank batch mismatch: sent {sent} texts, got {received} scores")]
    BatchMismatch {
        /// Number of texts sent.
        sent: usize,
        /// Number of scores received.
        received: usize,
    },

    /// The deadline elapsed before scoring finished.
    #[error("rerank timed out")]
    Timeout,
}
