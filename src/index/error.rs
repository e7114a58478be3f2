use thiserror::Error;

#[derive(Debug, Error)]
/// Errors returned by index lookups.
pub enum IndexError {
    /// Could not connect to the backend endpoint.
    #[error("failed to connect to {backend} at '{url}': {message}")]
    ConnectionFailed {
        /// Backend name (`lexical` or `vector`).
        backend: &'static str,
        /// Endpoint URL.
        url: String,
        /// Error message.
        message: String,
    },

    /// The search request failed downstream.
    #[error("{backend} search failed: {message}")]
    SearchFailed {
        /// Backend name.
        backend: &'static str,
        /// Error message.
        message: String,
    },

    /// The backend answered with a payload this engine cannot interpret.
    #[error("{backend} returned an invalid response: {message}")]
    InvalidResponse {
        /// Backend name.
        backend: &'static str,
        /// Error message.
        message: String,
    },

    /// The per-call timeout elapsed before the backend answered.
    #[error("{backend} lookup timed out")]
    Timeout {
        /// Backend name.
        backend: &'static str,
    },
}

/// Convenience result type for index operations.
pub type IndexResult<T> = Result<T, IndexError>;
