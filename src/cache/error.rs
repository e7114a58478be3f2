use thiserror::Error;

#[derive(Debug, Error)]
/// Errors returned by a cache backend.
///
/// Every variant is recoverable: the semantic cache treats any backend error
/// as an unconditional miss and never blocks the pipeline on it.
pub enum CacheError {
    /// The backend is unreachable or refused the operation.
    #[error("cache backend unavailable: {message}")]
    BackendUnavailable {
        /// Error message.
        message: String,
    },

    /// A stored value could not be (de)serialized.
    #[error("cache serialization failed: {message}")]
    Serialization {
        /// Error message.
        message: String,
    },

    /// A purge predicate could not be registered.
    #[error("cache purge failed: {message}")]
    PurgeFailed {
        /// Error message.
        message: String,
    },
}

/// Convenience result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
