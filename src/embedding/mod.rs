//! Client for the external embedding service.
//!
//! The model itself is out of scope; this module owns only the access contract
//! and the `model_version` string that flows into embedding-tier cache keys.

pub mod error;
pub mod mock;

pub use error::EmbeddingError;
#[cfg(any(test, feature = "mock"))]
pub use mock::MockEmbeddingClient;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::constants::DEFAULT_EMBEDDING_DIM;

/// Minimal async interface over the external embedding service.
pub trait EmbeddingClient: Send + Sync {
    /// Embeds one query text into a fixed-dimension vector.
    fn embed(
        &self,
        text: &str,
    ) -> impl std::future::Future<Output = Result<Vec<f32>, EmbeddingError>> + Send;

    /// Model version identifier, folded into embedding-tier cache keys.
    fn model_version(&self) -> &str;

    /// Returns `true` if the backend is reachable.
    fn is_ready(&self) -> impl std::future::Future<Output = bool> + Send;
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

/// HTTP adapter over an embedding service exposing `POST {base}/embed`.
#[derive(Clone)]
pub struct HttpEmbeddingClient {
    client: reqwest::Client,
    base_url: String,
    model_version: String,
    expected_dim: usize,
}

impl HttpEmbeddingClient {
    /// Creates a client for `base_url` with the default expected dimension.
    pub fn new(base_url: impl Into<String>, model_version: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            model_version: model_version.into(),
            expected_dim: DEFAULT_EMBEDDING_DIM,
        }
    }

    /// Overrides the expected embedding dimension.
    pub fn with_expected_dim(mut self, dim: usize) -> Self {
        self.expected_dim = dim;
        self
    }
}

impl std::fmt::Debug for HttpEmbeddingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpEmbeddingClient")
            .field("base_url", &self.base_url)
            .field("model_version", &self.model_version)
            .field("expected_dim", &self.expected_dim)
            .finish()
    }
}

impl EmbeddingClient for HttpEmbeddingClient {
    #[instrument(skip(self, text), fields(text_len = text.len(), model = %self.model_version))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let url = format!("{}/embed", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&EmbedRequest { text })
            .send()
            .await
            .map_err(|e| EmbeddingError::RequestFailed {
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(EmbeddingError::RequestFailed {
                message: format!("status {}", response.status()),
            });
        }

        let parsed: EmbedResponse =
            response
                .json()
                .await
                .map_err(|e| EmbeddingError::InvalidResponse {
                    message: e.to_string(),
                })?;

        if parsed.embedding.len() != self.expected_dim {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.expected_dim,
                actual: parsed.embedding.len(),
            });
        }

        debug!(dim = parsed.embedding.len(), "Embedding generated");
        Ok(parsed.embedding)
    }

    fn model_version(&self) -> &str {
        &self.model_version
    }

    async fn is_ready(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}
