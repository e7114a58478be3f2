//! Full-text index client.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::error::{IndexError, IndexResult};
use super::model::{RankedDoc, SourceSpan};

/// Minimal async interface over the external full-text index.
pub trait LexicalIndexClient: Send + Sync {
    /// Returns up to `top_n` hits for `query_text`, best first, scoped to one tenant.
    fn search(
        &self,
        query_text: &str,
        tenant_id: u64,
        top_n: usize,
    ) -> impl std::future::Future<Output = IndexResult<Vec<RankedDoc>>> + Send;

    /// Returns `true` if the backend is reachable.
    fn is_ready(&self) -> impl std::future::Future<Output = bool> + Send;
}

#[derive(Serialize)]
struct LexicalSearchRequest<'a> {
    query: &'a str,
    tenant_id: u64,
    limit: usize,
}

#[derive(Deserialize)]
struct LexicalSearchResponse {
    hits: Vec<LexicalHit>,
}

#[derive(Deserialize)]
struct LexicalHit {
    id: String,
    score: f32,
    text: Option<String>,
    source_uri: Option<String>,
    #[serde(default)]
    offset: u64,
    #[serde(default)]
    length: u64,
}

/// HTTP adapter over a full-text search service exposing `POST {base}/search`.
#[derive(Clone)]
pub struct HttpLexicalIndex {
    client: reqwest::Client,
    base_url: String,
}

impl HttpLexicalIndex {
    /// Creates a client for `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Returns the configured base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl std::fmt::Debug for HttpLexicalIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpLexicalIndex")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl LexicalIndexClient for HttpLexicalIndex {
    #[instrument(skip(self, query_text), fields(tenant_id = tenant_id, top_n = top_n))]
    async fn search(
        &self,
        query_text: &str,
        tenant_id: u64,
        top_n: usize,
    ) -> IndexResult<Vec<RankedDoc>> {
        let url = format!("{}/search", self.base_url);
        let body = LexicalSearchRequest {
            query: query_text,
            tenant_id,
            limit: top_n,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    IndexError::ConnectionFailed {
                        backend: "lexical",
                        url: url.clone(),
                        message: e.to_string(),
                    }
                } else {
                    IndexError::SearchFailed {
                        backend: "lexical",
                        message: e.to_string(),
                    }
                }
            })?;

        if !response.status().is_success() {
            return Err(IndexError::SearchFailed {
                backend: "lexical",
                message: format!("status {}", response.status()),
            });
        }

        let parsed: LexicalSearchResponse =
            response
                .json()
                .await
                .map_err(|e| IndexError::InvalidResponse {
                    backend: "lexical",
                    message: e.to_string(),
                })?;

        debug!(hits = parsed.hits.len(), "Lexical search complete");

        let docs = parsed
            .hits
            .into_iter()
            .take(top_n)
            .map(|hit| RankedDoc {
                source: hit.source_uri.map(|uri| SourceSpan {
                    uri,
                    offset: hit.offset,
                    length: hit.length,
                }),
                chunk_id: hit.id,
                score: hit.score,
                text: hit.text,
            })
            .collect();

        Ok(docs)
    }

    async fn is_ready(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}
