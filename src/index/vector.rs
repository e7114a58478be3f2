//! ANN index client (Qdrant).

use qdrant_client::Qdrant;
use qdrant_client::qdrant::{Condition, Filter, SearchPointsBuilder};
use tracing::{debug, instrument};

use super::error::{IndexError, IndexResult};
use super::model::{RankedDoc, SourceSpan};

/// Minimal async interface over the external ANN store.
pub trait VectorIndexClient: Send + Sync {
    /// Returns up to `top_n` nearest chunks for `embedding`, best first,
    /// scoped to one tenant.
    fn search(
        &self,
        embedding: Vec<f32>,
        tenant_id: u64,
        top_n: usize,
    ) -> impl std::future::Future<Output = IndexResult<Vec<RankedDoc>>> + Send;

    /// Returns `true` if the backend is reachable.
    fn is_ready(&self) -> impl std::future::Future<Output = bool> + Send;
}

/// Qdrant adapter. The collection is owned by the ingestion collaborator;
/// this client only searches it.
#[derive(Clone)]
pub struct QdrantVectorIndex {
    client: std::sync::Arc<Qdrant>,
    collection: String,
    url: String,
}

impl QdrantVectorIndex {
    /// Creates a client for `url` searching `collection`.
    pub fn new(url: &str, collection: impl Into<String>) -> IndexResult<Self> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| IndexError::ConnectionFailed {
                backend: "vector",
                url: url.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            client: std::sync::Arc::new(client),
            collection: collection.into(),
            url: url.to_string(),
        })
    }

    /// Returns the configured collection name.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Returns the configured URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl std::fmt::Debug for QdrantVectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantVectorIndex")
            .field("collection", &self.collection)
            .field("url", &self.url)
            .finish()
    }
}

impl VectorIndexClient for QdrantVectorIndex {
    #[instrument(skip(self, embedding), fields(tenant_id = tenant_id, top_n = top_n, dim = embedding.len()))]
    async fn search(
        &self,
        embedding: Vec<f32>,
        tenant_id: u64,
        top_n: usize,
    ) -> IndexResult<Vec<RankedDoc>> {
        let filter = Filter::must([Condition::matches("tenant_id", tenant_id as i64)]);
        let search = SearchPointsBuilder::new(&self.collection, embedding, top_n as u64)
            .filter(filter)
            .with_payload(true);

        let result =
            self.client
                .search_points(search)
                .await
                .map_err(|e| IndexError::SearchFailed {
                    backend: "vector",
                    message: e.to_string(),
                })?;

        debug!(hits = result.result.len(), "Vector search complete");

        let docs = result
            .result
            .into_iter()
            .filter_map(|point| {
                let payload = point.payload;

                // Chunk ids live in the payload; points without one are
                // malformed ingestion output and are skipped.
                let chunk_id = payload.get("chunk_id").and_then(|v| v.as_str())?.to_string();

                let text = payload
                    .get("text")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string());

                let source = payload
                    .get("source_uri")
                    .and_then(|v| v.as_str())
                    .map(|uri| SourceSpan {
                        uri: uri.to_string(),
                        offset: payload
                            .get("offset")
                            .and_then(|v| v.as_integer())
                            .unwrap_or(0) as u64,
                        length: payload
                            .get("length")
                            .and_then(|v| v.as_integer())
                            .unwrap_or(0) as u64,
                    });

                Some(RankedDoc {
                    chunk_id,
                    score: point.score,
                    text,
                    source,
                })
            })
            .collect();

        Ok(docs)
    }

    async fn is_ready(&self) -> bool {
        self.client.health_check().await.is_ok()
    }
}
