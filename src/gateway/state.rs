use std::sync::Arc;

use crate::cache::CacheBackend;
use crate::embedding::EmbeddingClient;
use crate::index::{LexicalIndexClient, VectorIndexClient};
use crate::pipeline::RetrievalEngine;
use crate::rerank::CrossEncoderClient;

/// Shared handler state: the engine behind an [`Arc`], cloned per request.
pub struct HandlerState<L, V, E, C, B>
where
    L: LexicalIndexClient + 'static,
    V: VectorIndexClient + 'static,
    E: EmbeddingClient + 'static,
    C: CrossEncoderClient + 'static,
    B: CacheBackend + 'static,
{
    pub engine: Arc<RetrievalEngine<L, V, E, C, B>>,
}

impl<L, V, E, C, B> Clone for HandlerState<L, V, E, C, B>
where
    L: LexicalIndexClient + 'static,
    V: VectorIndexClient + 'static,
    E: EmbeddingClient + 'static,
    C: CrossEncoderClient + 'static,
    B: CacheBackend + 'static,
{
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
        }
    }
}

impl<L, V, E, C, B> HandlerState<L, V, E, C, B>
where
    L: LexicalIndexClient + 'static,
    V: VectorIndexClient + 'static,
    E: EmbeddingClient + 'static,
    C: CrossEncoderClient + 'static,
    B: CacheBackend + 'static,
{
    pub fn new(engine: Arc<RetrievalEngine<L, V, E, C, B>>) -> Self {
        Self { engine }
    }
}
