use serde::{Deserialize, Serialize};

/// Span of the source document a chunk was cut from.
///
/// Used by the assembler to detect overlapping chunks from the same source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    /// Source document URI.
    pub uri: String,
    /// Byte offset of the chunk within the source.
    pub offset: u64,
    /// Chunk length in bytes.
    pub length: u64,
}

impl SourceSpan {
    /// Returns `true` if two spans of the same source overlap.
    pub fn overlaps(&self, other: &SourceSpan) -> bool {
        self.uri == other.uri
            && self.offset < other.offset + other.length
            && other.offset < self.offset + self.length
    }
}

/// One ranked hit from a single index.
///
/// Chunk ids are tenant+source+offset derived by the ingestion collaborator,
/// so they are stable across index rebuilds and never collide across tenants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedDoc {
    /// Stable chunk identifier.
    pub chunk_id: String,
    /// Backend-native relevance score (BM25 or cosine; not comparable across
    /// backends, which is why fusion works on ranks).
    pub score: f32,
    /// Stored chunk text, when the backend returns it.
    pub text: Option<String>,
    /// Source span for dedup and citations.
    pub source: Option<SourceSpan>,
}

impl RankedDoc {
    /// Creates a hit with id and score only.
    pub fn new(chunk_id: impl Into<String>, score: f32) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            score,
            text: None,
            source: None,
        }
    }

    /// Attaches stored text.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Attaches a source span.
    pub fn with_source(mut self, source: SourceSpan) -> Self {
        self.source = Some(source);
        self
    }
}
