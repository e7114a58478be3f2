//! Cache-key composition (BLAKE3).
//!
//! Key layouts are normative: invalidation tooling outside this process must be
//! able to reproduce any key (or key prefix) from the same inputs, so every
//! composition rule lives here and nowhere else.
//!
//! Layouts:
//!
//! - embedding tier: `emb:{model_version}:{hash(normalized_text)}`
//! - fused tier:     `fus:{tenant_hash}:s{schema_version}:{params_hash}:{hash(query_text)}`
//! - reranked tier:  `rrk:{model_version}:{hash(query_text)}:{hash(candidate_id_set)}`
//!
//! The tenant hash is a prefix component, never a runtime check: purging
//! `fus:{tenant_hash}:` removes every fused entry a tenant could ever read.

use blake3::Hasher;

/// Key prefix for the embedding tier.
pub const EMBEDDING_TIER_PREFIX: &str = "emb";
/// Key prefix for the fused-result tier.
pub const FUSED_TIER_PREFIX: &str = "fus";
/// Key prefix for the reranked-result tier.
pub const RERANKED_TIER_PREFIX: &str = "rrk";

/// Computes a 64-bit BLAKE3 hash, truncated from 256 bits.
///
/// 64 bits is plenty for cache keys: collisions at realistic entry counts are
/// negligible and a collision costs a spurious miss, never corruption.
#[inline]
pub fn hash_to_u64(data: &[u8]) -> u64 {
    let hash = blake3::hash(data);
    let bytes: [u8; 8] = hash.as_bytes()[0..8]
        .try_into()
        .expect("BLAKE3 always produces at least 8 bytes");
    u64::from_le_bytes(bytes)
}

/// Hashes a tenant identifier to its u64 form used in keys and index filters.
#[inline]
pub fn hash_tenant_id(tenant: &str) -> u64 {
    hash_to_u64(tenant.as_bytes())
}

/// Normalizes query text before hashing: trim, lowercase, collapse whitespace.
///
/// Normalization only feeds the embedding-tier key; fused and reranked tiers
/// hash the raw query text so distinct phrasings never share ranked results.
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_space = false;
    for ch in text.trim().chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            for lower in ch.to_lowercase() {
                out.push(lower);
            }
            last_was_space = false;
        }
    }
    out
}

/// Embedding-tier key: `emb:{model_version}:{hash(normalized_text)}`.
pub fn embedding_key(text: &str, model_version: &str) -> String {
    let normalized = normalize_text(text);
    format!(
        "{EMBEDDING_TIER_PREFIX}:{model_version}:{:016x}",
        hash_to_u64(normalized.as_bytes())
    )
}

/// Prefix covering every embedding entry for one model version.
pub fn embedding_model_prefix(model_version: &str) -> String {
    format!("{EMBEDDING_TIER_PREFIX}:{model_version}:")
}

/// Hashes the retrieval parameters that change fused output.
///
/// Any parameter that alters fusion output must be folded in here, otherwise a
/// config change would serve stale candidate lists until TTL expiry.
pub fn params_hash(rrf_k: u32, stage_top_n: usize, fused_top_n: usize) -> u64 {
    let mut hasher = Hasher::new();
    hasher.update(&rrf_k.to_le_bytes());
    hasher.update(b"|");
    hasher.update(&(stage_top_n as u64).to_le_bytes());
    hasher.update(b"|");
    hasher.update(&(fused_top_n as u64).to_le_bytes());
    let hash = hasher.finalize();
    let bytes: [u8; 8] = hash.as_bytes()[0..8]
        .try_into()
        .expect("BLAKE3 always produces at least 8 bytes");
    u64::from_le_bytes(bytes)
}

/// Fused-tier key: `fus:{tenant_hash}:s{schema}:{params}:{hash(query_text)}`.
pub fn fused_key(tenant_hash: u64, query_text: &str, params: u64, schema_version: u32) -> String {
    format!(
        "{FUSED_TIER_PREFIX}:{tenant_hash:016x}:s{schema_version}:{params:016x}:{:016x}",
        hash_to_u64(query_text.as_bytes())
    )
}

/// Prefix covering every fused entry for one tenant (legal-hold purge unit).
pub fn fused_tenant_prefix(tenant_hash: u64) -> String {
    format!("{FUSED_TIER_PREFIX}:{tenant_hash:016x}:")
}

/// Order-insensitive hash of a candidate id set.
///
/// Ids are sorted before hashing so that fusion-order jitter between two
/// identical candidate sets still lands on the same rerank key.
pub fn candidate_set_hash<S: AsRef<str>>(ids: &[S]) -> u64 {
    let mut sorted: Vec<&str> = ids.iter().map(|s| s.as_ref()).collect();
    sorted.sort_unstable();
    let mut hasher = Hasher::new();
    for id in sorted {
        hasher.update(id.as_bytes());
        hasher.update(b"\n");
    }
    let hash = hasher.finalize();
    let bytes: [u8; 8] = hash.as_bytes()[0..8]
        .try_into()
        .expect("BLAKE3 always produces at least 8 bytes");
    u64::from_le_bytes(bytes)
}

/// Reranked-tier key: `rrk:{model_version}:{hash(query)}:{hash(candidate_set)}`.
///
/// Includes the reranker model version so a model upgrade never serves scores
/// produced by its predecessor.
pub fn reranked_key(query_text: &str, set_hash: u64, model_version: &str) -> String {
    format!(
        "{RERANKED_TIER_PREFIX}:{model_version}:{:016x}:{set_hash:016x}",
        hash_to_u64(query_text.as_bytes())
    )
}

/// Prefix covering every reranked entry for one model version.
pub fn reranked_model_prefix(model_version: &str) -> String {
    format!("{RERANKED_TIER_PREFIX}:{model_version}:")
}
