//! Environment-backed configuration.
//!
//! Most settings have defaults. Override with `BRAID_*` environment variables.
//! Backend URLs left unset put the corresponding client into stub mode (the
//! binary logs this loudly; production deployments set all three).

pub mod error;

#[cfg(test)]
mod tests;

pub use error::ConfigError;

use std::env;
use std::net::IpAddr;
use std::time::Duration;

use crate::constants::{DEFAULT_TENANT_ADMISSION_LIMIT, DEFAULT_TOTAL_BUDGET};

/// Default Qdrant URL used when `BRAID_QDRANT_URL` is not set.
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";

/// Server configuration loaded from environment variables.
///
/// Use [`Config::from_env`] to read `BRAID_*` overrides on top of defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port. Default: `8080`.
    pub port: u16,

    /// IP address to bind to. Default: `127.0.0.1`.
    pub bind_addr: IpAddr,

    /// Qdrant endpoint for the vector index. Default: `http://localhost:6334`.
    pub qdrant_url: String,

    /// Qdrant collection holding chunk vectors. Default: `braid_chunks`.
    pub vector_collection: String,

    /// Full-text index endpoint. `None` → stub lexical client.
    pub lexical_url: Option<String>,

    /// Embedding service endpoint. `None` → stub embedder.
    pub embedding_url: Option<String>,

    /// Embedding model version, folded into embedding-tier cache keys.
    pub embedding_model_version: String,

    /// Cross-encoder service endpoint. `None` → stub reranker.
    pub rerank_url: Option<String>,

    /// Reranker model version, folded into reranked-tier cache keys.
    pub rerank_model_version: String,

    /// Total pipeline budget. Default: 150ms.
    pub total_budget: Duration,

    /// Concurrent in-flight requests per tenant. Default: 32.
    pub tenant_admission_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            bind_addr: IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
            qdrant_url: DEFAULT_QDRANT_URL.to_string(),
            vector_collection: "braid_chunks".to_string(),
            lexical_url: None,
            embedding_url: None,
            embedding_model_version: "emb-v1".to_string(),
            rerank_url: None,
            rerank_model_version: "ce-v1".to_string(),
            total_budget: DEFAULT_TOTAL_BUDGET,
            tenant_admission_limit: DEFAULT_TENANT_ADMISSION_LIMIT,
        }
    }
}

impl Config {
    const ENV_PORT: &'static str = "BRAID_PORT";
    const ENV_BIND_ADDR: &'static str = "BRAID_BIND_ADDR";
    const ENV_QDRANT_URL: &'static str = "BRAID_QDRANT_URL";
    const ENV_VECTOR_COLLECTION: &'static str = "BRAID_VECTOR_COLLECTION";
    const ENV_LEXICAL_URL: &'static str = "BRAID_LEXICAL_URL";
    const ENV_EMBEDDING_URL: &'static str = "BRAID_EMBEDDING_URL";
    const ENV_EMBEDDING_MODEL_VERSION: &'static str = "BRAID_EMBEDDING_MODEL_VERSION";
    const ENV_RERANK_URL: &'static str = "BRAID_RERANK_URL";
    const ENV_RERANK_MODEL_VERSION: &'static str = "BRAID_RERANK_MODEL_VERSION";
    const ENV_TOTAL_BUDGET_MS: &'static str = "BRAID_TOTAL_BUDGET_MS";
    const ENV_TENANT_ADMISSION_LIMIT: &'static str = "BRAID_TENANT_ADMISSION_LIMIT";

    /// Loads configuration from environment variables (falling back to defaults).
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let port = Self::parse_port_from_env(defaults.port)?;
        let bind_addr = Self::parse_bind_addr_from_env(defaults.bind_addr)?;
        let qdrant_url = Self::parse_string_from_env(Self::ENV_QDRANT_URL, defaults.qdrant_url);
        let vector_collection =
            Self::parse_string_from_env(Self::ENV_VECTOR_COLLECTION, defaults.vector_collection);
        let lexical_url = Self::parse_optional_url_from_env(Self::ENV_LEXICAL_URL)?;
        let embedding_url = Self::parse_optional_url_from_env(Self::ENV_EMBEDDING_URL)?;
        let embedding_model_version = Self::parse_string_from_env(
            Self::ENV_EMBEDDING_MODEL_VERSION,
            defaults.embedding_model_version,
        );
        let rerank_url = Self::parse_optional_url_from_env(Self::ENV_RERANK_URL)?;
        let rerank_model_version = Self::parse_string_from_env(
            Self::ENV_RERANK_MODEL_VERSION,
            defaults.rerank_model_version,
        );
        let total_budget = Duration::from_millis(Self::parse_u64_from_env(
            Self::ENV_TOTAL_BUDGET_MS,
            defaults.total_budget.as_millis() as u64,
        )?);
        let tenant_admission_limit = Self::parse_u64_from_env(
            Self::ENV_TENANT_ADMISSION_LIMIT,
            defaults.tenant_admission_limit as u64,
        )? as usize;

        Ok(Self {
            port,
            bind_addr,
            qdrant_url,
            vector_collection,
            lexical_url,
            embedding_url,
            embedding_model_version,
            rerank_url,
            rerank_model_version,
            total_budget,
            tenant_admission_limit,
        })
    }

    /// Validates basic invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.total_budget.is_zero() {
            return Err(ConfigError::InvalidNumber {
                var: Self::ENV_TOTAL_BUDGET_MS,
                value: "0".to_string(),
            });
        }
        if self.tenant_admission_limit == 0 {
            return Err(ConfigError::InvalidNumber {
                var: Self::ENV_TENANT_ADMISSION_LIMIT,
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    /// Returns `"{bind_addr}:{port}"` (useful for logging/binding).
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    fn parse_port_from_env(default: u16) -> Result<u16, ConfigError> {
        match env::var(Self::ENV_PORT) {
            Ok(value) => {
                let port: u16 = value.parse().map_err(|e| ConfigError::PortParseError {
                    value: value.clone(),
                    source: e,
                })?;

                if port == 0 {
                    return Err(ConfigError::InvalidPort { value });
                }

                Ok(port)
            }
            Err(_) => Ok(default),
        }
    }

    fn parse_bind_addr_from_env(default: IpAddr) -> Result<IpAddr, ConfigError> {
        match env::var(Self::ENV_BIND_ADDR) {
            Ok(value) => value
                .parse()
                .map_err(|e| ConfigError::InvalidBindAddr { value, source: e }),
            Err(_) => Ok(default),
        }
    }

    fn parse_string_from_env(var_name: &str, default: String) -> String {
        env::var(var_name).unwrap_or(default)
    }

    fn parse_optional_url_from_env(
        var_name: &'static str,
    ) -> Result<Option<String>, ConfigError> {
        match env::var(var_name) {
            Ok(value) => {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    Err(ConfigError::EmptyUrl { var: var_name })
                } else {
                    Ok(Some(trimmed.to_string()))
                }
            }
            Err(_) => Ok(None),
        }
    }

    fn parse_u64_from_env(var_name: &'static str, default: u64) -> Result<u64, ConfigError> {
        match env::var(var_name) {
            Ok(value) => value.parse().map_err(|_| ConfigError::InvalidNumber {
                var: var_name,
                value,
            }),
            Err(_) => Ok(default),
        }
    }
}
