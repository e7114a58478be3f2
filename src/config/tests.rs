use super::*;

#[test]
fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.port, 8080);
    assert_eq!(config.qdrant_url, DEFAULT_QDRANT_URL);
    assert_eq!(config.vector_collection, "braid_chunks");
    assert!(config.lexical_url.is_none());
    assert!(config.embedding_url.is_none());
    assert_eq!(config.total_budget, Duration::from_millis(150));
}

#[test]
fn test_default_config_validates() {
    assert!(Config::default().validate().is_ok());
}

#[test]
fn test_zero_budget_rejected() {
    let config = Config {
        total_budget: Duration::ZERO,
        ..Config::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn test_zero_admission_limit_rejected() {
    let config = Config {
        tenant_admission_limit: 0,
        ..Config::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn test_socket_addr_format() {
    let config = Config::default();
    assert_eq!(config.socket_addr(), "127.0.0.1:8080");
}

#[test]
fn test_model_versions_distinct_by_default() {
    let config = Config::default();
    assert_ne!(config.embedding_model_version, config.rerank_model_version);
}
