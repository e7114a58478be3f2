//! Braid HTTP server entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mimalloc::MiMalloc;
use tokio::net::TcpListener;
use tokio::signal;

use braid::cache::{InMemoryBackend, SemanticCache};
use braid::config::Config;
use braid::embedding::{EmbeddingClient, EmbeddingError, HttpEmbeddingClient};
use braid::gateway::{HandlerState, create_router_with_state};
use braid::hashing;
use braid::index::{
    HttpLexicalIndex, LexicalIndexClient, QdrantVectorIndex, RankedDoc, VectorIndexClient,
};
use braid::pipeline::{PipelineConfig, RetrievalEngine};
use braid::rerank::{
    CrossEncoderClient, HttpCrossEncoder, RerankError, RerankerClient, RerankerConfig,
};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!(
        r#"
██████╗ ██████╗  █████╗ ██╗██████╗
██╔══██╗██╔══██╗██╔══██╗██║██╔══██╗
██████╔╝██████╔╝███████║██║██║  ██║
██╔══██╗██╔══██╗██╔══██║██║██║  ██║
██████╔╝██║  ██║██║  ██║██║██████╔╝
╚═════╝ ╚═╝  ╚═╝╚═╝  ╚═╝╚═╝╚═════╝

        FUSE. RERANK. CITE.
                                AGPL-3.0
"#
    );

    if std::env::args().any(|arg| arg == "--health-check") {
        std::process::exit(run_health_check());
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    config.validate()?;
    let addr: SocketAddr = config.socket_addr().parse()?;

    tracing::info!(
        bind_addr = %config.bind_addr,
        port = config.port,
        qdrant_url = %config.qdrant_url,
        "Braid starting"
    );

    let vector = QdrantVectorIndex::new(&config.qdrant_url, &config.vector_collection)?;

    let lexical = match &config.lexical_url {
        Some(url) => LexicalBackend::Http(HttpLexicalIndex::new(url)),
        None => {
            tracing::warn!("No BRAID_LEXICAL_URL configured, running lexical index in stub mode");
            LexicalBackend::Stub
        }
    };

    let embedder = match &config.embedding_url {
        Some(url) => EmbeddingBackend::Http(HttpEmbeddingClient::new(
            url,
            config.embedding_model_version.clone(),
        )),
        None => {
            tracing::warn!("No BRAID_EMBEDDING_URL configured, running embedder in stub mode");
            EmbeddingBackend::Stub {
                model_version: config.embedding_model_version.clone(),
            }
        }
    };

    let transport = match &config.rerank_url {
        Some(url) => RerankBackend::Http(HttpCrossEncoder::new(
            url,
            config.rerank_model_version.clone(),
        )),
        None => {
            tracing::warn!("No BRAID_RERANK_URL configured, running reranker in stub mode");
            RerankBackend::Stub {
                model_version: config.rerank_model_version.clone(),
            }
        }
    };

    let pipeline_config = PipelineConfig {
        total_budget: config.total_budget,
        tenant_admission_limit: config.tenant_admission_limit,
        ..PipelineConfig::default()
    };

    let engine = RetrievalEngine::new(
        lexical,
        vector,
        embedder,
        RerankerClient::new(transport, RerankerConfig::default()),
        SemanticCache::new(InMemoryBackend::new()),
        pipeline_config,
    );

    let app = create_router_with_state(HandlerState::new(Arc::new(engine)));

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Braid shutdown complete");
    Ok(())
}

fn run_health_check() -> i32 {
    let port = std::env::var("BRAID_PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(8080);

    let url = format!("http://127.0.0.1:{}/healthz", port);

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build runtime");

    rt.block_on(async {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(1))
            .build()
            .expect("failed to build client");

        match client.get(&url).send().await {
            Ok(res) if res.status().is_success() => 0,
            _ => 1,
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

/// Lexical index, or a stub that finds nothing when no backend is configured.
enum LexicalBackend {
    Http(HttpLexicalIndex),
    Stub,
}

impl LexicalIndexClient for LexicalBackend {
    async fn search(
        &self,
        query_text: &str,
        tenant_id: u64,
        top_n: usize,
    ) -> Result<Vec<RankedDoc>, braid::index::IndexError> {
        match self {
            Self::Http(client) => client.search(query_text, tenant_id, top_n).await,
            Self::Stub => Ok(Vec::new()),
        }
    }

    async fn is_ready(&self) -> bool {
        match self {
            Self::Http(client) => client.is_ready().await,
            Self::Stub => true,
        }
    }
}

/// Embedder, or a deterministic hash-seeded stub when no backend is configured.
///
/// Stub vectors are stable per normalized text, so the vector leg still
/// exercises Qdrant end to end in local setups.
enum EmbeddingBackend {
    Http(HttpEmbeddingClient),
    Stub { model_version: String },
}

impl EmbeddingClient for EmbeddingBackend {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        match self {
            Self::Http(client) => client.embed(text).await,
            Self::Stub { .. } => {
                let normalized = hashing::normalize_text(text);
                let mut state = hashing::hash_to_u64(normalized.as_bytes()) | 1;
                let dim = braid::constants::DEFAULT_EMBEDDING_DIM;
                let mut out = Vec::with_capacity(dim);
                for _ in 0..dim {
                    // xorshift64
                    state ^= state << 13;
                    state ^= state >> 7;
                    state ^= state << 17;
                    out.push((state as f32 / u64::MAX as f32) * 2.0 - 1.0);
                }
                Ok(out)
            }
        }
    }

    fn model_version(&self) -> &str {
        match self {
            Self::Http(client) => client.model_version(),
            Self::Stub { model_version } => model_version,
        }
    }

    async fn is_ready(&self) -> bool {
        match self {
            Self::Http(client) => client.is_ready().await,
            Self::Stub { .. } => true,
        }
    }
}

/// Cross-encoder, or a deterministic hash-scoring stub when no backend is
/// configured.
enum RerankBackend {
    Http(HttpCrossEncoder),
    Stub { model_version: String },
}

impl CrossEncoderClient for RerankBackend {
    async fn score_batch(&self, query: &str, texts: &[&str]) -> Result<Vec<f32>, RerankError> {
        match self {
            Self::Http(client) => client.score_batch(query, texts).await,
            Self::Stub { .. } => Ok(texts
                .iter()
                .map(|text| {
                    let pair = format!("{query}\n{text}");
                    (hashing::hash_to_u64(pair.as_bytes()) % 10_000) as f32 / 10_000.0
                })
                .collect()),
        }
    }

    fn model_version(&self) -> &str {
        match self {
            Self::Http(client) => client.model_version(),
            Self::Stub { model_version } => model_version,
        }
    }

    async fn is_ready(&self) -> bool {
        match self {
            Self::Http(client) => client.is_ready().await,
            Self::Stub { .. } => true,
        }
    }
}
