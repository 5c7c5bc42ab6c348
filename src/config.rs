//! Per-service configuration, parsed from CLI args with environment
//! variable fallback, following the teacher's `clap::Parser` + `env`
//! convention.

use clap::Parser;
use std::time::Duration;

fn expand(path: &str) -> String {
    shellexpand::tilde(path).into_owned()
}

/// Shared upstream/device knobs enumerated in the configuration section,
/// embedded via `#[command(flatten)]` into every service's CLI.
#[derive(Parser, Debug, Clone)]
pub struct SharedConfig {
    #[arg(long, env = "QDRANT_URL", default_value = "http://localhost:6333")]
    pub qdrant_url: String,

    #[arg(long, env = "QDRANT_COLLECTION_PREFIX", default_value = "rag")]
    pub qdrant_collection_prefix: String,

    #[arg(long, env = "OLLAMA_URL", default_value = "http://localhost:11434")]
    pub ollama_url: String,

    #[arg(long, env = "INFERENCE_API_URL", default_value = "http://localhost:8081")]
    pub inference_api_url: String,

    #[arg(long, env = "RERANKER_API_URL", default_value = "http://localhost:8082")]
    pub reranker_api_url: String,

    #[arg(long, env = "NORMALIZATION_VERSION", default_value_t = 1)]
    pub normalization_version: i32,

    #[arg(long, env = "CHUNKING_VERSION", default_value_t = 1)]
    pub chunking_version: i32,

    #[arg(long, env = "CONTEXTUALIZATION_VERSION", default_value_t = 1)]
    pub contextualization_version: i32,

    #[arg(long, env = "RAG_DEFAULT_HISTORY_WINDOW_MESSAGES", default_value_t = 8)]
    pub rag_default_history_window_messages: usize,

    #[arg(long, env = "RERANK_UNLOAD_AFTER_REQUEST", default_value_t = false)]
    pub rerank_unload_after_request: bool,

    #[arg(long, env = "RERANK_DEVICE", default_value = "auto")]
    pub rerank_device: String,

    #[arg(long, env = "KEEP_ALIVE", default_value = "5m")]
    pub keep_alive: String,

    #[arg(long, env = "UPSTREAM_TIMEOUT_SECS", default_value_t = 60)]
    pub upstream_timeout_secs: u64,

    #[arg(long, env = "LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

impl SharedConfig {
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    /// Resolves `rerank_device`, picking `cuda` when `auto` (spec §6:
    /// "auto picks cuda if available"). CUDA availability here is a
    /// config-time hint, not an actual device probe.
    pub fn resolved_rerank_device(&self, cuda_available: bool) -> String {
        if self.rerank_device == "auto" {
            if cuda_available { "cuda" } else { "cpu" }.to_string()
        } else {
            self.rerank_device.clone()
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "ingestion-service")]
pub struct IngestionConfig {
    #[command(flatten)]
    pub shared: SharedConfig,

    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind_addr: String,

    #[arg(long, env = "DATABASE_URL", default_value = "data/control_plane.db")]
    pub database_url: String,

    #[arg(long, env = "PROMPTS_DIR", default_value = "prompts")]
    pub prompts_dir: String,

    #[arg(long, env = "CHAT_MODEL", default_value = "llama3.1:8b")]
    pub chat_model: String,

    #[arg(long, env = "EMBEDDING_MODEL", default_value = "nomic-embed-text")]
    pub embedding_model: String,
}

impl IngestionConfig {
    pub fn db_path(&self) -> String {
        expand(&self.database_url)
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "inference-gateway")]
pub struct InferenceGatewayConfig {
    #[command(flatten)]
    pub shared: SharedConfig,

    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8081")]
    pub bind_addr: String,

    #[arg(long, env = "CHAT_MODEL", default_value = "llama3.1:8b")]
    pub chat_model: String,

    #[arg(long, env = "EMBEDDING_MODEL", default_value = "nomic-embed-text")]
    pub embedding_model: String,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "reranker-service")]
pub struct RerankerConfig {
    #[command(flatten)]
    pub shared: SharedConfig,

    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8082")]
    pub bind_addr: String,

    #[arg(long, env = "RERANK_MODEL", default_value = "bge-reranker-v2-m3:latest")]
    pub default_model: String,

    #[arg(long, env = "RERANK_BATCH_SIZE", default_value_t = 16)]
    pub batch_size: usize,

    #[arg(long, env = "RERANK_MAX_LENGTH", default_value_t = 512)]
    pub max_length: usize,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "rag-orchestrator")]
pub struct OrchestratorConfig {
    #[command(flatten)]
    pub shared: SharedConfig,

    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8083")]
    pub bind_addr: String,

    #[arg(long, env = "DATABASE_URL", default_value = "data/control_plane.db")]
    pub database_url: String,

    #[arg(long, env = "SESSIONS_DATABASE_URL", default_value = "data/sessions.db")]
    pub sessions_database_url: String,

    #[arg(long, env = "CHECKPOINT_DATABASE_URL", default_value = "data/checkpoints.db")]
    pub checkpoint_database_url: String,

    #[arg(long, env = "PROMPTS_DIR", default_value = "prompts")]
    pub prompts_dir: String,

    #[arg(long, env = "CHAT_MODEL", default_value = "llama3.1:8b")]
    pub chat_model: String,

    #[arg(long, env = "EMBEDDING_MODEL", default_value = "nomic-embed-text")]
    pub embedding_model: String,

    #[arg(long, env = "RERANK_MODEL", default_value = "bge-reranker-v2-m3:latest")]
    pub rerank_model: String,
}

impl OrchestratorConfig {
    pub fn control_db_path(&self) -> String {
        expand(&self.database_url)
    }

    pub fn sessions_db_path(&self) -> String {
        expand(&self.sessions_database_url)
    }

    pub fn checkpoint_db_path(&self) -> String {
        expand(&self.checkpoint_database_url)
    }
}

/// Installs the process-wide `tracing` subscriber. Mirrors the teacher's
/// startup sequence: `RUST_LOG`-driven filter, JSON in production,
/// human-readable in development.
pub fn init_tracing(log_format: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    if log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
