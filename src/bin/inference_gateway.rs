//! Inference Gateway binary (spec §6): OpenAI-compatible façade over the
//! local LLM runtime for chat, completions, embeddings, and rerank.

use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use rag_suite::clients::OllamaInferenceClient;
use rag_suite::config::{init_tracing, InferenceGatewayConfig};
use rag_suite::http::inference_routes::{self, InferenceState};
use rag_suite::operations::OperationRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = InferenceGatewayConfig::parse();
    init_tracing(&config.shared.log_format);

    let inference = OllamaInferenceClient::new(&config.shared.ollama_url, config.shared.upstream_timeout());

    let state = InferenceState {
        inference,
        operations: OperationRegistry::new(),
        default_chat_model: config.chat_model.clone(),
        default_embedding_model: config.embedding_model.clone(),
    };

    let app = inference_routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!("inference-gateway listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
