//! Reranker Service binary (spec §6): lazy-loaded cross-encoder reranking
//! behind the internal `POST /rerank` RPC `clients::RerankerClient` calls.

use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use rag_suite::clients::OllamaInferenceClient;
use rag_suite::config::{init_tracing, RerankerConfig};
use rag_suite::http::reranker_routes::{self, RerankerState};
use rag_suite::search::RerankerEngine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = RerankerConfig::parse();
    init_tracing(&config.shared.log_format);

    let client = OllamaInferenceClient::new(&config.shared.ollama_url, config.shared.upstream_timeout());
    let engine = RerankerEngine::new(
        client,
        config.default_model.clone(),
        config.max_length,
        config.batch_size,
        config.shared.rerank_unload_after_request,
    );

    let state = RerankerState { engine };

    let app = reranker_routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!("reranker-service listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
