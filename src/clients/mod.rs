//! HTTP clients for the upstream collaborators named in spec §6: the
//! local LLM runtime, the dedicated reranker service, and the vector
//! store.

pub mod ollama_client;
pub mod reranker_client;
pub mod vector_store;

pub use ollama_client::OllamaInferenceClient;
pub use reranker_client::{RerankClientResult, RerankerClient};
pub use vector_store::{QdrantVectorStore, VectorStore};
