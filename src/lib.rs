//! RAG Suite - multi-service retrieval-augmented generation platform.
//!
//! Four cooperating services share this library: an ingestion control
//! plane, an inference gateway, a cross-encoder reranker, and a RAG
//! orchestrator. This crate holds the pipeline shared by all of them:
//! normalization, chunking, contextualization, hybrid retrieval, the
//! orchestrator state machine, session persistence, and cooperative
//! cancellation.

pub mod clients;
pub mod config;
pub mod error;
pub mod http;
pub mod ingestion;
pub mod operations;
pub mod orchestrator;
pub mod prompts;
pub mod search;
pub mod session;
pub mod storage;
pub mod text;
pub mod types;

pub use error::{RagError, Result};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
