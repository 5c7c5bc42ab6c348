//! SQLite-backed storage for projects, documents, chunks, sessions and
//! checkpoints.

mod connection;
mod migrations;
pub mod queries;

pub use connection::Storage;
pub use migrations::SCHEMA_VERSION;
