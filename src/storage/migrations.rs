//! Database migrations.
//!
//! Every service shares this schema module and opens only the tables it
//! needs: the ingestion service and the orchestrator's retrieval path
//! both use `projects`/`documents`/`chunks` against the control-plane
//! database; the orchestrator's session and checkpoint databases use the
//! rest. Unused tables in a given file are harmless.

use rusqlite::Connection;

use crate::error::Result;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 2;

/// Run all migrations, gated by the `schema_version` table.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    if current_version < SCHEMA_VERSION {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Control-plane + session + checkpoint tables.
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            description TEXT,
            collection_name TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            source_type TEXT NOT NULL,
            raw_text TEXT NOT NULL,
            normalized_text TEXT NOT NULL,
            workflow_mode TEXT NOT NULL,
            chunking_mode TEXT NOT NULL,
            contextualization_mode TEXT NOT NULL,
            normalization_version INTEGER NOT NULL,
            chunking_version INTEGER NOT NULL,
            contextualization_version INTEGER NOT NULL,
            embedding_model TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE INDEX IF NOT EXISTS idx_documents_project ON documents(project_id, created_at);

        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
            chunk_index INTEGER NOT NULL,
            start_char INTEGER NOT NULL,
            end_char INTEGER NOT NULL,
            rationale TEXT,
            raw_chunk TEXT NOT NULL,
            normalized_chunk TEXT NOT NULL,
            context_header TEXT,
            contextualized_chunk TEXT NOT NULL,
            approved INTEGER NOT NULL DEFAULT 0,
            point_id TEXT NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}',
            UNIQUE(document_id, chunk_index)
        );

        CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id, chunk_index);

        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            title TEXT NOT NULL,
            message_count INTEGER NOT NULL DEFAULT 0,
            selected_document_ids TEXT NOT NULL DEFAULT '[]',
            selected_source_id TEXT,
            latest_response TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_updated ON sessions(updated_at);

        CREATE TABLE IF NOT EXISTS session_messages (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
            seq INTEGER NOT NULL,
            role TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE INDEX IF NOT EXISTS idx_session_messages_session ON session_messages(session_id, seq);

        CREATE TABLE IF NOT EXISTS checkpoints (
            thread_id TEXT NOT NULL,
            seq INTEGER NOT NULL,
            role TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (thread_id, seq)
        );
        "#,
    )?;
    conn.execute("INSERT INTO schema_version (version) VALUES (1)", [])?;
    Ok(())
}

/// Tracked cancellable operations, for diagnostics/auditing of the
/// in-memory operation manager (the registry itself stays in-memory per
/// spec §4.10; this table is an optional durability aid, not consulted
/// for cancellation decisions).
fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS operation_log (
            operation_id TEXT PRIMARY KEY,
            started_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            cancelled_at TEXT
        );
        "#,
    )?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [SCHEMA_VERSION],
    )?;
    Ok(())
}
