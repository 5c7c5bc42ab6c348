//! SQL queries for projects, documents, chunks, sessions and checkpoints.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{RagError, Result};
use crate::types::*;

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

// ---------------------------------------------------------------- projects

pub fn project_from_row(row: &Row) -> rusqlite::Result<Project> {
    let created_at: String = row.get("created_at")?;
    Ok(Project {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        collection_name: row.get("collection_name")?,
        created_at: parse_ts(&created_at),
    })
}

pub fn insert_project(conn: &Connection, project: &Project) -> Result<()> {
    conn.execute(
        "INSERT INTO projects (id, name, description, collection_name, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            project.id,
            project.name,
            project.description,
            project.collection_name,
            project.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn get_project(conn: &Connection, id: &str) -> Result<Option<Project>> {
    conn.query_row(
        "SELECT id, name, description, collection_name, created_at FROM projects WHERE id = ?1",
        params![id],
        project_from_row,
    )
    .optional()
    .map_err(RagError::from)
}

pub fn require_project(conn: &Connection, id: &str) -> Result<Project> {
    get_project(conn, id)?.ok_or_else(|| RagError::NotFound(format!("project {id}")))
}

pub fn list_projects(conn: &Connection) -> Result<Vec<Project>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, description, collection_name, created_at FROM projects ORDER BY created_at",
    )?;
    let rows = stmt.query_map([], project_from_row)?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(RagError::from)
}

pub fn delete_project(conn: &Connection, id: &str) -> Result<bool> {
    let affected = conn.execute("DELETE FROM projects WHERE id = ?1", params![id])?;
    Ok(affected > 0)
}

// --------------------------------------------------------------- documents

fn workflow_mode_to_str(m: &WorkflowMode) -> &'static str {
    match m {
        WorkflowMode::Automatic => "automatic",
        WorkflowMode::Manual => "manual",
    }
}

fn workflow_mode_from_str(s: &str) -> WorkflowMode {
    match s {
        "manual" => WorkflowMode::Manual,
        _ => WorkflowMode::Automatic,
    }
}

pub fn document_from_row(row: &Row) -> rusqlite::Result<Document> {
    let created_at: String = row.get("created_at")?;
    let workflow_mode: String = row.get("workflow_mode")?;
    let chunking_mode: String = row.get("chunking_mode")?;
    let contextualization_mode: String = row.get("contextualization_mode")?;
    Ok(Document {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        name: row.get("name")?,
        source_type: row.get("source_type")?,
        raw_text: row.get("raw_text")?,
        normalized_text: row.get("normalized_text")?,
        workflow_mode: workflow_mode_from_str(&workflow_mode),
        chunking_mode: serde_json::from_str(&chunking_mode).unwrap_or(ChunkingMode::Deterministic),
        contextualization_mode: serde_json::from_str(&contextualization_mode)
            .unwrap_or(ContextualizationMode::Template),
        normalization_version: row.get("normalization_version")?,
        chunking_version: row.get("chunking_version")?,
        contextualization_version: row.get("contextualization_version")?,
        embedding_model: row.get("embedding_model")?,
        created_at: parse_ts(&created_at),
    })
}

pub fn insert_document(conn: &Connection, doc: &Document) -> Result<()> {
    conn.execute(
        "INSERT INTO documents (
            id, project_id, name, source_type, raw_text, normalized_text,
            workflow_mode, chunking_mode, contextualization_mode,
            normalization_version, chunking_version, contextualization_version,
            embedding_model, created_at
        ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)",
        params![
            doc.id,
            doc.project_id,
            doc.name,
            doc.source_type,
            doc.raw_text,
            doc.normalized_text,
            workflow_mode_to_str(&doc.workflow_mode),
            serde_json::to_string(&doc.chunking_mode)?,
            serde_json::to_string(&doc.contextualization_mode)?,
            doc.normalization_version,
            doc.chunking_version,
            doc.contextualization_version,
            doc.embedding_model,
            doc.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn get_document(conn: &Connection, id: &str) -> Result<Option<Document>> {
    conn.query_row(
        "SELECT id, project_id, name, source_type, raw_text, normalized_text,
                workflow_mode, chunking_mode, contextualization_mode,
                normalization_version, chunking_version, contextualization_version,
                embedding_model, created_at
         FROM documents WHERE id = ?1",
        params![id],
        document_from_row,
    )
    .optional()
    .map_err(RagError::from)
}

pub fn list_documents_for_project(conn: &Connection, project_id: &str) -> Result<Vec<Document>> {
    let mut stmt = conn.prepare(
        "SELECT id, project_id, name, source_type, raw_text, normalized_text,
                workflow_mode, chunking_mode, contextualization_mode,
                normalization_version, chunking_version, contextualization_version,
                embedding_model, created_at
         FROM documents WHERE project_id = ?1 ORDER BY created_at",
    )?;
    let rows = stmt.query_map(params![project_id], document_from_row)?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(RagError::from)
}

/// Verifies every id in `document_ids` belongs to `project_id`. Returns a
/// `Validation` error listing the missing ids otherwise, grounded in
/// `hybrid_retrieval_service.py::_validate_document_filter`.
pub fn validate_document_filter(
    conn: &Connection,
    project_id: &str,
    document_ids: &[String],
) -> Result<()> {
    if document_ids.is_empty() {
        return Ok(());
    }
    let mut missing = Vec::new();
    for id in document_ids {
        let belongs: Option<String> = conn
            .query_row(
                "SELECT id FROM documents WHERE id = ?1 AND project_id = ?2",
                params![id, project_id],
                |r| r.get(0),
            )
            .optional()?;
        if belongs.is_none() {
            missing.push(id.clone());
        }
    }
    if !missing.is_empty() {
        return Err(RagError::Validation(format!(
            "document ids not found in project {project_id}: {}",
            missing.join(", ")
        )));
    }
    Ok(())
}

// ------------------------------------------------------------------ chunks

pub fn chunk_from_row(row: &Row) -> rusqlite::Result<Chunk> {
    let approved: i64 = row.get("approved")?;
    let metadata: String = row.get("metadata")?;
    Ok(Chunk {
        id: row.get("id")?,
        document_id: row.get("document_id")?,
        chunk_index: row.get("chunk_index")?,
        start_char: row.get("start_char")?,
        end_char: row.get("end_char")?,
        rationale: row.get("rationale")?,
        raw_chunk: row.get("raw_chunk")?,
        normalized_chunk: row.get("normalized_chunk")?,
        context_header: row.get("context_header")?,
        contextualized_chunk: row.get("contextualized_chunk")?,
        approved: approved != 0,
        point_id: row.get("point_id")?,
        metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::json!({})),
    })
}

pub fn insert_chunk(conn: &Connection, chunk: &Chunk) -> Result<()> {
    conn.execute(
        "INSERT INTO chunks (
            id, document_id, chunk_index, start_char, end_char, rationale,
            raw_chunk, normalized_chunk, context_header, contextualized_chunk,
            approved, point_id, metadata
        ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13)",
        params![
            chunk.id,
            chunk.document_id,
            chunk.chunk_index,
            chunk.start_char,
            chunk.end_char,
            chunk.rationale,
            chunk.raw_chunk,
            chunk.normalized_chunk,
            chunk.context_header,
            chunk.contextualized_chunk,
            chunk.approved as i64,
            chunk.point_id,
            chunk.metadata.to_string(),
        ],
    )?;
    Ok(())
}

/// Approved chunks joined to documents, ordered by
/// `(document.created_at, chunk.chunk_index)`, optionally restricted to a
/// document-id filter. Grounded in
/// `hybrid_retrieval_service.py::_load_candidates`.
pub fn load_approved_chunks(
    conn: &Connection,
    project_id: &str,
    document_ids: &[String],
) -> Result<Vec<(Chunk, Document)>> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.document_id, c.chunk_index, c.start_char, c.end_char, c.rationale,
                c.raw_chunk, c.normalized_chunk, c.context_header, c.contextualized_chunk,
                c.approved, c.point_id, c.metadata,
                d.id, d.project_id, d.name, d.source_type, d.raw_text, d.normalized_text,
                d.workflow_mode, d.chunking_mode, d.contextualization_mode,
                d.normalization_version, d.chunking_version, d.contextualization_version,
                d.embedding_model, d.created_at
         FROM chunks c
         JOIN documents d ON d.id = c.document_id
         WHERE d.project_id = ?1 AND c.approved = 1
         ORDER BY d.created_at, c.chunk_index",
    )?;
    let rows = stmt.query_map(params![project_id], |row| {
        Ok((chunk_from_row(row)?, document_from_row(row)?))
    })?;
    let mut out = Vec::new();
    for r in rows {
        let (chunk, doc) = r?;
        if document_ids.is_empty() || document_ids.contains(&chunk.document_id) {
            out.push((chunk, doc));
        }
    }
    Ok(out)
}

pub fn list_chunks_for_document(conn: &Connection, document_id: &str) -> Result<Vec<Chunk>> {
    let mut stmt = conn.prepare(
        "SELECT id, document_id, chunk_index, start_char, end_char, rationale,
                raw_chunk, normalized_chunk, context_header, contextualized_chunk,
                approved, point_id, metadata
         FROM chunks WHERE document_id = ?1 ORDER BY chunk_index",
    )?;
    let rows = stmt.query_map(params![document_id], chunk_from_row)?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(RagError::from)
}

// ------------------------------------------------------------------ sessions

pub fn session_summary_from_row(row: &Row) -> rusqlite::Result<SessionSummary> {
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    Ok(SessionSummary {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        title: row.get("title")?,
        message_count: row.get("message_count")?,
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
    })
}

pub fn get_session_record(conn: &Connection, id: &str) -> Result<Option<SessionRecord>> {
    let summary: Option<SessionSummary> = conn
        .query_row(
            "SELECT id, project_id, title, message_count, created_at, updated_at
             FROM sessions WHERE id = ?1",
            params![id],
            session_summary_from_row,
        )
        .optional()?;
    let Some(summary) = summary else {
        return Ok(None);
    };

    let (selected_document_ids, selected_source_id, latest_response): (
        String,
        Option<String>,
        Option<String>,
    ) = conn.query_row(
        "SELECT selected_document_ids, selected_source_id, latest_response FROM sessions WHERE id = ?1",
        params![id],
        |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
    )?;

    let mut stmt = conn.prepare(
        "SELECT id, role, content, created_at FROM session_messages
         WHERE session_id = ?1 ORDER BY seq",
    )?;
    let messages = stmt
        .query_map(params![id], |row| {
            let role_str: String = row.get("role")?;
            let created_at: String = row.get("created_at")?;
            Ok(SessionMessage {
                id: row.get("id")?,
                role: if role_str == "assistant" {
                    MessageRole::Assistant
                } else {
                    MessageRole::User
                },
                content: row.get("content")?,
                created_at: parse_ts(&created_at),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(Some(SessionRecord {
        summary,
        selected_document_ids: serde_json::from_str(&selected_document_ids).unwrap_or_default(),
        selected_source_id,
        latest_response: latest_response
            .and_then(|s| serde_json::from_str(&s).ok()),
        messages,
    }))
}

pub fn list_sessions(conn: &Connection) -> Result<Vec<SessionSummary>> {
    let mut stmt = conn.prepare(
        "SELECT id, project_id, title, message_count, created_at, updated_at
         FROM sessions ORDER BY updated_at DESC",
    )?;
    let rows = stmt.query_map([], session_summary_from_row)?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(RagError::from)
}

pub fn insert_session(conn: &Connection, record: &SessionRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO sessions (
            id, project_id, title, message_count, selected_document_ids,
            selected_source_id, latest_response, created_at, updated_at
        ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
        params![
            record.summary.id,
            record.summary.project_id,
            record.summary.title,
            record.summary.message_count,
            serde_json::to_string(&record.selected_document_ids)?,
            record.selected_source_id,
            record
                .latest_response
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            record.summary.created_at.to_rfc3339(),
            record.summary.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn delete_session(conn: &Connection, id: &str) -> Result<bool> {
    let affected = conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
    Ok(affected > 0)
}

pub fn next_message_seq(conn: &Connection, session_id: &str) -> Result<i64> {
    let max: Option<i64> = conn.query_row(
        "SELECT MAX(seq) FROM session_messages WHERE session_id = ?1",
        params![session_id],
        |r| r.get(0),
    )?;
    Ok(max.unwrap_or(-1) + 1)
}

pub fn insert_session_message(
    conn: &Connection,
    session_id: &str,
    seq: i64,
    message: &SessionMessage,
) -> Result<()> {
    let role_str = match message.role {
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
    };
    conn.execute(
        "INSERT INTO session_messages (id, session_id, seq, role, content, created_at)
         VALUES (?1,?2,?3,?4,?5,?6)",
        params![
            message.id,
            session_id,
            seq,
            role_str,
            message.content,
            message.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn update_session_fields(
    conn: &Connection,
    id: &str,
    title: &str,
    message_count: i64,
    selected_document_ids: &[String],
    selected_source_id: Option<&str>,
    latest_response: Option<&ChatResponse>,
    updated_at: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "UPDATE sessions SET title = ?2, message_count = ?3, selected_document_ids = ?4,
         selected_source_id = ?5, latest_response = ?6, updated_at = ?7 WHERE id = ?1",
        params![
            id,
            title,
            message_count,
            serde_json::to_string(selected_document_ids)?,
            selected_source_id,
            latest_response.map(serde_json::to_string).transpose()?,
            updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

// --------------------------------------------------------------- checkpoints

/// Loads the ordered message list for a checkpoint thread. Grounded in
/// Design Notes §9: "a key/value of (thread id -> ordered message list)".
pub fn load_checkpoint(conn: &Connection, thread_id: &str) -> Result<Vec<SessionMessage>> {
    let mut stmt = conn.prepare(
        "SELECT role, content, created_at FROM checkpoints
         WHERE thread_id = ?1 ORDER BY seq",
    )?;
    let rows = stmt.query_map(params![thread_id], |row| {
        let role_str: String = row.get("role")?;
        let created_at: String = row.get("created_at")?;
        Ok(SessionMessage {
            id: uuid::Uuid::new_v4().to_string(),
            role: if role_str == "assistant" {
                MessageRole::Assistant
            } else {
                MessageRole::User
            },
            content: row.get("content")?,
            created_at: parse_ts(&created_at),
        })
    })?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(RagError::from)
}

/// Appends messages to a checkpoint thread. Caller is responsible for
/// serializing writers per thread id (spec §5: "checkpoint thread is
/// serialized by a per-process lock").
pub fn append_checkpoint_messages(
    conn: &Connection,
    thread_id: &str,
    messages: &[SessionMessage],
) -> Result<()> {
    let mut next_seq: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(seq), -1) + 1 FROM checkpoints WHERE thread_id = ?1",
            params![thread_id],
            |r| r.get(0),
        )
        .unwrap_or(0);

    for message in messages {
        let role_str = match message.role {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        };
        conn.execute(
            "INSERT INTO checkpoints (thread_id, seq, role, content, created_at)
             VALUES (?1,?2,?3,?4,?5)",
            params![
                thread_id,
                next_seq,
                role_str,
                message.content,
                message.created_at.to_rfc3339(),
            ],
        )?;
        next_seq += 1;
    }
    Ok(())
}
