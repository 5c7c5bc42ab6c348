//! Session Store (spec §4.11): CRUD over persisted session snapshots,
//! plus the atomic `append_turn` operation used by the orchestrator.

use chrono::Utc;
use uuid::Uuid;

use crate::error::{RagError, Result};
use crate::storage::{queries, Storage};
use crate::types::{ChatResponse, MessageRole, SessionMessage, SessionRecord, SessionSummary, DEFAULT_SESSION_TITLE};

#[derive(Clone)]
pub struct SessionStore {
    storage: Storage,
}

#[derive(Default)]
pub struct SessionUpdate {
    pub title: Option<String>,
    pub messages: Option<Vec<SessionMessage>>,
    pub selected_document_ids: Option<Vec<String>>,
    pub selected_source_id: Option<Option<String>>,
    pub latest_response: Option<Option<ChatResponse>>,
}

fn title_is_default(title: &str) -> bool {
    let trimmed = title.trim();
    trimmed.is_empty() || trimmed == DEFAULT_SESSION_TITLE
}

/// Resolves an explicit title (truncated to 200 chars) or derives one from
/// the first non-empty user message (truncated to 64 chars), falling back
/// to the default sentinel. Grounded in `session_store_service.py::_normalize_title`.
fn normalize_title(explicit: Option<&str>, messages: &[SessionMessage]) -> String {
    if let Some(title) = explicit {
        let trimmed = title.trim();
        if !trimmed.is_empty() {
            return trimmed.chars().take(200).collect();
        }
    }

    for message in messages {
        if message.role != MessageRole::User {
            continue;
        }
        let candidate = message.content.trim().replace('\n', " ");
        if candidate.is_empty() {
            continue;
        }
        return candidate.chars().take(64).collect();
    }

    DEFAULT_SESSION_TITLE.to_string()
}

impl SessionStore {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        self.storage.with_connection(|conn| queries::list_sessions(conn))
    }

    pub fn create_session(&self, project_id: &str, title: Option<&str>, selected_document_ids: Vec<String>) -> Result<SessionRecord> {
        let now = Utc::now();
        let record = SessionRecord {
            summary: SessionSummary {
                id: Uuid::new_v4().to_string(),
                project_id: project_id.to_string(),
                title: normalize_title(title, &[]),
                message_count: 0,
                created_at: now,
                updated_at: now,
            },
            selected_document_ids,
            selected_source_id: None,
            latest_response: None,
            messages: Vec::new(),
        };
        self.storage.with_connection(|conn| queries::insert_session(conn, &record))?;
        Ok(record)
    }

    pub fn get_session(&self, id: &str) -> Result<SessionRecord> {
        self.storage
            .with_connection(|conn| queries::get_session_record(conn, id))?
            .ok_or_else(|| RagError::NotFound(format!("session {id}")))
    }

    pub fn delete_session(&self, id: &str) -> Result<()> {
        let deleted = self.storage.with_connection(|conn| queries::delete_session(conn, id))?;
        if !deleted {
            return Err(RagError::NotFound(format!("session {id}")));
        }
        Ok(())
    }

    /// Patches the fields present in `update`. `None` fields are left
    /// untouched; `Some(None)` on nullable fields clears them.
    pub fn update_session(&self, id: &str, update: SessionUpdate) -> Result<SessionRecord> {
        let mut record = self.get_session(id)?;

        if let Some(messages) = update.messages {
            record.summary.message_count = messages.len() as i64;
            if update.title.is_none() && title_is_default(&record.summary.title) {
                record.summary.title = normalize_title(None, &messages);
            }
            record.messages = messages;
        }

        if let Some(ids) = update.selected_document_ids {
            record.selected_document_ids = ids;
        }

        if let Some(source_id) = update.selected_source_id {
            record.selected_source_id = source_id;
        }

        if let Some(response) = update.latest_response {
            record.latest_response = response;
        }

        if let Some(title) = update.title {
            record.summary.title = normalize_title(Some(&title), &record.messages);
        }

        record.summary.updated_at = Utc::now();

        self.storage.with_connection(|conn| {
            queries::update_session_fields(
                conn,
                id,
                &record.summary.title,
                record.summary.message_count,
                &record.selected_document_ids,
                record.selected_source_id.as_deref(),
                record.latest_response.as_ref(),
                record.summary.updated_at,
            )
        })?;

        // Messages themselves are append-only via `append_turn`; a direct
        // PATCH of `messages` replaces persisted session_messages rows.
        if !record.messages.is_empty() {
            self.storage.with_connection(|conn| {
                conn.execute("DELETE FROM session_messages WHERE session_id = ?1", rusqlite::params![id])?;
                for (seq, message) in record.messages.iter().enumerate() {
                    queries::insert_session_message(conn, id, seq as i64, message)?;
                }
                Ok(())
            })?;
        }

        Ok(record)
    }

    /// Atomically appends the user/assistant turn, updates derived fields,
    /// and snapshots the latest response. A no-op on message count when
    /// both messages are empty (spec §8 round-trip property).
    pub fn append_turn(
        &self,
        session_id: &str,
        project_id: &str,
        user_message: &str,
        assistant_message: &str,
        selected_document_ids: Vec<String>,
        latest_response: ChatResponse,
    ) -> Result<SessionRecord> {
        let now = Utc::now();

        let mut record = match self.get_session(session_id) {
            Ok(record) => record,
            Err(RagError::NotFound(_)) => {
                let record = SessionRecord {
                    summary: SessionSummary {
                        id: session_id.to_string(),
                        project_id: project_id.to_string(),
                        title: DEFAULT_SESSION_TITLE.to_string(),
                        message_count: 0,
                        created_at: now,
                        updated_at: now,
                    },
                    selected_document_ids: selected_document_ids.clone(),
                    selected_source_id: None,
                    latest_response: None,
                    messages: Vec::new(),
                };
                self.storage.with_connection(|conn| queries::insert_session(conn, &record))?;
                record
            }
            Err(e) => return Err(e),
        };

        record.summary.project_id = project_id.to_string();

        let user_content = user_message.trim();
        if !user_content.is_empty() {
            let message = SessionMessage {
                id: format!("msg-{}", Uuid::new_v4()),
                role: MessageRole::User,
                content: user_content.to_string(),
                created_at: now,
            };
            self.storage.with_connection(|conn| {
                let seq = queries::next_message_seq(conn, session_id)?;
                queries::insert_session_message(conn, session_id, seq, &message)
            })?;
            record.messages.push(message);
        }

        let assistant_content = assistant_message.trim();
        if !assistant_content.is_empty() {
            let message = SessionMessage {
                id: format!("msg-{}", Uuid::new_v4()),
                role: MessageRole::Assistant,
                content: assistant_content.to_string(),
                created_at: now,
            };
            self.storage.with_connection(|conn| {
                let seq = queries::next_message_seq(conn, session_id)?;
                queries::insert_session_message(conn, session_id, seq, &message)
            })?;
            record.messages.push(message);
        }

        record.summary.message_count = record.messages.len() as i64;
        record.selected_document_ids = selected_document_ids;
        record.selected_source_id = latest_response.sources.first().map(|s| s.source_id.clone());
        if title_is_default(&record.summary.title) {
            record.summary.title = normalize_title(None, &record.messages);
        }
        record.latest_response = Some(latest_response);
        record.summary.updated_at = now;

        self.storage.with_connection(|conn| {
            queries::update_session_fields(
                conn,
                session_id,
                &record.summary.title,
                record.summary.message_count,
                &record.selected_document_ids,
                record.selected_source_id.as_deref(),
                record.latest_response.as_ref(),
                record.summary.updated_at,
            )
        })?;

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SessionStore {
        SessionStore::new(Storage::open_in_memory().unwrap())
    }

    #[test]
    fn title_defaults_to_sentinel_then_derives_from_first_user_message() {
        let messages = vec![SessionMessage {
            id: "m1".into(),
            role: MessageRole::User,
            content: "  What is the\nmeaning of life, the universe, and absolutely everything else?  ".into(),
            created_at: Utc::now(),
        }];
        let title = normalize_title(None, &messages);
        assert_eq!(title.chars().count(), 64);
        assert!(!title.contains('\n'));
    }

    #[test]
    fn create_and_get_round_trips() {
        let store = store();
        let created = store.create_session("proj-1", None, vec![]).unwrap();
        assert_eq!(created.summary.title, DEFAULT_SESSION_TITLE);
        let fetched = store.get_session(&created.summary.id).unwrap();
        assert_eq!(fetched.summary.id, created.summary.id);
    }

    #[test]
    fn append_turn_with_empty_messages_is_noop_on_count() {
        let store = store();
        let created = store.create_session("proj-1", None, vec![]).unwrap();
        let response = ChatResponse {
            mode: crate::types::ChatMode::Session,
            session_id: Some(created.summary.id.clone()),
            project_id: "proj-1".into(),
            query: "q".into(),
            answer: "a".into(),
            chat_model: "m".into(),
            embedding_model: "e".into(),
            rerank_model: None,
            hybrid_candidates: vec![],
            sources: vec![],
            documents: vec![],
            citations_used: vec![],
            created_at: Utc::now(),
        };
        let updated = store.append_turn(&created.summary.id, "proj-1", "", "", vec![], response).unwrap();
        assert_eq!(updated.summary.message_count, 0);
    }

    #[test]
    fn get_missing_session_returns_not_found() {
        let store = store();
        assert!(matches!(store.get_session("missing"), Err(RagError::NotFound(_))));
    }
}
