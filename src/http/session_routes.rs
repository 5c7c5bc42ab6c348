//! Session CRUD HTTP surface (spec §6, §4.11).

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use crate::error::Result;
use crate::session::{SessionStore, SessionUpdate};
use crate::types::{ChatResponse, SessionMessage, SessionRecord, SessionSummary};

#[derive(Clone)]
pub struct SessionState {
    pub sessions: SessionStore,
}

pub fn router(state: SessionState) -> Router {
    Router::new()
        .route("/v1/sessions", get(list_sessions_handler).post(create_session_handler))
        .route("/v1/sessions/:id", get(get_session_handler).patch(patch_session_handler).delete(delete_session_handler))
        .with_state(state)
}

async fn list_sessions_handler(State(state): State<SessionState>) -> Result<Json<Vec<SessionSummary>>> {
    Ok(Json(state.sessions.list_sessions()?))
}

#[derive(Deserialize)]
struct CreateSessionRequest {
    project_id: String,
    title: Option<String>,
    #[serde(default)]
    selected_document_ids: Vec<String>,
}

async fn create_session_handler(State(state): State<SessionState>, Json(req): Json<CreateSessionRequest>) -> Result<Json<SessionRecord>> {
    Ok(Json(state.sessions.create_session(&req.project_id, req.title.as_deref(), req.selected_document_ids)?))
}

async fn get_session_handler(State(state): State<SessionState>, Path(id): Path<String>) -> Result<Json<SessionRecord>> {
    Ok(Json(state.sessions.get_session(&id)?))
}

async fn delete_session_handler(State(state): State<SessionState>, Path(id): Path<String>) -> Result<axum::http::StatusCode> {
    state.sessions.delete_session(&id)?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[derive(Deserialize, Default)]
struct PatchSessionRequest {
    title: Option<String>,
    messages: Option<Vec<SessionMessage>>,
    selected_document_ids: Option<Vec<String>>,
    #[serde(default)]
    selected_source_id: Option<Option<String>>,
    #[serde(default)]
    latest_response: Option<Option<ChatResponse>>,
}

async fn patch_session_handler(State(state): State<SessionState>, Path(id): Path<String>, Json(req): Json<PatchSessionRequest>) -> Result<Json<SessionRecord>> {
    let update = SessionUpdate {
        title: req.title,
        messages: req.messages,
        selected_document_ids: req.selected_document_ids,
        selected_source_id: req.selected_source_id,
        latest_response: req.latest_response,
    };
    Ok(Json(state.sessions.update_session(&id, update)?))
}
