use super::JsonBody;
use crate::dtos::{
    ChatRequest, ChatResponse, CreateSessionRequest, CreateSessionResponse,
    DeleteSessionResponse, SessionDetailResponse, SessionListResponse,
};
use crate::models::{Selector, Tier};
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;
use validator::Validate;

pub async fn create_session(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<CreateSessionRequest>,
) -> Result<Json<CreateSessionResponse>, AppError> {
    let selector = Selector::from_request(Tier::Standard, None, request.language.as_deref());
    let created = state.registry.create(selector)?;
    Ok(Json(created.into()))
}

pub async fn chat(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    JsonBody(request): JsonBody<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    request.validate()?;

    let reply = state.registry.send(&session_id, &request.message).await?;
    Ok(Json(reply.into()))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionDetailResponse>, AppError> {
    let snapshot = state.registry.get(&session_id)?;
    Ok(Json(snapshot.into()))
}

pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<DeleteSessionResponse>, AppError> {
    if !state.registry.delete(&session_id) {
        return Err(AppError::NotFound(anyhow::anyhow!("Session not found")));
    }

    Ok(Json(DeleteSessionResponse {
        success: true,
        message: "Session ended".to_string(),
    }))
}

pub async fn list_sessions(State(state): State<AppState>) -> Json<SessionListResponse> {
    let sessions = state.registry.list();
    Json(SessionListResponse {
        total: sessions.len(),
        sessions,
    })
}
