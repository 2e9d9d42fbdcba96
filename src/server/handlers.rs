//! HTTP request handlers

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::trace::TraceLayer;

use super::types::{
    ChatRequest, ChatResponse, ErrorResponse, HealthResponse, ListQuery, WelcomeResponse,
};
use super::AppState;
use crate::notes::{DbError, NewNote, Note};
use crate::provider::ProviderConfig;
use crate::ConversationState;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/notes", get(list_notes).post(create_note))
        .route("/notes/", get(list_notes).post(create_note))
        .route("/chat", post(chat))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "cortex",
    })
}

async fn root() -> Json<WelcomeResponse> {
    Json(WelcomeResponse {
        message: "Welcome to The Second Brain Cortex",
    })
}

async fn create_note(
    State(state): State<AppState>,
    payload: Result<Json<NewNote>, JsonRejection>,
) -> Result<Json<Note>, AppError> {
    let Json(note) = payload?;
    let note = state.notes.create(note).await?;
    Ok(Json(note))
}

async fn list_notes(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Note>>, AppError> {
    let notes = state.notes.list(query.skip, query.limit()).await?;
    Ok(Json(notes))
}

async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let Json(req) = payload?;
    if req.message.trim().is_empty() {
        return Err(AppError::BadRequest("message must not be empty".to_string()));
    }

    let config = ProviderConfig::new(req.provider, req.api_key);
    let result = state
        .workflow
        .run(ConversationState::from_user(req.message), config)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Chat workflow failed");
            AppError::Internal(e.to_string())
        })?;

    let response = result
        .last_reply()
        .map(|m| m.content().to_string())
        .unwrap_or_default();
    Ok(Json(ChatResponse { response }))
}

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    Internal(String),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<DbError> for AppError {
    fn from(e: DbError) -> Self {
        tracing::error!(error = %e, "Note store failed");
        AppError::Internal(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(ErrorResponse::new(message))).into_response()
    }
}
