//! API routes

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::conversation::Message;
use crate::relay::{Relay, RelayError};
use crate::render::markdown_to_html;

/// Single chat page, embedded so the binary deploys on its own
const INDEX_HTML: &str = include_str!("../../static/index.html");

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<dyn Relay>,
}

impl AppState {
    pub fn new(relay: Arc<dyn Relay>) -> Self {
        Self { relay }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub message: Message,
    /// `message.content` rendered from markdown, for display
    pub html: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Everything the chat endpoint can answer with instead of a message
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error("Invalid request body: {0}")]
    InvalidBody(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Relay(err) => {
                StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            ApiError::InvalidBody(_) => StatusCode::BAD_REQUEST,
        };

        if status.is_server_error() {
            error!(error = ?self, "Chat request failed");
        }

        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::InvalidBody(e.body_text()))?;

    let message = state.relay.complete(&request.messages).await?;
    let html = markdown_to_html(&message.content);

    Ok(Json(ChatResponse { message, html }))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/chat", post(chat))
        .with_state(state)
}
