use axum::extract::State;
use axum::response::IntoResponse;
use axum::{Json, Router, routing::post};

use relay_core::config::RunConfig;

use crate::error::AppError;
use crate::sse::{run_events, sse_response};
use crate::state::AppState;
use crate::types::{ChatRequest, ResumeRequest};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/chat", post(chat))
        .route("/chat/resume", post(resume))
}

async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.messages.is_empty() {
        return Err(AppError::BadRequest("messages must not be empty".into()));
    }
    let mut config = RunConfig::new();
    if let Some(request_id) = req.request_id {
        config = config.with_request_id(request_id);
    }

    let handler = state.service.start(req.messages, config);
    tracing::info!(
        workflow = %state.service.name(),
        request_id = %handler.request_id(),
        run_id = %handler.run_id(),
        "chat run started"
    );
    Ok(sse_response(run_events(handler)))
}

async fn resume(
    State(state): State<AppState>,
    Json(req): Json<ResumeRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.responses.is_empty() {
        return Err(AppError::BadRequest("responses must not be empty".into()));
    }
    let handler = state.service.resume(&req.request_id, req.responses).await?;
    tracing::info!(
        workflow = %state.service.name(),
        request_id = %req.request_id,
        "chat run resumed"
    );
    Ok(sse_response(run_events(handler)))
}
