use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use relay_core::error::{GraphError, ModelError, RelayError, ResumeError};

/// Application error type that maps to HTTP responses.
///
/// Only raised before the event stream starts; failures during a run are
/// reported inside the stream.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Relay(RelayError),
}

impl From<RelayError> for AppError {
    fn from(err: RelayError) -> Self {
        AppError::Relay(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            AppError::Relay(err) => (status_for(err), err.kind(), err.to_string()),
        };
        if status.is_server_error() {
            tracing::error!(%status, error = %message, "request failed");
        }

        let body = json!({ "error": message, "kind": kind });
        (status, axum::Json(body)).into_response()
    }
}

fn status_for(err: &RelayError) -> StatusCode {
    match err {
        RelayError::Resume(ResumeError::SnapshotNotFound(_)) => StatusCode::NOT_FOUND,
        RelayError::Resume(ResumeError::NotResumable(_) | ResumeError::UnsupportedVersion { .. }) => {
            StatusCode::CONFLICT
        }
        RelayError::Serialization(_) => StatusCode::BAD_REQUEST,
        RelayError::Model(ModelError::Auth(_)) => StatusCode::UNAUTHORIZED,
        RelayError::Model(ModelError::RateLimited { .. }) => StatusCode::TOO_MANY_REQUESTS,
        RelayError::Graph(GraphError::StepLimit { .. }) => StatusCode::BAD_REQUEST,
        RelayError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
