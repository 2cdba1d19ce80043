pub mod api;
pub mod error;
pub mod service;
pub mod sse;
pub mod state;
pub mod types;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::service::WorkflowService;
use crate::state::AppState;

/// Router serving `service` under `/api/chat`.
pub fn app_router(service: Arc<dyn WorkflowService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    api::api_routes(AppState::new(service)).layer(cors)
}
