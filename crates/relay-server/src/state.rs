use std::sync::Arc;

use crate::service::WorkflowService;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<dyn WorkflowService>,
}

impl AppState {
    pub fn new(service: Arc<dyn WorkflowService>) -> Self {
        Self { service }
    }
}
