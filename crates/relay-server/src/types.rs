use serde::{Deserialize, Serialize};
use serde_json::Value;

use relay_core::message::Message;
use relay_graph::notification::Notification;

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    /// Key for a later resume. Generated when absent.
    #[serde(default)]
    pub request_id: Option<String>,
}

/// Body of `POST /api/chat/resume`.
#[derive(Debug, Clone, Deserialize)]
pub struct ResumeRequest {
    pub request_id: String,
    /// Human responses, each a serialized workflow event.
    pub responses: Vec<Value>,
}

/// One `data:` frame of the chat event stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatSseEvent {
    Text { delta: String },
    Annotation { notification: Notification },
    Paused {
        request_id: String,
        response_tag: String,
        payload: Value,
    },
    Error { kind: String, message: String },
}
