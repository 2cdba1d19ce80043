#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::Notify;

use relay_core::error::{Result, ToolError};
use relay_core::message::{Message, Role};
use relay_core::retriever::{RetrievedNode, Retriever};
use relay_core::tool::{Tool, ToolDefinition};

/// A tool that records its inputs and either echoes or fails.
pub struct RecordingTool {
    name: &'static str,
    failure: Option<&'static str>,
    inputs: Mutex<Vec<Value>>,
}

impl RecordingTool {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            failure: None,
            inputs: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(name: &'static str, reason: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            failure: Some(reason),
            inputs: Mutex::new(Vec::new()),
        })
    }

    pub fn inputs(&self) -> Vec<Value> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Tool for RecordingTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.into(),
            description: format!("Mock tool: {}", self.name),
            input_schema: json!({"type": "object", "properties": {}}),
        }
    }

    async fn call(&self, input: Value) -> Result<String> {
        self.inputs.lock().unwrap().push(input.clone());
        match self.failure {
            Some(reason) => Err(ToolError::ExecutionFailed(reason.into()).into()),
            None => Ok(format!("{} ok: {input}", self.name)),
        }
    }
}

/// A tool that never finishes on its own and records whether its execution
/// was abandoned.
pub struct BlockingTool {
    name: &'static str,
    pub started: Notify,
    abandoned: Arc<AtomicBool>,
}

struct FlagOnDrop(Arc<AtomicBool>);

impl Drop for FlagOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl BlockingTool {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            started: Notify::new(),
            abandoned: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn was_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for BlockingTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.into(),
            description: "Waits forever".into(),
            input_schema: json!({"type": "object"}),
        }
    }

    async fn call(&self, _input: Value) -> Result<String> {
        let _flag = FlagOnDrop(Arc::clone(&self.abandoned));
        self.started.notify_one();
        std::future::pending::<()>().await;
        Ok("unreachable".into())
    }
}

pub struct StaticRetriever(pub Vec<RetrievedNode>);

#[async_trait]
impl Retriever for StaticRetriever {
    async fn retrieve(&self, _query: &str) -> Result<Vec<RetrievedNode>> {
        Ok(self.0.clone())
    }
}

pub fn node(id: &str, text: &str) -> RetrievedNode {
    RetrievedNode {
        id: id.into(),
        text: text.into(),
        score: 0.9,
        metadata: Default::default(),
    }
}

/// `(tool_call_id, is_error, content)` of every tool message.
pub fn tool_messages(messages: &[Message]) -> Vec<(String, bool, String)> {
    messages
        .iter()
        .filter_map(|m| match m {
            Message::Tool {
                content,
                tool_call_id,
                is_error,
            } => Some((tool_call_id.clone(), *is_error, content.clone())),
            _ => None,
        })
        .collect()
}

pub fn count_role(messages: &[Message], role: Role) -> usize {
    messages.iter().filter(|m| m.role() == role).count()
}
