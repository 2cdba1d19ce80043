use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// A ranked context snippet returned by a retriever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedNode {
    pub id: String,
    pub text: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

/// Contract for a retrieval backend (vector index, keyword search, ...).
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Return context snippets for `query`, best match first.
    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedNode>>;
}

/// Render retrieved nodes as a numbered context block for a prompt.
pub fn format_context(nodes: &[RetrievedNode]) -> String {
    nodes
        .iter()
        .enumerate()
        .map(|(i, node)| format!("[{}] (id: {})\n{}", i + 1, node.id, node.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}
