use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use relay_core::retriever::RetrievedNode;

/// Position within a batch of agent actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Shared by every notification of one batch.
    pub id: String,
    pub total: usize,
    /// Zero-based.
    pub current: usize,
}

/// Side-channel signal for the caller. Never dispatched to a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// Commentary about what an agent is doing.
    AgentRun {
        agent: String,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        progress: Option<Progress>,
    },
    /// Context snippets a response is grounded on.
    Sources { nodes: Vec<RetrievedNode> },
    /// A generated document, chart, code result, ...
    Artifact {
        kind: String,
        data: Value,
        created_at: DateTime<Utc>,
    },
    SuggestedQuestions { questions: Vec<String> },
    Custom { name: String, data: Value },
}

impl Notification {
    pub fn agent_run(agent: impl Into<String>, text: impl Into<String>) -> Self {
        Notification::AgentRun {
            agent: agent.into(),
            text: text.into(),
            progress: None,
        }
    }

    pub fn agent_progress(agent: impl Into<String>, text: impl Into<String>, progress: Progress) -> Self {
        Notification::AgentRun {
            agent: agent.into(),
            text: text.into(),
            progress: Some(progress),
        }
    }

    pub fn sources(nodes: Vec<RetrievedNode>) -> Self {
        Notification::Sources { nodes }
    }

    pub fn artifact(kind: impl Into<String>, data: Value) -> Self {
        Notification::Artifact {
            kind: kind.into(),
            data,
            created_at: Utc::now(),
        }
    }

    pub fn progress(&self) -> Option<&Progress> {
        match self {
            Notification::AgentRun { progress, .. } => progress.as_ref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn agent_run_omits_missing_progress() {
        let json = serde_json::to_value(Notification::agent_run("writer", "drafting")).unwrap();
        assert_eq!(json, json!({"type": "agent_run", "agent": "writer", "text": "drafting"}));
    }

    #[test]
    fn progress_roundtrip() {
        let n = Notification::agent_progress(
            "form",
            "extracting",
            Progress {
                id: "p1".into(),
                total: 3,
                current: 1,
            },
        );
        let parsed: Notification = serde_json::from_str(&serde_json::to_string(&n).unwrap()).unwrap();
        assert_eq!(parsed, n);
        assert_eq!(parsed.progress().map(|p| p.current), Some(1));
    }

    #[test]
    fn artifact_carries_timestamp() {
        let n = Notification::artifact("document", json!({"title": "Report"}));
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["type"], "artifact");
        assert!(json["created_at"].is_string());
    }
}
