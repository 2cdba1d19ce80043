use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use relay_core::error::{Result, ResumeError};

/// Current on-disk snapshot format.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Frozen state of a run that paused for human input.
///
/// Pending events and context are stored as opaque JSON so the snapshot
/// schema does not depend on any particular workflow's event type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub version: u32,
    /// Key under which the snapshot is stored.
    pub request_id: String,
    /// Name of the workflow that paused.
    pub workflow: String,
    pub run_id: Uuid,
    /// Control events queued but not yet dispatched, in queue order.
    pub pending_events: Vec<Value>,
    /// Event tags a resume is allowed to inject.
    pub expected_responses: Vec<String>,
    /// Serialized run context (memory and workflow state).
    pub context: Value,
    /// Number of events dispatched before the pause.
    pub dispatched: usize,
    /// Step that requested the pause.
    pub paused_by: String,
    /// Run tags, carried into the resumed run.
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl RunSnapshot {
    pub fn new(request_id: impl Into<String>, workflow: impl Into<String>, run_id: Uuid) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            request_id: request_id.into(),
            workflow: workflow.into(),
            run_id,
            pending_events: Vec::new(),
            expected_responses: Vec::new(),
            context: Value::Null,
            dispatched: 0,
            paused_by: String::new(),
            tags: Vec::new(),
            metadata: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    /// Whether a response with `tag` may be injected on resume.
    pub fn expects(&self, tag: &str) -> bool {
        self.expected_responses.iter().any(|t| t == tag)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a stored blob, rejecting snapshots written by another format version.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let raw: Value = serde_json::from_slice(bytes)?;
        let found = raw.get("version").and_then(Value::as_u64).unwrap_or(0) as u32;
        if found != SNAPSHOT_VERSION {
            return Err(ResumeError::UnsupportedVersion {
                found,
                expected: SNAPSHOT_VERSION,
            }
            .into());
        }
        Ok(serde_json::from_value(raw)?)
    }
}
