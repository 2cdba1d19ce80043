use std::collections::VecDeque;
use std::sync::Arc;

use relay_checkpoint::store::SnapshotStore;
use relay_checkpoint::types::{RunSnapshot, SNAPSHOT_VERSION};
use relay_core::error::{Result, ResumeError};

use crate::context::{ContextState, WorkflowState};
use crate::event::WorkflowEvent;
use crate::handler::WorkflowHandler;
use crate::workflow::{RunOptions, Workflow};

impl<E: WorkflowEvent, S: WorkflowState> Workflow<E, S> {
    /// Continue a paused run with the human's response(s).
    ///
    /// The snapshot is removed from `store` once it has been validated, so a
    /// second resume with the same id fails with `SnapshotNotFound`. If the
    /// run pauses again it is saved back to the same store.
    pub async fn resume(
        &self,
        request_id: &str,
        responses: Vec<E>,
        store: Arc<dyn SnapshotStore>,
        options: RunOptions<E>,
    ) -> Result<WorkflowHandler> {
        let snapshot = store
            .load(request_id)
            .await?
            .ok_or_else(|| ResumeError::SnapshotNotFound(request_id.to_string()))?;
        let handler = self.resume_from_snapshot(snapshot, responses, options.with_store(Arc::clone(&store)))?;
        store.delete(request_id).await?;
        Ok(handler)
    }

    /// Continue a run from an already-loaded snapshot.
    ///
    /// The pending queue is restored exactly as captured and the responses are
    /// appended to its tail.
    pub fn resume_from_snapshot(
        &self,
        snapshot: RunSnapshot,
        responses: Vec<E>,
        mut options: RunOptions<E>,
    ) -> Result<WorkflowHandler> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(ResumeError::UnsupportedVersion {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            }
            .into());
        }
        if snapshot.workflow != self.name() {
            return Err(ResumeError::NotResumable(format!(
                "snapshot belongs to workflow '{}', not '{}'",
                snapshot.workflow,
                self.name()
            ))
            .into());
        }
        if snapshot.expected_responses.is_empty() {
            return Err(ResumeError::NotResumable("run is not awaiting human input".into()).into());
        }
        if responses.is_empty() {
            return Err(ResumeError::NotResumable("no human response supplied".into()).into());
        }
        if let Some(bad) = responses.iter().find(|r| !snapshot.expects(r.tag())) {
            return Err(ResumeError::NotResumable(format!(
                "run awaits {:?}, got '{}'",
                snapshot.expected_responses,
                bad.tag()
            ))
            .into());
        }

        let mut queue = snapshot
            .pending_events
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<VecDeque<E>, _>>()?;
        queue.extend(responses);
        let context: ContextState<S> = serde_json::from_value(snapshot.context)?;

        options.config.run_id = snapshot.run_id;
        options.config.request_id = Some(snapshot.request_id.clone());
        if options.config.tags.is_empty() {
            options.config.tags = snapshot.tags;
        }
        for (key, value) in snapshot.metadata {
            options.config.metadata.entry(key).or_insert(value);
        }
        tracing::info!(
            workflow = %self.name(),
            request_id = %snapshot.request_id,
            paused_by = %snapshot.paused_by,
            queued = queue.len(),
            "resuming run"
        );
        Ok(self.launch(queue, context, options, snapshot.dispatched))
    }
}
