use async_trait::async_trait;

use relay_core::error::Result;

use crate::types::RunSnapshot;

/// Async storage backend for paused-run snapshots, keyed by request id.
///
/// Saving under an existing id overwrites it (last snapshot wins).
/// Implementations must be thread-safe (`Send + Sync`).
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Store a snapshot under `snapshot.request_id`.
    async fn save(&self, snapshot: &RunSnapshot) -> Result<()>;

    /// Load the snapshot stored under `request_id`, if any.
    async fn load(&self, request_id: &str) -> Result<Option<RunSnapshot>>;

    /// Remove the snapshot. Returns whether one existed.
    async fn delete(&self, request_id: &str) -> Result<bool>;

    /// Load and discard in one go; a snapshot is consumed by exactly one resume.
    async fn take(&self, request_id: &str) -> Result<Option<RunSnapshot>> {
        let snapshot = self.load(request_id).await?;
        if snapshot.is_some() {
            self.delete(request_id).await?;
        }
        Ok(snapshot)
    }
}
