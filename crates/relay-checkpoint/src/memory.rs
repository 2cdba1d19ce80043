use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use relay_core::error::{GraphError, Result};

use crate::store::SnapshotStore;
use crate::types::RunSnapshot;

/// In-memory snapshot store for testing and single-process deployments.
///
/// Snapshots are kept as encoded blobs, so loading goes through the same
/// version check as a durable store. All data is lost when the store is dropped.
#[derive(Default)]
pub struct MemorySnapshotStore {
    /// Map: request_id → encoded snapshot
    data: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> GraphError {
    GraphError::Snapshot("memory store lock poisoned".into())
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save(&self, snapshot: &RunSnapshot) -> Result<()> {
        let bytes = snapshot.to_bytes()?;
        let mut data = self.data.write().map_err(|_| poisoned())?;
        data.insert(snapshot.request_id.clone(), bytes);
        Ok(())
    }

    async fn load(&self, request_id: &str) -> Result<Option<RunSnapshot>> {
        let data = self.data.read().map_err(|_| poisoned())?;
        data.get(request_id)
            .map(|bytes| RunSnapshot::from_bytes(bytes))
            .transpose()
    }

    async fn delete(&self, request_id: &str) -> Result<bool> {
        let mut data = self.data.write().map_err(|_| poisoned())?;
        Ok(data.remove(request_id).is_some())
    }
}
