//! File-based snapshot storage.
//!
//! Stores one JSON document per request id under a directory.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;

use relay_core::error::{GraphError, Result};

use crate::store::SnapshotStore;
use crate::types::RunSnapshot;

/// Directory-backed snapshot store.
///
/// Request ids become file names, so they are restricted to ASCII
/// alphanumerics, `-` and `_`.
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    /// The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, request_id: &str) -> Result<PathBuf> {
        let valid = !request_id.is_empty()
            && request_id.len() <= 128
            && request_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(GraphError::Snapshot(format!("invalid request id: {request_id:?}")).into());
        }
        Ok(self.dir.join(format!("{request_id}.json")))
    }
}

fn io_error(action: &str, e: std::io::Error) -> GraphError {
    GraphError::Snapshot(format!("{action}: {e}"))
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn save(&self, snapshot: &RunSnapshot) -> Result<()> {
        let path = self.path_for(&snapshot.request_id)?;
        let body = snapshot.to_bytes()?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error("create snapshot dir", e))?;

        // Write then rename so a reader never sees a half-written file.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| io_error("write snapshot", e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_error("rename snapshot", e))?;
        Ok(())
    }

    async fn load(&self, request_id: &str) -> Result<Option<RunSnapshot>> {
        let path = self.path_for(request_id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => RunSnapshot::from_bytes(&bytes).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error("read snapshot", e).into()),
        }
    }

    async fn delete(&self, request_id: &str) -> Result<bool> {
        let path = self.path_for(request_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error("delete snapshot", e).into()),
        }
    }
}
