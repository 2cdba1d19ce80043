use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};

use relay_core::error::{GraphError, Result};

use crate::store::SnapshotStore;
use crate::types::RunSnapshot;

/// SQLite-backed snapshot store for durable persistence.
///
/// Thread-safe via `Arc<Mutex<Connection>>`. All SQLite operations are
/// dispatched to a blocking thread via `tokio::task::spawn_blocking`.
pub struct SqliteSnapshotStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSnapshotStore {
    /// Open (or create) a SQLite database at the given path.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| GraphError::Snapshot(format!("failed to open database: {e}")))?;
        Self::with_connection(conn)
    }

    /// Create an in-memory SQLite database (useful for tests).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| GraphError::Snapshot(format!("failed to open in-memory db: {e}")))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS run_snapshots (
                request_id TEXT PRIMARY KEY,
                workflow TEXT NOT NULL,
                version INTEGER NOT NULL,
                body BLOB NOT NULL,
                created_at TEXT NOT NULL
            );",
        )
        .map_err(|e| GraphError::Snapshot(format!("failed to create table: {e}")))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| GraphError::Snapshot("sqlite connection lock poisoned".into()))?;
            f(&conn)
        })
        .await
        .map_err(|e| GraphError::Snapshot(format!("spawn_blocking: {e}")))?
    }
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn save(&self, snapshot: &RunSnapshot) -> Result<()> {
        let body = snapshot.to_bytes()?;
        let request_id = snapshot.request_id.clone();
        let workflow = snapshot.workflow.clone();
        let version = snapshot.version;
        let created_at = snapshot.created_at.to_rfc3339();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO run_snapshots
                    (request_id, workflow, version, body, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![request_id, workflow, version, body, created_at],
            )
            .map_err(|e| GraphError::Snapshot(format!("insert snapshot: {e}")))?;
            tracing::debug!(request_id = %request_id, "snapshot saved");
            Ok(())
        })
        .await
    }

    async fn load(&self, request_id: &str) -> Result<Option<RunSnapshot>> {
        let request_id = request_id.to_owned();
        let body: Option<Vec<u8>> = self
            .blocking(move |conn| {
                conn.query_row(
                    "SELECT body FROM run_snapshots WHERE request_id = ?1",
                    params![request_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| GraphError::Snapshot(format!("query: {e}")).into())
            })
            .await?;
        body.map(|b| RunSnapshot::from_bytes(&b)).transpose()
    }

    async fn delete(&self, request_id: &str) -> Result<bool> {
        let request_id = request_id.to_owned();
        self.blocking(move |conn| {
            let removed = conn
                .execute(
                    "DELETE FROM run_snapshots WHERE request_id = ?1",
                    params![request_id],
                )
                .map_err(|e| GraphError::Snapshot(format!("delete: {e}")))?;
            Ok(removed > 0)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::error::{RelayError, ResumeError};
    use serde_json::json;
    use uuid::Uuid;

    fn make_snapshot(request_id: &str) -> RunSnapshot {
        let mut snapshot = RunSnapshot::new(request_id, "form_fill", Uuid::new_v4());
        snapshot.pending_events = vec![json!({"type": "input", "text": "hello"})];
        snapshot.expected_responses = vec!["fill_confirmation".into()];
        snapshot.context = json!({
            "memory": {"messages": [{"role": "user", "content": "hello"}]},
            "state": {"pending_calls": []}
        });
        snapshot.dispatched = 4;
        snapshot.paused_by = "fill".into();
        snapshot
    }

    #[tokio::test]
    async fn save_and_load() {
        let store = SqliteSnapshotStore::in_memory().unwrap();
        let snapshot = make_snapshot("req-1");
        store.save(&snapshot).await.unwrap();

        let loaded = store.load("req-1").await.unwrap().unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[tokio::test]
    async fn load_nonexistent() {
        let store = SqliteSnapshotStore::in_memory().unwrap();
        assert!(store.load("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn overwrite_keeps_single_row() {
        let store = SqliteSnapshotStore::in_memory().unwrap();
        let mut snapshot = make_snapshot("req-1");
        store.save(&snapshot).await.unwrap();
        snapshot.dispatched = 9;
        store.save(&snapshot).await.unwrap();

        assert_eq!(store.load("req-1").await.unwrap().unwrap().dispatched, 9);
        assert!(store.delete("req-1").await.unwrap());
        assert!(store.load("req-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn take_consumes_once() {
        let store = SqliteSnapshotStore::in_memory().unwrap();
        store.save(&make_snapshot("req-1")).await.unwrap();
        assert!(store.take("req-1").await.unwrap().is_some());
        assert!(store.take("req-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn persists_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshots.db");
        let snapshot = make_snapshot("req-durable");
        {
            let store = SqliteSnapshotStore::new(&path).unwrap();
            store.save(&snapshot).await.unwrap();
        }
        let store = SqliteSnapshotStore::new(&path).unwrap();
        assert_eq!(store.load("req-durable").await.unwrap(), Some(snapshot));
    }

    #[tokio::test]
    async fn foreign_version_rejected_on_load() {
        let store = SqliteSnapshotStore::in_memory().unwrap();
        let mut raw = serde_json::to_value(make_snapshot("req-old")).unwrap();
        raw["version"] = json!(0);
        let body = serde_json::to_vec(&raw).unwrap();
        store
            .blocking(move |conn| {
                conn.execute(
                    "INSERT INTO run_snapshots (request_id, workflow, version, body, created_at)
                     VALUES ('req-old', 'form_fill', 0, ?1, '')",
                    params![body],
                )
                .unwrap();
                Ok(())
            })
            .await
            .unwrap();

        let err = store.load("req-old").await.unwrap_err();
        assert!(matches!(
            err,
            RelayError::Resume(ResumeError::UnsupportedVersion { found: 0, .. })
        ));
    }
}
