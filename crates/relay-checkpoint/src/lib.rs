pub mod file;
pub mod memory;
pub mod sqlite;
pub mod store;
pub mod types;

pub mod prelude {
    pub use crate::file::FileSnapshotStore;
    pub use crate::memory::MemorySnapshotStore;
    pub use crate::sqlite::SqliteSnapshotStore;
    pub use crate::store::SnapshotStore;
    pub use crate::types::{RunSnapshot, SNAPSHOT_VERSION};
}
