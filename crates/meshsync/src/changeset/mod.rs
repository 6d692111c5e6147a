//! Content-hash change detection with persisted, crash-recoverable snapshots.

pub mod engine;
pub mod error;
pub mod hash;
pub mod refs;
pub mod store;

pub use engine::{
    ChangeSetEngine, ConfigDelta, EngineOptions, WorkloadDelta, DEFAULT_CONFIG_SNAPSHOT_KEY,
    DEFAULT_CONNECT_RETRY, DEFAULT_WORKLOAD_SNAPSHOT_KEY,
};
pub use error::StoreError;
pub use hash::structural_hash;
pub use refs::{ConfigObjectRef, WorkloadObjectRef, CATALOG_SERVICE, CONFIG_KINDS};
pub use store::{MemoryStateStore, SqliteStateStore, StateStore};
