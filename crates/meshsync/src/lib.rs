pub mod changeset;
pub mod commands;
pub mod config;
pub mod error;
pub mod external;
pub mod gitops;
pub mod operator;
pub mod reconcile;
pub mod secrets;
pub mod shutdown;
pub mod telemetry;

pub use changeset::{
    ChangeSetEngine, ConfigDelta, ConfigObjectRef, EngineOptions, MemoryStateStore,
    SqliteStateStore, StateStore, WorkloadDelta, WorkloadObjectRef,
};
pub use commands::{Command, TargetQueue};
pub use config::{load_config, load_config_from_str, OperatorConfig};
pub use error::{
    ClusterError, CommandError, ConfigError, EvaluatorError, MeshSyncError, Result,
};
pub use external::{
    ClusterClient, ConfigEvaluator, ConfigObject, MeshCommandQueues, SidecarConfigurer,
    WorkloadManifest,
};
pub use gitops::{GitOpsError, RepoRef, SyncConfig, SyncController, SyncStatus};
pub use operator::{ApplyReport, Collaborators, Operator};
pub use reconcile::{DesiredState, InstallerContext, ReconcileLoop, ReconcilerSet};
pub use secrets::{resolve_secret, SecretError};
pub use shutdown::{Shutdown, ShutdownListener};
pub use telemetry::init_logging;
