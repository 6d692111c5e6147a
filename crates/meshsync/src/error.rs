use std::path::PathBuf;
use thiserror::Error;

use crate::changeset::StoreError;
use crate::gitops::GitOpsError;

#[derive(Error, Debug)]
pub enum MeshSyncError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("GitOps error: {0}")]
    GitOps(#[from] GitOpsError),

    #[error("State store error: {0}")]
    Store(#[from] StoreError),

    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("Evaluator error: {0}")]
    Evaluator(#[from] EvaluatorError),

    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    #[error("Telemetry error: {0}")]
    Telemetry(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("A branch OR a tag may be tracked, not both (branch: {branch}, tag: {tag})")]
    BranchAndTag { branch: String, tag: String },
}

/// Errors returned by the cluster control-plane client.
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("{kind} '{namespace}/{name}' not found")]
    NotFound {
        kind: String,
        namespace: String,
        name: String,
    },

    #[error("Failed to list {kind} in namespace '{namespace}': {message}")]
    List {
        kind: String,
        namespace: String,
        message: String,
    },

    #[error("Cluster API request failed: {0}")]
    Api(String),

    #[error("Failed to convert resource: {0}")]
    Conversion(#[from] serde_json::Error),
}

impl ClusterError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound { .. })
    }
}

/// Errors returned by the configuration evaluator.
#[derive(Error, Debug)]
pub enum EvaluatorError {
    #[error("Failed to render desired state: {0}")]
    Render(String),

    #[error("Failed to render sidecar for cluster '{cluster}': {message}")]
    Sidecar { cluster: String, message: String },

    #[error("Failed to render ingress allowlist: {0}")]
    Allowlist(String),
}

/// Errors from the mesh control-plane command path.
#[derive(Error, Debug, Clone)]
pub enum CommandError {
    #[error("Command queue '{0}' is closed")]
    QueueClosed(String),

    #[error("Command '{args}' failed: {output}")]
    Failed { args: String, output: String },

    #[error("Sidecar configuration for '{workload}' failed: {message}")]
    Sidecar { workload: String, message: String },
}

pub type Result<T> = std::result::Result<T, MeshSyncError>;
