//! Shared state handed to every reconciler.

use std::sync::Arc;

use tokio::sync::RwLock;

use super::pool::SidecarPool;
use crate::external::{ClusterClient, ConfigEvaluator, MeshCommandQueues};

/// The part of desired state the reconcilers depend on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesiredState {
    pub mesh_name: String,
    pub watch_namespaces: Vec<String>,
}

impl DesiredState {
    pub fn new(mesh_name: impl Into<String>, watch_namespaces: Vec<String>) -> Self {
        Self {
            mesh_name: mesh_name.into(),
            watch_namespaces,
        }
    }

    pub fn is_watched(&self, namespace: &str) -> bool {
        self.watch_namespaces.iter().any(|ns| ns == namespace)
    }
}

/// Collaborators and settings shared by the reconcilers and the operator.
pub struct InstallerContext {
    /// Read-locked for a whole scan; write-locked to replace.
    pub desired: RwLock<DesiredState>,
    pub cluster: Arc<dyn ClusterClient>,
    pub evaluator: Arc<dyn ConfigEvaluator>,
    pub queues: MeshCommandQueues,
    pub sidecars: SidecarPool,
    /// Name of the image pull secret referenced by injected sidecars.
    pub image_pull_secret: String,
}

impl InstallerContext {
    pub fn new(
        desired: DesiredState,
        cluster: Arc<dyn ClusterClient>,
        evaluator: Arc<dyn ConfigEvaluator>,
        queues: MeshCommandQueues,
        sidecars: SidecarPool,
        image_pull_secret: impl Into<String>,
    ) -> Self {
        Self {
            desired: RwLock::new(desired),
            cluster,
            evaluator,
            queues,
            sidecars,
            image_pull_secret: image_pull_secret.into(),
        }
    }
}
