//! Configuration evaluator boundary.

use async_trait::async_trait;

use super::workload::{Container, Volume, WorkloadManifest};
use crate::error::EvaluatorError;

/// One rendered mesh configuration object and its kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigObject {
    pub kind: String,
    /// Serialized JSON body as rendered.
    pub raw: Vec<u8>,
}

impl ConfigObject {
    pub fn new(kind: impl Into<String>, raw: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: kind.into(),
            raw: raw.into(),
        }
    }

    pub fn as_str_lossy(&self) -> String {
        String::from_utf8_lossy(&self.raw).into_owned()
    }
}

/// Full desired state rendered from the configuration tree.
#[derive(Debug, Clone, Default)]
pub struct RenderedState {
    pub config_objects: Vec<ConfigObject>,
    pub manifests: Vec<WorkloadManifest>,
}

/// Sidecar container plus the volumes it mounts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SidecarFragment {
    pub container: Container,
    pub volumes: Vec<Volume>,
}

/// Renders desired state from the declarative configuration.
#[async_trait]
pub trait ConfigEvaluator: Send + Sync {
    async fn render_all(&self) -> Result<RenderedState, EvaluatorError>;

    /// Sidecar definition for the workload carrying `cluster_label`.
    async fn render_sidecar_for(&self, cluster_label: &str) -> Result<SidecarFragment, EvaluatorError>;

    /// Ingress allowlist listener body admitting the given cluster labels.
    async fn render_allowlist(&self, cluster_labels: &[String]) -> Result<Vec<u8>, EvaluatorError>;
}
