//! Cluster control-plane client boundary.

use async_trait::async_trait;

use super::workload::{Deployment, GroupVersionKind, Pod, StatefulSet, WorkloadManifest};
use crate::changeset::WorkloadObjectRef;
use crate::error::ClusterError;

/// Upsert flavour used by [`apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    /// Create when absent, otherwise overwrite.
    CreateOrUpdate,
    /// Create when absent, otherwise leave the live object alone.
    GetOrCreate,
}

/// What [`apply`] ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Created,
    Updated,
    Unchanged,
}

#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>, ClusterError>;
    async fn list_deployments(&self, namespace: &str) -> Result<Vec<Deployment>, ClusterError>;
    async fn list_stateful_sets(&self, namespace: &str) -> Result<Vec<StatefulSet>, ClusterError>;

    /// Fetches one object; `ClusterError::NotFound` when absent.
    async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        name: &str,
    ) -> Result<WorkloadManifest, ClusterError>;

    async fn create(&self, manifest: &WorkloadManifest) -> Result<(), ClusterError>;
    async fn update(&self, manifest: &WorkloadManifest) -> Result<(), ClusterError>;

    async fn delete(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        name: &str,
    ) -> Result<(), ClusterError>;
}

/// Upserts `manifest` keyed by namespace and name.
pub async fn apply(
    client: &dyn ClusterClient,
    manifest: &WorkloadManifest,
    mode: ApplyMode,
) -> Result<ApplyOutcome, ClusterError> {
    let gvk = manifest.gvk();
    match client.get(&gvk, manifest.namespace(), manifest.name()).await {
        Ok(_) if mode == ApplyMode::GetOrCreate => Ok(ApplyOutcome::Unchanged),
        Ok(_) => {
            client.update(manifest).await?;
            Ok(ApplyOutcome::Updated)
        }
        Err(e) if e.is_not_found() => {
            client.create(manifest).await?;
            Ok(ApplyOutcome::Created)
        }
        Err(e) => Err(e),
    }
}

/// [`apply`] that logs instead of returning the error.
pub async fn apply_logged(client: &dyn ClusterClient, manifest: &WorkloadManifest, mode: ApplyMode) -> bool {
    match apply(client, manifest, mode).await {
        Ok(outcome) => {
            tracing::info!(resource = %manifest.describe(), ?outcome, "applied");
            true
        }
        Err(e) => {
            tracing::error!(resource = %manifest.describe(), error = %e, "apply failed");
            false
        }
    }
}

/// Deletes every referenced object, logging failures. Already-absent objects are fine.
pub async fn delete_all(client: &dyn ClusterClient, refs: &[WorkloadObjectRef]) {
    for r in refs {
        match client.delete(&r.kind, &r.namespace, &r.name).await {
            Ok(()) => tracing::info!(namespace = %r.namespace, name = %r.name, kind = %r.kind, "deleted"),
            Err(e) if e.is_not_found() => {
                tracing::debug!(namespace = %r.namespace, name = %r.name, "already deleted")
            }
            Err(e) => tracing::error!(
                namespace = %r.namespace,
                name = %r.name,
                kind = %r.kind,
                error = %e,
                "delete failed"
            ),
        }
    }
}
