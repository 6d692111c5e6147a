//! Wires the sync controller, change-set engine and reconcile loop together.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use crate::changeset::{ChangeSetEngine, EngineOptions, SqliteStateStore, StateStore};
use crate::commands::{apply_all, delete_all_by_refs};
use crate::config::{OperatorConfig, ReconcileSettings};
use crate::error::{ClusterError, Result};
use crate::external::{
    apply, apply_logged, delete_all, ApplyMode, ApplyOutcome, ClusterClient, ConfigEvaluator,
    GroupVersionKind, MeshCommandQueues, SidecarConfigurer, TemplatedWorkload, WorkloadManifest,
};
use crate::gitops::{revision_callback, CallbackError, RevisionCallback, SyncController};
use crate::reconcile::labels::strip_mesh_labels;
use crate::reconcile::{DesiredState, InstallerContext, ReconcileLoop, ReconcilerSet, SidecarPool};
use crate::shutdown::Shutdown;

/// The services the operator drives.
#[derive(Clone)]
pub struct Collaborators {
    pub cluster: Arc<dyn ClusterClient>,
    pub evaluator: Arc<dyn ConfigEvaluator>,
    pub sidecar_configurer: Arc<dyn SidecarConfigurer>,
    pub queues: MeshCommandQueues,
}

/// What one desired-state application did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub manifests_applied: usize,
    pub manifests_deleted: usize,
    pub configs_applied: usize,
    pub configs_deleted: usize,
}

pub struct Operator {
    ctx: Arc<InstallerContext>,
    engine: Arc<ChangeSetEngine>,
    reconcilers: ReconcilerSet,
    interval: Duration,
    operator_namespace: String,
    shutdown: Shutdown,
    closed: AtomicBool,
}

impl Operator {
    /// Must be called inside a tokio runtime: the sidecar workers start here.
    pub fn new(
        settings: &ReconcileSettings,
        engine: Arc<ChangeSetEngine>,
        collaborators: Collaborators,
        shutdown: Shutdown,
    ) -> Self {
        let sidecars = SidecarPool::new(
            collaborators.sidecar_configurer,
            settings.sidecar_workers,
            settings.sidecar_queue_capacity,
        );
        let ctx = InstallerContext::new(
            settings.desired_state(),
            collaborators.cluster,
            collaborators.evaluator,
            collaborators.queues,
            sidecars,
            settings.image_pull_secret.clone(),
        );

        Self {
            ctx: Arc::new(ctx),
            engine,
            reconcilers: ReconcilerSet::standard(settings.mtls_enabled()),
            interval: settings.interval(),
            operator_namespace: settings.operator_namespace.clone(),
            shutdown,
            closed: AtomicBool::new(false),
        }
    }

    /// Opens the SQLite state store, starts the engine, and builds the
    /// operator plus a sync controller that re-applies desired state on
    /// every new revision.
    pub async fn start(
        config: &OperatorConfig,
        collaborators: Collaborators,
        shutdown: Shutdown,
    ) -> Result<(Arc<Self>, Arc<SyncController>)> {
        let sync_config = config.sync.to_sync_config()?;
        let store: Arc<dyn StateStore> = Arc::new(SqliteStateStore::new(&config.state.database_path));
        let engine = ChangeSetEngine::start(store, config.state.engine_options()).await;

        let operator = Arc::new(Self::new(
            &config.reconcile,
            Arc::clone(&engine),
            collaborators,
            shutdown.clone(),
        ));
        let sync = SyncController::new(sync_config, shutdown)
            .on_revision_changed(operator.sync_callback())
            .with_state(engine);

        Ok((operator, Arc::new(sync)))
    }

    /// Same as [`start`](Self::start) over a caller-provided store.
    pub async fn start_with_store(
        settings: &ReconcileSettings,
        store: Arc<dyn StateStore>,
        options: EngineOptions,
        collaborators: Collaborators,
        shutdown: Shutdown,
    ) -> Arc<Self> {
        let engine = ChangeSetEngine::start(store, options).await;
        Arc::new(Self::new(settings, engine, collaborators, shutdown))
    }

    pub fn context(&self) -> &Arc<InstallerContext> {
        &self.ctx
    }

    pub fn engine(&self) -> &Arc<ChangeSetEngine> {
        &self.engine
    }

    pub fn shutdown_handle(&self) -> &Shutdown {
        &self.shutdown
    }

    pub async fn desired_state(&self) -> DesiredState {
        self.ctx.desired.read().await.clone()
    }

    /// Swaps in new desired state. Waits for an in-flight scan to finish.
    pub async fn replace_desired_state(&self, desired: DesiredState) {
        let mut guard = self.ctx.desired.write().await;
        tracing::info!(
            mesh = %desired.mesh_name,
            namespaces = ?desired.watch_namespaces,
            "desired state replaced"
        );
        *guard = desired;
    }

    /// Callback for the sync controller: re-applies desired state.
    pub fn sync_callback(self: &Arc<Self>) -> RevisionCallback {
        let operator = Arc::clone(self);
        revision_callback(move |head: String| {
            let operator = Arc::clone(&operator);
            async move {
                tracing::info!(%head, "new revision, applying desired state");
                operator
                    .apply_desired_state()
                    .await
                    .map(|_| ())
                    .map_err(|e| Box::new(e) as CallbackError)
            }
        })
    }

    /// Renders everything and pushes only what changed since the last pass.
    pub async fn apply_desired_state(&self) -> Result<ApplyReport> {
        let desired = self.desired_state().await;
        let cluster = self.ctx.cluster.as_ref();

        for namespace in &desired.watch_namespaces {
            self.ensure_namespace(namespace).await;
            self.copy_pull_secret(namespace).await;
        }

        let rendered = self.ctx.evaluator.render_all().await?;
        let mut report = ApplyReport::default();

        let workloads = self.engine.compute_workload_delta(rendered.manifests);
        for manifest in &workloads.changed {
            if apply_logged(cluster, manifest, ApplyMode::CreateOrUpdate).await {
                report.manifests_applied += 1;
            }
        }
        delete_all(cluster, &workloads.deleted).await;
        report.manifests_deleted = workloads.deleted.len();

        let configs = self.engine.compute_config_delta(rendered.config_objects);
        report.configs_applied = apply_all(&self.ctx.queues, &configs.changed).await;
        report.configs_deleted = delete_all_by_refs(&self.ctx.queues, &configs.deleted).await;

        tracing::info!(?report, "desired state applied");
        Ok(report)
    }

    async fn ensure_namespace(&self, namespace: &str) {
        let manifest = WorkloadManifest::new(json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": { "name": namespace },
        }));
        apply_logged(self.ctx.cluster.as_ref(), &manifest, ApplyMode::GetOrCreate).await;
    }

    /// Copies the image pull secret from the operator namespace into `namespace`.
    async fn copy_pull_secret(&self, namespace: &str) {
        if namespace == self.operator_namespace {
            return;
        }
        match self.pull_secret_for(namespace).await {
            Ok(manifest) => {
                apply_logged(self.ctx.cluster.as_ref(), &manifest, ApplyMode::GetOrCreate).await;
            }
            Err(e) if e.is_not_found() => tracing::warn!(
                secret = %self.ctx.image_pull_secret,
                namespace = %self.operator_namespace,
                "image pull secret not found, not copying"
            ),
            Err(e) => tracing::error!(error = %e, "failed to read image pull secret"),
        }
    }

    async fn pull_secret_for(&self, namespace: &str) -> std::result::Result<WorkloadManifest, ClusterError> {
        let gvk = GroupVersionKind::new("", "v1", "Secret");
        let source = self
            .ctx
            .cluster
            .get(&gvk, &self.operator_namespace, &self.ctx.image_pull_secret)
            .await?;

        let mut secret = json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": {
                "name": self.ctx.image_pull_secret,
                "namespace": namespace,
            },
        });
        for field in ["type", "data"] {
            if let Some(value) = source.value().get(field) {
                secret[field] = value.clone();
            }
        }
        Ok(WorkloadManifest::new(secret))
    }

    /// Strips the mesh labels from deployments and stateful sets in watched
    /// namespaces. Returns how many resources were re-applied.
    pub async fn remove_mesh_labels(&self) -> usize {
        let desired = self.ctx.desired.read().await;
        let cluster = self.ctx.cluster.as_ref();
        let mut updated = 0;

        for namespace in &desired.watch_namespaces {
            match cluster.list_deployments(namespace).await {
                Ok(items) => updated += unlabel_all(cluster, items).await,
                Err(e) => tracing::error!(namespace = %namespace, error = %e, "failed to list deployments"),
            }
            match cluster.list_stateful_sets(namespace).await {
                Ok(items) => updated += unlabel_all(cluster, items).await,
                Err(e) => tracing::error!(namespace = %namespace, error = %e, "failed to list stateful sets"),
            }
        }

        tracing::info!(updated, "mesh labels removed");
        updated
    }

    pub fn reconcile_loop(&self) -> ReconcileLoop {
        ReconcileLoop::new(Arc::clone(&self.ctx), self.reconcilers.clone(), self.interval)
    }

    /// Clones the repository, applies desired state once, then runs the
    /// repository watch and reconcile loop until shutdown.
    pub async fn run(self: Arc<Self>, sync: Arc<SyncController>) -> Result<()> {
        sync.bootstrap().await?;

        if let Err(e) = self.apply_desired_state().await {
            tracing::error!(error = %e, "initial desired-state application failed");
        }

        let watcher = {
            let sync = Arc::clone(&sync);
            tokio::spawn(async move { sync.watch().await })
        };
        let reconciler = tokio::spawn(self.reconcile_loop().run(self.shutdown.listener()));

        let mut mesh_cancelled = self.ctx.queues.cancellation().listener();
        let mut stopping = self.shutdown.listener();
        tokio::select! {
            _ = stopping.wait() => {}
            _ = mesh_cancelled.wait() => {
                tracing::warn!("mesh client cancelled, stopping operator");
            }
        }

        sync.close().await;
        self.close().await;

        for (name, handle) in [("repository watch", watcher), ("reconcile loop", reconciler)] {
            if let Err(e) = handle.await {
                tracing::error!(task = name, error = %e, "task ended abnormally");
            }
        }
        Ok(())
    }

    /// Stops the loops, drains sidecar workers, and flushes snapshots. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shutdown.trigger();
        self.ctx.sidecars.shutdown().await;
        self.engine.close().await;
        tracing::info!("operator closed");
    }
}

async fn unlabel_all<W: TemplatedWorkload>(cluster: &dyn ClusterClient, items: Vec<W>) -> usize {
    let mut updated = 0;
    for mut item in items {
        if !strip_mesh_labels(item.template_mut()) {
            continue;
        }
        let manifest = match item.to_manifest() {
            Ok(manifest) => manifest,
            Err(e) => {
                tracing::error!(resource = %item.qualified_name(), error = %e, "failed to encode workload");
                continue;
            }
        };
        match apply(cluster, &manifest, ApplyMode::CreateOrUpdate).await {
            Ok(ApplyOutcome::Unchanged) => {}
            Ok(_) => updated += 1,
            Err(e) => tracing::error!(
                resource = %item.qualified_name(),
                error = %e,
                "failed to remove mesh labels"
            ),
        }
    }
    updated
}
