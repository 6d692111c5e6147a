//! The periodic reconciliation loop.

use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;

use super::allowlist::AllowlistReconciler;
use super::context::{DesiredState, InstallerContext};
use super::labels::LabelReconciler;
use super::sidecar::SidecarInjectionReconciler;
use super::Reconciler;
use crate::external::{Deployment, Pod, StatefulSet};
use crate::shutdown::ShutdownListener;

pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(30);

/// Registered reconcilers per resource kind, run in registration order.
#[derive(Default, Clone)]
pub struct ReconcilerSet {
    pub pods: Vec<Arc<dyn Reconciler<Pod>>>,
    pub deployments: Vec<Arc<dyn Reconciler<Deployment>>>,
    pub stateful_sets: Vec<Arc<dyn Reconciler<StatefulSet>>>,
}

impl ReconcilerSet {
    /// Labels on deployments and stateful sets, sidecar injection on
    /// deployments, and the ingress allowlist on pods when mutual TLS is on.
    pub fn standard(mtls_enabled: bool) -> Self {
        let mut set = Self::default();
        if mtls_enabled {
            set.pods.push(Arc::new(AllowlistReconciler::new()));
        }
        set.deployments.push(Arc::new(LabelReconciler::<Deployment>::new()));
        set.deployments
            .push(Arc::new(SidecarInjectionReconciler::<Deployment>::new()));
        set.stateful_sets
            .push(Arc::new(LabelReconciler::<StatefulSet>::new()));
        set
    }

    pub fn is_empty(&self) -> bool {
        self.pods.is_empty() && self.deployments.is_empty() && self.stateful_sets.is_empty()
    }
}

/// Counts from one pass, for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    pub namespaces: usize,
    pub pods: usize,
    pub deployments: usize,
    pub stateful_sets: usize,
    pub list_errors: usize,
}

/// Resource kinds whose listing failed in at least one namespace.
#[derive(Default)]
struct FailedKinds {
    pods: bool,
    deployments: bool,
    stateful_sets: bool,
}

async fn run_each<R: Send>(
    reconcilers: &[Arc<dyn Reconciler<R>>],
    resources: Vec<R>,
    desired: &DesiredState,
    ctx: &InstallerContext,
) -> usize {
    let count = resources.len();
    for mut resource in resources {
        for reconciler in reconcilers {
            reconciler.reconcile(&mut resource, desired, ctx).await;
        }
    }
    count
}

pub struct ReconcileLoop {
    ctx: Arc<InstallerContext>,
    reconcilers: ReconcilerSet,
    interval: Duration,
}

impl ReconcileLoop {
    pub fn new(ctx: Arc<InstallerContext>, reconcilers: ReconcilerSet, interval: Duration) -> Self {
        Self {
            ctx,
            reconcilers,
            interval,
        }
    }

    pub fn context(&self) -> &Arc<InstallerContext> {
        &self.ctx
    }

    /// One scan of every watched namespace under the desired-state read lock.
    ///
    /// A failed listing is logged and the pass moves on.
    pub async fn run_pass(&self) -> PassReport {
        let ctx = self.ctx.as_ref();
        let desired = ctx.desired.read().await;
        let mut report = PassReport::default();
        let mut failed = FailedKinds::default();

        for namespace in &desired.watch_namespaces {
            report.namespaces += 1;

            if !self.reconcilers.pods.is_empty() {
                match ctx.cluster.list_pods(namespace).await {
                    Ok(pods) => {
                        report.pods += run_each(&self.reconcilers.pods, pods, &desired, ctx).await
                    }
                    Err(e) => {
                        report.list_errors += 1;
                        failed.pods = true;
                        tracing::error!(namespace = %namespace, error = %e, "failed to list pods");
                    }
                }
            }

            if !self.reconcilers.deployments.is_empty() {
                match ctx.cluster.list_deployments(namespace).await {
                    Ok(items) => {
                        report.deployments +=
                            run_each(&self.reconcilers.deployments, items, &desired, ctx).await
                    }
                    Err(e) => {
                        report.list_errors += 1;
                        failed.deployments = true;
                        tracing::error!(namespace = %namespace, error = %e, "failed to list deployments");
                    }
                }
            }

            if !self.reconcilers.stateful_sets.is_empty() {
                match ctx.cluster.list_stateful_sets(namespace).await {
                    Ok(items) => {
                        report.stateful_sets +=
                            run_each(&self.reconcilers.stateful_sets, items, &desired, ctx).await
                    }
                    Err(e) => {
                        report.list_errors += 1;
                        failed.stateful_sets = true;
                        tracing::error!(namespace = %namespace, error = %e, "failed to list stateful sets");
                    }
                }
            }
        }

        for reconciler in &self.reconcilers.pods {
            reconciler.finish_pass(&desired, ctx, !failed.pods).await;
        }
        for reconciler in &self.reconcilers.deployments {
            reconciler.finish_pass(&desired, ctx, !failed.deployments).await;
        }
        for reconciler in &self.reconcilers.stateful_sets {
            reconciler.finish_pass(&desired, ctx, !failed.stateful_sets).await;
        }

        report
    }

    /// Sleeps one interval, runs a pass, repeats. Stops on shutdown or when
    /// the mesh client is cancelled.
    pub async fn run(self, mut shutdown: ShutdownListener) {
        tracing::info!(interval_secs = self.interval.as_secs(), "reconcile loop started");
        let mut cancelled = self.ctx.queues.cancellation().listener();

        loop {
            let stop = tokio::select! {
                stopped = shutdown.sleep_or_shutdown(self.interval) => stopped,
                _ = cancelled.wait() => true,
            };
            if stop {
                break;
            }

            let pass_id = uuid::Uuid::new_v4();
            let span = tracing::debug_span!("reconcile_pass", %pass_id);
            let report = self.run_pass().instrument(span).await;
            tracing::debug!(?report, "reconcile pass finished");

            if self.ctx.queues.is_cancelled() || shutdown.is_triggered() {
                break;
            }
        }

        tracing::info!("reconcile loop stopped");
    }
}
