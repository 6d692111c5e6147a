//! Mutual-TLS ingress allowlist kept in step with the sidecar-bearing pods.

use std::collections::BTreeSet;
use std::sync::Mutex;

use async_trait::async_trait;

use super::context::{DesiredState, InstallerContext};
use super::{Reconciler, LABEL_CLUSTER, PROXY_PORT_NAME};
use crate::commands::make_apply;
use crate::external::{ConfigObject, Pod};

/// Config kind the rendered allowlist is applied as.
pub const ALLOWLIST_KIND: &str = "listener";

/// Cluster label of a pod that runs a proxy sidecar.
pub fn sidecar_cluster(pod: &Pod) -> Option<&str> {
    if !pod.spec.has_port_named(PROXY_PORT_NAME) {
        return None;
    }
    pod.metadata.labels.get(LABEL_CLUSTER).map(String::as_str)
}

/// Collects the clusters of sidecar pods over a pass and, once the pass is
/// done, re-applies the ingress allowlist when the set changed.
#[derive(Default)]
pub struct AllowlistReconciler {
    seen: Mutex<BTreeSet<String>>,
    last_applied: Mutex<Vec<String>>,
}

impl AllowlistReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// The sorted set most recently sent to the mesh.
    pub fn last_applied(&self) -> Vec<String> {
        match self.last_applied.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn take_seen(&self) -> Vec<String> {
        let mut guard = match self.seen.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::take(&mut *guard).into_iter().collect()
    }

    fn set_last_applied(&self, labels: Vec<String>) {
        match self.last_applied.lock() {
            Ok(mut guard) => *guard = labels,
            Err(poisoned) => *poisoned.into_inner() = labels,
        }
    }
}

#[async_trait]
impl Reconciler<Pod> for AllowlistReconciler {
    fn name(&self) -> &'static str {
        "ingress-allowlist"
    }

    async fn reconcile(&self, pod: &mut Pod, _desired: &DesiredState, _ctx: &InstallerContext) {
        let Some(cluster) = sidecar_cluster(pod) else {
            return;
        };
        match self.seen.lock() {
            Ok(mut seen) => {
                seen.insert(cluster.to_string());
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(cluster.to_string());
            }
        }
    }

    async fn finish_pass(&self, _desired: &DesiredState, ctx: &InstallerContext, complete: bool) {
        let current = self.take_seen();
        if !complete {
            tracing::warn!(
                clusters = ?current,
                "pod listing incomplete, keeping the current ingress allowlist"
            );
            return;
        }
        if current.is_empty() || current == self.last_applied() {
            return;
        }

        let rendered = match ctx.evaluator.render_allowlist(&current).await {
            Ok(rendered) => rendered,
            Err(e) => {
                tracing::error!(error = %e, clusters = ?current, "failed to render ingress allowlist");
                return;
            }
        };

        let Some(command) = make_apply(&ConfigObject::new(ALLOWLIST_KIND, rendered)) else {
            return;
        };
        match ctx.queues.send(command).await {
            Ok(()) => {
                tracing::info!(clusters = ?current, "ingress allowlist updated");
                self.set_last_applied(current);
            }
            Err(e) => tracing::error!(error = %e, "failed to enqueue ingress allowlist"),
        }
    }
}
