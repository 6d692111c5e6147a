//! Periodic repair of live workloads in watched namespaces.

pub mod allowlist;
pub mod context;
pub mod dispatch;
pub mod labels;
pub mod pool;
pub mod sidecar;

use async_trait::async_trait;

pub use allowlist::AllowlistReconciler;
pub use context::{DesiredState, InstallerContext};
pub use dispatch::{PassReport, ReconcileLoop, ReconcilerSet, DEFAULT_RECONCILE_INTERVAL};
pub use labels::LabelReconciler;
pub use pool::{SidecarPool, SidecarRequest};
pub use sidecar::SidecarInjectionReconciler;

/// Pod-template label naming the workload's mesh cluster (service discovery).
pub const LABEL_CLUSTER: &str = "meshsync.io/cluster";
/// Pod-template label `<mesh>.<cluster>` used for mutual-TLS subject matching.
pub const LABEL_WORKLOAD: &str = "meshsync.io/workload";
/// Pod-template annotation requesting a sidecar bound to the given port.
pub const ANNOTATION_INJECT_SIDECAR_TO_PORT: &str = "meshsync.io/inject-sidecar-to";
/// Pod-template annotation asking the mesh to configure the workload's sidecar.
pub const ANNOTATION_CONFIGURE_SIDECAR: &str = "meshsync.io/configure-sidecar";
/// Container port name carried by an injected proxy.
pub const PROXY_PORT_NAME: &str = "proxy";

/// One idempotent repair step for resources of type `R`.
///
/// Reconcilers run in registration order against the same resource, so a
/// later reconciler sees the in-memory changes of an earlier one.
#[async_trait]
pub trait Reconciler<R: Send>: Send + Sync {
    fn name(&self) -> &'static str;

    async fn reconcile(&self, resource: &mut R, desired: &DesiredState, ctx: &InstallerContext);

    /// Runs once after every resource of the pass has been visited.
    ///
    /// `complete` is false when listing this resource kind failed in some
    /// watched namespace, so the pass saw only part of the live state.
    async fn finish_pass(
        &self,
        _desired: &DesiredState,
        _ctx: &InstallerContext,
        _complete: bool,
    ) {
    }
}
