//! Proxy sidecar injection into workload pod templates.

use std::marker::PhantomData;

use async_trait::async_trait;

use super::context::{DesiredState, InstallerContext};
use super::{Reconciler, ANNOTATION_INJECT_SIDECAR_TO_PORT, LABEL_CLUSTER, PROXY_PORT_NAME};
use crate::external::{
    apply_logged, ApplyMode, LocalObjectReference, PodTemplateSpec, SidecarFragment,
    TemplatedWorkload,
};

/// Cluster label of a template that asks for a sidecar and does not have one yet.
pub fn injection_target(template: &PodTemplateSpec) -> Option<&str> {
    let requested = template
        .metadata
        .annotations
        .get(ANNOTATION_INJECT_SIDECAR_TO_PORT)
        .is_some_and(|port| !port.is_empty());
    if !requested || template.spec.has_port_named(PROXY_PORT_NAME) {
        return None;
    }
    template.metadata.labels.get(LABEL_CLUSTER).map(String::as_str)
}

/// Appends the sidecar container and its volumes, and references the pull secret.
pub fn inject(template: &mut PodTemplateSpec, fragment: SidecarFragment, image_pull_secret: &str) {
    let spec = &mut template.spec;
    spec.containers.push(fragment.container);
    spec.volumes.extend(fragment.volumes);
    if !spec
        .image_pull_secrets
        .iter()
        .any(|secret| secret.name == image_pull_secret)
    {
        spec.image_pull_secrets.push(LocalObjectReference {
            name: image_pull_secret.to_string(),
        });
    }
}

/// Injects the rendered proxy sidecar into annotated, labelled workloads.
pub struct SidecarInjectionReconciler<W> {
    _kind: PhantomData<fn() -> W>,
}

impl<W> SidecarInjectionReconciler<W> {
    pub fn new() -> Self {
        Self { _kind: PhantomData }
    }
}

impl<W> Default for SidecarInjectionReconciler<W> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<W: TemplatedWorkload> Reconciler<W> for SidecarInjectionReconciler<W> {
    fn name(&self) -> &'static str {
        "sidecar-injection"
    }

    async fn reconcile(&self, resource: &mut W, _desired: &DesiredState, ctx: &InstallerContext) {
        let Some(cluster) = injection_target(resource.template()).map(str::to_string) else {
            return;
        };

        let fragment = match ctx.evaluator.render_sidecar_for(&cluster).await {
            Ok(fragment) => fragment,
            Err(e) => {
                tracing::error!(
                    resource = %resource.qualified_name(),
                    cluster = %cluster,
                    error = %e,
                    "failed to render sidecar"
                );
                return;
            }
        };

        tracing::info!(
            kind = W::KIND,
            resource = %resource.qualified_name(),
            cluster = %cluster,
            "injecting sidecar"
        );
        inject(resource.template_mut(), fragment, &ctx.image_pull_secret);

        match resource.to_manifest() {
            Ok(manifest) => {
                apply_logged(ctx.cluster.as_ref(), &manifest, ApplyMode::CreateOrUpdate).await;
            }
            Err(e) => tracing::error!(
                resource = %resource.qualified_name(),
                error = %e,
                "failed to encode workload"
            ),
        }
    }
}
