//! Mesh discovery labels on pod templates.

use std::marker::PhantomData;

use async_trait::async_trait;

use super::context::{DesiredState, InstallerContext};
use super::pool::SidecarRequest;
use super::{
    Reconciler, ANNOTATION_CONFIGURE_SIDECAR, ANNOTATION_INJECT_SIDECAR_TO_PORT, LABEL_CLUSTER,
    LABEL_WORKLOAD,
};
use crate::external::{apply_logged, ApplyMode, PodTemplateSpec, TemplatedWorkload};

/// Value of the workload label for `cluster` in `mesh_name`.
pub fn workload_label(mesh_name: &str, cluster: &str) -> String {
    format!("{}.{}", mesh_name, cluster)
}

/// Adds the cluster and workload labels. Returns false when already labelled.
pub fn label_template(template: &mut PodTemplateSpec, mesh_name: &str, cluster: &str) -> bool {
    let labels = &mut template.metadata.labels;
    if labels.contains_key(LABEL_WORKLOAD) {
        return false;
    }
    labels.insert(LABEL_CLUSTER.to_string(), cluster.to_string());
    labels.insert(LABEL_WORKLOAD.to_string(), workload_label(mesh_name, cluster));
    true
}

/// Removes both mesh labels. Returns true when anything was removed.
pub fn strip_mesh_labels(template: &mut PodTemplateSpec) -> bool {
    let labels = &mut template.metadata.labels;
    let cluster = labels.remove(LABEL_CLUSTER).is_some();
    let workload = labels.remove(LABEL_WORKLOAD).is_some();
    cluster || workload
}

/// True when the template asks the mesh to configure its sidecar.
pub fn wants_sidecar_configuration(template: &PodTemplateSpec) -> bool {
    let annotations = &template.metadata.annotations;
    annotations.contains_key(ANNOTATION_INJECT_SIDECAR_TO_PORT)
        || annotations
            .get(ANNOTATION_CONFIGURE_SIDECAR)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

/// Labels each unlabelled workload with its cluster and mesh-qualified
/// workload identity, then re-applies it.
pub struct LabelReconciler<W> {
    _kind: PhantomData<fn() -> W>,
}

impl<W> LabelReconciler<W> {
    pub fn new() -> Self {
        Self { _kind: PhantomData }
    }
}

impl<W> Default for LabelReconciler<W> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<W: TemplatedWorkload> Reconciler<W> for LabelReconciler<W> {
    fn name(&self) -> &'static str {
        "labels"
    }

    async fn reconcile(&self, resource: &mut W, desired: &DesiredState, ctx: &InstallerContext) {
        let cluster = resource.metadata().name.clone();
        if !label_template(resource.template_mut(), &desired.mesh_name, &cluster) {
            return;
        }

        tracing::info!(
            kind = W::KIND,
            resource = %resource.qualified_name(),
            "labelling workload for mesh discovery"
        );

        if wants_sidecar_configuration(resource.template()) {
            ctx.sidecars.submit(SidecarRequest {
                workload: cluster.clone(),
                annotations: resource.template().metadata.annotations.clone(),
            });
        }

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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::ObjectMeta;

    fn template(labels: &[(&str, &str)], annotations: &[(&str, &str)]) -> PodTemplateSpec {
        let mut metadata = ObjectMeta::default();
        for (k, v) in labels {
            metadata = metadata.with_label(*k, *v);
        }
        for (k, v) in annotations {
            metadata = metadata.with_annotation(*k, *v);
        }
        PodTemplateSpec {
            metadata,
            ..Default::default()
        }
    }

    #[test]
    fn test_label_template() {
        let mut t = template(&[("app", "web")], &[]);
        assert!(label_template(&mut t, "prod", "web"));
        assert_eq!(t.metadata.labels[LABEL_CLUSTER], "web");
        assert_eq!(t.metadata.labels[LABEL_WORKLOAD], "prod.web");
        assert_eq!(t.metadata.labels["app"], "web");

        assert!(!label_template(&mut t, "other", "web"));
        assert_eq!(t.metadata.labels[LABEL_WORKLOAD], "prod.web");
    }

    #[test]
    fn test_existing_workload_label_is_left_alone() {
        let mut t = template(&[(LABEL_WORKLOAD, "custom")], &[]);
        assert!(!label_template(&mut t, "prod", "web"));
        assert!(!t.metadata.labels.contains_key(LABEL_CLUSTER));
    }

    #[test]
    fn test_strip_mesh_labels() {
        let mut t = template(&[(LABEL_CLUSTER, "a"), (LABEL_WORKLOAD, "m.a"), ("app", "a")], &[]);
        assert!(strip_mesh_labels(&mut t));
        assert!(!strip_mesh_labels(&mut t));
        assert_eq!(t.metadata.labels.len(), 1);
    }

    #[test]
    fn test_wants_sidecar_configuration() {
        assert!(!wants_sidecar_configuration(&template(&[], &[])));
        assert!(wants_sidecar_configuration(&template(
            &[],
            &[(ANNOTATION_INJECT_SIDECAR_TO_PORT, "8080")]
        )));
        assert!(wants_sidecar_configuration(&template(
            &[],
            &[(ANNOTATION_CONFIGURE_SIDECAR, "True")]
        )));
        assert!(!wants_sidecar_configuration(&template(
            &[],
            &[(ANNOTATION_CONFIGURE_SIDECAR, "false")]
        )));
    }
}
