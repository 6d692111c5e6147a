//! In-memory stand-ins for the external collaborators.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use meshsync::error::{ClusterError, CommandError, EvaluatorError};
use meshsync::external::{
    ClusterClient, ConfigEvaluator, Container, ContainerPort, Deployment, GroupVersionKind, Pod,
    RenderedState, SidecarConfigurer, SidecarFragment, StatefulSet, Volume, WorkloadManifest,
};
use meshsync::reconcile::PROXY_PORT_NAME;

type ObjectKey = (String, String, String);

fn key(kind: &str, namespace: &str, name: &str) -> ObjectKey {
    (kind.to_string(), namespace.to_string(), name.to_string())
}

/// Cluster keeping objects as JSON, keyed by kind, namespace and name.
#[derive(Default)]
pub struct FakeCluster {
    objects: Mutex<BTreeMap<ObjectKey, Value>>,
    failing_namespaces: Mutex<BTreeSet<String>>,
    pub creates: Mutex<Vec<String>>,
    pub updates: Mutex<Vec<String>>,
    pub deletes: Mutex<Vec<String>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: serde::Serialize>(&self, resource: &T) {
        let manifest = WorkloadManifest::from_resource(resource).expect("serializable resource");
        self.insert_manifest(&manifest);
    }

    pub fn insert_manifest(&self, manifest: &WorkloadManifest) {
        self.objects.lock().unwrap().insert(
            key(manifest.kind(), manifest.namespace(), manifest.name()),
            manifest.value().clone(),
        );
    }

    pub fn remove(&self, kind: &str, namespace: &str, name: &str) {
        self.objects.lock().unwrap().remove(&key(kind, namespace, name));
    }

    /// Makes every list call in `namespace` fail.
    pub fn fail_listing(&self, namespace: &str) {
        self.failing_namespaces
            .lock()
            .unwrap()
            .insert(namespace.to_string());
    }

    pub fn restore_listing(&self, namespace: &str) {
        self.failing_namespaces.lock().unwrap().remove(namespace);
    }

    pub fn object(&self, kind: &str, namespace: &str, name: &str) -> Option<Value> {
        self.objects
            .lock()
            .unwrap()
            .get(&key(kind, namespace, name))
            .cloned()
    }

    pub fn typed<T: DeserializeOwned>(&self, kind: &str, namespace: &str, name: &str) -> Option<T> {
        self.object(kind, namespace, name)
            .map(|v| serde_json::from_value(v).expect("well-formed object"))
    }

    pub fn contains(&self, kind: &str, namespace: &str, name: &str) -> bool {
        self.object(kind, namespace, name).is_some()
    }

    pub fn update_count(&self) -> usize {
        self.updates.lock().unwrap().len()
    }

    pub fn create_count(&self) -> usize {
        self.creates.lock().unwrap().len()
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.lock().unwrap().len()
    }

    fn list<T: DeserializeOwned>(&self, kind: &str, namespace: &str) -> Result<Vec<T>, ClusterError> {
        if self.failing_namespaces.lock().unwrap().contains(namespace) {
            return Err(ClusterError::List {
                kind: kind.to_string(),
                namespace: namespace.to_string(),
                message: "connection refused".to_string(),
            });
        }
        self.objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((k, ns, _), _)| k == kind && ns == namespace)
            .map(|(_, v)| serde_json::from_value(v.clone()).map_err(ClusterError::from))
            .collect()
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn list_pods(&self, namespace: &str) -> Result<Vec<Pod>, ClusterError> {
        self.list("Pod", namespace)
    }

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<Deployment>, ClusterError> {
        self.list("Deployment", namespace)
    }

    async fn list_stateful_sets(&self, namespace: &str) -> Result<Vec<StatefulSet>, ClusterError> {
        self.list("StatefulSet", namespace)
    }

    async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        name: &str,
    ) -> Result<WorkloadManifest, ClusterError> {
        self.object(&gvk.kind, namespace, name)
            .map(WorkloadManifest::new)
            .ok_or_else(|| ClusterError::NotFound {
                kind: gvk.kind.clone(),
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }

    async fn create(&self, manifest: &WorkloadManifest) -> Result<(), ClusterError> {
        self.creates.lock().unwrap().push(manifest.describe());
        self.insert_manifest(manifest);
        Ok(())
    }

    async fn update(&self, manifest: &WorkloadManifest) -> Result<(), ClusterError> {
        self.updates.lock().unwrap().push(manifest.describe());
        self.insert_manifest(manifest);
        Ok(())
    }

    async fn delete(
        &self,
        gvk: &GroupVersionKind,
        namespace: &str,
        name: &str,
    ) -> Result<(), ClusterError> {
        let removed = self
            .objects
            .lock()
            .unwrap()
            .remove(&key(&gvk.kind, namespace, name));
        match removed {
            Some(_) => {
                self.deletes
                    .lock()
                    .unwrap()
                    .push(format!("{}/{}", namespace, name));
                Ok(())
            }
            None => Err(ClusterError::NotFound {
                kind: gvk.kind.clone(),
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
        }
    }
}

/// Evaluator returning whatever the test staged.
#[derive(Default)]
pub struct FakeEvaluator {
    rendered: Mutex<RenderedState>,
    fail_render: Mutex<bool>,
    fail_allowlist: Mutex<bool>,
    pub sidecar_requests: Mutex<Vec<String>>,
    pub allowlist_requests: Mutex<Vec<Vec<String>>>,
}

impl FakeEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self, rendered: RenderedState) {
        *self.rendered.lock().unwrap() = rendered;
    }

    pub fn fail_rendering(&self, fail: bool) {
        *self.fail_render.lock().unwrap() = fail;
    }

    pub fn fail_allowlist(&self, fail: bool) {
        *self.fail_allowlist.lock().unwrap() = fail;
    }

    pub fn allowlist_calls(&self) -> Vec<Vec<String>> {
        self.allowlist_requests.lock().unwrap().clone()
    }
}

pub fn sidecar_fragment() -> SidecarFragment {
    SidecarFragment {
        container: Container {
            name: "sidecar".to_string(),
            image: Some("mesh/proxy:1.0".to_string()),
            ports: vec![ContainerPort::named(PROXY_PORT_NAME, 10808)],
            ..Default::default()
        },
        volumes: vec![Volume {
            name: "sidecar-certs".to_string(),
            ..Default::default()
        }],
    }
}

#[async_trait]
impl ConfigEvaluator for FakeEvaluator {
    async fn render_all(&self) -> Result<RenderedState, EvaluatorError> {
        if *self.fail_render.lock().unwrap() {
            return Err(EvaluatorError::Render("unterminated string".to_string()));
        }
        Ok(self.rendered.lock().unwrap().clone())
    }

    async fn render_sidecar_for(&self, cluster_label: &str) -> Result<SidecarFragment, EvaluatorError> {
        self.sidecar_requests
            .lock()
            .unwrap()
            .push(cluster_label.to_string());
        Ok(sidecar_fragment())
    }

    async fn render_allowlist(&self, cluster_labels: &[String]) -> Result<Vec<u8>, EvaluatorError> {
        self.allowlist_requests
            .lock()
            .unwrap()
            .push(cluster_labels.to_vec());
        if *self.fail_allowlist.lock().unwrap() {
            return Err(EvaluatorError::Render("listener template missing".to_string()));
        }
        let body = serde_json::json!({
            "listener_key": "edge-ingress",
            "zone_key": "zone-default",
            "allowed": cluster_labels,
        });
        Ok(serde_json::to_vec(&body).expect("json"))
    }
}

/// Records every sidecar configuration request.
#[derive(Default)]
pub struct RecordingConfigurer {
    pub workloads: Mutex<Vec<String>>,
}

impl RecordingConfigurer {
    pub fn seen(&self) -> Vec<String> {
        self.workloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl SidecarConfigurer for RecordingConfigurer {
    async fn configure_sidecar(
        &self,
        workload: &str,
        _annotations: &BTreeMap<String, String>,
    ) -> Result<(), CommandError> {
        self.workloads.lock().unwrap().push(workload.to_string());
        Ok(())
    }
}
