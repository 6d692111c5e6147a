//! Builders for workloads and config objects.

#![allow(dead_code)]

use serde_json::json;

use meshsync::external::{
    ConfigObject, Container, ContainerPort, Deployment, ObjectMeta, Pod, PodTemplateSpec,
    StatefulSet, TemplatedWorkload, WorkloadManifest,
};
use meshsync::reconcile::{ANNOTATION_INJECT_SIDECAR_TO_PORT, LABEL_CLUSTER, PROXY_PORT_NAME};

/// Builder for deployments and stateful sets.
pub struct WorkloadBuilder {
    namespace: String,
    name: String,
    template: PodTemplateSpec,
}

impl WorkloadBuilder {
    pub fn new(namespace: &str, name: &str) -> Self {
        let template = PodTemplateSpec {
            metadata: ObjectMeta::default().with_label("app", name),
            ..Default::default()
        };
        let mut builder = Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            template,
        };
        builder.template.spec.containers.push(Container {
            name: "app".to_string(),
            image: Some(format!("registry.local/{}:1", name)),
            ports: vec![ContainerPort::named("http", 8080)],
            ..Default::default()
        });
        builder
    }

    pub fn label(mut self, key: &str, value: &str) -> Self {
        self.template.metadata.labels.insert(key.to_string(), value.to_string());
        self
    }

    pub fn annotation(mut self, key: &str, value: &str) -> Self {
        self.template
            .metadata
            .annotations
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn inject_sidecar_to(self, port: &str) -> Self {
        self.annotation(ANNOTATION_INJECT_SIDECAR_TO_PORT, port)
    }

    pub fn build<W: TemplatedWorkload>(self) -> W {
        let mut workload = W::new_named(&self.namespace, &self.name);
        *workload.template_mut() = self.template;
        workload
    }

    pub fn deployment(self) -> Deployment {
        self.build()
    }

    pub fn stateful_set(self) -> StatefulSet {
        self.build()
    }
}

/// A running pod; with `cluster` set it carries a proxy sidecar.
pub fn pod(namespace: &str, name: &str, cluster: Option<&str>) -> Pod {
    let mut pod = Pod::new(namespace, name);
    pod.spec.containers.push(Container {
        name: "app".to_string(),
        ports: vec![ContainerPort::named("http", 8080)],
        ..Default::default()
    });
    if let Some(cluster) = cluster {
        pod.metadata
            .labels
            .insert(LABEL_CLUSTER.to_string(), cluster.to_string());
        pod.spec.containers.push(Container {
            name: "sidecar".to_string(),
            ports: vec![ContainerPort::named(PROXY_PORT_NAME, 10808)],
            ..Default::default()
        });
    }
    pod
}

pub fn cluster_object(key: &str, zone: &str, instances: u32) -> ConfigObject {
    let body = json!({ "cluster_key": key, "zone_key": zone, "instances": instances });
    ConfigObject::new("cluster", serde_json::to_vec(&body).unwrap())
}

pub fn catalog_object(service: &str, mesh: &str) -> ConfigObject {
    let body = json!({ "service_id": service, "mesh_id": mesh, "name": service });
    ConfigObject::new("catalogservice", serde_json::to_vec(&body).unwrap())
}

pub fn service_manifest(namespace: &str, name: &str, port: u16) -> WorkloadManifest {
    WorkloadManifest::new(json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": { "name": name, "namespace": namespace },
        "spec": { "ports": [{ "port": port }] },
    }))
}
