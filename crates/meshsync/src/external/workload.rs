//! Cluster workload resources as seen by the reconcilers.
//!
//! Only the fields the reconcilers read or write are modelled; everything else
//! is carried through `extra` so a mutated resource re-applies without losing data.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ClusterError;

/// Group, version and kind of a cluster resource.
///
/// Serialized with capitalized field names so persisted snapshots keep the
/// cluster tooling's layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GroupVersionKind {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub kind: String,
}

impl GroupVersionKind {
    pub fn new(group: &str, version: &str, kind: &str) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.to_string(),
        }
    }

    /// Splits an `apiVersion` such as `apps/v1` (or core `v1`).
    pub fn from_api_version(api_version: &str, kind: &str) -> Self {
        match api_version.split_once('/') {
            Some((group, version)) => Self::new(group, version, kind),
            None => Self::new("", api_version, kind),
        }
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl std::fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}, Kind={}", self.group, self.version, self.kind)
    }
}

/// Any cluster object, kept as its raw JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkloadManifest(Value);

impl WorkloadManifest {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Serializes a typed resource into a manifest.
    pub fn from_resource<T: Serialize>(resource: &T) -> Result<Self, ClusterError> {
        Ok(Self(serde_json::to_value(resource)?))
    }

    /// Deserializes the manifest into a typed resource.
    pub fn to_resource<T: DeserializeOwned>(&self) -> Result<T, ClusterError> {
        Ok(serde_json::from_value(self.0.clone())?)
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    fn str_at(&self, pointer: &str) -> &str {
        self.0.pointer(pointer).and_then(Value::as_str).unwrap_or("")
    }

    pub fn api_version(&self) -> &str {
        self.str_at("/apiVersion")
    }

    pub fn kind(&self) -> &str {
        self.str_at("/kind")
    }

    pub fn namespace(&self) -> &str {
        self.str_at("/metadata/namespace")
    }

    pub fn name(&self) -> &str {
        self.str_at("/metadata/name")
    }

    pub fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::from_api_version(self.api_version(), self.kind())
    }

    /// `namespace/name (Kind)` for log lines.
    pub fn describe(&self) -> String {
        format!("{}/{} ({})", self.namespace(), self.name(), self.kind())
    }
}

impl From<Value> for WorkloadManifest {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerPort {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default)]
    pub container_port: i32,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ContainerPort {
    pub fn named(name: impl Into<String>, port: i32) -> Self {
        Self {
            name: Some(name.into()),
            container_port: port,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<ContainerPort>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Container {
    pub fn has_port_named(&self, port_name: &str) -> bool {
        self.ports
            .iter()
            .any(|p| p.name.as_deref() == Some(port_name))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    #[serde(default)]
    pub name: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalObjectReference {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    #[serde(default)]
    pub containers: Vec<Container>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_pull_secrets: Vec<LocalObjectReference>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PodSpec {
    pub fn has_port_named(&self, port_name: &str) -> bool {
        self.containers.iter().any(|c| c.has_port_named(port_name))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PodTemplateSpec {
    #[serde(default)]
    pub metadata: ObjectMeta,

    #[serde(default)]
    pub spec: PodSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pod {
    #[serde(default = "core_v1")]
    pub api_version: String,

    #[serde(default = "pod_kind")]
    pub kind: String,

    #[serde(default)]
    pub metadata: ObjectMeta,

    #[serde(default)]
    pub spec: PodSpec,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    #[serde(default)]
    pub template: PodTemplateSpec,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    #[serde(default = "apps_v1")]
    pub api_version: String,

    #[serde(default = "deployment_kind")]
    pub kind: String,

    #[serde(default)]
    pub metadata: ObjectMeta,

    #[serde(default)]
    pub spec: WorkloadSpec,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatefulSet {
    #[serde(default = "apps_v1")]
    pub api_version: String,

    #[serde(default = "stateful_set_kind")]
    pub kind: String,

    #[serde(default)]
    pub metadata: ObjectMeta,

    #[serde(default)]
    pub spec: WorkloadSpec,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn core_v1() -> String {
    "v1".to_string()
}

fn apps_v1() -> String {
    "apps/v1".to_string()
}

fn pod_kind() -> String {
    "Pod".to_string()
}

fn deployment_kind() -> String {
    "Deployment".to_string()
}

fn stateful_set_kind() -> String {
    "StatefulSet".to_string()
}

impl Pod {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            api_version: core_v1(),
            kind: pod_kind(),
            metadata: ObjectMeta::new(namespace, name),
            ..Default::default()
        }
    }
}

/// A resource that owns a pod template (deployment-style or stateful-set-style).
pub trait TemplatedWorkload: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: &'static str;

    fn new_named(namespace: &str, name: &str) -> Self;
    fn metadata(&self) -> &ObjectMeta;
    fn metadata_mut(&mut self) -> &mut ObjectMeta;
    fn template(&self) -> &PodTemplateSpec;
    fn template_mut(&mut self) -> &mut PodTemplateSpec;

    fn to_manifest(&self) -> Result<WorkloadManifest, ClusterError> {
        WorkloadManifest::from_resource(self)
    }

    /// `namespace/name` of the resource.
    fn qualified_name(&self) -> String {
        format!("{}/{}", self.metadata().namespace, self.metadata().name)
    }
}

macro_rules! templated_workload {
    ($ty:ty, $kind:literal, $version:ident) => {
        impl TemplatedWorkload for $ty {
            const KIND: &'static str = $kind;

            fn new_named(namespace: &str, name: &str) -> Self {
                Self {
                    api_version: $version(),
                    kind: $kind.to_string(),
                    metadata: ObjectMeta::new(namespace, name),
                    ..Default::default()
                }
            }

            fn metadata(&self) -> &ObjectMeta {
                &self.metadata
            }

            fn metadata_mut(&mut self) -> &mut ObjectMeta {
                &mut self.metadata
            }

            fn template(&self) -> &PodTemplateSpec {
                &self.spec.template
            }

            fn template_mut(&mut self) -> &mut PodTemplateSpec {
                &mut self.spec.template
            }
        }
    };
}

templated_workload!(Deployment, "Deployment", apps_v1);
templated_workload!(StatefulSet, "StatefulSet", apps_v1);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_gvk_display_matches_cluster_format() {
        assert_eq!(
            GroupVersionKind::from_api_version("apps/v1", "Deployment").to_string(),
            "apps/v1, Kind=Deployment"
        );
        assert_eq!(
            GroupVersionKind::from_api_version("v1", "Service").to_string(),
            "/v1, Kind=Service"
        );
        assert_eq!(GroupVersionKind::new("", "v1", "Pod").api_version(), "v1");
    }

    #[test]
    fn test_manifest_accessors() {
        let manifest = WorkloadManifest::new(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "web", "namespace": "prod"}
        }));
        assert_eq!(manifest.namespace(), "prod");
        assert_eq!(manifest.name(), "web");
        assert_eq!(manifest.gvk(), GroupVersionKind::new("apps", "v1", "Deployment"));

        let bare = WorkloadManifest::new(json!({"kind": "ConfigMap"}));
        assert_eq!(bare.namespace(), "");
        assert_eq!(bare.name(), "");
    }

    #[test]
    fn test_unknown_fields_survive_roundtrip() {
        let raw = json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "web", "namespace": "prod", "uid": "123"},
            "spec": {
                "replicas": 3,
                "template": {
                    "metadata": {"labels": {"app": "web"}},
                    "spec": {
                        "containers": [{
                            "name": "web",
                            "image": "nginx",
                            "ports": [{"name": "http", "containerPort": 80, "protocol": "TCP"}],
                            "env": [{"name": "A", "value": "1"}]
                        }],
                        "serviceAccountName": "web"
                    }
                }
            },
            "status": {"readyReplicas": 3}
        });

        let deployment: Deployment = serde_json::from_value(raw.clone()).unwrap();
        assert!(deployment.template().spec.has_port_named("http"));
        assert_eq!(serde_json::to_value(&deployment).unwrap(), raw);
    }

    #[test]
    fn test_new_named_sets_type_meta() {
        let sts = StatefulSet::new_named("ns", "db");
        let manifest = sts.to_manifest().unwrap();
        assert_eq!(manifest.kind(), "StatefulSet");
        assert_eq!(manifest.api_version(), "apps/v1");
        assert_eq!(sts.qualified_name(), "ns/db");
    }
}
