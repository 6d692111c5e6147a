//! Identity and content references for the two object universes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::hash::{hash_object_bytes, structural_hash};
use crate::external::{GroupVersionKind, WorkloadManifest};

/// Kind name of catalog entries, whose identity fields differ from all others.
pub const CATALOG_SERVICE: &str = "catalogservice";

/// Mesh configuration kinds the control plane understands.
pub const CONFIG_KINDS: [&str; 7] = [
    "cluster",
    "listener",
    "domain",
    "route",
    "proxy",
    "zone",
    CATALOG_SERVICE,
];

/// Body field holding the object id for `kind`.
pub fn id_field(kind: &str) -> String {
    if kind == CATALOG_SERVICE {
        "service_id".to_string()
    } else {
        format!("{}_key", kind)
    }
}

/// Body field holding the zone for `kind`.
pub fn zone_field(kind: &str) -> &'static str {
    if kind == CATALOG_SERVICE {
        "mesh_id"
    } else {
        "zone_key"
    }
}

/// Reads a top-level string field; absent or non-JSON yields `None`.
pub fn lookup_field(value: Option<&Value>, field: &str) -> Option<String> {
    match value?.get(field)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Reference to one mesh configuration object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigObjectRef {
    pub zone: String,
    pub kind: String,
    pub id: String,
    pub hash: u64,
}

impl ConfigObjectRef {
    /// Builds the ref from a serialized object. Missing identity fields become
    /// empty strings; the object is still tracked.
    pub fn from_bytes(raw: &[u8], kind: &str) -> Self {
        let parsed = serde_json::from_slice::<Value>(raw).ok();

        let id_key = id_field(kind);
        let id = lookup_field(parsed.as_ref(), &id_key).unwrap_or_else(|| {
            tracing::warn!(kind, field = %id_key, "config object has no identity field");
            String::new()
        });
        let zone_key = zone_field(kind);
        let zone = lookup_field(parsed.as_ref(), zone_key).unwrap_or_else(|| {
            tracing::warn!(kind, field = zone_key, id = %id, "config object has no zone field");
            String::new()
        });

        Self {
            zone,
            kind: kind.to_string(),
            id,
            hash: hash_object_bytes(raw),
        }
    }

    pub fn key(&self) -> String {
        format!("{}-{}-{}", self.zone, self.kind, self.id)
    }
}

/// Reference to one cluster workload manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadObjectRef {
    pub namespace: String,
    pub kind: GroupVersionKind,
    pub name: String,
    pub hash: u64,
}

impl WorkloadObjectRef {
    pub fn from_manifest(manifest: &WorkloadManifest) -> Self {
        Self {
            namespace: manifest.namespace().to_string(),
            kind: manifest.gvk(),
            name: manifest.name().to_string(),
            hash: structural_hash(manifest.value()),
        }
    }

    pub fn key(&self) -> String {
        format!("{}-{}-{}", self.namespace, self.kind, self.name)
    }
}

/// A ref that can be indexed in a snapshot.
pub trait SnapshotRef: Clone + Serialize + serde::de::DeserializeOwned + Send + Sync + 'static {
    fn key(&self) -> String;
    fn hash(&self) -> u64;
}

impl SnapshotRef for ConfigObjectRef {
    fn key(&self) -> String {
        ConfigObjectRef::key(self)
    }

    fn hash(&self) -> u64 {
        self.hash
    }
}

impl SnapshotRef for WorkloadObjectRef {
    fn key(&self) -> String {
        WorkloadObjectRef::key(self)
    }

    fn hash(&self) -> u64 {
        self.hash
    }
}
