//! Interfaces to the collaborators the engine drives but does not implement.

pub mod cluster;
pub mod evaluator;
pub mod mesh;
pub mod workload;

pub use cluster::{apply, apply_logged, delete_all, ApplyMode, ApplyOutcome, ClusterClient};
pub use evaluator::{ConfigEvaluator, ConfigObject, RenderedState, SidecarFragment};
pub use mesh::{CommandReceivers, MeshCommandQueues, SidecarConfigurer};
pub use workload::{
    Container, ContainerPort, Deployment, GroupVersionKind, LocalObjectReference, ObjectMeta, Pod,
    PodSpec, PodTemplateSpec, StatefulSet, TemplatedWorkload, Volume, WorkloadManifest,
    WorkloadSpec,
};
