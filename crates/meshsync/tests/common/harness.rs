//! Operator wired over in-memory collaborators.

#![allow(dead_code)]

use std::sync::Arc;

use meshsync::changeset::{EngineOptions, MemoryStateStore, StateStore};
use meshsync::config::ReconcileSettings;
use meshsync::external::{CommandReceivers, MeshCommandQueues};
use meshsync::operator::{Collaborators, Operator};
use meshsync::shutdown::Shutdown;
use meshsync::Command;

use super::fakes::{FakeCluster, FakeEvaluator, RecordingConfigurer};

pub struct OperatorHarness {
    pub cluster: Arc<FakeCluster>,
    pub evaluator: Arc<FakeEvaluator>,
    pub configurer: Arc<RecordingConfigurer>,
    pub store: MemoryStateStore,
    pub receivers: CommandReceivers,
    pub queues: MeshCommandQueues,
    pub shutdown: Shutdown,
    pub operator: Arc<Operator>,
}

pub fn settings(namespaces: &[&str], mtls: bool) -> ReconcileSettings {
    ReconcileSettings {
        mesh_name: "prod".to_string(),
        watch_namespaces: namespaces.iter().map(|ns| ns.to_string()).collect(),
        mtls_identity: mtls.then(|| "spiffe://prod".to_string()),
        sidecar_workers: 1,
        ..Default::default()
    }
}

impl OperatorHarness {
    pub async fn new(settings: ReconcileSettings) -> Self {
        Self::with_store(settings, MemoryStateStore::new()).await
    }

    pub async fn with_store(settings: ReconcileSettings, store: MemoryStateStore) -> Self {
        let cluster = Arc::new(FakeCluster::new());
        let evaluator = Arc::new(FakeEvaluator::new());
        let configurer = Arc::new(RecordingConfigurer::default());
        let (queues, receivers) = MeshCommandQueues::new(64);
        let shutdown = Shutdown::new();

        let collaborators = Collaborators {
            cluster: cluster.clone(),
            evaluator: evaluator.clone(),
            sidecar_configurer: configurer.clone(),
            queues: queues.clone(),
        };
        let state: Arc<dyn StateStore> = Arc::new(store.clone());
        let operator = Operator::start_with_store(
            &settings,
            state,
            EngineOptions::default(),
            collaborators,
            shutdown.clone(),
        )
        .await;

        Self {
            cluster,
            evaluator,
            configurer,
            store,
            receivers,
            queues,
            shutdown,
            operator,
        }
    }

    /// Everything currently queued on either mesh queue, control first.
    pub fn drain_commands(&mut self) -> Vec<Command> {
        let mut commands = Vec::new();
        while let Ok(command) = self.receivers.control.try_recv() {
            commands.push(command);
        }
        while let Ok(command) = self.receivers.catalog.try_recv() {
            commands.push(command);
        }
        commands
    }

    pub fn drain_args(&mut self) -> Vec<String> {
        self.drain_commands().into_iter().map(|c| c.args).collect()
    }
}
