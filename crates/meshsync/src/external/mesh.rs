//! Mesh control-plane client boundary.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::commands::{Command, TargetQueue};
use crate::error::CommandError;
use crate::shutdown::Shutdown;

/// Mesh-side sidecar configuration for one workload.
#[async_trait]
pub trait SidecarConfigurer: Send + Sync {
    async fn configure_sidecar(
        &self,
        workload: &str,
        annotations: &BTreeMap<String, String>,
    ) -> Result<(), CommandError>;
}

/// Receiving halves, owned by the command executor.
pub struct CommandReceivers {
    pub control: mpsc::Receiver<Command>,
    pub catalog: mpsc::Receiver<Command>,
}

/// The two bounded command queues of the mesh client plus its cancellation.
#[derive(Clone)]
pub struct MeshCommandQueues {
    control: mpsc::Sender<Command>,
    catalog: mpsc::Sender<Command>,
    cancelled: Shutdown,
}

impl MeshCommandQueues {
    pub fn new(capacity: usize) -> (Self, CommandReceivers) {
        let (control, control_rx) = mpsc::channel(capacity);
        let (catalog, catalog_rx) = mpsc::channel(capacity);
        let queues = Self {
            control,
            catalog,
            cancelled: Shutdown::new(),
        };
        (
            queues,
            CommandReceivers {
                control: control_rx,
                catalog: catalog_rx,
            },
        )
    }

    /// Enqueues `command` on its target queue, waiting for capacity.
    pub async fn send(&self, command: Command) -> Result<(), CommandError> {
        let target = command.target;
        let sender = match target {
            TargetQueue::Control => &self.control,
            TargetQueue::Catalog => &self.catalog,
        };
        sender
            .send(command)
            .await
            .map_err(|_| CommandError::QueueClosed(target.to_string()))
    }

    /// Cancellation of the mesh client; stops the reconciliation loop.
    pub fn cancellation(&self) -> &Shutdown {
        &self.cancelled
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.is_triggered()
    }

    pub fn cancel(&self) {
        self.cancelled.trigger();
    }
}
