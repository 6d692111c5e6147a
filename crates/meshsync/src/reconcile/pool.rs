//! Bounded worker pool for asynchronous sidecar configuration.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, error, info, warn};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::external::SidecarConfigurer;

/// Ask the mesh to configure the sidecar of one workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidecarRequest {
    pub workload: String,
    pub annotations: BTreeMap<String, String>,
}

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<SidecarRequest>>>;

pub struct SidecarPool {
    sender: Mutex<Option<mpsc::Sender<SidecarRequest>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    completed: Arc<AtomicUsize>,
}

impl SidecarPool {
    /// Spawns `worker_count` workers (at least one) sharing a queue of `capacity`.
    pub fn new(configurer: Arc<dyn SidecarConfigurer>, worker_count: usize, capacity: usize) -> Self {
        let worker_count = worker_count.max(1);
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let receiver: SharedReceiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let completed = Arc::new(AtomicUsize::new(0));

        let workers = (0..worker_count)
            .map(|worker_id| {
                tokio::spawn(run_worker(
                    worker_id,
                    Arc::clone(&receiver),
                    Arc::clone(&configurer),
                    Arc::clone(&completed),
                ))
            })
            .collect();

        info!("Started {} sidecar workers", worker_count);

        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            completed,
        }
    }

    /// Queues a request without waiting. Returns false when it was dropped.
    pub fn submit(&self, request: SidecarRequest) -> bool {
        let guard = match self.sender.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(sender) = guard.as_ref() else {
            debug!(
                "Sidecar pool shut down, ignoring configuration for {}",
                request.workload
            );
            return false;
        };
        match sender.try_send(request) {
            Ok(()) => true,
            Err(TrySendError::Full(request)) => {
                warn!(
                    "Sidecar queue full, dropping configuration for {}",
                    request.workload
                );
                false
            }
            Err(TrySendError::Closed(request)) => {
                debug!(
                    "Sidecar pool shut down, ignoring configuration for {}",
                    request.workload
                );
                false
            }
        }
    }

    /// Number of requests the workers have finished, successfully or not.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Stops accepting requests, lets workers drain the queue and waits for them.
    pub async fn shutdown(&self) {
        // Workers exit once the last sender is gone and the queue is empty.
        match self.sender.lock() {
            Ok(mut guard) => drop(guard.take()),
            Err(poisoned) => drop(poisoned.into_inner().take()),
        }

        let workers = match self.workers.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        if workers.is_empty() {
            return;
        }

        info!("Shutting down sidecar workers...");
        for (i, worker) in workers.into_iter().enumerate() {
            if let Err(e) = worker.await {
                error!("Sidecar worker {} panicked: {}", i, e);
            }
        }
        info!("All sidecar workers have stopped");
    }
}

async fn run_worker(
    worker_id: usize,
    receiver: SharedReceiver,
    configurer: Arc<dyn SidecarConfigurer>,
    completed: Arc<AtomicUsize>,
) {
    debug!("Sidecar worker {} started", worker_id);

    loop {
        let request = { receiver.lock().await.recv().await };
        let Some(request) = request else {
            break;
        };

        match configurer
            .configure_sidecar(&request.workload, &request.annotations)
            .await
        {
            Ok(()) => info!("Configured sidecar for {}", request.workload),
            Err(e) => error!("Failed to configure sidecar for {}: {}", request.workload, e),
        }
        completed.fetch_add(1, Ordering::SeqCst);
    }

    debug!("Sidecar worker {} finished", worker_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CommandError;
    use async_trait::async_trait;

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SidecarConfigurer for Recording {
        async fn configure_sidecar(
            &self,
            workload: &str,
            _annotations: &BTreeMap<String, String>,
        ) -> Result<(), CommandError> {
            self.seen.lock().unwrap().push(workload.to_string());
            if workload == "broken" {
                return Err(CommandError::Sidecar {
                    workload: workload.to_string(),
                    message: "no such cluster".to_string(),
                });
            }
            Ok(())
        }
    }

    fn request(workload: &str) -> SidecarRequest {
        SidecarRequest {
            workload: workload.to_string(),
            annotations: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_shutdown_drains_queued_requests() {
        let configurer = Arc::new(Recording::default());
        let pool = SidecarPool::new(configurer.clone(), 2, 8);

        assert!(pool.submit(request("a")));
        assert!(pool.submit(request("broken")));
        assert!(pool.submit(request("b")));
        pool.shutdown().await;

        assert_eq!(pool.completed(), 3);
        let mut seen = configurer.seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec!["a", "b", "broken"]);

        assert!(!pool.submit(request("late")));
        pool.shutdown().await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_full_queue_drops_request() {
        let configurer = Arc::new(Recording::default());
        let pool = SidecarPool::new(configurer, 1, 1);

        // Workers cannot run before this task yields on the current-thread runtime.
        assert!(pool.submit(request("a")));
        assert!(!pool.submit(request("b")));
        pool.shutdown().await;
        assert_eq!(pool.completed(), 1);
    }
}
