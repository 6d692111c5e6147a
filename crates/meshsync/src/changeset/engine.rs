//! Change-set engine: decides what changed since the last reconciliation.
//!
//! Each universe keeps one snapshot (identity key -> ref). A diff pass builds a
//! fresh map from the candidates, reports changed and deleted objects, and swaps
//! the fresh map in wholesale. Persistence is requested through a capacity-1
//! channel so bursts of passes coalesce into a single pending write.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::refs::{ConfigObjectRef, SnapshotRef, WorkloadObjectRef};
use super::store::StateStore;
use crate::external::{ConfigObject, WorkloadManifest};
use crate::shutdown::{Shutdown, ShutdownListener};

pub const DEFAULT_CONFIG_SNAPSHOT_KEY: &str = "meshsync.gitops.config";
pub const DEFAULT_WORKLOAD_SNAPSHOT_KEY: &str = "meshsync.gitops.workloads";
pub const DEFAULT_CONNECT_RETRY: Duration = Duration::from_secs(30);

/// Store keys and retry policy for the engine.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub config_key: String,
    pub workload_key: String,
    pub connect_retry: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            config_key: DEFAULT_CONFIG_SNAPSHOT_KEY.to_string(),
            workload_key: DEFAULT_WORKLOAD_SNAPSHOT_KEY.to_string(),
            connect_retry: DEFAULT_CONNECT_RETRY,
        }
    }
}

/// Result of a config diff pass.
#[derive(Debug, Clone, Default)]
pub struct ConfigDelta {
    /// Changed objects, in candidate order.
    pub changed: Vec<ConfigObject>,
    pub deleted: Vec<ConfigObjectRef>,
}

impl ConfigDelta {
    /// Kinds of the changed objects, parallel to `changed`.
    pub fn changed_kinds(&self) -> Vec<&str> {
        self.changed.iter().map(|o| o.kind.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.deleted.is_empty()
    }
}

/// Result of a workload diff pass.
#[derive(Debug, Clone, Default)]
pub struct WorkloadDelta {
    /// Changed manifests, in candidate order.
    pub changed: Vec<WorkloadManifest>,
    pub deleted: Vec<WorkloadObjectRef>,
}

impl WorkloadDelta {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.deleted.is_empty()
    }
}

type Snapshot<R> = BTreeMap<String, R>;

/// One object universe: its snapshot and its dirty signal.
struct Universe<R> {
    name: &'static str,
    store_key: String,
    snapshot: RwLock<Arc<Snapshot<R>>>,
    /// Diff passes completed; guarded by the snapshot write lock.
    passes: AtomicU64,
    dirty: mpsc::Sender<()>,
}

impl<R: SnapshotRef> Universe<R> {
    fn new(name: &'static str, store_key: String) -> (Arc<Self>, mpsc::Receiver<()>) {
        let (dirty, rx) = mpsc::channel(1);
        let universe = Self {
            name,
            store_key,
            snapshot: RwLock::new(Arc::new(Snapshot::new())),
            passes: AtomicU64::new(0),
            dirty,
        };
        (Arc::new(universe), rx)
    }

    fn current(&self) -> Arc<Snapshot<R>> {
        match self.snapshot.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Diffs `refs` against the snapshot and swaps in the fresh map.
    ///
    /// Returns the indices of changed candidates and the deleted refs.
    fn diff(&self, refs: Vec<R>) -> (Vec<usize>, Vec<R>) {
        let mut guard = match self.snapshot.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let previous = Arc::clone(&guard);

        let mut fresh = Snapshot::new();
        let mut changed = Vec::new();
        for (index, r) in refs.into_iter().enumerate() {
            let key = r.key();
            let unchanged = previous.get(&key).is_some_and(|p| p.hash() == r.hash());
            if !unchanged {
                changed.push(index);
            }
            fresh.insert(key, r);
        }

        let deleted = previous
            .iter()
            .filter(|(key, _)| !fresh.contains_key(*key))
            .map(|(_, r)| r.clone())
            .collect();

        *guard = Arc::new(fresh);
        self.passes.fetch_add(1, Ordering::SeqCst);
        (changed, deleted)
    }

    /// Installs a loaded snapshot unless a diff pass already ran.
    fn restore(&self, loaded: Snapshot<R>) -> bool {
        let mut guard = match self.snapshot.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if self.passes.load(Ordering::SeqCst) > 0 {
            return false;
        }
        *guard = Arc::new(loaded);
        true
    }

    fn signal_dirty(&self) {
        match self.dirty.try_send(()) {
            Ok(()) => {}
            // A write is already pending and will pick up the newest snapshot
            Err(mpsc::error::TrySendError::Full(())) => {}
            Err(mpsc::error::TrySendError::Closed(())) => {
                tracing::debug!(universe = self.name, "persistence queue closed, skipping");
            }
        }
    }

    fn pending(&self) -> usize {
        self.dirty.max_capacity() - self.dirty.capacity()
    }

    async fn load(&self, store: &dyn StateStore) {
        let loaded = match store.get(&self.store_key).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<Snapshot<R>>(&bytes) {
                Ok(map) => map,
                Err(e) => {
                    tracing::error!(
                        universe = self.name,
                        key = %self.store_key,
                        error = %e,
                        "failed to decode persisted snapshot, starting empty"
                    );
                    Snapshot::new()
                }
            },
            Ok(None) => {
                tracing::info!(universe = self.name, key = %self.store_key, "no persisted snapshot");
                return;
            }
            Err(e) => {
                tracing::error!(
                    universe = self.name,
                    key = %self.store_key,
                    error = %e,
                    "failed to read persisted snapshot, starting empty"
                );
                return;
            }
        };

        let count = loaded.len();
        if self.restore(loaded) {
            tracing::info!(universe = self.name, key = %self.store_key, objects = count, "loaded persisted snapshot");
        } else {
            tracing::info!(
                universe = self.name,
                "diff pass already ran, keeping in-memory snapshot over persisted one"
            );
        }
    }

    async fn persist(&self, store: &dyn StateStore) {
        let snapshot = self.current();
        let bytes = match serde_json::to_vec(&*snapshot) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(universe = self.name, error = %e, "failed to encode snapshot");
                return;
            }
        };
        match store.set(&self.store_key, bytes).await {
            Ok(()) => tracing::debug!(
                universe = self.name,
                key = %self.store_key,
                objects = snapshot.len(),
                "snapshot persisted"
            ),
            Err(e) => tracing::error!(
                universe = self.name,
                key = %self.store_key,
                error = %e,
                "failed to persist snapshot"
            ),
        }
    }
}

/// Computes deltas for both universes and persists snapshots in the background.
pub struct ChangeSetEngine {
    config: Arc<Universe<ConfigObjectRef>>,
    workload: Arc<Universe<WorkloadObjectRef>>,
    store: Arc<dyn StateStore>,
    /// Held for reading across each diff and its dirty signal; `close`
    /// flips it under the write lock, so no accepted pass can signal after.
    accepting: RwLock<bool>,
    connected: Arc<AtomicBool>,
    stop: Shutdown,
    drain: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl ChangeSetEngine {
    /// Connects to the store (once), loads persisted snapshots on success and
    /// starts the persistence task. A failed connect is retried by the task.
    pub async fn start(store: Arc<dyn StateStore>, options: EngineOptions) -> Arc<Self> {
        let (config, config_rx) = Universe::new("config", options.config_key.clone());
        let (workload, workload_rx) = Universe::new("workload", options.workload_key.clone());

        let connected = match store.connect().await {
            Ok(()) => {
                tracing::info!("connected to state store");
                config.load(store.as_ref()).await;
                workload.load(store.as_ref()).await;
                true
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    retry_secs = options.connect_retry.as_secs(),
                    "state store unavailable, will retry"
                );
                false
            }
        };

        let engine = Arc::new(Self {
            config,
            workload,
            store,
            accepting: RwLock::new(true),
            connected: Arc::new(AtomicBool::new(connected)),
            stop: Shutdown::new(),
            drain: Mutex::new(None),
            closed: AtomicBool::new(false),
        });

        let task = DrainTask {
            config: Arc::clone(&engine.config),
            workload: Arc::clone(&engine.workload),
            config_rx,
            workload_rx,
            store: Arc::clone(&engine.store),
            connected: Arc::clone(&engine.connected),
            retry: options.connect_retry,
            stop: engine.stop.listener(),
        };
        let handle = tokio::spawn(task.run());
        if let Ok(mut slot) = engine.drain.lock() {
            *slot = Some(handle);
        }

        engine
    }

    /// Filters mesh configuration objects down to what changed.
    pub fn compute_config_delta(&self, candidates: Vec<ConfigObject>) -> ConfigDelta {
        let _span = tracing::info_span!("config_delta", candidates = candidates.len()).entered();

        let refs = candidates
            .iter()
            .map(|c| ConfigObjectRef::from_bytes(&c.raw, &c.kind))
            .collect();
        let (changed_idx, deleted, _) = self.diff_gated(&self.config, refs);

        let changed = select_indices(candidates, &changed_idx);
        tracing::info!(changed = changed.len(), deleted = deleted.len(), "config delta computed");
        ConfigDelta { changed, deleted }
    }

    /// Filters workload manifests down to what changed.
    pub fn compute_workload_delta(&self, candidates: Vec<WorkloadManifest>) -> WorkloadDelta {
        let _span =
            tracing::info_span!("workload_delta", candidates = candidates.len()).entered();

        let refs = candidates.iter().map(WorkloadObjectRef::from_manifest).collect();
        let (changed_idx, deleted, _) = self.diff_gated(&self.workload, refs);

        let changed = select_indices(candidates, &changed_idx);
        tracing::info!(changed = changed.len(), deleted = deleted.len(), "workload delta computed");
        WorkloadDelta { changed, deleted }
    }

    /// Diffs and, while the engine still accepts, marks the universe dirty.
    /// The flag reports whether the pass was accepted for persistence.
    fn diff_gated<R: SnapshotRef>(
        &self,
        universe: &Universe<R>,
        refs: Vec<R>,
    ) -> (Vec<usize>, Vec<R>, bool) {
        let accepting = match self.accepting.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let (changed, deleted) = universe.diff(refs);
        if *accepting {
            universe.signal_dirty();
        }
        (changed, deleted, *accepting)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Unconsumed persistence signals as `(config, workload)`; never above 1 each.
    pub fn pending_persists(&self) -> (usize, usize) {
        (self.config.pending(), self.workload.pending())
    }

    /// Object counts in the current snapshots as `(config, workload)`.
    pub fn snapshot_sizes(&self) -> (usize, usize) {
        (self.config.current().len(), self.workload.current().len())
    }

    /// Stops accepting signals, drains once more, then releases the store. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        match self.accepting.write() {
            Ok(mut accepting) => *accepting = false,
            Err(poisoned) => *poisoned.into_inner() = false,
        }
        self.stop.trigger();

        let handle = match self.drain.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "persistence task ended abnormally");
            }
        }

        self.store.close().await;
        self.connected.store(false, Ordering::SeqCst);
        tracing::info!("change-set engine closed");
    }
}

fn select_indices<T>(items: Vec<T>, indices: &[usize]) -> Vec<T> {
    let mut wanted = indices.iter().peekable();
    items
        .into_iter()
        .enumerate()
        .filter_map(|(i, item)| {
            if wanted.peek() == Some(&&i) {
                wanted.next();
                Some(item)
            } else {
                None
            }
        })
        .collect()
}

/// Background persistence: connect (with retry), then write snapshots on signal.
struct DrainTask {
    config: Arc<Universe<ConfigObjectRef>>,
    workload: Arc<Universe<WorkloadObjectRef>>,
    config_rx: mpsc::Receiver<()>,
    workload_rx: mpsc::Receiver<()>,
    store: Arc<dyn StateStore>,
    connected: Arc<AtomicBool>,
    retry: Duration,
    stop: ShutdownListener,
}

impl DrainTask {
    async fn run(mut self) {
        if !self.connected.load(Ordering::SeqCst) && !self.wait_for_store().await {
            self.config_rx.close();
            self.workload_rx.close();
            return;
        }

        loop {
            tokio::select! {
                biased;
                _ = self.stop.wait() => break,
                Some(()) = self.config_rx.recv() => self.config.persist(self.store.as_ref()).await,
                Some(()) = self.workload_rx.recv() => self.workload.persist(self.store.as_ref()).await,
                else => break,
            }
        }

        // Every accepted pass signalled before stop fired; drain, then close
        if self.config_rx.try_recv().is_ok() {
            self.config.persist(self.store.as_ref()).await;
        }
        if self.workload_rx.try_recv().is_ok() {
            self.workload.persist(self.store.as_ref()).await;
        }
        self.config_rx.close();
        self.workload_rx.close();
    }

    /// Retries the store connection on a fixed backoff. Returns `false` on stop.
    async fn wait_for_store(&mut self) -> bool {
        loop {
            if self.stop.sleep_or_shutdown(self.retry).await {
                return false;
            }
            match self.store.connect().await {
                Ok(()) => {
                    tracing::info!("connected to state store");
                    self.config.load(self.store.as_ref()).await;
                    self.workload.load(self.store.as_ref()).await;
                    self.connected.store(true, Ordering::SeqCst);
                    return true;
                }
                Err(e) => tracing::info!(
                    error = %e,
                    retry_secs = self.retry.as_secs(),
                    "waiting for state store availability"
                ),
            }
        }
    }
}
