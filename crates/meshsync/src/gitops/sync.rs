//! Repository sync controller: poll the remote, notify on new revisions.

use std::error::Error as StdError;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::future::{BoxFuture, FutureExt};
use secrecy::SecretString;

use super::error::Result;
use super::git::{GitAuth, GitRepository, RepoRef, SyncPhase, SyncStatus};
use crate::changeset::ChangeSetEngine;
use crate::error::ConfigError;
use crate::shutdown::Shutdown;

/// Invoked with the new head commit whenever the tracked revision moves.
pub type RevisionCallback =
    Arc<dyn Fn(String) -> BoxFuture<'static, std::result::Result<(), CallbackError>> + Send + Sync>;

/// Error type returned by revision callbacks.
pub type CallbackError = Box<dyn StdError + Send + Sync>;

/// Wraps an async closure as a [`RevisionCallback`].
pub fn revision_callback<F, Fut>(f: F) -> RevisionCallback
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<(), CallbackError>> + Send + 'static,
{
    Arc::new(move |head| f(head).boxed())
}

pub const DEFAULT_BRANCH: &str = "main";

/// Immutable settings for one sync controller.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Remote URL; empty means the bundled local tree is used as-is.
    pub remote: String,
    pub reference: RepoRef,
    pub local_path: PathBuf,
    pub auth: GitAuth,
    pub poll_interval: Duration,
}

impl SyncConfig {
    /// Validates raw settings. Tracking both a branch and a tag is rejected here,
    /// before any loop starts.
    pub fn new(
        remote: &str,
        branch: &str,
        tag: &str,
        local_path: impl Into<PathBuf>,
        ssh_key_path: &str,
        ssh_passphrase: Option<SecretString>,
        poll_interval: Duration,
    ) -> std::result::Result<Self, ConfigError> {
        let reference = RepoRef::from_parts(branch, tag, DEFAULT_BRANCH)
            .map_err(|(branch, tag)| ConfigError::BranchAndTag { branch, tag })?;

        if poll_interval.is_zero() {
            return Err(ConfigError::Validation {
                message: "sync poll interval must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            remote: remote.trim().to_string(),
            reference,
            local_path: local_path.into(),
            auth: GitAuth::from_settings(ssh_key_path, ssh_passphrase),
            poll_interval,
        })
    }
}

/// Something that can be brought to the latest tracked revision.
#[async_trait]
pub trait RevisionSource: Send + Sync {
    /// Whether there is a remote to track at all.
    fn is_enabled(&self) -> bool {
        true
    }

    /// One-time preparation (initial clone).
    async fn bootstrap(&self) -> Result<()>;

    /// Updates the working tree and returns the resulting head commit.
    async fn update(&self) -> Result<String>;
}

/// Revision source backed by a git working tree.
pub struct GitSource {
    repo: GitRepository,
    reference: RepoRef,
}

impl GitSource {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            repo: GitRepository::new(&config.local_path, &config.remote, config.auth.clone()),
            reference: config.reference.clone(),
        }
    }
}

#[async_trait]
impl RevisionSource for GitSource {
    fn is_enabled(&self) -> bool {
        !self.repo.remote().is_empty()
    }

    async fn bootstrap(&self) -> Result<()> {
        self.repo.clone_at(&self.reference).await
    }

    async fn update(&self) -> Result<String> {
        self.repo.update_to(&self.reference).await
    }
}

/// Polls the desired-state repository and reports revision changes.
pub struct SyncController {
    source: Arc<dyn RevisionSource>,
    local_path: PathBuf,
    poll_interval: Duration,
    on_change: Option<RevisionCallback>,
    state: Option<Arc<ChangeSetEngine>>,
    status: Mutex<SyncStatus>,
    shutdown: Shutdown,
    closed: AtomicBool,
}

impl SyncController {
    /// Creates a controller tracking a git remote.
    pub fn new(config: SyncConfig, shutdown: Shutdown) -> Self {
        let source = Arc::new(GitSource::new(&config));
        Self::with_source(source, config.local_path, config.poll_interval, shutdown)
    }

    /// Creates a controller over an arbitrary revision source.
    pub fn with_source(
        source: Arc<dyn RevisionSource>,
        local_path: impl Into<PathBuf>,
        poll_interval: Duration,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            source,
            local_path: local_path.into(),
            poll_interval,
            on_change: None,
            state: None,
            status: Mutex::new(SyncStatus::default()),
            shutdown,
            closed: AtomicBool::new(false),
        }
    }

    /// Registers the callback run when the head commit moves.
    pub fn on_revision_changed(mut self, callback: RevisionCallback) -> Self {
        self.on_change = Some(callback);
        self
    }

    /// Ties the change-set engine's store connection to this controller's lifetime.
    pub fn with_state(mut self, engine: Arc<ChangeSetEngine>) -> Self {
        self.state = Some(engine);
        self
    }

    /// Root of the checked-out desired-state tree.
    pub fn content_root(&self) -> &Path {
        &self.local_path
    }

    pub fn status(&self) -> SyncStatus {
        match self.status.lock() {
            Ok(status) => status.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Performs the initial clone. A missing remote is a no-op.
    pub async fn bootstrap(&self) -> Result<()> {
        if !self.source.is_enabled() {
            log::info!(
                "No remote configured, using local tree at {}",
                self.local_path.display()
            );
            return Ok(());
        }

        self.set_phase(SyncPhase::Cloning);
        match self.source.bootstrap().await {
            Ok(()) => {
                self.set_phase(SyncPhase::Watching);
                Ok(())
            }
            Err(e) => {
                self.record_error(&e.to_string());
                Err(e)
            }
        }
    }

    /// Runs the poll loop until shutdown. Update failures are logged and the
    /// next interval retries.
    pub async fn watch(&self) {
        let mut listener = self.shutdown.listener();

        if !self.source.is_enabled() {
            log::info!("Repository watch disabled: no remote configured");
            listener.wait().await;
            self.set_phase(SyncPhase::Closed);
            return;
        }

        let mut last_head: Option<String> = None;
        self.set_phase(SyncPhase::Watching);

        while !listener.is_triggered() {
            self.set_phase(SyncPhase::Fetching);

            match self.source.update().await {
                Ok(head) => {
                    self.record_checkout(&head);
                    if let Some(previous) = last_head.as_deref() {
                        if previous != head {
                            log::info!("Revision changed: {} -> {}", previous, head);
                            self.notify(&head).await;
                        }
                    }
                    last_head = Some(head);
                }
                Err(e) => {
                    log::error!("Repository update failed: {}", e);
                    self.record_error(&e.to_string());
                }
            }

            self.set_phase(SyncPhase::Watching);
            if listener.sleep_or_shutdown(self.poll_interval).await {
                break;
            }
        }

        self.set_phase(SyncPhase::Closed);
        log::info!("Repository watch stopped");
    }

    /// Stops the watch loop and releases the state store. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shutdown.trigger();
        if let Some(engine) = &self.state {
            engine.close().await;
        }
        self.set_phase(SyncPhase::Closed);
    }

    async fn notify(&self, head: &str) {
        let Some(callback) = &self.on_change else {
            return;
        };
        if let Err(e) = callback(head.to_string()).await {
            log::error!("Revision change handler failed for {}: {}", head, e);
        }
    }

    fn with_status(&self, f: impl FnOnce(&mut SyncStatus)) {
        match self.status.lock() {
            Ok(mut status) => f(&mut status),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    fn set_phase(&self, phase: SyncPhase) {
        self.with_status(|status| {
            if status.phase != SyncPhase::Closed {
                status.phase = phase;
            }
        });
    }

    fn record_checkout(&self, head: &str) {
        self.with_status(|status| {
            if status.phase != SyncPhase::Closed {
                status.phase = SyncPhase::CheckedOut;
            }
            status.last_revision = Some(head.to_string());
            status.last_synced_at = Some(Utc::now());
            status.last_error = None;
        });
    }

    fn record_error(&self, message: &str) {
        self.with_status(|status| status.last_error = Some(message.to_string()));
    }
}
