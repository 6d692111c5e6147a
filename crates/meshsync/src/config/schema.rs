use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::changeset::{
    EngineOptions, DEFAULT_CONFIG_SNAPSHOT_KEY, DEFAULT_WORKLOAD_SNAPSHOT_KEY,
};
use crate::error::ConfigError;
use crate::gitops::SyncConfig;
use crate::secrets::resolve_secret;
use crate::reconcile::DesiredState;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorConfig {
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub state: StateSettings,
    #[serde(default)]
    pub reconcile: ReconcileSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSettings {
    /// Empty means the local tree is used as-is and never refreshed.
    #[serde(default)]
    pub remote: String,
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default = "default_local_path")]
    pub local_path: PathBuf,
    #[serde(default)]
    pub ssh_key_path: String,
    /// Passphrase sources, tried in order: value, file, environment variable.
    #[serde(default, skip_serializing)]
    pub ssh_passphrase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_passphrase_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_passphrase_env_var: Option<String>,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("meshsync")
}

fn default_local_path() -> PathBuf {
    data_dir().join("gitops")
}

fn default_poll_interval() -> u64 {
    10
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            remote: String::new(),
            branch: String::new(),
            tag: String::new(),
            local_path: default_local_path(),
            ssh_key_path: String::new(),
            ssh_passphrase: None,
            ssh_passphrase_file: None,
            ssh_passphrase_env_var: None,
            poll_interval_seconds: default_poll_interval(),
        }
    }
}

impl std::fmt::Debug for SyncSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSettings")
            .field("remote", &self.remote)
            .field("branch", &self.branch)
            .field("tag", &self.tag)
            .field("local_path", &self.local_path)
            .field("ssh_key_path", &self.ssh_key_path)
            .field("ssh_passphrase", &self.ssh_passphrase.as_ref().map(|_| "[REDACTED]"))
            .field("ssh_passphrase_file", &self.ssh_passphrase_file)
            .field("ssh_passphrase_env_var", &self.ssh_passphrase_env_var)
            .field("poll_interval_seconds", &self.poll_interval_seconds)
            .finish()
    }
}

impl SyncSettings {
    pub fn passphrase(&self) -> Result<Option<SecretString>, ConfigError> {
        resolve_secret(
            self.ssh_passphrase.as_deref(),
            self.ssh_passphrase_file.as_deref(),
            self.ssh_passphrase_env_var.as_deref(),
        )
        .map_err(|e| ConfigError::Validation {
            message: format!("sync.sshPassphrase: {}", e),
        })
    }

    pub fn to_sync_config(&self) -> Result<SyncConfig, ConfigError> {
        SyncConfig::new(
            &self.remote,
            &self.branch,
            &self.tag,
            self.local_path.clone(),
            &self.ssh_key_path,
            self.passphrase()?,
            Duration::from_secs(self.poll_interval_seconds),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSettings {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_config_snapshot_key")]
    pub config_snapshot_key: String,
    #[serde(default = "default_workload_snapshot_key")]
    pub workload_snapshot_key: String,
    #[serde(default = "default_connect_retry")]
    pub connect_retry_seconds: u64,
}

fn default_database_path() -> PathBuf {
    data_dir().join("state.db")
}

fn default_config_snapshot_key() -> String {
    DEFAULT_CONFIG_SNAPSHOT_KEY.to_string()
}

fn default_workload_snapshot_key() -> String {
    DEFAULT_WORKLOAD_SNAPSHOT_KEY.to_string()
}

fn default_connect_retry() -> u64 {
    30
}

impl Default for StateSettings {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            config_snapshot_key: default_config_snapshot_key(),
            workload_snapshot_key: default_workload_snapshot_key(),
            connect_retry_seconds: default_connect_retry(),
        }
    }
}

impl StateSettings {
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            config_key: self.config_snapshot_key.clone(),
            workload_key: self.workload_snapshot_key.clone(),
            connect_retry: Duration::from_secs(self.connect_retry_seconds),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileSettings {
    #[serde(default = "default_reconcile_interval")]
    pub interval_seconds: u64,
    #[serde(default)]
    pub mesh_name: String,
    #[serde(default)]
    pub watch_namespaces: Vec<String>,
    /// Namespace the image pull secret is copied from.
    #[serde(default = "default_operator_namespace")]
    pub operator_namespace: String,
    /// Turns on the ingress allowlist reconciler when set.
    #[serde(default)]
    pub mtls_identity: Option<String>,
    #[serde(default = "default_image_pull_secret")]
    pub image_pull_secret: String,
    #[serde(default = "default_sidecar_workers")]
    pub sidecar_workers: usize,
    #[serde(default = "default_sidecar_queue_capacity")]
    pub sidecar_queue_capacity: usize,
}

fn default_reconcile_interval() -> u64 {
    30
}

fn default_operator_namespace() -> String {
    "meshsync".to_string()
}

fn default_image_pull_secret() -> String {
    "mesh-docker-secret".to_string()
}

fn default_sidecar_workers() -> usize {
    4
}

fn default_sidecar_queue_capacity() -> usize {
    64
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            interval_seconds: default_reconcile_interval(),
            mesh_name: String::new(),
            watch_namespaces: Vec::new(),
            operator_namespace: default_operator_namespace(),
            mtls_identity: None,
            image_pull_secret: default_image_pull_secret(),
            sidecar_workers: default_sidecar_workers(),
            sidecar_queue_capacity: default_sidecar_queue_capacity(),
        }
    }
}

impl ReconcileSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn mtls_enabled(&self) -> bool {
        self.mtls_identity
            .as_deref()
            .is_some_and(|identity| !identity.trim().is_empty())
    }

    pub fn desired_state(&self) -> DesiredState {
        DesiredState::new(self.mesh_name.clone(), self.watch_namespaces.clone())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
        }
    }
}
