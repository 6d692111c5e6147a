//! Pure data types for repository tracking.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// The remote reference being tracked. Branch and tag are exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoRef {
    Branch(String),
    Tag(String),
}

impl RepoRef {
    /// Builds a reference from the two optional settings.
    ///
    /// Both empty falls back to `default_branch`; both set is rejected.
    pub fn from_parts(branch: &str, tag: &str, default_branch: &str) -> Result<Self, (String, String)> {
        match (branch.trim(), tag.trim()) {
            (b, t) if !b.is_empty() && !t.is_empty() => Err((b.to_string(), t.to_string())),
            (_, t) if !t.is_empty() => Ok(RepoRef::Tag(t.to_string())),
            (b, _) if !b.is_empty() => Ok(RepoRef::Branch(b.to_string())),
            _ => Ok(RepoRef::Branch(default_branch.to_string())),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            RepoRef::Branch(name) | RepoRef::Tag(name) => name,
        }
    }
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepoRef::Branch(name) => write!(f, "branch '{}'", name),
            RepoRef::Tag(name) => write!(f, "tag '{}'", name),
        }
    }
}

/// Lifecycle phase of the sync controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncPhase {
    Idle,
    Cloning,
    Watching,
    Fetching,
    CheckedOut,
    Closed,
}

/// Point-in-time view of the sync controller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub phase: SyncPhase,
    /// Head commit after the most recent successful update.
    pub last_revision: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            phase: SyncPhase::Idle,
            last_revision: None,
            last_synced_at: None,
            last_error: None,
        }
    }
}
