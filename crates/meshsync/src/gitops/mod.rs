//! Desired-state repository tracking.

pub mod error;
pub mod git;
pub mod sync;

pub use error::{classify_git_error, GitOpsError};
pub use git::{GitAuth, GitRepository, RepoRef, SyncPhase, SyncStatus};
pub use sync::{
    revision_callback, CallbackError, GitSource, RevisionCallback, RevisionSource, SyncConfig,
    SyncController, DEFAULT_BRANCH,
};
