//! Errors raised by the repository sync controller.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while cloning, fetching or checking out the
/// desired-state repository.
#[derive(Error, Debug)]
pub enum GitOpsError {
    #[error("Unable to open local repository '{0}'")]
    NotARepository(PathBuf),

    #[error("Failed to clone '{remote}': {message}")]
    Clone { remote: String, message: String },

    #[error("Failed to fetch remote '{remote}': {message}")]
    Fetch { remote: String, message: String },

    #[error("Failed to checkout '{reference}': {message}")]
    Checkout { reference: String, message: String },

    #[error("Failed to pull changes from remote: {0}")]
    Pull(String),

    #[error("Unable to resolve tag '{tag}': {message}")]
    ResolveTag { tag: String, message: String },

    #[error("Failed to run git clean: {0}")]
    Clean(String),

    #[error("Failed to read repository HEAD: {0}")]
    Head(String),

    #[error("Git operation failed: {0}")]
    GitOperation(String),

    #[error("Git network error: {0}")]
    GitNetworkError(String),

    #[error("Git authentication failed: {0}")]
    GitAuthFailed(String),

    #[error("Sync controller is closed")]
    Closed,

    #[error("File operation failed: {0}")]
    FileOperation(String),
}

impl From<std::io::Error> for GitOpsError {
    fn from(err: std::io::Error) -> Self {
        GitOpsError::FileOperation(err.to_string())
    }
}

impl GitOpsError {
    /// Returns true if the error is likely transient and the next poll may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GitOpsError::GitNetworkError(_) | GitOpsError::Fetch { .. } | GitOpsError::Pull(_)
        )
    }
}

/// Classifies a git stderr string into a more specific error variant.
pub fn classify_git_error(stderr: &str) -> GitOpsError {
    let lower = stderr.to_lowercase();

    if lower.contains("could not resolve host")
        || lower.contains("connection refused")
        || lower.contains("connection timed out")
        || lower.contains("network is unreachable")
        || lower.contains("unable to access")
        || lower.contains("failed to connect")
        || lower.contains("couldn't connect to server")
        || lower.contains("the remote end hung up unexpectedly")
    {
        return GitOpsError::GitNetworkError(stderr.trim().to_string());
    }

    if lower.contains("authentication failed")
        || lower.contains("permission denied")
        || lower.contains("invalid credentials")
        || lower.contains("host key verification failed")
    {
        return GitOpsError::GitAuthFailed(stderr.trim().to_string());
    }

    GitOpsError::GitOperation(stderr.trim().to_string())
}

/// Result type for GitOps operations.
pub type Result<T> = std::result::Result<T, GitOpsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_network_error() {
        let err = classify_git_error("fatal: Could not resolve host: github.com\n");
        assert!(matches!(err, GitOpsError::GitNetworkError(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_classify_auth_error() {
        let err = classify_git_error("git@github.com: Permission denied (publickey).");
        assert!(matches!(err, GitOpsError::GitAuthFailed(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_classify_generic_error() {
        let err = classify_git_error("  fatal: bad object  ");
        match err {
            GitOpsError::GitOperation(msg) => assert_eq!(msg, "fatal: bad object"),
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
