pub mod auth;
pub mod parse;
pub mod repository;
pub mod types;

pub use auth::GitAuth;
pub use repository::GitRepository;
pub use types::{RepoRef, SyncPhase, SyncStatus};
