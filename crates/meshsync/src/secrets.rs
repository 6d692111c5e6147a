//! Secret resolution from a direct value, a file, or an environment variable.
//!
//! Sources are tried in that order, so a quick local override wins over a
//! mounted secret file, which wins over the environment.

use std::fs;

use secrecy::SecretString;

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("Failed to read secret from file '{path}': {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Environment variable '{name}' not set")]
    EnvVarNotSet { name: String },

    #[error("Environment variable '{name}' contains invalid UTF-8")]
    EnvVarNotUnicode { name: String },
}

/// Resolves an optional secret. `Ok(None)` when no source is configured.
pub fn resolve_secret(
    direct: Option<&str>,
    file_path: Option<&str>,
    env_var: Option<&str>,
) -> Result<Option<SecretString>, SecretError> {
    if let Some(value) = direct.filter(|v| !v.is_empty()) {
        return Ok(Some(SecretString::from(value.to_string())));
    }

    if let Some(path) = file_path.filter(|p| !p.is_empty()) {
        let expanded = crate::gitops::git::auth::expand_tilde(path);
        return match fs::read_to_string(&expanded) {
            Ok(content) => Ok(Some(SecretString::from(content.trim().to_string()))),
            Err(e) => Err(SecretError::FileRead {
                path: expanded.display().to_string(),
                source: e,
            }),
        };
    }

    if let Some(name) = env_var.filter(|n| !n.is_empty()) {
        return match std::env::var(name) {
            // Env vars often carry a trailing newline
            Ok(value) => Ok(Some(SecretString::from(value.trim().to_string()))),
            Err(std::env::VarError::NotPresent) => Err(SecretError::EnvVarNotSet {
                name: name.to_string(),
            }),
            Err(std::env::VarError::NotUnicode(_)) => Err(SecretError::EnvVarNotUnicode {
                name: name.to_string(),
            }),
        };
    }

    Ok(None)
}
