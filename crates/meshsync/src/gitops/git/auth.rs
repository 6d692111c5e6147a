//! Repository transport authentication.

use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};

use crate::gitops::error::{GitOpsError, Result};

/// How the git transport authenticates against the remote.
#[derive(Debug, Clone, Default)]
pub enum GitAuth {
    /// Anonymous access (public HTTPS, local paths, `file://` remotes).
    #[default]
    None,
    /// SSH private key, optionally protected by a passphrase.
    SshKey {
        key_path: String,
        passphrase: Option<SecretString>,
    },
}

impl GitAuth {
    /// Builds the auth mode from raw settings; an empty key path means anonymous.
    pub fn from_settings(key_path: &str, passphrase: Option<SecretString>) -> Self {
        if key_path.trim().is_empty() {
            GitAuth::None
        } else {
            GitAuth::SshKey {
                key_path: key_path.to_string(),
                passphrase: passphrase.filter(|p| !p.expose_secret().is_empty()),
            }
        }
    }
}

/// Escapes a value for safe use in single-quoted shell strings.
pub fn shell_escape(value: &str) -> String {
    value.replace('\'', "'\\''")
}

/// Expands a leading `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        dirs::home_dir().unwrap_or_default()
    } else if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .map(|h| h.join(rest))
            .unwrap_or_else(|| PathBuf::from(path))
    } else {
        PathBuf::from(path)
    }
}

/// RAII guard for askpass script cleanup.
///
/// The script holds the key passphrase, so it is removed as soon as the git
/// command that needed it has finished.
#[derive(Debug)]
pub struct AskpassCleanup {
    path: Option<PathBuf>,
}

impl AskpassCleanup {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    pub(crate) fn empty() -> Self {
        Self { path: None }
    }
}

impl Drop for AskpassCleanup {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                log::warn!("Failed to clean up askpass script: {}", e);
            }
        }
    }
}

/// Environment for one git invocation.
#[derive(Debug)]
pub struct AuthEnv {
    /// Environment variables to set for the git command.
    pub env_vars: Vec<(String, String)>,
    /// Must outlive the git command to keep the askpass script alive.
    pub _cleanup: AskpassCleanup,
}

/// Build the git environment for the configured transport auth.
pub fn build_auth_env(auth: &GitAuth) -> Result<AuthEnv> {
    let mut env = vec![("GIT_TERMINAL_PROMPT".to_string(), "0".to_string())];

    let (key_path, passphrase) = match auth {
        GitAuth::None => {
            return Ok(AuthEnv {
                env_vars: env,
                _cleanup: AskpassCleanup::empty(),
            });
        }
        GitAuth::SshKey {
            key_path,
            passphrase,
        } => (expand_tilde(key_path), passphrase),
    };

    if !key_path.exists() {
        return Err(GitOpsError::GitAuthFailed(format!(
            "SSH key file not found: {}",
            key_path.display()
        )));
    }

    let safe_path = {
        let escaped = shell_escape(&key_path.display().to_string());
        if escaped.starts_with('-') {
            format!("'./{}'", escaped)
        } else {
            format!("'{}'", escaped)
        }
    };

    env.push((
        "GIT_SSH_COMMAND".to_string(),
        format!(
            "ssh -i {} -o IdentitiesOnly=yes -o StrictHostKeyChecking=accept-new",
            safe_path
        ),
    ));

    let cleanup = match passphrase {
        Some(passphrase) => {
            let script_path = write_askpass_script(passphrase.expose_secret())?;
            let script_str = script_path
                .to_str()
                .ok_or_else(|| {
                    GitOpsError::GitAuthFailed(
                        "Temp directory path contains non-UTF8 characters".to_string(),
                    )
                })?
                .to_string();
            env.push(("SSH_ASKPASS".to_string(), script_str));
            env.push(("SSH_ASKPASS_REQUIRE".to_string(), "force".to_string()));
            AskpassCleanup::new(script_path)
        }
        None => AskpassCleanup::empty(),
    };

    Ok(AuthEnv {
        env_vars: env,
        _cleanup: cleanup,
    })
}

fn write_askpass_script(passphrase: &str) -> Result<PathBuf> {
    let path = std::env::temp_dir().join(format!(".ssh-askpass-{}.sh", uuid::Uuid::new_v4()));
    let script = format!("#!/bin/sh\necho '{}'\n", shell_escape(passphrase));
    create_private_file(&path, script.as_bytes())?;
    Ok(path)
}

#[cfg(unix)]
fn create_private_file(path: &Path, contents: &[u8]) -> Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o700)
        .open(path)?;
    file.write_all(contents)?;
    Ok(())
}

#[cfg(not(unix))]
fn create_private_file(path: &Path, contents: &[u8]) -> Result<()> {
    std::fs::write(path, contents)?;
    Ok(())
}
