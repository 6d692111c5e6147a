use std::path::Path;

use crate::config::schema::OperatorConfig;
use crate::error::ConfigError;
use crate::gitops::{RepoRef, DEFAULT_BRANCH};

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<OperatorConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<OperatorConfig, ConfigError> {
    let config: OperatorConfig = serde_yaml::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_config(config: &OperatorConfig) -> Result<(), ConfigError> {
    let sync = &config.sync;
    RepoRef::from_parts(&sync.branch, &sync.tag, DEFAULT_BRANCH)
        .map_err(|(branch, tag)| ConfigError::BranchAndTag { branch, tag })?;

    if sync.poll_interval_seconds == 0 {
        return Err(ConfigError::Validation {
            message: "sync.pollIntervalSeconds must be greater than zero".to_string(),
        });
    }

    if config.reconcile.interval_seconds == 0 {
        return Err(ConfigError::Validation {
            message: "reconcile.intervalSeconds must be greater than zero".to_string(),
        });
    }

    if config.reconcile.mesh_name.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "reconcile.meshName is required".to_string(),
        });
    }

    if config.reconcile.sidecar_workers == 0 {
        return Err(ConfigError::Validation {
            message: "reconcile.sidecarWorkers must be greater than zero".to_string(),
        });
    }

    let mut seen = std::collections::HashSet::new();
    for namespace in &config.reconcile.watch_namespaces {
        if namespace.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: "reconcile.watchNamespaces contains an empty name".to_string(),
            });
        }
        if !seen.insert(namespace) {
            return Err(ConfigError::Validation {
                message: format!("Duplicate watched namespace: {}", namespace),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::LogFormat;
    use std::io::Write;
    use std::time::Duration;

    const MINIMAL: &str = r#"
reconcile:
  meshName: prod
"#;

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config = load_config_from_str(MINIMAL).unwrap();
        assert_eq!(config.sync.remote, "");
        assert_eq!(config.sync.poll_interval_seconds, 10);
        assert_eq!(config.state.config_snapshot_key, "meshsync.gitops.config");
        assert_eq!(config.state.workload_snapshot_key, "meshsync.gitops.workloads");
        assert_eq!(config.state.engine_options().connect_retry, Duration::from_secs(30));
        assert_eq!(config.reconcile.interval(), Duration::from_secs(30));
        assert_eq!(config.reconcile.image_pull_secret, "mesh-docker-secret");
        assert_eq!(config.reconcile.sidecar_workers, 4);
        assert!(!config.reconcile.mtls_enabled());
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
sync:
  remote: git@example.com:org/mesh.git
  tag: v1.2.0
  localPath: /var/lib/meshsync/repo
  sshKeyPath: ~/.ssh/id_ed25519
  sshPassphrase: hunter2
  pollIntervalSeconds: 5
state:
  databasePath: /var/lib/meshsync/state.db
  connectRetrySeconds: 3
reconcile:
  intervalSeconds: 15
  meshName: prod
  watchNamespaces: [apps, payments]
  mtlsIdentity: spiffe://prod
logging:
  level: debug
  format: json
"#;
        let config = load_config_from_str(yaml).unwrap();
        let sync = config.sync.to_sync_config().unwrap();
        assert_eq!(sync.reference, RepoRef::Tag("v1.2.0".to_string()));
        assert_eq!(sync.poll_interval, Duration::from_secs(5));
        assert!(config.reconcile.mtls_enabled());
        assert_eq!(
            config.reconcile.desired_state().watch_namespaces,
            vec!["apps", "payments"]
        );
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_branch_and_tag_rejected() {
        let yaml = r#"
sync:
  branch: main
  tag: v1
reconcile:
  meshName: prod
"#;
        assert!(matches!(
            load_config_from_str(yaml).unwrap_err(),
            ConfigError::BranchAndTag { .. }
        ));
    }

    #[test]
    fn test_zero_intervals_rejected() {
        let yaml = "sync:\n  pollIntervalSeconds: 0\nreconcile:\n  meshName: prod\n";
        assert!(matches!(
            load_config_from_str(yaml).unwrap_err(),
            ConfigError::Validation { .. }
        ));

        let yaml = "reconcile:\n  meshName: prod\n  intervalSeconds: 0\n";
        assert!(matches!(
            load_config_from_str(yaml).unwrap_err(),
            ConfigError::Validation { .. }
        ));
    }

    #[test]
    fn test_missing_mesh_name_rejected() {
        let err = load_config_from_str("logging:\n  level: warn\n").unwrap_err();
        assert!(err.to_string().contains("meshName"));
    }

    #[test]
    fn test_duplicate_namespace_rejected() {
        let yaml = "reconcile:\n  meshName: prod\n  watchNamespaces: [a, a]\n";
        assert!(load_config_from_str(yaml).is_err());
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(matches!(
            load_config_from_str("reconcile: [").unwrap_err(),
            ConfigError::ParseYaml(_)
        ));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.reconcile.mesh_name, "prod");

        assert!(matches!(
            load_config("/nonexistent/meshsync.yaml").unwrap_err(),
            ConfigError::ReadFile { .. }
        ));
    }
}
