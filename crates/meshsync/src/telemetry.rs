//! Process-wide log and trace subscriber.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{MeshSyncError, Result};

fn filter_for(config: &LoggingConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
            MeshSyncError::Telemetry(format!("invalid log level '{}': {}", config.level, e))
        }),
    }
}

/// Installs the global subscriber. `RUST_LOG` overrides the configured level.
///
/// `log` records are bridged into the same subscriber. Fails if a global
/// logger or subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = filter_for(config)?;
    let json = config.format == LogFormat::Json;

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json().with_target(true)))
        .with((!json).then(|| fmt::layer().with_target(true)));

    tracing_log::LogTracer::init()
        .map_err(|e| MeshSyncError::Telemetry(format!("log bridge already installed: {}", e)))?;
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| MeshSyncError::Telemetry(format!("subscriber already installed: {}", e)))?;

    tracing::debug!(level = %config.level, ?config.format, "logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_is_reported() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let config = LoggingConfig {
            level: "meshsync=notalevel".to_string(),
            format: LogFormat::Text,
        };
        assert!(matches!(
            filter_for(&config),
            Err(MeshSyncError::Telemetry(_))
        ));
    }

    #[test]
    fn test_second_init_fails() {
        let config = LoggingConfig::default();
        let _ = init_logging(&config);
        assert!(init_logging(&config).is_err());
    }
}
