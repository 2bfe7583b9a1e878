use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::fs;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::env::LogFormat;
use crate::config::Config;

/// `RUST_LOG` wins; otherwise `level`, or debug when `debug` is set.
pub fn init_logging(level: &str, debug: bool, format: LogFormat) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Human => registry.with(fmt::layer()).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }

    Ok(())
}

pub struct LoadedConfig {
    pub config: Config,
    pub path: Option<PathBuf>,
}

/// Lookup order: `--config`, `./config/config.yaml`, the user config dir.
/// Falls back to defaults when none exists.
pub async fn load_config(config_path: Option<&PathBuf>) -> Result<LoadedConfig> {
    let config_path = match config_path {
        Some(path) => Some(path.clone()),
        None => default_config_path(),
    };

    match config_path {
        Some(path) if path.exists() => {
            let content = fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let config: Config = serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?;
            info!("Loaded configuration from: {}", path.display());
            Ok(LoadedConfig {
                config,
                path: Some(path),
            })
        }
        Some(path) => {
            warn!("Config file not found, using defaults: {}", path.display());
            Ok(LoadedConfig {
                config: Config::default(),
                path: None,
            })
        }
        None => Ok(LoadedConfig {
            config: Config::default(),
            path: None,
        }),
    }
}

fn default_config_path() -> Option<PathBuf> {
    let local_config = PathBuf::from("config/config.yaml");
    if local_config.exists() {
        return Some(local_config);
    }
    dirs::config_dir().map(|mut path| {
        path.push("webtest");
        path.push("config.yaml");
        path
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn explicit_config_file_is_parsed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("webtest.yaml");
        std::fs::write(
            &path,
            "server:\n  port: 4100\nrecording:\n  debounce_ms: 250\n",
        )
        .unwrap();

        let loaded = load_config(Some(&path)).await.unwrap();
        assert_eq!(loaded.path.as_deref(), Some(path.as_path()));
        assert_eq!(loaded.config.server.port, 4100);
        assert_eq!(loaded.config.recording.debounce_ms, 250);
        assert_eq!(loaded.config.replay.action_timeout_ms, 5_000);
    }

    #[tokio::test]
    async fn missing_config_file_means_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        let loaded = load_config(Some(&path)).await.unwrap();
        assert!(loaded.path.is_none());
        assert_eq!(loaded.config, Config::default());
    }

    #[tokio::test]
    async fn malformed_config_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "server: [not, a, map]\n").unwrap();
        assert!(load_config(Some(&path)).await.is_err());
    }
}
