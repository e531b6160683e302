use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::ScannerConfig;
use crate::error::{AppError, Result};

/// Configuration store backed by a JSON file
///
/// Missing files are created with defaults; missing keys fall back to their
/// defaults through `#[serde(default)]`.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    config: ScannerConfig,
}

impl ConfigStore {
    /// Load configuration from `path`, writing defaults if it does not exist
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let config = match tokio::fs::read_to_string(&path).await {
            Ok(text) => serde_json::from_str::<ScannerConfig>(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Config {} not found, writing defaults", path.display());
                let config = ScannerConfig::default();
                Self::write(&path, &config).await?;
                config
            }
            Err(e) => return Err(e.into()),
        };

        config.validate().map_err(AppError::Config)?;
        info!("Loaded configuration from {}", path.display());

        Ok(Self { path, config })
    }

    /// Get current configuration
    pub fn get(&self) -> &ScannerConfig {
        &self.config
    }

    /// Path the configuration was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace and persist the configuration
    pub async fn set(&mut self, config: ScannerConfig) -> Result<()> {
        config.validate().map_err(AppError::Config)?;
        Self::write(&self.path, &config).await?;
        self.config = config;
        Ok(())
    }

    async fn write(path: &Path, config: &ScannerConfig) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_string_pretty(config)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}
