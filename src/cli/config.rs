use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, Result};
use serde::Deserialize;

use crate::storage::StoreConfig;

/// Configuration loaded from `stepstore.yaml`.
/// All fields are optional; missing fields fall back to CLI/env/defaults.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct StepStoreConfig {
    pub instance_dir: Option<PathBuf>,
    pub store_name: Option<String>,
    pub lock_timeout_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub library_path: Option<String>,
}

impl StepStoreConfig {
    /// Load configuration from a YAML file.
    ///
    /// - If `path` is `Some`, load that specific file (error if missing).
    /// - If `path` is `None`, auto-detect `stepstore.yaml` in cwd; return defaults if absent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file_path = match path {
            Some(p) => {
                if !p.exists() {
                    anyhow::bail!("Config file not found: {}", p.display());
                }
                p.to_path_buf()
            }
            None => {
                let default_path = Path::new("stepstore.yaml");
                if !default_path.exists() {
                    return Ok(Self::default());
                }
                default_path.to_path_buf()
            }
        };

        let contents = std::fs::read_to_string(&file_path)
            .with_context(|| format!("Failed to read config file: {}", file_path.display()))?;

        let config: StepStoreConfig = serde_yml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", file_path.display()))?;

        Ok(config)
    }

    /// Store tunables from this file, with explicit overrides taking precedence.
    pub fn store_config(
        &self,
        store_name: Option<&str>,
        lock_timeout_ms: Option<u64>,
    ) -> StoreConfig {
        let mut config = StoreConfig::default();
        if let Some(name) = store_name.or(self.store_name.as_deref()) {
            config.store_name = name.to_string();
        }
        if let Some(ms) = lock_timeout_ms.or(self.lock_timeout_ms) {
            config.lock_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.poll_interval_ms {
            config.poll_interval = Duration::from_millis(ms);
        }
        config
    }
}
