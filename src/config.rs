use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use serde::Deserialize;

/// Directory used when no storage directory is configured.
pub const DEFAULT_STORAGE_DIR: &str = "./storage";

/// File auto-detected in the working directory by [`StoreConfig::load`].
pub const DEFAULT_CONFIG_FILE: &str = "flowstore.yaml";

/// Configuration loaded from `flowstore.yaml`.
/// All fields are optional; missing fields fall back to defaults.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct StoreConfig {
    pub storage_dir: Option<String>,
}

impl StoreConfig {
    /// Load configuration from a YAML file.
    ///
    /// - If `path` is `Some`, load that specific file (error if missing).
    /// - If `path` is `None`, auto-detect `flowstore.yaml` in cwd; return defaults if absent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file_path = match path {
            Some(p) => {
                if !p.exists() {
                    anyhow::bail!("Config file not found: {}", p.display());
                }
                p.to_path_buf()
            }
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if !default_path.exists() {
                    return Ok(Self::default());
                }
                default_path.to_path_buf()
            }
        };

        let contents = std::fs::read_to_string(&file_path)
            .with_context(|| format!("Failed to read config file: {}", file_path.display()))?;

        let config: StoreConfig = serde_yml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", file_path.display()))?;

        Ok(config)
    }

    /// Storage directory to open, falling back to `./storage`.
    pub fn storage_dir(&self) -> PathBuf {
        PathBuf::from(self.storage_dir.as_deref().unwrap_or(DEFAULT_STORAGE_DIR))
    }
}
