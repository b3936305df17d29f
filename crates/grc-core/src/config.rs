//! Configuration for storage, retrieval and revision settings.
//!
//! Load order: `.grc/config.toml` → environment variables → defaults.

use crate::revision::DEFAULT_REVISION_PREFIX;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GrcConfig {
    pub storage: StorageConfig,
    pub retrieval: RetrievalConfig,
    pub revision: RevisionConfig,
}

/// Where snapshot files live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Graph directory, relative to the project root unless absolute.
    pub graph_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Maximum number of paths returned per query.
    pub max_results: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RevisionConfig {
    /// Prefix of issued revision ids (`grc-kg-rev-003`).
    pub id_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            graph_dir: PathBuf::from("graph"),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { max_results: 10 }
    }
}

impl Default for RevisionConfig {
    fn default() -> Self {
        Self {
            id_prefix: DEFAULT_REVISION_PREFIX.to_string(),
        }
    }
}

/// Helper to parse an env var and apply it to a config field.
fn env_override<T: std::str::FromStr>(var: &str, target: &mut T) {
    if let Ok(v) = std::env::var(var)
        && let Ok(n) = v.parse()
    {
        *target = n;
    }
}

impl GrcConfig {
    /// Load config from `.grc/config.toml` in the project root, with env var overrides.
    /// Falls back to defaults if no config file exists.
    pub fn load(project_root: &Path) -> Result<Self> {
        let config_path = project_root.join(".grc").join("config.toml");

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("failed to read {}", config_path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("failed to parse {}", config_path.display()))?
        } else {
            Self::default()
        };

        env_override("GRC_GRAPH_DIR", &mut config.storage.graph_dir);
        env_override("GRC_MAX_RESULTS", &mut config.retrieval.max_results);
        env_override("GRC_REVISION_PREFIX", &mut config.revision.id_prefix);

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.retrieval.max_results == 0 {
            anyhow::bail!("retrieval.max_results must be greater than 0");
        }
        if self.revision.id_prefix.trim().is_empty() {
            anyhow::bail!("revision.id_prefix must not be empty");
        }
        Ok(())
    }

    /// Graph directory resolved against the project root.
    pub fn graph_dir(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.storage.graph_dir)
    }
}
