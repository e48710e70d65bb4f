//! Engine configuration loaded from TOML.
//!
//! ```toml
//! [planner]
//! exhaustive = false
//! max_states = 5000
//!
//! [executor]
//! replace_existing = false
//! commit_each_step = true
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::exec::ExecutorConfig;
use crate::plan::PlannerConfig;

/// Planner and executor settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Search settings.
    pub planner: PlannerConfig,
    /// Execution settings.
    pub executor: ExecutorConfig,
}

/// Failures while reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid TOML for [`EngineConfig`].
    #[error("failed to parse config {path}: {source}")]
    Parse {
        /// File path.
        path: PathBuf,
        /// Underlying TOML failure.
        #[source]
        source: toml::de::Error,
    },
}

impl EngineConfig {
    /// Reads `explicit`, or the default location when `None`. A missing file
    /// yields the defaults.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let Some(path) = explicit.or_else(default_config_path) else {
            return Ok(Self::default());
        };
        if !path.exists() {
            debug!(path = %path.display(), "config.absent");
            return Ok(Self::default());
        }
        read_file(&path)
    }

    /// Parses TOML text.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

/// `$CONFIG_DIR/qgraph/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("qgraph").join("config.toml"))
}

fn read_file(path: &Path) -> Result<EngineConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load(Some(dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(!config.planner.exhaustive);
        assert!(config.executor.commit_each_step);
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[planner]\nexhaustive = true\n\n[executor]\nreplace_existing = true\n").unwrap();
        let config = EngineConfig::load(Some(path)).unwrap();
        assert!(config.planner.exhaustive);
        assert_eq!(config.planner.max_states, None);
        assert!(config.executor.replace_existing);
        assert!(config.executor.commit_each_step);
    }

    #[test]
    fn invalid_toml_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[planner\nexhaustive = yes").unwrap();
        let err = EngineConfig::load(Some(path.clone())).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains(&path.display().to_string()));
    }
}
