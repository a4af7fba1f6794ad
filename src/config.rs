//! Run configuration
//!
//! Loaded from an optional JSON file; the CLI overrides individual fields.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::policy::NormalizePolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RunConfig {
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub normalize: NormalizePolicy,
    /// Worker threads. 1 is sequential, 0 uses available parallelism.
    #[serde(default = "default_jobs")]
    pub jobs: usize,
}

fn default_category() -> String { "piet".to_string() }
fn default_jobs() -> usize { 1 }

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            category: default_category(),
            normalize: NormalizePolicy::default(),
            jobs: default_jobs(),
        }
    }
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Concrete worker count for this machine.
    pub fn worker_count(&self) -> usize {
        match self.jobs {
            0 => std::thread::available_parallelism().map_or(1, |n| n.get()),
            n => n,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: RunConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, RunConfig::default());
        assert_eq!(config.category, "piet");
        assert_eq!(config.worker_count(), 1);
    }

    #[test]
    fn test_full_config() {
        let config: RunConfig =
            serde_json::from_str(r#"{"category": "piet-extra", "normalize": "off", "jobs": 4}"#).unwrap();
        assert_eq!(config.normalize, NormalizePolicy::Off);
        assert_eq!(config.worker_count(), 4);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(serde_json::from_str::<RunConfig>(r#"{"tolerance": 3}"#).is_err());
    }

    #[test]
    fn test_zero_jobs_uses_available_parallelism() {
        let config = RunConfig { jobs: 0, ..RunConfig::default() };
        assert!(config.worker_count() >= 1);
    }

    #[test]
    fn test_load_missing_file() {
        let err = RunConfig::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
