//! Configuration file handling

use anyhow::{Context, Result};
use planner::{ReferencePolicy, Repository};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::paths;

/// `config.toml`
///
/// ```toml
/// store_dir = "~/planner-store"
/// jobs = 8
/// allow_cross_namespace_refs = false
///
/// [repository]
/// org = "tf-controller"
/// name = "helloworld"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Object store directory
    pub store_dir: Option<String>,
    /// Branches applied in parallel
    pub jobs: usize,
    /// Let templates reference sources in other namespaces
    pub allow_cross_namespace_refs: bool,
    /// Repository to ask for pull requests; derived from the source URL when
    /// unset
    pub repository: Option<Repository>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_dir: None,
            jobs: 4,
            allow_cross_namespace_refs: true,
            repository: None,
        }
    }
}

impl Config {
    /// Load the config file.
    ///
    /// An explicit path must exist. The default location is optional and
    /// falls back to defaults when missing.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }

        let path = paths::config_file()?;
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let config = Self::parse(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        anyhow::ensure!(config.jobs > 0, "jobs must be at least 1");
        Ok(config)
    }

    /// Store directory: flag, then config, then the default location
    pub fn store_dir(&self, flag: Option<&Path>) -> Result<PathBuf> {
        if let Some(dir) = flag {
            return Ok(dir.to_path_buf());
        }
        match &self.store_dir {
            Some(dir) => Ok(paths::expand(dir)),
            None => paths::store_dir(),
        }
    }

    pub fn reference_policy(&self) -> ReferencePolicy {
        ReferencePolicy {
            no_cross_namespace_refs: !self.allow_cross_namespace_refs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert!(!config.reference_policy().no_cross_namespace_refs);
    }

    #[test]
    fn test_full_config() {
        let config = Config::parse(
            r#"
            store_dir = "/srv/planner"
            jobs = 8
            allow_cross_namespace_refs = false

            [repository]
            org = "tf-controller"
            name = "helloworld"
            "#,
        )
        .unwrap();

        assert_eq!(config.jobs, 8);
        assert!(config.reference_policy().no_cross_namespace_refs);
        assert_eq!(
            config.store_dir(None).unwrap(),
            PathBuf::from("/srv/planner")
        );
        let repo = config.repository.unwrap();
        assert_eq!(repo.to_string(), "tf-controller/helloworld");
    }

    #[test]
    fn test_store_flag_wins() {
        let config = Config {
            store_dir: Some("/srv/planner".into()),
            ..Default::default()
        };
        assert_eq!(
            config.store_dir(Some(Path::new("/tmp/other"))).unwrap(),
            PathBuf::from("/tmp/other")
        );
    }

    #[test]
    fn test_zero_jobs_rejected() {
        assert!(Config::parse("jobs = 0").is_err());
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(Config::load(Some(&dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "jobs = 2\n").unwrap();
        assert_eq!(Config::load(Some(&path)).unwrap().jobs, 2);
    }
}
