//! Gateway configuration
//!
//! Build policies and registry settings are fixed at startup from a
//! TOML file; everything constructed from them is read-only afterwards.

use crate::error::{CacheError, CacheResult};
use crate::policy::{BuildPolicy, RepositoryDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Named build policies, each an ordered repository search list
    pub policies: BTreeMap<String, PolicyConfig>,

    /// Registry client settings
    pub registry: RegistryConfig,
}

/// One named build policy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Whether this policy serves source-rebuilt artifacts
    pub transformed: bool,

    /// Repositories in search order
    pub repositories: Vec<RepositoryDescriptor>,
}

/// Registry client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Registry host, e.g. `quay.io`
    pub host: String,

    /// Repository within the registry, e.g. `org/rebuilt-artifacts`
    pub repository: String,

    /// Pre-encoded basic credential; absent means anonymous access
    pub credential: Option<String>,

    /// Use plain HTTP instead of HTTPS
    pub insecure: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            host: "quay.io".to_string(),
            repository: String::new(),
            credential: None,
            insecure: false,
        }
    }
}

impl Config {
    /// Build the immutable policy for a name, if configured
    pub fn build_policy(&self, name: &str) -> CacheResult<BuildPolicy> {
        let policy = self
            .policies
            .get(name)
            .ok_or_else(|| CacheError::UnknownPolicy(name.to_string()))?;
        Ok(BuildPolicy::new(
            policy.repositories.clone(),
            policy.transformed,
        ))
    }
}

/// Loads configuration from disk
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a config manager with the default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Default config file location
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("rebuild-cache")
            .join("config.toml")
    }

    /// Load configuration, falling back to defaults when the file is
    /// missing
    pub fn load(&self) -> CacheResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }
        self.load_from_file(&self.config_path)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(&self, path: &Path) -> CacheResult<Config> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CacheError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| CacheError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::RepositoryType;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
[registry]
host = "registry.example.com"
repository = "org/rebuilt"
credential = "YmFzaWM="

[policies.default]
transformed = false
repositories = [
    { name = "rebuilt", type = "s3" },
    { name = "central", type = "maven2" },
]

[policies.transformed]
transformed = true
repositories = [
    { name = "rebuilt", type = "s3" },
    { name = "registry", type = "oci-registry" },
]
"#;

    #[test]
    fn load_default_when_missing() {
        let temp = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(temp.path().join("nonexistent.toml"));

        let config = manager.load().unwrap();
        assert!(config.policies.is_empty());
        assert_eq!(config.registry.host, "quay.io");
        assert!(config.registry.credential.is_none());
    }

    #[test]
    fn parse_sample_config() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = ConfigManager::with_path(path).load().unwrap();
        assert_eq!(config.registry.host, "registry.example.com");
        assert_eq!(config.registry.credential.as_deref(), Some("YmFzaWM="));
        assert!(!config.registry.insecure);

        let policy = config.build_policy("default").unwrap();
        assert!(!policy.is_transformed());
        assert_eq!(policy.repositories().len(), 2);
        assert_eq!(policy.repositories()[0].name, "rebuilt");
        assert_eq!(policy.repositories()[0].repo_type, RepositoryType::S3);
        assert_eq!(policy.repositories()[1].repo_type, RepositoryType::Maven2);

        let transformed = config.build_policy("transformed").unwrap();
        assert!(transformed.is_transformed());
        assert_eq!(
            transformed.repositories()[1].repo_type,
            RepositoryType::OciRegistry
        );
    }

    #[test]
    fn unknown_policy_is_an_error() {
        let config = Config::default();
        let err = config.build_policy("missing").unwrap_err();
        assert!(matches!(err, CacheError::UnknownPolicy(_)));
    }

    #[test]
    fn invalid_toml_reports_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "policies = 3").unwrap();

        let err = ConfigManager::with_path(path).load().unwrap_err();
        assert!(matches!(err, CacheError::ConfigInvalid { .. }));
    }

    #[test]
    fn invalid_repository_type_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[policies.default]
repositories = [{ name = "x", type = "ftp" }]
"#,
        )
        .unwrap();

        let err = ConfigManager::with_path(path).load().unwrap_err();
        assert!(matches!(err, CacheError::ConfigInvalid { .. }));
    }
}
