//! Configuration for the version-controlled registry
//!
//! Configuration sources are loaded in priority order:
//! 1. Programmatic overrides (`.set_override()`)
//! 2. Environment variables (`REGVAULT__*`)
//! 3. Config file (`~/.config/regvault/config.toml` or an explicit path)
//! 4. Default values
//!
//! # Basic Usage
//!
//! ```rust,ignore
//! use regvault_core::config::RegistryConfig;
//!
//! let config = RegistryConfig::load(None)?;
//! ```
//!
//! # Programmatic Overrides
//!
//! ```rust,ignore
//! let config: RegistryConfig = RegistryConfig::builder(None)?
//!     .set_override("registry.management_type", "domain")?
//!     .build()?
//!     .try_deserialize()?;
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration for the registry
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RegistryConfig {
    /// Repository locations
    pub version_control: VersionControlConfig,
    /// Registry storage configuration
    pub registry: RegistryStorageConfig,
    /// Signature used for commits
    pub signature: CommitSignature,
}

impl RegistryConfig {
    /// Create a configuration builder with regvault defaults
    ///
    /// # Supported Environment Variables
    ///
    /// - `REGVAULT__VERSION_CONTROL__SERVICES_REPO`: Master repository location
    /// - `REGVAULT__VERSION_CONTROL__REPOS_DIR`: Base directory for per-user repositories
    /// - `REGVAULT__REGISTRY__SOURCE_DIR`: Pre-existing JSON registry used to seed master
    /// - `REGVAULT__REGISTRY__MANAGEMENT_TYPE`: `default` or `domain`
    /// - `REGVAULT__SIGNATURE__NAME`: Commit author name
    /// - `REGVAULT__SIGNATURE__EMAIL`: Commit author email
    pub fn builder(
        config_file: Option<&Path>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        let defaults = VersionControlConfig::default();
        let file = match config_file {
            Some(path) => config::File::from(path).required(true),
            None => config::File::from(Self::default_config_path().unwrap_or_default())
                .required(false),
        };

        Ok(config::Config::builder()
            .set_default(
                "version_control.services_repo",
                defaults.services_repo.to_string_lossy().to_string(),
            )?
            .set_default(
                "version_control.repos_dir",
                defaults.repos_dir.to_string_lossy().to_string(),
            )?
            .set_default("registry.management_type", "default")?
            .set_default("signature.name", "regvault")?
            .set_default("signature.email", "regvault@local")?
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("REGVAULT")
                    .separator("__")
                    .try_parsing(true)
                    .ignore_empty(true),
            ))
    }

    /// Load configuration with defaults, an optional explicit file and environment overrides
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let config = Self::builder(config_file)?
            .build()
            .context("Failed to build configuration")?;

        let deserialized: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        tracing::info!(
            "Loaded regvault config: services_repo = {}, repos_dir = {}, management_type = {:?}",
            deserialized.version_control.services_repo.display(),
            deserialized.version_control.repos_dir.display(),
            deserialized.registry.management_type
        );

        Ok(deserialized)
    }

    /// Configuration rooted at a single directory, used by tests and the CLI `--root` flag
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            version_control: VersionControlConfig {
                services_repo: root.join("services-repo"),
                repos_dir: root.join("user-repos"),
            },
            registry: RegistryStorageConfig {
                source_dir: None,
                management_type: ManagementType::Default,
            },
            signature: CommitSignature::default(),
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
                return Some(PathBuf::from(xdg_config).join("regvault").join("config.toml"));
            }
        }

        std::env::var("HOME").ok().map(|home| {
            PathBuf::from(home)
                .join(".config")
                .join("regvault")
                .join("config.toml")
        })
    }
}

/// Where the master and per-user repositories live
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionControlConfig {
    /// Master repository working directory
    pub services_repo: PathBuf,
    /// Parent directory of the private per-user repositories
    pub repos_dir: PathBuf,
}

impl Default for VersionControlConfig {
    fn default() -> Self {
        let base = std::env::var("HOME")
            .map(|home| PathBuf::from(home).join(".local").join("share").join("regvault"))
            .unwrap_or_else(|_| PathBuf::from("/var/lib/regvault"));
        Self {
            services_repo: base.join("services-repo"),
            repos_dir: base.join("user-repos"),
        }
    }
}

/// Registry storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RegistryStorageConfig {
    /// Pre-existing, non-versioned JSON registry imported on first bootstrap
    #[serde(default)]
    pub source_dir: Option<PathBuf>,
    /// In-memory layout of the registry
    #[serde(default)]
    pub management_type: ManagementType,
}

/// Services manager variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ManagementType {
    /// Flat registry
    #[default]
    Default,
    /// Registry partitioned by the host of each service URL pattern
    Domain,
}

impl std::str::FromStr for ManagementType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "domain" => Ok(Self::Domain),
            other => Err(format!(
                "unknown management type '{}', expected 'default' or 'domain'",
                other
            )),
        }
    }
}

/// Author and committer identity for registry commits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitSignature {
    pub name: String,
    pub email: String,
}

impl Default for CommitSignature {
    fn default() -> Self {
        Self {
            name: "regvault".to_string(),
            email: "regvault@local".to_string(),
        }
    }
}
