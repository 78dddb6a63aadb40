use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::arch::Arch;
use crate::error::{ChartError, Result};

/// Environment variable naming the default package repository.
pub const ENV_PACKAGE_REPOSITORY: &str = "PACKAGE_REPOSITORY";

/// Environment variable naming one trusted repository key file.
pub const ENV_PACKAGE_REPOSITORY_PUB_KEY: &str = "PACKAGE_REPOSITORY_PUB_KEY";

/// Default upper bound for a single package download.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(300);

/// Provider-level defaults shared by every build invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ProviderConfig {
    /// Package repository locations (directories or http(s) URLs)
    pub package_repositories: Vec<String>,

    /// Paths to trusted repository public keys
    pub public_keys: Vec<PathBuf>,

    /// Architecture used when a request does not name one
    pub default_arch: Option<Arch>,

    /// Accept repository indexes without a trusted signature
    pub allow_untrusted: bool,
}

impl ProviderConfig {
    /// Read defaults from `PACKAGE_REPOSITORY` and `PACKAGE_REPOSITORY_PUB_KEY`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ProviderConfig::from_env`] with an injectable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(repo) = lookup(ENV_PACKAGE_REPOSITORY).filter(|v| !v.is_empty()) {
            config.package_repositories.push(repo);
        }
        if let Some(key) = lookup(ENV_PACKAGE_REPOSITORY_PUB_KEY).filter(|v| !v.is_empty()) {
            config.public_keys.push(PathBuf::from(key));
        }
        config
    }

    /// Load a YAML configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ChartError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        serde_yaml::from_str(&content).map_err(|e| {
            ChartError::ConfigError(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// Overlay `other` on top of `self`.
    ///
    /// Repositories set in `other` replace ours; keys are appended.
    pub fn merge(mut self, other: ProviderConfig) -> Self {
        if !other.package_repositories.is_empty() {
            self.package_repositories = other.package_repositories;
        }
        self.public_keys.extend(other.public_keys);
        if other.default_arch.is_some() {
            self.default_arch = other.default_arch;
        }
        self.allow_untrusted |= other.allow_untrusted;
        self
    }

    /// Require at least one repository.
    pub fn validate(&self) -> Result<()> {
        if self.package_repositories.is_empty() {
            return Err(ChartError::ConfigError(
                "package repository is not configured; set package_repositories or PACKAGE_REPOSITORY"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// Input of one build invocation.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Version constraint for the package (`None` = highest available)
    pub version: Option<String>,

    /// Trusted key files
    pub keys: Vec<PathBuf>,

    /// Repository locations, consulted in order
    pub repositories: Vec<String>,

    /// Target architecture
    pub arch: Arch,

    /// Relative chart path -> raw patch document
    pub patches: BTreeMap<String, Vec<u8>>,

    /// Image id -> image reference, resolved through the chart's image mapping
    pub images: BTreeMap<String, String>,

    /// Accept unsigned repository indexes
    pub allow_untrusted: bool,

    /// Upper bound for index loading and package download
    pub fetch_timeout: Duration,

    /// Parent of downloaded packages and extraction directories
    /// (system temp dir when unset)
    pub work_dir: Option<PathBuf>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            version: None,
            keys: Vec::new(),
            repositories: Vec::new(),
            arch: crate::arch::DEFAULT_ARCH,
            patches: BTreeMap::new(),
            images: BTreeMap::new(),
            allow_untrusted: false,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            work_dir: None,
        }
    }
}

impl BuildConfig {
    /// Derive a build configuration from provider defaults and a request-level arch.
    pub fn from_provider(provider: &ProviderConfig, arch: Option<Arch>) -> Self {
        Self {
            keys: provider.public_keys.clone(),
            repositories: provider.package_repositories.clone(),
            arch: Arch::resolve(arch, provider.default_arch),
            allow_untrusted: provider.allow_untrusted,
            ..Default::default()
        }
    }

    /// Parse `path=value` pairs as used on the command line.
    pub fn parse_assignment(raw: &str) -> Result<(String, String)> {
        match raw.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
            _ => Err(ChartError::ConfigError(format!(
                "expected KEY=VALUE, got '{}'",
                raw
            ))),
        }
    }
}
