//! Configuration management for vltpkg

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::extract::ArchiveExtractor;
use crate::registry::{CompositePackageRegistry, FsPackageRegistry, PackageRegistry};

const CONFIG_FILE: &str = "vltpkg.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Registry configuration
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Extraction target configuration
    #[serde(default)]
    pub target: TargetConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Directory of the primary registry, new packages are stored here
    #[serde(default = "default_home")]
    pub home: PathBuf,

    /// Further registries whose packages are visible alongside the primary
    #[serde(default)]
    pub extra: Vec<PathBuf>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            home: default_home(),
            extra: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Directory package content is extracted into
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
        }
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("org", "vltpkg", "vltpkg")
}

fn data_dir() -> PathBuf {
    project_dirs()
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".vltpkg"))
}

fn default_home() -> PathBuf {
    data_dir().join("registry")
}

fn default_root() -> PathBuf {
    data_dir().join("target")
}

impl Config {
    /// Load configuration from file, or use defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(PathBuf::from).or_else(|| {
            project_dirs()
                .map(|d| d.config_dir().join(CONFIG_FILE))
                .filter(|p| p.exists())
        });

        match config_path {
            Some(path) => {
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config: {}", path.display()))?;
                let config = Self::parse(&content)
                    .with_context(|| format!("Failed to parse config: {}", path.display()))?;
                tracing::debug!("Loaded configuration from {}", path.display());
                Ok(config)
            }
            None => Ok(Config::default()),
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Open the configured registries
    pub fn open_registry(&self) -> Result<Box<dyn PackageRegistry>> {
        let primary = FsPackageRegistry::new(&self.registry.home).with_context(|| {
            format!("Failed to open registry: {}", self.registry.home.display())
        })?;
        if self.registry.extra.is_empty() {
            return Ok(Box::new(primary));
        }

        let mut registries: Vec<Box<dyn PackageRegistry>> = vec![Box::new(primary)];
        for home in &self.registry.extra {
            let registry = FsPackageRegistry::new(home)
                .with_context(|| format!("Failed to open registry: {}", home.display()))?;
            registries.push(Box::new(registry));
        }
        Ok(Box::new(CompositePackageRegistry::new(registries)?))
    }

    /// Extractor writing into the configured target
    pub fn extractor(&self) -> ArchiveExtractor {
        ArchiveExtractor::new(&self.target.root)
    }
}
