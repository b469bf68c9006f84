//! Package registries
//!
//! A registry stores package files together with their install state and
//! answers dependency queries against what it holds.
//!
//! - [`FsPackageRegistry`] keeps everything below a home directory.
//! - [`CompositePackageRegistry`] merges several registries, writing to the
//!   first one.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::archive::{PackageArchiveReader, PackageProperties};
use crate::dependency::Dependency;
use crate::error::{Error, Result};
use crate::options::PathFilter;
use crate::package::{PackageId, PackageStatus, SubPackageOption};
use crate::resolver::DependencyInfo;

mod composite;
mod fs;
mod state;

pub use composite::CompositePackageRegistry;
pub use fs::FsPackageRegistry;
pub use state::InstallState;

/// A package as stored in a registry
#[derive(Debug, Clone)]
pub struct RegisteredPackage {
    state: InstallState,
    file: PathBuf,
}

impl RegisteredPackage {
    pub fn new(state: InstallState, file: PathBuf) -> Self {
        Self { state, file }
    }

    pub fn id(&self) -> &PackageId {
        &self.state.id
    }

    /// Absolute path of the package file
    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn state(&self) -> &InstallState {
        &self.state
    }

    pub fn status(&self) -> PackageStatus {
        self.state.status
    }

    pub fn is_installed(&self) -> bool {
        self.state.is_installed()
    }

    pub fn is_external(&self) -> bool {
        self.state.external
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.state.dependencies
    }

    pub fn sub_packages(&self) -> &BTreeMap<PackageId, SubPackageOption> {
        &self.state.sub_packages
    }

    pub fn size(&self) -> u64 {
        self.state.size
    }

    pub fn installed_at(&self) -> Option<DateTime<Utc>> {
        self.state.installed_at()
    }

    pub fn filter(&self) -> Option<&PathFilter> {
        self.state.filter.as_ref()
    }

    /// Open the package file for reading
    pub fn reader(&self) -> Result<PackageArchiveReader> {
        PackageArchiveReader::open(&self.file)
    }

    /// Re-read the manifest from the package file
    pub fn properties(&self) -> Result<PackageProperties> {
        self.reader()?.read_properties()
    }
}

impl DependencyInfo for RegisteredPackage {
    fn id(&self) -> &PackageId {
        &self.state.id
    }

    fn dependencies(&self) -> &[Dependency] {
        &self.state.dependencies
    }
}

/// Outcome of [`PackageRegistry::analyze_dependencies`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyReport {
    /// Registered packages satisfying a dependency
    pub resolved: Vec<PackageId>,
    /// Dependencies nothing registered satisfies
    pub unresolved: Vec<Dependency>,
}

impl DependencyReport {
    pub fn is_satisfied(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// A store of packages and their install state.
///
/// Write operations are serialized per instance. Reads reflect the
/// persisted state at the time of the call.
pub trait PackageRegistry: Send + Sync {
    /// Whether `id` is registered
    fn contains(&self, id: &PackageId) -> Result<bool>;

    /// All registered ids, in ascending order
    fn packages(&self) -> Result<BTreeSet<PackageId>>;

    /// Look up a registered package
    fn open(&self, id: &PackageId) -> Result<Option<RegisteredPackage>>;

    /// Store a copy of the package read from `source`.
    ///
    /// Fails with [`Error::PackageExists`] when the package is registered
    /// and `replace` is false.
    fn register(&self, source: &mut dyn Read, replace: bool) -> Result<PackageId>;

    /// Register a package file that stays owned by the caller
    fn register_external(&self, file: &Path, replace: bool) -> Result<PackageId>;

    /// Unregister a package. Files registered externally are left alone.
    fn remove(&self, id: &PackageId) -> Result<()>;

    /// Update the status of a registered package
    fn set_status(&self, id: &PackageId, status: PackageStatus) -> Result<()>;

    /// Record how the sub-packages of `id` were handled
    fn record_sub_packages(
        &self,
        id: &PackageId,
        sub_packages: &BTreeMap<PackageId, SubPackageOption>,
    ) -> Result<()>;

    /// Find the registered package that best satisfies `dependency`.
    ///
    /// Registered ids are checked newest first; the first match wins.
    fn resolve(&self, dependency: &Dependency, only_installed: bool) -> Result<Option<PackageId>> {
        for id in self.packages()?.into_iter().rev() {
            if !dependency.matches(&id) {
                continue;
            }
            if only_installed {
                match self.open(&id)? {
                    Some(pkg) if pkg.is_installed() => {}
                    _ => continue,
                }
            }
            return Ok(Some(id));
        }
        Ok(None)
    }

    /// Registered packages that depend on `id`
    fn usage(&self, id: &PackageId) -> Result<Vec<PackageId>> {
        let mut users = Vec::new();
        for candidate in self.packages()? {
            if let Some(pkg) = self.open(&candidate)? {
                if pkg.dependencies().iter().any(|d| d.matches(id)) {
                    users.push(candidate);
                }
            }
        }
        Ok(users)
    }

    /// Split the dependencies of `id` into resolvable and unresolvable ones
    fn analyze_dependencies(&self, id: &PackageId, only_installed: bool) -> Result<DependencyReport> {
        let pkg = self
            .open(id)?
            .ok_or_else(|| Error::NoSuchPackage(id.clone()))?;

        let mut report = DependencyReport::default();
        for dep in pkg.dependencies() {
            match self.resolve(dep, only_installed)? {
                Some(resolved) => report.resolved.push(resolved),
                None => report.unresolved.push(dep.clone()),
            }
        }
        Ok(report)
    }
}
