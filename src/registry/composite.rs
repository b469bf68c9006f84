//! Registry merging several registries into one view

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use tempfile::NamedTempFile;

use super::{PackageRegistry, RegisteredPackage};
use crate::archive::PackageArchiveReader;
use crate::error::{Error, Result};
use crate::package::{PackageId, PackageStatus, SubPackageOption};

/// Several registries seen as one.
///
/// New packages go to the first (primary) registry. Changes to an existing
/// package go to the registry holding it.
pub struct CompositePackageRegistry {
    registries: Vec<Box<dyn PackageRegistry>>,
}

impl CompositePackageRegistry {
    /// Combine `registries`, the first being the primary one.
    ///
    /// Fails if a package is registered in more than one of them.
    pub fn new(registries: Vec<Box<dyn PackageRegistry>>) -> Result<Self> {
        if registries.is_empty() {
            return Err(Error::Config(
                "a composite registry needs at least one member".to_string(),
            ));
        }

        let mut seen = BTreeSet::new();
        for registry in &registries {
            for id in registry.packages()? {
                if !seen.insert(id.clone()) {
                    return Err(Error::PackageExists(id));
                }
            }
        }
        tracing::debug!(
            "Composite registry over {} registries with {} packages",
            registries.len(),
            seen.len()
        );
        Ok(Self { registries })
    }

    fn primary(&self) -> &dyn PackageRegistry {
        self.registries[0].as_ref()
    }

    fn owner(&self, id: &PackageId) -> Result<Option<&dyn PackageRegistry>> {
        for registry in &self.registries {
            if registry.contains(id)? {
                return Ok(Some(registry.as_ref()));
            }
        }
        Ok(None)
    }

    fn owner_or_missing(&self, id: &PackageId) -> Result<&dyn PackageRegistry> {
        self.owner(id)?
            .ok_or_else(|| Error::NoSuchPackage(id.clone()))
    }

    /// A package held outside the primary registry cannot be registered
    /// again, even with `replace`
    fn check_secondary(&self, id: &PackageId) -> Result<()> {
        for registry in &self.registries[1..] {
            if registry.contains(id)? {
                return Err(Error::PackageExists(id.clone()));
            }
        }
        Ok(())
    }
}

impl PackageRegistry for CompositePackageRegistry {
    fn contains(&self, id: &PackageId) -> Result<bool> {
        Ok(self.owner(id)?.is_some())
    }

    fn packages(&self) -> Result<BTreeSet<PackageId>> {
        let mut all = BTreeSet::new();
        for registry in &self.registries {
            all.extend(registry.packages()?);
        }
        Ok(all)
    }

    fn open(&self, id: &PackageId) -> Result<Option<RegisteredPackage>> {
        for registry in &self.registries {
            if let Some(pkg) = registry.open(id)? {
                return Ok(Some(pkg));
            }
        }
        Ok(None)
    }

    fn register(&self, source: &mut dyn Read, replace: bool) -> Result<PackageId> {
        // the id is only known once the manifest has been read
        let mut tmp = NamedTempFile::new()?;
        io::copy(source, &mut tmp)?;
        let id = PackageArchiveReader::open(tmp.path())?.read_properties()?.id;
        self.check_secondary(&id)?;

        let mut file = File::open(tmp.path())?;
        self.primary().register(&mut file, replace)
    }

    fn register_external(&self, file: &Path, replace: bool) -> Result<PackageId> {
        let id = PackageArchiveReader::open(file)?.read_properties()?.id;
        self.check_secondary(&id)?;
        self.primary().register_external(file, replace)
    }

    fn remove(&self, id: &PackageId) -> Result<()> {
        self.owner_or_missing(id)?.remove(id)
    }

    fn set_status(&self, id: &PackageId, status: PackageStatus) -> Result<()> {
        self.owner_or_missing(id)?.set_status(id, status)
    }

    fn record_sub_packages(
        &self,
        id: &PackageId,
        sub_packages: &BTreeMap<PackageId, SubPackageOption>,
    ) -> Result<()> {
        self.owner_or_missing(id)?.record_sub_packages(id, sub_packages)
    }
}
