//! Directory backed package registry
//!
//! Layout below the registry home:
//!
//! ```text
//! <home>/<group>/<name>-<version>.pkg   package file (absent for external packages)
//! <home>/<group>/<name>-<version>.xml   install state, see [`InstallState`]
//! ```
//!
//! The metadata files are the only source of truth. Every read goes to disk,
//! so writes made through another instance or process are seen right away.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tempfile::NamedTempFile;

use super::{InstallState, PackageRegistry, RegisteredPackage};
use crate::archive::{PackageArchiveReader, PackageProperties};
use crate::error::{Error, Result};
use crate::package::{PackageId, PackageStatus, SubPackageOption};

const CONTENT_EXT: &str = "pkg";
const METADATA_EXT: &str = "xml";

type Entries = BTreeMap<PackageId, InstallState>;

/// Package registry stored in a directory
pub struct FsPackageRegistry {
    home: PathBuf,
    write_lock: Mutex<()>,
}

impl FsPackageRegistry {
    /// Open or create a registry at `home`
    pub fn new(home: &Path) -> Result<Self> {
        fs::create_dir_all(home)?;
        Ok(Self {
            home: home.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Install state of `id`, read from disk
    pub fn install_state(&self, id: &PackageId) -> Result<Option<InstallState>> {
        self.read_state(id)
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn base_path(&self, id: &PackageId) -> Result<PathBuf> {
        let rel = PathBuf::from(id.installation_path());
        let safe = !id.name().is_empty()
            && rel.components().all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(Error::InvalidPackage(format!(
                "package id {} cannot be stored in a registry",
                id
            )));
        }
        Ok(self.home.join(rel))
    }

    fn content_path(&self, id: &PackageId) -> Result<PathBuf> {
        Ok(with_extension(&self.base_path(id)?, CONTENT_EXT))
    }

    fn metadata_path(&self, id: &PackageId) -> Result<PathBuf> {
        Ok(with_extension(&self.base_path(id)?, METADATA_EXT))
    }

    fn absolute_file(&self, state: &InstallState) -> PathBuf {
        if state.external {
            state.file_path.clone()
        } else {
            self.home.join(&state.file_path)
        }
    }

    fn relative_content_path(&self, id: &PackageId) -> PathBuf {
        PathBuf::from(format!("{}.{}", id.installation_path(), CONTENT_EXT))
    }

    fn read_state(&self, id: &PackageId) -> Result<Option<InstallState>> {
        // an id that cannot be stored is never registered
        let Ok(path) = self.metadata_path(id) else {
            return Ok(None);
        };
        if !path.is_file() {
            return Ok(None);
        }
        let state = InstallState::read(&path)?;
        // `g:a-1.0` and `g:a:1.0` share a path
        Ok((state.id == *id).then_some(state))
    }

    fn load(&self) -> Result<Entries> {
        let mut files = Vec::new();
        collect_metadata_files(&self.home, &mut files)?;

        let mut entries = Entries::new();
        for path in files {
            match InstallState::read(&path) {
                Ok(state) => {
                    entries.insert(state.id.clone(), state);
                }
                // another writer may have removed it since the scan
                Err(Error::Io(e)) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Skipping unreadable registry entry: {}", e),
            }
        }
        tracing::debug!(
            "Loaded {} registry entries from {}",
            entries.len(),
            self.home.display()
        );
        Ok(entries)
    }

    /// Fail if `id` is registered and may not be replaced, or if its path is
    /// taken by a different package. Returns the state being replaced.
    fn check_replace(&self, id: &PackageId, replace: bool) -> Result<Option<InstallState>> {
        let path = self.metadata_path(id)?;
        if !path.is_file() {
            return Ok(None);
        }
        let existing = InstallState::read(&path)?;
        if existing.id != *id || !replace {
            return Err(Error::PackageExists(existing.id));
        }
        Ok(Some(existing))
    }

    /// Delete the content file of a replaced registration unless the new
    /// registration uses the same file
    fn discard_replaced(&self, old: &InstallState, new_file: &Path) -> Result<()> {
        if old.external {
            return Ok(());
        }
        let old_file = self.absolute_file(old);
        if old_file != new_file {
            remove_if_exists(&old_file)?;
        }
        Ok(())
    }

    fn finish_write(&self, state: &InstallState) -> Result<()> {
        state.write(&self.metadata_path(&state.id)?)
    }

    fn update<F>(&self, id: &PackageId, f: F) -> Result<()>
    where
        F: FnOnce(&mut InstallState),
    {
        let _guard = self.lock();
        let mut state = self
            .read_state(id)?
            .ok_or_else(|| Error::NoSuchPackage(id.clone()))?;
        f(&mut state);
        self.finish_write(&state)
    }

    fn new_state(&self, props: PackageProperties, file_path: PathBuf, size: u64) -> InstallState {
        let mut state = InstallState::new(props.id, file_path);
        state.dependencies = props.dependencies;
        state.filter = props.filter;
        state.size = size;
        state
    }

    fn prune_empty_dirs(&self, from: &Path) {
        let mut current = from.parent();
        while let Some(dir) = current {
            if dir == self.home || !dir.starts_with(&self.home) {
                break;
            }
            if fs::remove_dir(dir).is_err() {
                break;
            }
            current = dir.parent();
        }
    }
}

fn with_extension(base: &Path, ext: &str) -> PathBuf {
    let mut s = base.as_os_str().to_os_string();
    s.push(".");
    s.push(ext);
    PathBuf::from(s)
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn collect_metadata_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_metadata_files(&path, files)?;
        } else if file_type.is_file()
            && path.extension().is_some_and(|e| e == METADATA_EXT)
        {
            files.push(path);
        }
    }
    Ok(())
}

impl PackageRegistry for FsPackageRegistry {
    fn contains(&self, id: &PackageId) -> Result<bool> {
        Ok(self.read_state(id)?.is_some())
    }

    fn packages(&self) -> Result<BTreeSet<PackageId>> {
        Ok(self.load()?.into_keys().collect())
    }

    fn open(&self, id: &PackageId) -> Result<Option<RegisteredPackage>> {
        Ok(self.read_state(id)?.map(|state| {
            let file = self.absolute_file(&state);
            RegisteredPackage::new(state, file)
        }))
    }

    fn register(&self, source: &mut dyn Read, replace: bool) -> Result<PackageId> {
        let _guard = self.lock();

        let mut tmp = NamedTempFile::new_in(&self.home)?;
        let size = io::copy(source, &mut tmp)?;
        tmp.as_file().sync_all()?;

        let props = PackageArchiveReader::open(tmp.path())?.read_properties()?;
        let id = props.id.clone();
        let replaced = self.check_replace(&id, replace)?;

        let content = self.content_path(&id)?;
        if let Some(parent) = content.parent() {
            fs::create_dir_all(parent)?;
        }
        tmp.persist(&content).map_err(|e| Error::Io(e.error))?;
        if let Some(old) = &replaced {
            self.discard_replaced(old, &content)?;
        }

        let state = self.new_state(props, self.relative_content_path(&id), size);
        self.finish_write(&state)?;

        tracing::info!(
            "Registered {} ({} bytes){}",
            id,
            size,
            if replaced.is_some() { ", replacing previous registration" } else { "" }
        );
        Ok(id)
    }

    fn register_external(&self, file: &Path, replace: bool) -> Result<PackageId> {
        let _guard = self.lock();

        let file = fs::canonicalize(file)?;
        let props = PackageArchiveReader::open(&file)?.read_properties()?;
        let size = fs::metadata(&file)?.len();
        let id = props.id.clone();

        if let Some(old) = self.check_replace(&id, replace)? {
            self.discard_replaced(&old, &file)?;
        }

        let mut state = self.new_state(props, file.clone(), size);
        state.external = true;
        self.finish_write(&state)?;

        tracing::info!("Registered {} from external file {}", id, file.display());
        Ok(id)
    }

    fn remove(&self, id: &PackageId) -> Result<()> {
        let _guard = self.lock();

        let state = self
            .read_state(id)?
            .ok_or_else(|| Error::NoSuchPackage(id.clone()))?;
        let metadata = self.metadata_path(id)?;

        // metadata goes first so no entry ever points at missing content
        fs::remove_file(&metadata)?;
        if !state.external {
            remove_if_exists(&self.absolute_file(&state))?;
        }
        self.prune_empty_dirs(&metadata);

        tracing::info!("Removed {}", id);
        Ok(())
    }

    fn set_status(&self, id: &PackageId, status: PackageStatus) -> Result<()> {
        self.update(id, |state| {
            state.status = status;
            state.install_time = status
                .is_installed()
                .then(|| chrono::Utc::now().timestamp_millis());
        })?;
        tracing::debug!("Status of {} is now {}", id, status);
        Ok(())
    }

    fn record_sub_packages(
        &self,
        id: &PackageId,
        sub_packages: &BTreeMap<PackageId, SubPackageOption>,
    ) -> Result<()> {
        self.update(id, |state| {
            state.sub_packages = sub_packages.clone();
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::PackageArchiveBuilder;
    use crate::dependency::Dependency;
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    fn id(s: &str) -> PackageId {
        PackageId::parse(s).unwrap()
    }

    fn package(pid: &str, deps: &str) -> Vec<u8> {
        let mut builder = PackageArchiveBuilder::new(id(pid)).file("/apps/x/a.txt", pid);
        for dep in Dependency::parse_list(deps) {
            builder = builder.dependency(dep);
        }
        builder.to_bytes().unwrap()
    }

    fn registry() -> (TempDir, FsPackageRegistry) {
        let dir = tempdir().unwrap();
        let registry = FsPackageRegistry::new(&dir.path().join("registry")).unwrap();
        (dir, registry)
    }

    #[test]
    fn test_register_and_open() {
        let (_dir, registry) = registry();
        let bytes = package("my/group:a:1.0", "my/group:b");
        let pid = registry.register(&mut bytes.as_slice(), false).unwrap();

        assert_eq!(pid, id("my/group:a:1.0"));
        assert!(registry.contains(&pid).unwrap());
        assert_eq!(registry.packages().unwrap().len(), 1);

        let pkg = registry.open(&pid).unwrap().unwrap();
        assert_eq!(pkg.status(), PackageStatus::Registered);
        assert!(!pkg.is_external());
        assert_eq!(pkg.size(), bytes.len() as u64);
        assert_eq!(pkg.dependencies(), Dependency::parse_list("my/group:b").as_slice());
        assert!(pkg.file().is_file());
        assert!(pkg.file().starts_with(registry.home()));
        assert_eq!(pkg.properties().unwrap().id, pid);
    }

    #[test]
    fn test_register_twice_without_replace() {
        let (_dir, registry) = registry();
        let bytes = package("g:a:1.0", "");
        registry.register(&mut bytes.as_slice(), false).unwrap();

        // different bytes, same logical package
        let other = PackageArchiveBuilder::new(id("g:a:1.0"))
            .description("changed")
            .to_bytes()
            .unwrap();
        let err = registry.register(&mut other.as_slice(), false).unwrap_err();
        assert!(matches!(err, Error::PackageExists(ref p) if *p == id("g:a:1.0")));
        assert_eq!(registry.packages().unwrap().len(), 1);
        assert_eq!(registry.open(&id("g:a:1.0")).unwrap().unwrap().size(), bytes.len() as u64);
    }

    #[test]
    fn test_register_with_replace() {
        let (_dir, registry) = registry();
        registry.register(&mut package("g:a:1.0", "").as_slice(), false).unwrap();
        registry.set_status(&id("g:a:1.0"), PackageStatus::Extracted).unwrap();

        let bytes = package("g:a:1.0", "g:b");
        registry.register(&mut bytes.as_slice(), true).unwrap();

        let pkg = registry.open(&id("g:a:1.0")).unwrap().unwrap();
        assert_eq!(pkg.status(), PackageStatus::Registered);
        assert_eq!(pkg.dependencies().len(), 1);
        assert_eq!(registry.packages().unwrap().len(), 1);
    }

    #[test]
    fn test_remove() {
        let (_dir, registry) = registry();
        registry.register(&mut package("g/sub:a:1.0", "").as_slice(), false).unwrap();
        let file = registry.open(&id("g/sub:a:1.0")).unwrap().unwrap().file().to_path_buf();

        registry.remove(&id("g/sub:a:1.0")).unwrap();
        assert!(!registry.contains(&id("g/sub:a:1.0")).unwrap());
        assert!(!file.exists());
        assert!(!registry.home().join("g").exists());
    }

    #[test]
    fn test_remove_unregistered() {
        let (_dir, registry) = registry();
        let err = registry.remove(&id("g:missing:1.0")).unwrap_err();
        assert!(matches!(err, Error::NoSuchPackage(ref p) if *p == id("g:missing:1.0")));
        assert!(!registry.contains(&id("g:missing:1.0")).unwrap());
    }

    #[test]
    fn test_register_external() {
        let (dir, registry) = registry();
        let path = dir.path().join("outside").join("a.pkg");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, package("g:a:1.0", "")).unwrap();

        let pid = registry.register_external(&path, false).unwrap();
        let pkg = registry.open(&pid).unwrap().unwrap();
        assert!(pkg.is_external());
        assert_eq!(pkg.file(), fs::canonicalize(&path).unwrap());

        assert!(matches!(
            registry.register_external(&path, false),
            Err(Error::PackageExists(_))
        ));

        registry.remove(&pid).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_replace_internal_with_external() {
        let (dir, registry) = registry();
        registry.register(&mut package("g:a:1.0", "").as_slice(), false).unwrap();
        let internal = registry.open(&id("g:a:1.0")).unwrap().unwrap().file().to_path_buf();

        let path = dir.path().join("a.pkg");
        fs::write(&path, package("g:a:1.0", "g:b")).unwrap();
        registry.register_external(&path, true).unwrap();

        assert!(!internal.exists());
        let pkg = registry.open(&id("g:a:1.0")).unwrap().unwrap();
        assert!(pkg.is_external());
        assert_eq!(pkg.dependencies().len(), 1);
        assert_eq!(pkg.properties().unwrap().dependencies.len(), 1);
    }

    #[test]
    fn test_state_survives_new_instance() {
        let (dir, registry) = registry();
        registry.register(&mut package("g:a:1.0", "g:b").as_slice(), false).unwrap();
        registry.register(&mut package("g:b:1.0", "").as_slice(), false).unwrap();
        registry.set_status(&id("g:a:1.0"), PackageStatus::Extracted).unwrap();
        let mut subs = BTreeMap::new();
        subs.insert(id("g:inner:0.1"), SubPackageOption::Add);
        registry.record_sub_packages(&id("g:a:1.0"), &subs).unwrap();

        let reopened = FsPackageRegistry::new(&dir.path().join("registry")).unwrap();
        assert_eq!(reopened.packages().unwrap(), registry.packages().unwrap());
        for pid in registry.packages().unwrap() {
            assert_eq!(
                reopened.open(&pid).unwrap().unwrap().state(),
                registry.open(&pid).unwrap().unwrap().state()
            );
        }
        let a = reopened.open(&id("g:a:1.0")).unwrap().unwrap();
        assert!(a.is_installed());
        assert!(a.installed_at().is_some());
        assert_eq!(a.sub_packages(), &subs);
    }

    #[test]
    fn test_reads_see_writes_of_other_instances() {
        let (dir, registry) = registry();
        assert!(registry.packages().unwrap().is_empty());
        assert!(!registry.contains(&id("g:a:1.0")).unwrap());

        let other = FsPackageRegistry::new(&dir.path().join("registry")).unwrap();
        other.register(&mut package("g:a:1.0", "").as_slice(), false).unwrap();
        assert!(registry.contains(&id("g:a:1.0")).unwrap());
        assert_eq!(registry.packages().unwrap().len(), 1);

        other.set_status(&id("g:a:1.0"), PackageStatus::Extracted).unwrap();
        assert_eq!(
            registry.open(&id("g:a:1.0")).unwrap().unwrap().status(),
            PackageStatus::Extracted
        );

        other.remove(&id("g:a:1.0")).unwrap();
        assert!(!registry.contains(&id("g:a:1.0")).unwrap());
        assert!(registry.open(&id("g:a:1.0")).unwrap().is_none());
        assert!(registry.packages().unwrap().is_empty());
    }

    #[test]
    fn test_set_status_clears_install_time() {
        let (_dir, registry) = registry();
        registry.register(&mut package("g:a:1.0", "").as_slice(), false).unwrap();
        registry.set_status(&id("g:a:1.0"), PackageStatus::Extracted).unwrap();
        registry.set_status(&id("g:a:1.0"), PackageStatus::Registered).unwrap();

        let state = registry.install_state(&id("g:a:1.0")).unwrap().unwrap();
        assert_eq!(state.install_time, None);
        assert!(matches!(
            registry.set_status(&id("g:x:1.0"), PackageStatus::Extracted),
            Err(Error::NoSuchPackage(_))
        ));
    }

    #[test]
    fn test_resolve_usage_and_analyze() {
        let (_dir, registry) = registry();
        registry.register(&mut package("g:a:1.0", "g:b,g:missing:1.0").as_slice(), false).unwrap();
        registry.register(&mut package("g:b:1.0", "").as_slice(), false).unwrap();
        registry.register(&mut package("g:b:1.5", "").as_slice(), false).unwrap();

        let dep = Dependency::parse("g:b").unwrap();
        assert_eq!(registry.resolve(&dep, false).unwrap(), Some(id("g:b:1.5")));
        assert_eq!(registry.resolve(&dep, true).unwrap(), None);

        registry.set_status(&id("g:b:1.0"), PackageStatus::Extracted).unwrap();
        assert_eq!(registry.resolve(&dep, true).unwrap(), Some(id("g:b:1.0")));

        assert_eq!(registry.usage(&id("g:b:1.0")).unwrap(), vec![id("g:a:1.0")]);
        assert!(registry.usage(&id("g:a:1.0")).unwrap().is_empty());

        let report = registry.analyze_dependencies(&id("g:a:1.0"), false).unwrap();
        assert_eq!(report.resolved, vec![id("g:b:1.5")]);
        assert_eq!(report.unresolved, Dependency::parse_list("g:missing:1.0"));
        assert!(!report.is_satisfied());

        assert!(matches!(
            registry.analyze_dependencies(&id("g:nope:1.0"), false),
            Err(Error::NoSuchPackage(_))
        ));
    }

    #[test]
    fn test_concurrent_registration() {
        let (_dir, registry) = registry();
        let registry = Arc::new(registry);
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    let bytes = package(&format!("g:p{}:1.0", i % 4), "");
                    registry.register(&mut bytes.as_slice(), false).is_ok()
                })
            })
            .collect();
        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(successes, 4);
        assert_eq!(registry.packages().unwrap().len(), 4);
        for pid in registry.packages().unwrap() {
            assert!(registry.open(&pid).unwrap().unwrap().file().is_file());
        }
    }

    #[test]
    fn test_unstorable_id_is_not_registered() {
        let (_dir, registry) = registry();
        let bad = PackageId::new("..", "a", crate::version::Version::EMPTY);
        assert!(!registry.contains(&bad).unwrap());
        assert!(registry.open(&bad).unwrap().is_none());
        assert!(matches!(registry.remove(&bad), Err(Error::NoSuchPackage(_))));
    }

    #[test]
    fn test_invalid_package_is_rejected() {
        let (_dir, registry) = registry();
        let result = registry.register(&mut &b"not a package"[..], false);
        assert!(result.is_err());
        assert!(registry.packages().unwrap().is_empty());
    }
}
