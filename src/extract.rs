//! Content extraction
//!
//! Plans decide what happens in which order; a [`ContentExtractor`] moves
//! the content of a package in and out of the target tree.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::options::{ImportOptions, PathFilter};
use crate::plan::TaskType;
use crate::registry::RegisteredPackage;

/// Applies package content to a target
pub trait ContentExtractor {
    /// Copy the content of `package` into the target
    fn extract(&self, package: &RegisteredPackage, options: &ImportOptions) -> Result<()>;

    /// Extract `package` and run its installation steps
    fn install(&self, package: &RegisteredPackage, _options: &ImportOptions) -> Result<()> {
        Err(Error::UnsupportedTask {
            id: package.id().clone(),
            task_type: TaskType::Install,
        })
    }

    /// Remove the content of `package` from the target
    fn uninstall(&self, package: &RegisteredPackage, options: &ImportOptions) -> Result<()>;
}

/// Extracts package archives into a directory.
///
/// Repository paths map onto paths below the target root, so
/// `/apps/site/a.html` lands at `<root>/apps/site/a.html`.
pub struct ArchiveExtractor {
    target_root: PathBuf,
}

impl ArchiveExtractor {
    pub fn new(target_root: &Path) -> Self {
        Self {
            target_root: target_root.to_path_buf(),
        }
    }

    pub fn target_root(&self) -> &Path {
        &self.target_root
    }

    fn filter<'a>(package: &'a RegisteredPackage, options: &'a ImportOptions) -> PathFilter {
        options
            .filter
            .as_ref()
            .or(package.filter())
            .cloned()
            .unwrap_or_default()
    }
}

impl ContentExtractor for ArchiveExtractor {
    fn extract(&self, package: &RegisteredPackage, options: &ImportOptions) -> Result<()> {
        let reader = package.reader()?;
        let filter = Self::filter(package, options);

        if options.dry_run {
            let paths: Vec<String> = reader
                .content_paths()?
                .into_iter()
                .filter(|p| filter.covers(p))
                .collect();
            tracing::info!(
                "Dry run: would extract {} files of {} into {}",
                paths.len(),
                package.id(),
                self.target_root.display()
            );
            return Ok(());
        }

        std::fs::create_dir_all(&self.target_root)?;
        let written = reader.extract_content(&self.target_root, &filter, options.import_mode)?;
        tracing::info!(
            "Extracted {} files of {} into {}",
            written.len(),
            package.id(),
            self.target_root.display()
        );
        Ok(())
    }

    fn uninstall(&self, package: &RegisteredPackage, options: &ImportOptions) -> Result<()> {
        let filter = Self::filter(package, options);
        if options.dry_run {
            tracing::info!("Dry run: would remove content of {}", package.id());
            return Ok(());
        }
        let removed = package.reader()?.remove_content(&self.target_root, &filter)?;
        tracing::info!("Removed {} files of {}", removed.len(), package.id());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::PackageArchiveBuilder;
    use crate::package::PackageId;
    use crate::registry::{FsPackageRegistry, PackageRegistry};
    use std::fs;
    use tempfile::tempdir;

    fn registered(home: &Path, filter: Option<PathFilter>) -> RegisteredPackage {
        let registry = FsPackageRegistry::new(home).unwrap();
        let mut builder = PackageArchiveBuilder::new(PackageId::parse("g:site:1.0").unwrap())
            .file("/apps/site/a.html", "a")
            .file("/content/site/b.json", "{}");
        if let Some(filter) = filter {
            builder = builder.filter(filter);
        }
        let id = registry
            .register(&mut builder.to_bytes().unwrap().as_slice(), false)
            .unwrap();
        registry.open(&id).unwrap().unwrap()
    }

    #[test]
    fn test_extract_and_uninstall() {
        let dir = tempdir().unwrap();
        let pkg = registered(&dir.path().join("registry"), None);
        let extractor = ArchiveExtractor::new(&dir.path().join("target"));

        extractor.extract(&pkg, &ImportOptions::default()).unwrap();
        assert!(dir.path().join("target/apps/site/a.html").is_file());
        assert!(dir.path().join("target/content/site/b.json").is_file());

        extractor.uninstall(&pkg, &ImportOptions::default()).unwrap();
        assert!(!dir.path().join("target/apps").exists());
        assert!(!dir.path().join("target/content").exists());
    }

    #[test]
    fn test_package_filter_and_override() {
        let dir = tempdir().unwrap();
        let pkg = registered(&dir.path().join("registry"), Some(PathFilter::new(["/apps"])));
        let extractor = ArchiveExtractor::new(&dir.path().join("target"));

        extractor.extract(&pkg, &ImportOptions::default()).unwrap();
        assert!(dir.path().join("target/apps/site/a.html").is_file());
        assert!(!dir.path().join("target/content").exists());

        let options = ImportOptions::new().filter(PathFilter::new(["/content"]));
        extractor.extract(&pkg, &options).unwrap();
        assert!(dir.path().join("target/content/site/b.json").is_file());
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let dir = tempdir().unwrap();
        let pkg = registered(&dir.path().join("registry"), None);
        let extractor = ArchiveExtractor::new(&dir.path().join("target"));

        extractor.extract(&pkg, &ImportOptions::new().dry_run(true)).unwrap();
        assert!(!dir.path().join("target").exists());

        fs::create_dir_all(dir.path().join("target/apps/site")).unwrap();
        fs::write(dir.path().join("target/apps/site/a.html"), "kept").unwrap();
        extractor.uninstall(&pkg, &ImportOptions::new().dry_run(true)).unwrap();
        assert!(dir.path().join("target/apps/site/a.html").is_file());
    }

    #[test]
    fn test_install_unsupported() {
        let dir = tempdir().unwrap();
        let pkg = registered(&dir.path().join("registry"), None);
        let extractor = ArchiveExtractor::new(&dir.path().join("target"));

        let err = extractor.install(&pkg, &ImportOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedTask { task_type: TaskType::Install, .. }
        ));
    }
}
