//! Package archive reading and writing
//!
//! A package file is a tar archive, optionally zstd compressed:
//!
//! ```text
//! META-INF/vault/properties.xml   group, name, version, dependencies
//! META-INF/vault/filter.xml       optional content filter
//! jcr_root/...                    content, mapped onto repository paths
//! jcr_root/etc/packages/...       embedded sub-packages
//! ```

use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};

use crate::dependency::Dependency;
use crate::error::{Error, Result};
use crate::options::{ImportMode, PathFilter};
use crate::package::PackageId;
use crate::version::Version;
use crate::xml;

pub const PROPERTIES_PATH: &str = "META-INF/vault/properties.xml";
pub const FILTER_PATH: &str = "META-INF/vault/filter.xml";
pub const CONTENT_ROOT: &str = "jcr_root";
pub const SUB_PACKAGE_ROOT: &str = "/etc/packages/";

const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// Metadata read from a package's manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageProperties {
    pub id: PackageId,
    pub dependencies: Vec<Dependency>,
    pub description: Option<String>,
    pub filter: Option<PathFilter>,
}

impl PackageProperties {
    pub fn new(id: PackageId) -> Self {
        Self {
            id,
            dependencies: Vec::new(),
            description: None,
            filter: None,
        }
    }

    fn from_xml(text: &str) -> Result<Self> {
        let doc = xml::parse(text)?;
        let entry = |key: &str| {
            doc.descendants()
                .find(|n| n.has_tag_name("entry") && n.attribute("key") == Some(key))
                .map(|n| n.text().unwrap_or("").trim().to_string())
        };

        let name = entry("name")
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::InvalidPackage("properties.xml has no package name".to_string()))?;
        let group = entry("group").unwrap_or_default();
        let version = entry("version").unwrap_or_default();

        Ok(Self {
            id: PackageId::new(&group, &name, Version::parse(&version)),
            dependencies: entry("dependencies")
                .map(|d| Dependency::parse_list(&d))
                .unwrap_or_default(),
            description: entry("description").filter(|d| !d.is_empty()),
            filter: None,
        })
    }

    fn to_xml(&self) -> String {
        let mut out = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"no\"?>\n\
             <!DOCTYPE properties SYSTEM \"http://java.sun.com/dtd/properties.dtd\">\n\
             <properties>\n",
        );
        let mut push = |key: &str, value: &str| {
            out.push_str(&format!("<entry key=\"{}\">{}</entry>\n", key, xml::escape(value)));
        };
        push("group", self.id.group());
        push("name", self.id.name());
        push("version", self.id.version().as_str());
        if !self.dependencies.is_empty() {
            push("dependencies", &Dependency::format_list(&self.dependencies));
        }
        if let Some(description) = &self.description {
            push("description", description);
        }
        out.push_str("</properties>\n");
        out
    }
}

fn filter_from_xml(text: &str) -> Result<PathFilter> {
    let doc = xml::parse(text)?;
    Ok(PathFilter::new(
        doc.descendants()
            .filter(|n| n.has_tag_name("filter"))
            .filter_map(|n| n.attribute("root"))
            .map(String::from)
            .collect::<Vec<_>>(),
    ))
}

fn filter_to_xml(filter: &PathFilter) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<workspaceFilter version=\"1.0\">\n");
    for root in &filter.roots {
        out.push_str(&format!("    <filter root=\"{}\"/>\n", xml::escape(root)));
    }
    out.push_str("</workspaceFilter>\n");
    out
}

/// Map an archive entry path onto a repository path.
///
/// Returns `None` for entries outside the content root and for paths that
/// try to escape it.
fn repository_path(entry_path: &Path) -> Option<String> {
    let rest = entry_path.strip_prefix(CONTENT_ROOT).ok()?;
    let mut repo = String::new();
    for component in rest.components() {
        match component {
            Component::Normal(part) => {
                repo.push('/');
                repo.push_str(part.to_str()?);
            }
            Component::CurDir => {}
            _ => return None,
        }
    }
    (!repo.is_empty()).then_some(repo)
}

fn is_sub_package(repo_path: &str) -> bool {
    repo_path.starts_with(SUB_PACKAGE_ROOT)
}

/// Reader for package archives
pub struct PackageArchiveReader {
    path: PathBuf,
}

impl PackageArchiveReader {
    /// Open a package archive
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::InvalidPackage(format!(
                "{} is not a file",
                path.display()
            )));
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn archive(&self) -> Result<tar::Archive<Box<dyn Read>>> {
        let mut file = File::open(&self.path)?;
        let mut magic = [0u8; 4];
        let n = file.read(&mut magic)?;
        file.seek(SeekFrom::Start(0))?;

        let reader: Box<dyn Read> = if n == magic.len() && magic == ZSTD_MAGIC {
            Box::new(zstd::stream::read::Decoder::new(file)?)
        } else {
            Box::new(file)
        };
        Ok(tar::Archive::new(reader))
    }

    /// Read the package manifest and filter
    pub fn read_properties(&self) -> Result<PackageProperties> {
        let mut properties = None;
        let mut filter = None;

        let mut archive = self.archive()?;
        for entry in archive.entries()? {
            let mut entry = entry?;
            let path = entry.path()?.to_path_buf();
            if path == Path::new(PROPERTIES_PATH) {
                let mut text = String::new();
                entry.read_to_string(&mut text)?;
                properties = Some(PackageProperties::from_xml(&text)?);
            } else if path == Path::new(FILTER_PATH) {
                let mut text = String::new();
                entry.read_to_string(&mut text)?;
                filter = Some(filter_from_xml(&text)?);
            }
        }

        let mut properties = properties.ok_or_else(|| {
            Error::InvalidPackage(format!(
                "{} has no {}",
                self.path.display(),
                PROPERTIES_PATH
            ))
        })?;
        properties.filter = filter.filter(|f| !f.is_empty());
        Ok(properties)
    }

    /// Repository paths of all content files, sub-packages excluded
    pub fn content_paths(&self) -> Result<Vec<String>> {
        let mut paths = Vec::new();
        let mut archive = self.archive()?;
        for entry in archive.entries()? {
            let entry = entry?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            if let Some(repo) = repository_path(&entry.path()?) {
                if !is_sub_package(&repo) {
                    paths.push(repo);
                }
            }
        }
        Ok(paths)
    }

    /// Write content files covered by `filter` below `target`.
    ///
    /// Returns the repository paths written.
    pub fn extract_content(
        &self,
        target: &Path,
        filter: &PathFilter,
        mode: ImportMode,
    ) -> Result<Vec<String>> {
        let mut written = Vec::new();
        let mut archive = self.archive()?;
        for entry in archive.entries()? {
            let mut entry = entry?;
            let entry_path = entry.path()?.to_path_buf();
            let Some(repo) = repository_path(&entry_path) else {
                if entry_path.starts_with(CONTENT_ROOT) {
                    tracing::warn!("Skipping unsafe entry {}", entry_path.display());
                }
                continue;
            };
            if is_sub_package(&repo) || !filter.covers(&repo) {
                continue;
            }

            let dest = target.join(repo.trim_start_matches('/'));
            if entry.header().entry_type().is_dir() {
                fs::create_dir_all(&dest)?;
                continue;
            }
            if !entry.header().entry_type().is_file() {
                continue;
            }

            let exists = dest.exists();
            match mode {
                ImportMode::Merge if exists => continue,
                ImportMode::Update if !exists => continue,
                _ => {}
            }
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            entry.unpack(&dest)?;
            tracing::debug!("Extracted {}", repo);
            written.push(repo);
        }
        Ok(written)
    }

    /// Remove content files covered by `filter` from below `target`, then
    /// prune directories left empty.
    ///
    /// Returns the repository paths removed.
    pub fn remove_content(&self, target: &Path, filter: &PathFilter) -> Result<Vec<String>> {
        let mut removed = Vec::new();
        let mut dirs = Vec::new();

        let mut paths = self.content_paths()?;
        paths.sort();
        paths.reverse();

        for repo in paths.into_iter().filter(|p| filter.covers(p)) {
            let full_path = target.join(repo.trim_start_matches('/'));
            if full_path.is_file() {
                fs::remove_file(&full_path)?;
                if let Some(parent) = full_path.parent() {
                    dirs.push(parent.to_path_buf());
                }
                removed.push(repo);
            }
        }

        dirs.sort();
        dirs.dedup();
        for dir in dirs.into_iter().rev() {
            let mut current = dir.as_path();
            while current != target && current.starts_with(target) && current.is_dir() {
                if fs::read_dir(current)?.next().is_some() {
                    break;
                }
                fs::remove_dir(current)?;
                match current.parent() {
                    Some(parent) => current = parent,
                    None => break,
                }
            }
        }
        Ok(removed)
    }

    /// Copy every embedded sub-package archive into `dest_dir`.
    ///
    /// Returns the written file paths in archive order.
    pub fn unpack_sub_packages(&self, dest_dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut archive = self.archive()?;
        for entry in archive.entries()? {
            let mut entry = entry?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let Some(repo) = repository_path(&entry.path()?) else {
                continue;
            };
            if !is_sub_package(&repo) {
                continue;
            }
            fs::create_dir_all(dest_dir)?;
            let dest = dest_dir.join(format!("{}-{}", files.len(), repo.rsplit('/').next().unwrap_or("sub")));
            let mut out = File::create(&dest)?;
            std::io::copy(&mut entry, &mut out)?;
            files.push(dest);
        }
        Ok(files)
    }
}

/// Builder for package archives
#[derive(Debug, Clone)]
pub struct PackageArchiveBuilder {
    properties: PackageProperties,
    files: Vec<(String, Vec<u8>)>,
    sub_packages: Vec<(PackageId, Vec<u8>)>,
    compress: bool,
}

impl PackageArchiveBuilder {
    pub fn new(id: PackageId) -> Self {
        Self {
            properties: PackageProperties::new(id),
            files: Vec::new(),
            sub_packages: Vec::new(),
            compress: false,
        }
    }

    pub fn dependency(mut self, dep: Dependency) -> Self {
        self.properties.dependencies.push(dep);
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.properties.description = Some(description.to_string());
        self
    }

    pub fn filter(mut self, filter: PathFilter) -> Self {
        self.properties.filter = Some(filter);
        self
    }

    /// Add a content file at a repository path such as `/apps/site/a.html`
    pub fn file(mut self, repo_path: &str, content: impl Into<Vec<u8>>) -> Self {
        self.files
            .push((repo_path.trim_start_matches('/').to_string(), content.into()));
        self
    }

    /// Embed another package archive
    pub fn sub_package(mut self, id: &PackageId, archive: Vec<u8>) -> Self {
        self.sub_packages.push((id.clone(), archive));
        self
    }

    /// Compress the archive with zstd
    pub fn compressed(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut builder = tar::Builder::new(Vec::new());

        append(&mut builder, PROPERTIES_PATH, self.properties.to_xml().as_bytes())?;
        if let Some(filter) = &self.properties.filter {
            append(&mut builder, FILTER_PATH, filter_to_xml(filter).as_bytes())?;
        }
        for (path, content) in &self.files {
            append(&mut builder, &format!("{}/{}", CONTENT_ROOT, path), content)?;
        }
        for (id, archive) in &self.sub_packages {
            let path = format!(
                "{}{}{}.pkg",
                CONTENT_ROOT,
                SUB_PACKAGE_ROOT,
                id.installation_path()
            );
            append(&mut builder, &path, archive)?;
        }

        let bytes = builder.into_inner()?;
        if self.compress {
            Ok(zstd::stream::encode_all(bytes.as_slice(), 3)?)
        } else {
            Ok(bytes)
        }
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(path)?;
        file.write_all(&self.to_bytes()?)?;
        Ok(())
    }
}

fn append(builder: &mut tar::Builder<Vec<u8>>, path: &str, data: &[u8]) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    builder.append_data(&mut header, path, data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn id(s: &str) -> PackageId {
        PackageId::parse(s).unwrap()
    }

    fn sample() -> PackageArchiveBuilder {
        PackageArchiveBuilder::new(id("my/group:site:1.0"))
            .dependency(Dependency::parse("my/group:base:[1.0,2.0)").unwrap())
            .description("Site <content> & config")
            .file("/apps/site/a.html", "<p>a</p>")
            .file("/content/site/en.json", "{}")
    }

    #[test]
    fn test_read_properties() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("site.pkg");
        sample().write_to(&path).unwrap();

        let props = PackageArchiveReader::open(&path).unwrap().read_properties().unwrap();
        assert_eq!(props.id, id("my/group:site:1.0"));
        assert_eq!(props.dependencies, Dependency::parse_list("my/group:base:[1.0,2.0)"));
        assert_eq!(props.description.as_deref(), Some("Site <content> & config"));
        assert_eq!(props.filter, None);
    }

    #[test]
    fn test_compressed_archive() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("site.pkg");
        sample()
            .filter(PathFilter::new(["/apps/site"]))
            .compressed(true)
            .write_to(&path)
            .unwrap();

        let reader = PackageArchiveReader::open(&path).unwrap();
        let props = reader.read_properties().unwrap();
        assert_eq!(props.filter, Some(PathFilter::new(["/apps/site"])));
        assert_eq!(reader.content_paths().unwrap().len(), 2);
    }

    #[test]
    fn test_missing_properties_is_invalid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.pkg");
        let builder = tar::Builder::new(Vec::new());
        fs::write(&path, builder.into_inner().unwrap()).unwrap();

        let result = PackageArchiveReader::open(&path).unwrap().read_properties();
        assert!(matches!(result, Err(Error::InvalidPackage(_))));
    }

    #[test]
    fn test_open_missing_file() {
        assert!(PackageArchiveReader::open(Path::new("/nonexistent/x.pkg")).is_err());
    }

    #[test]
    fn test_extract_and_remove_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("site.pkg");
        let target = dir.path().join("target");
        fs::create_dir_all(&target).unwrap();
        sample().write_to(&path).unwrap();

        let reader = PackageArchiveReader::open(&path).unwrap();
        let written = reader
            .extract_content(&target, &PathFilter::default(), ImportMode::Replace)
            .unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(
            fs::read_to_string(target.join("apps/site/a.html")).unwrap(),
            "<p>a</p>"
        );

        let removed = reader.remove_content(&target, &PathFilter::default()).unwrap();
        assert_eq!(removed.len(), 2);
        assert!(!target.join("apps").exists());
        assert!(target.exists());
    }

    #[test]
    fn test_extract_respects_filter_and_mode() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("site.pkg");
        let target = dir.path().join("target");
        sample().write_to(&path).unwrap();
        fs::create_dir_all(target.join("apps/site")).unwrap();
        fs::write(target.join("apps/site/a.html"), "local").unwrap();

        let reader = PackageArchiveReader::open(&path).unwrap();
        let written = reader
            .extract_content(&target, &PathFilter::new(["/apps"]), ImportMode::Merge)
            .unwrap();
        assert!(written.is_empty());
        assert_eq!(fs::read_to_string(target.join("apps/site/a.html")).unwrap(), "local");
        assert!(!target.join("content").exists());
    }

    #[test]
    fn test_sub_packages() {
        let dir = tempdir().unwrap();
        let inner = PackageArchiveBuilder::new(id("my/group:inner:0.1"))
            .file("/apps/inner/x.txt", "x")
            .to_bytes()
            .unwrap();
        let path = dir.path().join("outer.pkg");
        sample()
            .sub_package(&id("my/group:inner:0.1"), inner)
            .write_to(&path)
            .unwrap();

        let reader = PackageArchiveReader::open(&path).unwrap();
        assert_eq!(reader.content_paths().unwrap().len(), 2);

        let unpacked = reader.unpack_sub_packages(&dir.path().join("subs")).unwrap();
        assert_eq!(unpacked.len(), 1);
        let props = PackageArchiveReader::open(&unpacked[0])
            .unwrap()
            .read_properties()
            .unwrap();
        assert_eq!(props.id, id("my/group:inner:0.1"));
    }

    #[test]
    fn test_repository_path() {
        assert_eq!(
            repository_path(Path::new("jcr_root/apps/a.txt")).as_deref(),
            Some("/apps/a.txt")
        );
        assert_eq!(repository_path(Path::new("META-INF/vault/x")), None);
        assert_eq!(repository_path(Path::new("jcr_root/../etc/passwd")), None);
        assert_eq!(repository_path(Path::new("jcr_root")), None);
    }
}
