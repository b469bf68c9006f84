//! Persisted install state of a registered package
//!
//! Each package has one metadata file next to its content:
//!
//! ```xml
//! <registryMetadata packageid="my/group:site:1.0" size="1024" installtime="1700000000000"
//!                   filepath="my/group/site-1.0.pkg" external="false" packagestatus="EXTRACTED">
//!     <dependency packageid="my/group:base:[1.0,2.0)"/>
//!     <subpackage packageid="my/group:inner:0.1" sphoption="EXTRACT"/>
//!     <workspacefilter>
//!         <filter root="/apps/site"/>
//!     </workspacefilter>
//! </registryMetadata>
//! ```
//!
//! Absent attributes mean default values.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};

use crate::dependency::Dependency;
use crate::error::{Error, Result};
use crate::options::PathFilter;
use crate::package::{PackageId, PackageStatus, SubPackageOption};
use crate::xml;

const ROOT: &str = "registryMetadata";
const DEPENDENCY: &str = "dependency";
const SUB_PACKAGE: &str = "subpackage";
const FILTER_SET: &str = "workspacefilter";
const FILTER: &str = "filter";

/// Registration and installation record of one package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallState {
    pub id: PackageId,
    pub status: PackageStatus,
    /// Relative to the registry home, absolute for external packages
    pub file_path: PathBuf,
    /// The content file belongs to the caller and is never deleted
    pub external: bool,
    pub dependencies: Vec<Dependency>,
    pub sub_packages: BTreeMap<PackageId, SubPackageOption>,
    /// Size of the content file in bytes
    pub size: u64,
    /// Epoch milliseconds of the last extraction or installation
    pub install_time: Option<i64>,
    pub filter: Option<PathFilter>,
}

impl InstallState {
    pub fn new(id: PackageId, file_path: PathBuf) -> Self {
        Self {
            id,
            status: PackageStatus::Registered,
            file_path,
            external: false,
            dependencies: Vec::new(),
            sub_packages: BTreeMap::new(),
            size: 0,
            install_time: None,
            filter: None,
        }
    }

    pub fn is_installed(&self) -> bool {
        self.status.is_installed()
    }

    pub fn installed_at(&self) -> Option<DateTime<Utc>> {
        self.install_time
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    }

    /// Parse a metadata document
    pub fn from_xml(text: &str) -> Result<Self> {
        let doc = xml::parse(text)?;
        let root = doc.root_element();
        if !root.has_tag_name(ROOT) {
            return Err(Error::Metadata(format!(
                "expected <{}>, found <{}>",
                ROOT,
                root.tag_name().name()
            )));
        }

        let id = root
            .attribute("packageid")
            .and_then(PackageId::parse)
            .ok_or_else(|| Error::Metadata("missing packageid".to_string()))?;
        let file_path = root
            .attribute("filepath")
            .map(PathBuf::from)
            .ok_or_else(|| Error::Metadata(format!("missing filepath for {}", id)))?;

        let status = match root.attribute("packagestatus") {
            Some(s) => s.parse().map_err(Error::Metadata)?,
            None => PackageStatus::default(),
        };
        let size = match root.attribute("size") {
            Some(s) => s
                .parse()
                .map_err(|_| Error::Metadata(format!("invalid size '{}' for {}", s, id)))?,
            None => 0,
        };
        let install_time = match root.attribute("installtime") {
            Some(s) => Some(
                s.parse()
                    .map_err(|_| Error::Metadata(format!("invalid installtime '{}' for {}", s, id)))?,
            ),
            None => None,
        };
        let external = root.attribute("external") == Some("true");

        let mut state = Self {
            status,
            external,
            size,
            install_time,
            ..Self::new(id, file_path)
        };

        for child in root.children().filter(|n| n.is_element()) {
            match child.tag_name().name() {
                DEPENDENCY => {
                    state
                        .dependencies
                        .extend(child.attribute("packageid").and_then(Dependency::parse));
                }
                SUB_PACKAGE => {
                    let Some(sub) = child.attribute("packageid").and_then(PackageId::parse) else {
                        continue;
                    };
                    let option = match child.attribute("sphoption") {
                        Some(o) => o.parse().map_err(Error::Metadata)?,
                        None => SubPackageOption::default(),
                    };
                    state.sub_packages.insert(sub, option);
                }
                FILTER_SET => {
                    let roots: Vec<String> = child
                        .children()
                        .filter(|n| n.has_tag_name(FILTER))
                        .filter_map(|n| n.attribute("root"))
                        .map(String::from)
                        .collect();
                    state.filter = Some(PathFilter::new(roots));
                }
                other => tracing::debug!("Ignoring unknown metadata element <{}>", other),
            }
        }

        Ok(state)
    }

    /// Render the metadata document
    pub fn to_xml(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        out.push_str(&format!(
            "<{} packageid=\"{}\" size=\"{}\"",
            ROOT,
            xml::escape(&self.id.to_string()),
            self.size
        ));
        if let Some(time) = self.install_time {
            out.push_str(&format!(" installtime=\"{}\"", time));
        }
        out.push_str(&format!(
            " filepath=\"{}\" external=\"{}\" packagestatus=\"{}\">\n",
            xml::escape(&self.file_path.to_string_lossy()),
            self.external,
            self.status
        ));
        for dep in &self.dependencies {
            out.push_str(&format!(
                "    <{} packageid=\"{}\"/>\n",
                DEPENDENCY,
                xml::escape(&dep.to_string())
            ));
        }
        for (sub, option) in &self.sub_packages {
            out.push_str(&format!(
                "    <{} packageid=\"{}\" sphoption=\"{}\"/>\n",
                SUB_PACKAGE,
                xml::escape(&sub.to_string()),
                option
            ));
        }
        if let Some(filter) = &self.filter {
            out.push_str(&format!("    <{}>\n", FILTER_SET));
            for root in &filter.roots {
                out.push_str(&format!(
                    "        <{} root=\"{}\"/>\n",
                    FILTER,
                    xml::escape(root)
                ));
            }
            out.push_str(&format!("    </{}>\n", FILTER_SET));
        }
        out.push_str(&format!("</{}>\n", ROOT));
        out
    }

    /// Read a metadata file
    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_xml(&text).map_err(|e| match e {
            Error::Metadata(msg) => Error::Metadata(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    /// Write a metadata file atomically
    pub fn write(&self, path: &Path) -> Result<()> {
        let dir = path.parent().unwrap_or(Path::new("."));
        fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        let text = self.to_xml();
        xml::check_chars(&text)?;
        tmp.write_all(text.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }
}
