//! Options passed along with install, extract and uninstall tasks

use serde::{Deserialize, Serialize};

use crate::package::SubPackageHandling;

/// How extracted content treats files that already exist in the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    /// Overwrite existing files
    #[default]
    Replace,
    /// Keep existing files, add missing ones
    Merge,
    /// Overwrite existing files, never create new ones
    Update,
}

/// Restricts which repository paths a task touches.
///
/// A path is covered when it equals one of the roots or lies below one.
/// An empty filter covers everything.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PathFilter {
    #[serde(default)]
    pub roots: Vec<String>,
}

impl PathFilter {
    pub fn new<S: Into<String>>(roots: impl IntoIterator<Item = S>) -> Self {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn covers(&self, path: &str) -> bool {
        if self.roots.is_empty() {
            return true;
        }
        self.roots.iter().any(|root| {
            let root = root.trim_end_matches('/');
            root.is_empty()
                || path == root
                || path
                    .strip_prefix(root)
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }
}

/// Options of a single task
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportOptions {
    /// Only report what would happen
    pub dry_run: bool,

    /// Treat sub-package failures as task failures
    pub strict: bool,

    pub import_mode: ImportMode,

    /// Overrides the filter stored with the package
    pub filter: Option<PathFilter>,

    pub sub_packages: SubPackageHandling,
}

impl ImportOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn import_mode(mut self, mode: ImportMode) -> Self {
        self.import_mode = mode;
        self
    }

    pub fn filter(mut self, filter: PathFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn sub_packages(mut self, handling: SubPackageHandling) -> Self {
        self.sub_packages = handling;
        self
    }
}
