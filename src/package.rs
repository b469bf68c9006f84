//! Package types and operations

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::version::{split_trimmed, Version};

/// Repository path under which packages are stored
pub const ETC_PACKAGES: &str = "/etc/packages";

/// Same as [`ETC_PACKAGES`] with a trailing slash
pub const ETC_PACKAGES_PREFIX: &str = "/etc/packages/";

/// Identity of a package: group, name and version
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageId {
    group: String,
    name: String,
    version: Version,
}

fn normalize_group(group: &str) -> String {
    if group == ETC_PACKAGES {
        String::new()
    } else if let Some(rest) = group.strip_prefix(ETC_PACKAGES_PREFIX) {
        rest.to_string()
    } else if let Some(rest) = group.strip_prefix('/') {
        rest.to_string()
    } else {
        group.to_string()
    }
}

/// Strip a `.zip`/`.jar` extension and split the remaining path into group
/// and last path segment.
fn split_path(path: &str) -> (String, &str) {
    let mut path = path.trim();
    if let Some(idx) = path.rfind('.') {
        let ext = &path[idx..];
        if idx > 0 && (ext.eq_ignore_ascii_case(".zip") || ext.eq_ignore_ascii_case(".jar")) {
            path = &path[..idx];
        }
    }
    match path.rfind('/') {
        Some(idx) => (normalize_group(&path[..idx]), &path[idx + 1..]),
        None => (String::new(), path),
    }
}

/// Whether a `-` separated name segment looks like part of a version.
///
/// Numbers below 1000 count (hotfix numbers), as do segments that start
/// with a digit, the literal `SNAPSHOT`, and letter-digit qualifiers like
/// `R1234`.
fn is_version_segment(seg: &str) -> bool {
    if let Ok(n) = seg.parse::<i32>() {
        if n >= 1000 {
            return false;
        }
    }
    let mut chars = seg.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {
            let second_is_digit = chars.next().is_some_and(|c| c.is_ascii_digit());
            second_is_digit || seg == "SNAPSHOT"
        }
        _ => true,
    }
}

impl PackageId {
    /// Create an id from its parts. A leading `/etc/packages/` or `/` is
    /// removed from the group.
    pub fn new(group: &str, name: &str, version: Version) -> Self {
        Self {
            group: normalize_group(group),
            name: name.to_string(),
            version,
        }
    }

    /// Parse the canonical `group:name[:version]` form.
    ///
    /// Returns `None` for the empty string.
    pub fn parse(s: &str) -> Option<Self> {
        if s.is_empty() {
            return None;
        }
        let segs = split_trimmed(s, ':');
        Some(match segs.as_slice() {
            [] => Self::new("", "", Version::EMPTY),
            [name] => Self::new("", name, Version::EMPTY),
            [group, name] => Self::new(group, name, Version::EMPTY),
            [group, name, version, ..] => Self::new(group, name, Version::parse(version)),
        })
    }

    /// Parse a path such as `/etc/packages/my/group/name-1.0.zip`.
    ///
    /// Trailing `-` segments that look like a version are split off the
    /// name into the version.
    pub fn from_path(path: &str) -> Self {
        let (group, last) = split_path(path);
        let segs: Vec<&str> = last.split('-').filter(|s| !s.is_empty()).collect();

        let mut i = segs.len().saturating_sub(1);
        while i > 0 && is_version_segment(segs[i]) {
            i -= 1;
        }

        if segs.is_empty() || i == segs.len() - 1 {
            return Self {
                group,
                name: last.to_string(),
                version: Version::EMPTY,
            };
        }

        Self {
            group,
            name: segs[..=i].join("-"),
            version: Version::parse(&segs[i + 1..].join("-")),
        }
    }

    /// Parse a path with a known version; a `-<version>` suffix is stripped
    /// from the name.
    pub fn from_path_with_version(path: &str, version: Version) -> Self {
        let (group, last) = split_path(path);
        let suffix = format!("-{}", version);
        let name = if !version.is_empty() {
            last.strip_suffix(suffix.as_str()).unwrap_or(last)
        } else {
            last
        };
        Self {
            group,
            name: name.to_string(),
            version,
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    /// `name-version`, or just `name` for unversioned packages
    pub fn download_name(&self) -> String {
        if self.version.is_empty() {
            self.name.clone()
        } else {
            format!("{}-{}", self.name, self.version)
        }
    }

    /// Path of the package relative to a registry root: `group/name-version`
    pub fn installation_path(&self) -> String {
        if self.group.is_empty() {
            self.download_name()
        } else {
            format!("{}/{}", self.group, self.download_name())
        }
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.version.is_empty() {
            if self.group.is_empty() {
                write!(f, "{}", self.name)
            } else {
                write!(f, "{}:{}", self.group, self.name)
            }
        } else {
            write!(f, "{}:{}:{}", self.group, self.name, self.version)
        }
    }
}

impl PartialOrd for PackageId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PackageId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.group
            .cmp(&other.group)
            .then_with(|| self.name.cmp(&other.name))
            .then_with(|| self.version.cmp(&other.version))
    }
}

impl Serialize for PackageId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PackageId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PackageId::parse(&s).ok_or_else(|| serde::de::Error::custom("empty package id"))
    }
}

/// Registration status of a package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PackageStatus {
    /// Stored in the registry, content not applied
    #[default]
    Registered,
    /// Content extracted into the target
    Extracted,
    /// Content installed into the target
    Installed,
}

impl PackageStatus {
    pub fn is_installed(&self) -> bool {
        !matches!(self, PackageStatus::Registered)
    }
}

impl fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageStatus::Registered => write!(f, "REGISTERED"),
            PackageStatus::Extracted => write!(f, "EXTRACTED"),
            PackageStatus::Installed => write!(f, "INSTALLED"),
        }
    }
}

impl std::str::FromStr for PackageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "REGISTERED" => Ok(PackageStatus::Registered),
            "EXTRACTED" => Ok(PackageStatus::Extracted),
            "INSTALLED" => Ok(PackageStatus::Installed),
            _ => Err(format!("Unknown package status: {}", s)),
        }
    }
}

/// What to do with a sub-package found inside another package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SubPackageOption {
    /// Register and install
    #[default]
    Install,
    /// Register and extract
    Extract,
    /// Register only
    Add,
    /// Skip entirely
    Ignore,
}

impl fmt::Display for SubPackageOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubPackageOption::Install => write!(f, "INSTALL"),
            SubPackageOption::Extract => write!(f, "EXTRACT"),
            SubPackageOption::Add => write!(f, "ADD"),
            SubPackageOption::Ignore => write!(f, "IGNORE"),
        }
    }
}

impl std::str::FromStr for SubPackageOption {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "INSTALL" => Ok(SubPackageOption::Install),
            "EXTRACT" => Ok(SubPackageOption::Extract),
            "ADD" => Ok(SubPackageOption::Add),
            "IGNORE" => Ok(SubPackageOption::Ignore),
            _ => Err(format!("Unknown sub-package option: {}", s)),
        }
    }
}

/// A single sub-package handling rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubPackageRule {
    /// Group pattern; `*` or empty matches any group
    pub group: String,
    /// Name pattern; `*` or empty matches any name
    pub name: String,
    pub option: SubPackageOption,
}

impl SubPackageRule {
    fn matches(&self, id: &PackageId) -> bool {
        let any = |p: &str| p.is_empty() || p == "*";
        (any(&self.group) || self.group == id.group())
            && (any(&self.name) || self.name == id.name())
    }
}

/// Ordered sub-package handling rules. The last matching rule wins.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubPackageHandling {
    rules: Vec<SubPackageRule>,
}

impl SubPackageHandling {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, group: &str, name: &str, option: SubPackageOption) -> Self {
        self.push(group, name, option);
        self
    }

    pub fn push(&mut self, group: &str, name: &str, option: SubPackageOption) {
        self.rules.push(SubPackageRule {
            group: group.to_string(),
            name: name.to_string(),
            option,
        });
    }

    pub fn rules(&self) -> &[SubPackageRule] {
        &self.rules
    }

    /// Option for `id`; [`SubPackageOption::Install`] when no rule matches
    pub fn option_for(&self, id: &PackageId) -> SubPackageOption {
        self.rules
            .iter()
            .rev()
            .find(|r| r.matches(id))
            .map(|r| r.option)
            .unwrap_or_default()
    }

    /// Parse `group:name;option,...`. Malformed entries are skipped.
    pub fn parse(s: &str) -> Self {
        let mut handling = Self::new();
        for entry in s.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (pattern, option) = match entry.split_once(';') {
                Some((p, o)) => match o.parse() {
                    Ok(option) => (p, option),
                    Err(e) => {
                        tracing::warn!("Ignoring sub-package rule '{}': {}", entry, e);
                        continue;
                    }
                },
                None => (entry, SubPackageOption::Install),
            };
            match pattern.split_once(':') {
                Some((group, name)) => handling.push(group, name, option),
                None => handling.push("", pattern, option),
            }
        }
        handling
    }
}

impl fmt::Display for SubPackageHandling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut delim = "";
        for rule in &self.rules {
            let group = if rule.group.is_empty() { "*" } else { &rule.group };
            let name = if rule.name.is_empty() { "*" } else { &rule.name };
            write!(f, "{}{}:{};{}", delim, group, name, rule.option)?;
            delim = ",";
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(group: &str, name: &str, version: &str) -> PackageId {
        PackageId::new(group, name, Version::parse(version))
    }

    #[test]
    fn test_display_forms() {
        assert_eq!(id("my/group", "pkg", "1.0").to_string(), "my/group:pkg:1.0");
        assert_eq!(id("my/group", "pkg", "").to_string(), "my/group:pkg");
        assert_eq!(id("", "pkg", "1.0").to_string(), ":pkg:1.0");
        assert_eq!(id("", "pkg", "").to_string(), "pkg");
    }

    #[test]
    fn test_parse_round_trip() {
        for pid in [
            id("my/group", "pkg", "1.0"),
            id("my/group", "pkg", ""),
            id("", "pkg", "1.0-SNAPSHOT"),
            id("", "pkg", ""),
            id("g", "name-with-dashes", "2.1.3"),
        ] {
            assert_eq!(PackageId::parse(&pid.to_string()), Some(pid));
        }
    }

    #[test]
    fn test_parse_empty_is_none() {
        assert_eq!(PackageId::parse(""), None);
    }

    #[test]
    fn test_group_normalization() {
        assert_eq!(id("/etc/packages/my", "a", "").group(), "my");
        assert_eq!(id("/etc/packages", "a", "").group(), "");
        assert_eq!(id("/my", "a", "").group(), "my");
    }

    #[test]
    fn test_from_path() {
        let pid = PackageId::from_path("/etc/packages/my/group/foo-1.0.zip");
        assert_eq!(pid, id("my/group", "foo", "1.0"));

        assert_eq!(PackageId::from_path("foo-bar"), id("", "foo-bar", ""));
        assert_eq!(
            PackageId::from_path("g/foo-1.0-SNAPSHOT.jar"),
            id("g", "foo", "1.0-SNAPSHOT")
        );
        assert_eq!(PackageId::from_path("foo-1.0-R1234"), id("", "foo", "1.0-R1234"));
        assert_eq!(PackageId::from_path("foo-100"), id("", "foo", "100"));
        // four digit numbers are part of the name
        assert_eq!(PackageId::from_path("foo-2000"), id("", "foo-2000", ""));
        assert_eq!(PackageId::from_path("foo"), id("", "foo", ""));
    }

    #[test]
    fn test_from_path_with_version() {
        let pid = PackageId::from_path_with_version("/etc/packages/g/foo-1.0.zip", Version::parse("1.0"));
        assert_eq!(pid, id("g", "foo", "1.0"));
        let pid = PackageId::from_path_with_version("g/foo", Version::parse("2.0"));
        assert_eq!(pid, id("g", "foo", "2.0"));
    }

    #[test]
    fn test_installation_path() {
        assert_eq!(id("my/group", "foo", "1.0").installation_path(), "my/group/foo-1.0");
        assert_eq!(id("", "foo", "").installation_path(), "foo");
    }

    #[test]
    fn test_ordering() {
        assert!(id("a", "x", "1.0") < id("b", "a", "0.1"));
        assert!(id("a", "x", "9.0") > id("a", "w", "10.0"));
        assert!(id("a", "x", "2.9") < id("a", "x", "2.11"));
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!("extracted".parse::<PackageStatus>(), Ok(PackageStatus::Extracted));
        assert!("bogus".parse::<PackageStatus>().is_err());
        assert!(!PackageStatus::Registered.is_installed());
        assert!(PackageStatus::Installed.is_installed());
    }

    #[test]
    fn test_sub_package_last_match_wins() {
        let handling = SubPackageHandling::new()
            .with_rule("*", "*", SubPackageOption::Ignore)
            .with_rule("g", "*", SubPackageOption::Extract)
            .with_rule("g", "b", SubPackageOption::Add);

        assert_eq!(handling.option_for(&id("g", "b", "1.0")), SubPackageOption::Add);
        assert_eq!(handling.option_for(&id("g", "c", "1.0")), SubPackageOption::Extract);
        assert_eq!(handling.option_for(&id("other", "c", "")), SubPackageOption::Ignore);
        assert_eq!(
            SubPackageHandling::new().option_for(&id("g", "b", "")),
            SubPackageOption::Install
        );
    }

    #[test]
    fn test_sub_package_handling_parse() {
        let handling = SubPackageHandling::parse("g:a;extract, *:*;ignore, bad;nope, b");
        assert_eq!(handling.rules().len(), 3);
        assert_eq!(handling.option_for(&id("g", "a", "")), SubPackageOption::Ignore);
        assert_eq!(handling.option_for(&id("x", "b", "")), SubPackageOption::Install);
        assert_eq!(handling.to_string(), "g:a;EXTRACT,*:*;IGNORE,*:b;INSTALL");
    }
}
