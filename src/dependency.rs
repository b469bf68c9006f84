//! Package dependencies
//!
//! A [`Dependency`] names a group, a package name and a [`VersionRange`].
//! Dependency lists are stored as comma separated strings, e.g.
//! `my/group:base:[1.0,2.0),other:lib:1.5`.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::package::PackageId;
use crate::version::{split_trimmed, VersionRange};

/// A `(group, name, version range)` match expression
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dependency {
    group: String,
    name: String,
    range: VersionRange,
}

impl Dependency {
    pub fn new(group: &str, name: &str, range: VersionRange) -> Self {
        Self {
            group: group.to_string(),
            name: name.to_string(),
            range,
        }
    }

    /// A dependency on `id`'s version or anything newer
    pub fn from_id(id: &PackageId) -> Self {
        Self::new(id.group(), id.name(), VersionRange::from_version(id.version()))
    }

    /// Parse a single dependency. Returns `None` for the empty string.
    ///
    /// Besides `group:name[:range]` two legacy forms are understood: a
    /// single segment whose `/` separates group and name, and
    /// `group/name:range`, recognized by a second segment starting with a
    /// digit or an opening bracket.
    pub fn parse(s: &str) -> Option<Self> {
        if s.is_empty() {
            return None;
        }
        let segs = split_trimmed(s, ':');
        let (group, name, range) = match segs.as_slice() {
            [] => (String::new(), String::new(), None),
            [single] => match single.rfind('/') {
                Some(idx) => (single[..idx].to_string(), single[idx + 1..].to_string(), None),
                None => (String::new(), single.to_string(), None),
            },
            [first, second] => {
                let is_range = second
                    .chars()
                    .next()
                    .map_or(true, |c| c.is_ascii_digit() || c == '[' || c == '(');
                if is_range {
                    match first.rfind('/') {
                        Some(idx) => (
                            first[..idx].to_string(),
                            first[idx + 1..].to_string(),
                            Some(*second),
                        ),
                        None => (String::new(), first.to_string(), Some(*second)),
                    }
                } else {
                    (first.to_string(), second.to_string(), None)
                }
            }
            [group, name, range, ..] => (group.to_string(), name.to_string(), Some(*range)),
        };

        let range = match range {
            None => VersionRange::INFINITE,
            Some(r) => VersionRange::parse(r).unwrap_or_else(|e| {
                tracing::warn!("Ignoring version range of dependency '{}': {}", s, e);
                VersionRange::INFINITE
            }),
        };

        Some(Self {
            group,
            name,
            range,
        })
    }

    /// Parse a comma separated dependency list.
    ///
    /// Commas inside a range that directly follows a `:` do not split.
    pub fn parse_list(s: &str) -> Vec<Dependency> {
        let mut deps = Vec::new();
        let mut in_range = false;
        let mut was_seg = false;
        let mut start = 0;

        for (i, c) in s.char_indices() {
            match c {
                ',' if !in_range => {
                    deps.extend(Self::parse(s[start..i].trim()));
                    start = i + 1;
                }
                '[' | '(' if was_seg => in_range = true,
                ']' | ')' => in_range = false,
                _ => {}
            }
            was_seg = c == ':';
        }
        if start < s.len() {
            deps.extend(Self::parse(s[start..].trim()));
        }
        deps
    }

    /// Join dependencies with `,`
    pub fn format_list(deps: &[Dependency]) -> String {
        deps.iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn range(&self) -> &VersionRange {
        &self.range
    }

    /// Whether `id` satisfies this dependency
    pub fn matches(&self, id: &PackageId) -> bool {
        self.group == id.group() && self.name == id.name() && self.range.is_in_range(id.version())
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let infinite = self.range.is_infinite();
        if !self.group.is_empty() || !infinite {
            write!(f, "{}:", self.group)?;
        }
        f.write_str(&self.name)?;
        if !infinite {
            write!(f, ":{}", self.range)?;
        }
        Ok(())
    }
}

impl Serialize for Dependency {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Dependency {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Dependency::parse(&s).ok_or_else(|| serde::de::Error::custom("empty dependency"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> PackageId {
        PackageId::parse(s).unwrap()
    }

    fn range(s: &str) -> VersionRange {
        VersionRange::parse(s).unwrap()
    }

    #[test]
    fn test_parse_full_form() {
        let dep = Dependency::parse("my/group:pkg:[1.0,2.0)").unwrap();
        assert_eq!(dep.group(), "my/group");
        assert_eq!(dep.name(), "pkg");
        assert_eq!(dep.range(), &range("[1.0,2.0)"));
    }

    #[test]
    fn test_parse_group_and_name() {
        let dep = Dependency::parse("my/group:pkg").unwrap();
        assert_eq!(dep, Dependency::new("my/group", "pkg", VersionRange::INFINITE));
    }

    #[test]
    fn test_parse_legacy_name_with_group() {
        let dep = Dependency::parse("my/group/pkg").unwrap();
        assert_eq!(dep, Dependency::new("my/group", "pkg", VersionRange::INFINITE));
        assert_eq!(
            Dependency::parse("pkg").unwrap(),
            Dependency::new("", "pkg", VersionRange::INFINITE)
        );
    }

    #[test]
    fn test_parse_legacy_two_segment_range() {
        let dep = Dependency::parse("my/group/pkg:1.0").unwrap();
        assert_eq!(dep, Dependency::new("my/group", "pkg", range("1.0")));

        let dep = Dependency::parse("pkg:[1.0,2.0]").unwrap();
        assert_eq!(dep, Dependency::new("", "pkg", range("[1.0,2.0]")));

        let dep = Dependency::parse("pkg:(1.0,2.0]").unwrap();
        assert_eq!(dep, Dependency::new("", "pkg", range("(1.0,2.0]")));
    }

    #[test]
    fn test_two_segment_name_is_taken_verbatim() {
        // only the range form splits a `/` out of the first segment
        let dep = Dependency::parse("x:my/group/pkg").unwrap();
        assert_eq!(dep, Dependency::new("x", "my/group/pkg", VersionRange::INFINITE));
        assert!(!dep.matches(&id("my/group:pkg:1.0")));
        assert!(dep.matches(&id("x:my/group/pkg:1.0")));
    }

    #[test]
    fn test_parse_empty_is_none() {
        assert_eq!(Dependency::parse(""), None);
    }

    #[test]
    fn test_invalid_range_degrades_to_infinite() {
        let dep = Dependency::parse("g:pkg:[2.0,1.0]").unwrap();
        assert!(dep.range().is_infinite());
    }

    #[test]
    fn test_display() {
        assert_eq!(Dependency::parse("g:pkg").unwrap().to_string(), "g:pkg");
        assert_eq!(Dependency::parse("pkg").unwrap().to_string(), "pkg");
        assert_eq!(Dependency::parse("g:pkg:1.0").unwrap().to_string(), "g:pkg:1.0");
        assert_eq!(
            Dependency::new("", "pkg", range("[1.0,2.0)")).to_string(),
            ":pkg:[1.0,2.0)"
        );
    }

    #[test]
    fn test_parse_list_keeps_range_commas() {
        let deps = Dependency::parse_list("a:b:[1.0,2.0),c:d:1.5, e:f ,g:h:(,3.0]");
        assert_eq!(
            deps,
            vec![
                Dependency::new("a", "b", range("[1.0,2.0)")),
                Dependency::new("c", "d", range("1.5")),
                Dependency::new("e", "f", VersionRange::INFINITE),
                Dependency::new("g", "h", range("(,3.0]")),
            ]
        );
    }

    #[test]
    fn test_parse_list_skips_empty_entries() {
        assert!(Dependency::parse_list("").is_empty());
        assert_eq!(Dependency::parse_list("a:b,,c:d").len(), 2);
    }

    #[test]
    fn test_list_round_trip() {
        let deps = vec![
            Dependency::new("my/group", "a", range("[1.0,2.0)")),
            Dependency::new("my/group", "b", VersionRange::INFINITE),
            Dependency::new("", "c", range("(1.0,)")),
            Dependency::new("x", "d", range("[,2.0]")),
        ];
        let formatted = Dependency::format_list(&deps);
        assert_eq!(Dependency::parse_list(&formatted), deps);
    }

    #[test]
    fn test_matches() {
        let dep = Dependency::parse("g:b:[1.0,2.0)").unwrap();
        assert!(dep.matches(&id("g:b:1.0")));
        assert!(dep.matches(&id("g:b:1.9.9")));
        assert!(!dep.matches(&id("g:b:2.0")));
        assert!(!dep.matches(&id("h:b:1.5")));
        assert!(!dep.matches(&id("g:c:1.5")));

        let any = Dependency::parse("g:b").unwrap();
        assert!(any.matches(&id("g:b")));
        assert!(any.matches(&id("g:b:0.1")));
    }

    #[test]
    fn test_from_id() {
        let dep = Dependency::from_id(&id("g:b:1.0"));
        assert_eq!(dep.to_string(), "g:b:1.0");
        assert!(dep.matches(&id("g:b:1.1")));
        assert!(!dep.matches(&id("g:b:0.9")));
    }
}
