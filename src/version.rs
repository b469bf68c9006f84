//! Package versions and version ranges
//!
//! Versions are dotted strings compared segment by segment. Two orderings
//! exist: the default one used for display and sorting, and an OSGi-style
//! one used when checking whether a version falls inside a [`VersionRange`].

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Split like `java.lang.String#split` with a literal separator: trailing
/// empty pieces are dropped, an input without the separator is kept whole.
pub(crate) fn split_trimmed(s: &str, sep: char) -> Vec<&str> {
    if !s.contains(sep) {
        return vec![s];
    }
    let mut parts: Vec<&str> = s.split(sep).collect();
    while parts.last().is_some_and(|p| p.is_empty()) {
        parts.pop();
    }
    parts
}

fn parse_int(s: &str) -> Option<i32> {
    s.parse::<i32>().ok()
}

/// Numeric-first comparison of two pieces. `None` means the pieces are
/// equal under both the numeric and the lexicographic rule.
fn compare_piece(a: &str, b: &str) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (parse_int(a), parse_int(b)) {
        if x != y {
            return Some(x.cmp(&y));
        }
    }
    match a.cmp(b) {
        Ordering::Equal => None,
        ord => Some(ord),
    }
}

/// A dotted version string
#[derive(Debug, Clone, Default)]
pub struct Version {
    raw: String,
    segments: Vec<String>,
}

impl Version {
    /// The empty version. Sorts lowest and renders as `""`.
    pub const EMPTY: Version = Version {
        raw: String::new(),
        segments: Vec::new(),
    };

    /// Parse a version string. Never fails.
    pub fn parse(s: &str) -> Self {
        if s.is_empty() {
            return Self::EMPTY;
        }
        Self {
            raw: s.to_string(),
            segments: split_trimmed(s, '.').into_iter().map(String::from).collect(),
        }
    }

    /// Build a version from already split segments
    pub fn from_segments<S: AsRef<str>>(segments: &[S]) -> Self {
        let raw = segments
            .iter()
            .map(|s| s.as_ref())
            .collect::<Vec<_>>()
            .join(".");
        Self::parse(&raw)
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Default comparison.
    ///
    /// The first differing segment decides: numeric value first, then the
    /// `-` separated pieces one by one. A segment with fewer pieces sorts
    /// *higher*, so `2.1` is newer than `2.1-SNAPSHOT`. When all shared
    /// segments are equal the version with fewer segments sorts lower.
    pub fn compare(&self, other: &Version) -> Ordering {
        for (s1, s2) in self.segments.iter().zip(other.segments.iter()) {
            if s1 == s2 {
                continue;
            }
            if let (Some(v1), Some(v2)) = (parse_int(s1), parse_int(s2)) {
                if v1 != v2 {
                    return v1.cmp(&v2);
                }
            }
            let ss1 = split_trimmed(s1, '-');
            let ss2 = split_trimmed(s2, '-');
            for (c1, c2) in ss1.iter().zip(ss2.iter()) {
                if let Some(ord) = compare_piece(c1, c2) {
                    return ord;
                }
            }
            let ord = ss1.len().cmp(&ss2.len());
            if ord != Ordering::Equal {
                return ord.reverse();
            }
        }
        self.segments.len().cmp(&other.segments.len())
    }

    /// OSGi-style comparison used for range checks.
    ///
    /// All `-` pieces of all segments are flattened into one sequence and
    /// compared positionally; the shorter sequence sorts lower.
    pub fn osgi_compare(&self, other: &Version) -> Ordering {
        let a = self.flattened();
        let b = other.flattened();
        for (p1, p2) in a.iter().zip(b.iter()) {
            if let Some(ord) = compare_piece(p1, p2) {
                return ord;
            }
        }
        a.len().cmp(&b.len())
    }

    fn flattened(&self) -> Vec<&str> {
        self.segments
            .iter()
            .flat_map(|s| split_trimmed(s, '-'))
            .collect()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Version {}

impl std::hash::Hash for Version {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        // `1.0` and `1.0.` compare equal but are different strings
        self.compare(other).then_with(|| self.raw.cmp(&other.raw))
    }
}

impl From<&str> for Version {
    fn from(s: &str) -> Self {
        Version::parse(s)
    }
}

/// A range of versions with optional, optionally inclusive bounds
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VersionRange {
    low: Option<Version>,
    low_inclusive: bool,
    high: Option<Version>,
    high_inclusive: bool,
}

impl VersionRange {
    /// The range containing every version
    pub const INFINITE: VersionRange = VersionRange {
        low: None,
        low_inclusive: false,
        high: None,
        high_inclusive: false,
    };

    /// Create a range. Empty versions count as absent bounds.
    pub fn new(
        low: Option<Version>,
        low_inclusive: bool,
        high: Option<Version>,
        high_inclusive: bool,
    ) -> Result<Self> {
        let low = low.filter(|v| !v.is_empty());
        let high = high.filter(|v| !v.is_empty());

        if let (Some(l), Some(h)) = (&low, &high) {
            match l.compare(h) {
                Ordering::Greater => {
                    return Err(Error::InvalidRange(format!(
                        "lower bound {} must be less or equal to upper bound {}",
                        l, h
                    )));
                }
                Ordering::Equal if !(low_inclusive && high_inclusive) => {
                    return Err(Error::InvalidRange(format!(
                        "empty range at {}: both bounds must be inclusive",
                        l
                    )));
                }
                _ => {}
            }
        }

        // Inclusiveness of an absent bound carries no meaning
        let low_inclusive = low.is_some() && low_inclusive;
        let high_inclusive = high.is_some() && high_inclusive;

        Ok(Self {
            low,
            low_inclusive,
            high,
            high_inclusive,
        })
    }

    /// Range `[version,)`; the empty version yields the infinite range
    pub fn from_version(version: &Version) -> Self {
        if version.is_empty() {
            return Self::INFINITE;
        }
        Self {
            low: Some(version.clone()),
            low_inclusive: true,
            high: None,
            high_inclusive: false,
        }
    }

    /// Parse bracket notation or a bare version
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Ok(Self::INFINITE);
        }
        if s.starts_with('[') || s.starts_with('(') {
            let low_inclusive = s.starts_with('[');
            let high_inclusive = s.ends_with(']');
            let Some(comma) = s.find(',') else {
                return Err(Error::InvalidRange(format!(
                    "range must contain 2 bounds separated by a comma: {}",
                    s
                )));
            };
            let end = if s.ends_with(']') || s.ends_with(')') {
                s.len() - 1
            } else {
                s.len()
            };
            let v1 = &s[1..comma];
            let v2 = if comma + 1 <= end { &s[comma + 1..end] } else { "" };
            let low = (!v1.is_empty()).then(|| Version::parse(v1));
            let high = (!v2.is_empty()).then(|| Version::parse(v2));
            Self::new(low, low_inclusive, high, high_inclusive)
        } else {
            Ok(Self::from_version(&Version::parse(s)))
        }
    }

    pub fn low(&self) -> Option<&Version> {
        self.low.as_ref()
    }

    pub fn is_low_inclusive(&self) -> bool {
        self.low_inclusive
    }

    pub fn high(&self) -> Option<&Version> {
        self.high.as_ref()
    }

    pub fn is_high_inclusive(&self) -> bool {
        self.high_inclusive
    }

    pub fn is_infinite(&self) -> bool {
        self.low.is_none() && self.high.is_none()
    }

    /// Check whether `version` lies within this range (OSGi comparison)
    pub fn is_in_range(&self, version: &Version) -> bool {
        if let Some(low) = &self.low {
            match version.osgi_compare(low) {
                Ordering::Less => return false,
                Ordering::Equal if !self.low_inclusive => return false,
                _ => {}
            }
        }
        if let Some(high) = &self.high {
            match version.osgi_compare(high) {
                Ordering::Greater => return false,
                Ordering::Equal if !self.high_inclusive => return false,
                _ => {}
            }
        }
        true
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.low, &self.high) {
            (None, None) => Ok(()),
            (Some(low), None) if self.low_inclusive => write!(f, "{}", low),
            (Some(low), None) => write!(f, "({},)", low),
            (None, Some(high)) => {
                write!(f, "[,{}{}", high, if self.high_inclusive { ']' } else { ')' })
            }
            (Some(low), Some(high)) => write!(
                f,
                "{}{},{}{}",
                if self.low_inclusive { '[' } else { '(' },
                low,
                high,
                if self.high_inclusive { ']' } else { ')' }
            ),
        }
    }
}

impl FromStr for VersionRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        VersionRange::parse(s)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Version::parse(&s))
    }
}
