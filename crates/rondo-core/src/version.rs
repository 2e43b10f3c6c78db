//! Version grammar and version constraints.
//!
//! A version is `<numeric>(.<numeric>)*(-<prerelease>)?(+<build>)?`. Unlike
//! strict semver the numeric core may have any number of components, so the
//! grammar is implemented natively instead of on top of the `semver` crate.
//! Comparison is semver-like: numeric components compare
//! lexicographic-numerically with implicit zero padding and a prerelease
//! sorts below its release. Component count and build metadata carry no
//! precedence of their own but break remaining ties, keeping the total
//! order consistent with structural equality.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced while parsing a version string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    /// The input was empty.
    #[error("empty version string")]
    Empty,

    /// A numeric component did not parse.
    #[error("invalid version component '{0}'")]
    InvalidComponent(String),

    /// The prerelease part was empty or malformed.
    #[error("invalid prerelease in '{0}'")]
    InvalidPrerelease(String),
}

/// A package version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    components: Vec<u64>,
    prerelease: Option<String>,
    build: Option<String>,
}

impl Version {
    /// Build a release version from numeric components.
    #[must_use]
    pub fn new(components: Vec<u64>) -> Self {
        Self {
            components,
            prerelease: None,
            build: None,
        }
    }

    /// Parse a version string.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(VersionError::Empty);
        }

        // Build metadata comes last and is ordering-neutral.
        let (rest, build) = match input.split_once('+') {
            Some((r, b)) => (r, Some(b.to_string())),
            None => (input, None),
        };

        let (core, prerelease) = match rest.split_once('-') {
            Some((c, p)) => {
                if p.is_empty() {
                    return Err(VersionError::InvalidPrerelease(input.to_string()));
                }
                (c, Some(p.to_string()))
            }
            None => (rest, None),
        };

        if core.is_empty() {
            return Err(VersionError::Empty);
        }

        let mut components = Vec::new();
        for part in core.split('.') {
            let n: u64 = part
                .parse()
                .map_err(|_| VersionError::InvalidComponent(part.to_string()))?;
            components.push(n);
        }

        Ok(Self {
            components,
            prerelease,
            build,
        })
    }

    /// The numeric components.
    #[must_use]
    pub fn components(&self) -> &[u64] {
        &self.components
    }

    /// Numeric component at `idx`, zero when absent.
    #[must_use]
    pub fn component(&self, idx: usize) -> u64 {
        self.components.get(idx).copied().unwrap_or(0)
    }

    /// The prerelease part, if any.
    #[must_use]
    pub fn prerelease(&self) -> Option<&str> {
        self.prerelease.as_deref()
    }

    /// Whether this is a prerelease version.
    #[must_use]
    pub fn is_prerelease(&self) -> bool {
        self.prerelease.is_some()
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.components.len().max(other.components.len());
        for i in 0..len {
            match self.component(i).cmp(&other.component(i)) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }

        let pre = match (&self.prerelease, &other.prerelease) {
            (None, None) => Ordering::Equal,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(a), Some(b)) => cmp_prerelease(a, b),
        };
        if pre != Ordering::Equal {
            return pre;
        }

        // Ordering-neutral parts still break ties so that Ord stays
        // consistent with the structural Eq: fewer components first, then
        // build metadata lexically.
        self.components
            .len()
            .cmp(&other.components.len())
            .then_with(|| self.build.cmp(&other.build))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Semver prerelease comparison: dot-separated identifiers, numeric
/// identifiers compare numerically and sort below alphanumeric ones, and a
/// shorter identifier list sorts below a longer one with an equal prefix.
fn cmp_prerelease(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) => {
                let ord = match (l.parse::<u64>(), r.parse::<u64>()) {
                    (Ok(ln), Ok(rn)) => ln.cmp(&rn),
                    (Ok(_), Err(_)) => Ordering::Less,
                    (Err(_), Ok(_)) => Ordering::Greater,
                    (Err(_), Err(_)) => l.cmp(r),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self
            .components
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(".");
        write!(f, "{core}")?;
        if let Some(pre) = &self.prerelease {
            write!(f, "-{pre}")?;
        }
        if let Some(build) = &self.build {
            write!(f, "+{build}")?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Version {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A version constraint as it appears in a selector.
///
/// `~` is semver-compatible (leading component locked), `^` is minor-locked
/// (first two components locked). `Any` matches everything including
/// prereleases.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VersionConstraint {
    /// Any version (`*` or no constraint).
    Any,
    /// Exactly this version.
    Exact(Version),
    /// Any version except this one.
    NotEqual(Version),
    /// Strictly greater.
    Greater(Version),
    /// Greater or equal.
    GreaterEq(Version),
    /// Strictly less.
    Less(Version),
    /// Less or equal.
    LessEq(Version),
    /// Semver-compatible: `>=` with the leading component fixed.
    Tilde(Version),
    /// Minor-locked: `>=` with the first two components fixed.
    Caret(Version),
}

impl VersionConstraint {
    /// Check whether a version satisfies the constraint.
    #[must_use]
    pub fn matches(&self, version: &Version) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(v) => version == v,
            Self::NotEqual(v) => version != v,
            Self::Greater(v) => version > v,
            Self::GreaterEq(v) => version >= v,
            Self::Less(v) => version < v,
            Self::LessEq(v) => version <= v,
            Self::Tilde(v) => version >= v && version.component(0) == v.component(0),
            Self::Caret(v) => {
                version >= v
                    && version.component(0) == v.component(0)
                    && version.component(1) == v.component(1)
            }
        }
    }

    /// The operator string for display, empty for `Any`.
    #[must_use]
    pub fn operator(&self) -> &'static str {
        match self {
            Self::Any => "",
            Self::Exact(_) => "=",
            Self::NotEqual(_) => "!=",
            Self::Greater(_) => ">",
            Self::GreaterEq(_) => ">=",
            Self::Less(_) => "<",
            Self::LessEq(_) => "<=",
            Self::Tilde(_) => "~",
            Self::Caret(_) => "^",
        }
    }

    /// The constrained version, if any.
    #[must_use]
    pub fn version(&self) -> Option<&Version> {
        match self {
            Self::Any => None,
            Self::Exact(v)
            | Self::NotEqual(v)
            | Self::Greater(v)
            | Self::GreaterEq(v)
            | Self::Less(v)
            | Self::LessEq(v)
            | Self::Tilde(v)
            | Self::Caret(v) => Some(v),
        }
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version() {
            None => Ok(()),
            Some(v) => write!(f, "{}{}", self.operator(), v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn parse_basic() {
        let ver = v("1.2.3");
        assert_eq!(ver.components(), &[1, 2, 3]);
        assert!(!ver.is_prerelease());
    }

    #[test]
    fn parse_long_core() {
        // More components than semver allows
        let ver = v("1.2.3.4.5");
        assert_eq!(ver.components(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn parse_prerelease_and_build() {
        let ver = v("2.0.0-rc.1+build5");
        assert_eq!(ver.prerelease(), Some("rc.1"));
        assert_eq!(ver.to_string(), "2.0.0-rc.1+build5");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(Version::parse(""), Err(VersionError::Empty));
        assert!(matches!(
            Version::parse("1.x.3"),
            Err(VersionError::InvalidComponent(_))
        ));
        assert!(matches!(
            Version::parse("1.0-"),
            Err(VersionError::InvalidPrerelease(_))
        ));
    }

    #[test_case("1.0", "1.0.0", Ordering::Less ; "zero padding ties break on length")]
    #[test_case("1.2", "1.10", Ordering::Less ; "numeric not lexical")]
    #[test_case("2.0.0-rc1", "2.0.0", Ordering::Less ; "prerelease below release")]
    #[test_case("1.0.0-alpha", "1.0.0-beta", Ordering::Less ; "prerelease alpha order")]
    #[test_case("1.0.0-1", "1.0.0-alpha", Ordering::Less ; "numeric prerelease below alpha")]
    #[test_case("1.0.0-rc.1", "1.0.0-rc.1.1", Ordering::Less ; "shorter prerelease first")]
    #[test_case("1.0.0+a", "1.0.0+b", Ordering::Less ; "build is only a final tiebreak")]
    #[test_case("1.0.0-rc1", "1.0-rc1", Ordering::Greater ; "equal prereleases fall through to length")]
    fn ordering(a: &str, b: &str, expected: Ordering) {
        assert_eq!(v(a).cmp(&v(b)), expected);
    }

    #[test]
    fn ord_is_consistent_with_eq() {
        for (a, b) in [("1.0", "1.0.0"), ("1.0.0+a", "1.0.0+b"), ("1.0", "1.0")] {
            let (va, vb) = (v(a), v(b));
            assert_eq!(va == vb, va.cmp(&vb) == Ordering::Equal);
        }
    }

    #[test_case("1.5.0", true ; "tilde inside major")]
    #[test_case("1.2.3", true ; "tilde at floor")]
    #[test_case("2.0.0", false ; "tilde next major")]
    #[test_case("1.2.2", false ; "tilde below floor")]
    fn tilde(candidate: &str, expected: bool) {
        let c = VersionConstraint::Tilde(v("1.2.3"));
        assert_eq!(c.matches(&v(candidate)), expected);
    }

    #[test_case("1.2.9", true ; "caret inside minor")]
    #[test_case("1.3.0", false ; "caret next minor")]
    #[test_case("1.2.2", false ; "caret below floor")]
    fn caret(candidate: &str, expected: bool) {
        let c = VersionConstraint::Caret(v("1.2.3"));
        assert_eq!(c.matches(&v(candidate)), expected);
    }

    #[test]
    fn relational_constraints() {
        assert!(VersionConstraint::GreaterEq(v("2.0")).matches(&v("2.0.0")));
        assert!(!VersionConstraint::GreaterEq(v("2.0")).matches(&v("1.9")));
        assert!(VersionConstraint::NotEqual(v("1.0")).matches(&v("1.1")));
        assert!(!VersionConstraint::NotEqual(v("1.0")).matches(&v("1.0")));
        assert!(VersionConstraint::Less(v("1.0")).matches(&v("1.0.0-rc1")));
    }

    proptest! {
        #[test]
        fn display_parse_roundtrip(
            parts in proptest::collection::vec(0u64..1000, 1..5),
            pre in proptest::option::of("[a-z]{1,4}(\\.[0-9]{1,3})?"),
        ) {
            let mut s = parts
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(".");
            if let Some(p) = &pre {
                s.push('-');
                s.push_str(p);
            }
            let parsed = Version::parse(&s).unwrap();
            prop_assert_eq!(parsed.to_string(), s);
        }

        #[test]
        fn ordering_total_and_antisymmetric(
            a in proptest::collection::vec(0u64..50, 1..4),
            b in proptest::collection::vec(0u64..50, 1..4),
        ) {
            let va = Version::new(a);
            let vb = Version::new(b);
            match va.cmp(&vb) {
                Ordering::Less => prop_assert_eq!(vb.cmp(&va), Ordering::Greater),
                Ordering::Greater => prop_assert_eq!(vb.cmp(&va), Ordering::Less),
                Ordering::Equal => prop_assert_eq!(vb.cmp(&va), Ordering::Equal),
            }
        }
    }
}
