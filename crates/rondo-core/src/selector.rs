//! Selectors: package references with an optional version constraint.
//!
//! A selector matches packages by category and name (either may be the `*`
//! wildcard) and by a version constraint. The textual forms accepted are:
//!
//! - `shells/bash` — any version
//! - `shells/bash>=5.0` — operator constraint
//! - `shells/bash-5.1.0` — fingerprint form, exact constraint
//! - `shells/*`, `*/bash`, `bash` — wildcard category and/or name

use crate::package::Package;
use crate::version::{Version, VersionConstraint};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced while parsing a selector string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    /// The input (or the name part) was empty.
    #[error("empty package string")]
    Empty,

    /// The version operator was not recognized.
    #[error("bad version operator '{0}'")]
    BadOperator(String),

    /// The version part of the constraint did not parse.
    #[error("unknown version range '{0}'")]
    UnknownRange(String),
}

/// A package pattern: category, name, version constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Selector {
    /// Package category, `*` matches any.
    pub category: String,
    /// Package name, `*` matches any.
    pub name: String,
    /// Version constraint.
    pub constraint: VersionConstraint,
}

impl Selector {
    /// Build a selector for any version of `category/name`.
    #[must_use]
    pub fn any(category: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            name: name.into(),
            constraint: VersionConstraint::Any,
        }
    }

    /// Build a selector with an explicit constraint.
    #[must_use]
    pub fn new(
        category: impl Into<String>,
        name: impl Into<String>,
        constraint: VersionConstraint,
    ) -> Self {
        Self {
            category: category.into(),
            name: name.into(),
            constraint,
        }
    }

    /// Parse a selector string.
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(SelectorError::Empty);
        }

        let (category, rest) = match input.split_once('/') {
            Some((cat, rest)) => (cat.to_string(), rest),
            None => ("*".to_string(), input),
        };
        if category.is_empty() || rest.is_empty() {
            return Err(SelectorError::Empty);
        }

        // Operator constraint: name ends where the operator begins.
        if let Some(idx) = rest.find(|c| "><=!~^".contains(c)) {
            let name = &rest[..idx];
            if name.is_empty() {
                return Err(SelectorError::Empty);
            }
            let (op, version_str) = split_operator(&rest[idx..])?;
            let version = Version::parse(version_str)
                .map_err(|_| SelectorError::UnknownRange(rest[idx..].to_string()))?;
            let constraint = match op {
                "=" => VersionConstraint::Exact(version),
                "!=" => VersionConstraint::NotEqual(version),
                ">" => VersionConstraint::Greater(version),
                ">=" => VersionConstraint::GreaterEq(version),
                "<" => VersionConstraint::Less(version),
                "<=" => VersionConstraint::LessEq(version),
                "~" => VersionConstraint::Tilde(version),
                "^" => VersionConstraint::Caret(version),
                other => return Err(SelectorError::BadOperator(other.to_string())),
            };
            return Ok(Self {
                category,
                name: name.to_string(),
                constraint,
            });
        }

        // Fingerprint form: split at the last '-' whose suffix parses as a
        // version. Names may themselves contain '-'.
        for (idx, _) in rest.rmatch_indices('-') {
            let suffix = &rest[idx + 1..];
            if suffix.starts_with(|c: char| c.is_ascii_digit())
                && let Ok(version) = Version::parse(suffix)
            {
                let name = &rest[..idx];
                if name.is_empty() {
                    return Err(SelectorError::Empty);
                }
                return Ok(Self {
                    category,
                    name: name.to_string(),
                    constraint: VersionConstraint::Exact(version),
                });
            }
        }

        Ok(Self {
            category,
            name: rest.to_string(),
            constraint: VersionConstraint::Any,
        })
    }

    /// Check whether a package matches this selector.
    #[must_use]
    pub fn matches(&self, package: &Package) -> bool {
        part_matches(&self.category, &package.category)
            && part_matches(&self.name, &package.name)
            && self.constraint.matches(&package.version)
    }

    /// Whether the selector names a single `(category, name)` pair.
    #[must_use]
    pub fn is_concrete(&self) -> bool {
        self.category != "*" && self.name != "*"
    }
}

fn part_matches(pattern: &str, value: &str) -> bool {
    pattern == "*" || pattern == value
}

/// Split the leading operator off a constraint tail.
fn split_operator(tail: &str) -> Result<(&str, &str), SelectorError> {
    for op in ["!=", ">=", "<=", "=", ">", "<", "~", "^"] {
        if let Some(rest) = tail.strip_prefix(op) {
            // A second operator character here is a typo like "=>".
            if rest.starts_with(|c| "><=!~^".contains(c)) {
                let bad: String = tail.chars().take_while(|c| "><=!~^".contains(*c)).collect();
                return Err(SelectorError::BadOperator(bad));
            }
            return Ok((op, rest));
        }
    }
    Err(SelectorError::BadOperator(tail.to_string()))
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}{}", self.category, self.name, self.constraint)
    }
}

impl FromStr for Selector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Selector {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Selector {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn pkg(category: &str, name: &str, version: &str) -> Package {
        Package::new(category, name, Version::parse(version).unwrap())
    }

    #[test]
    fn parse_any() {
        let sel = Selector::parse("shells/bash").unwrap();
        assert_eq!(sel.category, "shells");
        assert_eq!(sel.name, "bash");
        assert_eq!(sel.constraint, VersionConstraint::Any);
    }

    #[test_case("shells/bash>=5.0", ">=" ; "gte")]
    #[test_case("shells/bash<=5.0", "<=" ; "lte")]
    #[test_case("shells/bash!=5.0", "!=" ; "ne")]
    #[test_case("shells/bash=5.0", "=" ; "eq")]
    #[test_case("shells/bash>5.0", ">" ; "gt")]
    #[test_case("shells/bash<5.0", "<" ; "lt")]
    #[test_case("shells/bash~5.0", "~" ; "tilde")]
    #[test_case("shells/bash^5.0", "^" ; "caret")]
    fn parse_operators(input: &str, op: &str) {
        let sel = Selector::parse(input).unwrap();
        assert_eq!(sel.constraint.operator(), op);
        assert_eq!(sel.name, "bash");
    }

    #[test]
    fn parse_fingerprint_form() {
        let sel = Selector::parse("system/busybox-1.36.0").unwrap();
        assert_eq!(sel.name, "busybox");
        assert_eq!(
            sel.constraint,
            VersionConstraint::Exact(Version::parse("1.36.0").unwrap())
        );
    }

    #[test]
    fn parse_fingerprint_form_with_dashed_name() {
        let sel = Selector::parse("libs/lib-foo-2.1").unwrap();
        assert_eq!(sel.name, "lib-foo");
        assert_eq!(
            sel.constraint,
            VersionConstraint::Exact(Version::parse("2.1").unwrap())
        );
    }

    #[test]
    fn dashed_name_without_version_is_any() {
        let sel = Selector::parse("libs/lib-foo").unwrap();
        assert_eq!(sel.name, "lib-foo");
        assert_eq!(sel.constraint, VersionConstraint::Any);
    }

    #[test]
    fn parse_wildcards() {
        let sel = Selector::parse("shells/*").unwrap();
        assert!(sel.matches(&pkg("shells", "bash", "5.0")));
        assert!(!sel.matches(&pkg("system", "bash", "5.0")));

        let bare = Selector::parse("bash").unwrap();
        assert_eq!(bare.category, "*");
        assert!(bare.matches(&pkg("shells", "bash", "5.0")));
    }

    #[test]
    fn parse_errors() {
        assert_eq!(Selector::parse(""), Err(SelectorError::Empty));
        assert_eq!(Selector::parse("shells/"), Err(SelectorError::Empty));
        assert!(matches!(
            Selector::parse("shells/bash=>5.0"),
            Err(SelectorError::BadOperator(_))
        ));
        assert!(matches!(
            Selector::parse("shells/bash>=banana"),
            Err(SelectorError::UnknownRange(_))
        ));
    }

    #[test]
    fn matches_version_constraint() {
        let sel = Selector::parse("shells/bash>=5.0").unwrap();
        assert!(sel.matches(&pkg("shells", "bash", "5.1")));
        assert!(!sel.matches(&pkg("shells", "bash", "4.4")));
        assert!(!sel.matches(&pkg("shells", "zsh", "5.1")));
    }

    #[test]
    fn fingerprint_roundtrip_matches_exactly() {
        let package = pkg("system", "busybox", "1.36.0");
        let other = pkg("system", "busybox", "1.36.1");
        let sel = Selector::parse(package.fingerprint().as_str()).unwrap();
        assert!(sel.matches(&package));
        assert!(!sel.matches(&other));
    }

    #[test]
    fn display_reparses() {
        for input in ["shells/bash", "shells/bash>=5.0", "libs/lib-foo~2.1"] {
            let sel = Selector::parse(input).unwrap();
            let reparsed = Selector::parse(&sel.to_string()).unwrap();
            assert_eq!(sel, reparsed);
        }
    }
}
