//! Package model: identity, fingerprints and file-ownership manifests.

use crate::selector::Selector;
use crate::version::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Label key marking a package as essential system data. Removal of such
/// packages is refused when `preserve_system_essential_data` is set.
pub const ESSENTIAL_LABEL: &str = "rondo.system.essential";

/// Package invariant violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PackageError {
    /// A selector appears in both requires and conflicts.
    #[error("package '{package}' both requires and conflicts '{selector}'")]
    RequireConflict {
        /// Offending package fingerprint.
        package: Fingerprint,
        /// The contradictory selector.
        selector: String,
    },

    /// A provides entry references the package itself.
    #[error("package '{package}' provides its own fingerprint")]
    SelfProvide {
        /// Offending package fingerprint.
        package: Fingerprint,
    },
}

/// Canonical string identifier of a package version: `category/name-version`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap a raw fingerprint string.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The fingerprint as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&Fingerprint> for Fingerprint {
    fn from(fp: &Fingerprint) -> Self {
        fp.clone()
    }
}

/// A single file owned by an installed package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path relative to the target root, forward slashes.
    pub path: String,
    /// Hex BLAKE3 digest of the file content.
    pub digest: String,
    /// Unix permission bits.
    pub mode: u32,
}

/// The complete file list an installed package owns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileManifest {
    /// Owned files.
    pub files: Vec<FileEntry>,
}

impl FileManifest {
    /// Manifest over the given entries.
    #[must_use]
    pub fn new(files: Vec<FileEntry>) -> Self {
        Self { files }
    }

    /// Paths only.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|f| f.path.as_str())
    }

    /// Number of owned files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the manifest is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// A package definition.
///
/// Identity is the `(category, name, version)` triple. Packages are
/// immutable once read from a database; the executor never mutates them in
/// place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    /// Package category.
    pub category: String,
    /// Package name.
    pub name: String,
    /// Package version.
    pub version: Version,
    /// Selectors that must resolve to an installed package.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<Selector>,
    /// Selectors that must not resolve to an installed package.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<Selector>,
    /// Selectors this package virtually satisfies.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provides: Vec<Selector>,
    /// Free-form labels, opaque to the core except for [`ESSENTIAL_LABEL`].
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Opaque annotations carried through unchanged.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub annotations: serde_json::Value,
    /// Human description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Upstream URIs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uri: Vec<String>,
    /// License identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
}

impl Package {
    /// Build a package with no constraint edges.
    #[must_use]
    pub fn new(category: impl Into<String>, name: impl Into<String>, version: Version) -> Self {
        Self {
            category: category.into(),
            name: name.into(),
            version,
            requires: Vec::new(),
            conflicts: Vec::new(),
            provides: Vec::new(),
            labels: BTreeMap::new(),
            annotations: serde_json::Value::Null,
            description: None,
            uri: Vec::new(),
            license: None,
        }
    }

    /// The deterministic fingerprint `category/name-version`.
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint(format!("{}/{}-{}", self.category, self.name, self.version))
    }

    /// The `(category, name)` family key.
    #[must_use]
    pub fn family(&self) -> (String, String) {
        (self.category.clone(), self.name.clone())
    }

    /// Whether this package carries the essential-data label.
    #[must_use]
    pub fn is_essential(&self) -> bool {
        self.labels
            .get(ESSENTIAL_LABEL)
            .is_some_and(|v| v == "true")
    }

    /// Whether another package has the same `(category, name)` pair.
    #[must_use]
    pub fn same_family(&self, other: &Self) -> bool {
        self.category == other.category && self.name == other.name
    }

    /// Check the package invariants: no selector in both requires and
    /// conflicts, and no provides entry naming the package itself.
    pub fn validate(&self) -> Result<(), PackageError> {
        let fp = self.fingerprint();
        for req in &self.requires {
            if self.conflicts.contains(req) {
                return Err(PackageError::RequireConflict {
                    package: fp,
                    selector: req.to_string(),
                });
            }
        }
        for provide in &self.provides {
            if provide.matches(self) {
                return Err(PackageError::SelfProvide { package: fp });
            }
        }
        Ok(())
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fingerprint())
    }
}
