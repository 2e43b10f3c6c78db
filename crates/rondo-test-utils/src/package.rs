//! Package builder for tests.

use rondo_core::{Package, Selector};

/// Start building a package from a fingerprint string like
/// `"system/busybox-1.36.0"`.
///
/// # Panics
/// Panics on malformed fingerprints; fixtures are static test data.
#[must_use]
pub fn package(fingerprint: &str) -> PackageBuilder {
    let selector = Selector::parse(fingerprint).expect("fixture fingerprint must parse");
    let version = selector
        .constraint
        .version()
        .cloned()
        .expect("fixture fingerprint must pin a version");
    PackageBuilder {
        package: Package::new(selector.category, selector.name, version),
    }
}

/// Fluent builder over [`Package`].
#[derive(Debug)]
pub struct PackageBuilder {
    package: Package,
}

impl PackageBuilder {
    /// Add a requirement.
    #[must_use]
    pub fn requires(mut self, selector: &str) -> Self {
        self.package
            .requires
            .push(Selector::parse(selector).expect("fixture selector must parse"));
        self
    }

    /// Add a conflict.
    #[must_use]
    pub fn conflicts(mut self, selector: &str) -> Self {
        self.package
            .conflicts
            .push(Selector::parse(selector).expect("fixture selector must parse"));
        self
    }

    /// Add a provides entry.
    #[must_use]
    pub fn provides(mut self, selector: &str) -> Self {
        self.package
            .provides
            .push(Selector::parse(selector).expect("fixture selector must parse"));
        self
    }

    /// Add a label.
    #[must_use]
    pub fn label(mut self, key: &str, value: &str) -> Self {
        self.package.labels.insert(key.to_string(), value.to_string());
        self
    }

    /// Mark the package essential.
    #[must_use]
    pub fn essential(self) -> Self {
        self.label(rondo_core::package::ESSENTIAL_LABEL, "true")
    }

    /// Finish building.
    #[must_use]
    pub fn build(self) -> Package {
        self.package
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_from_fingerprint() {
        let p = package("system/busybox-1.36.0")
            .requires("libs/musl")
            .essential()
            .build();
        assert_eq!(p.fingerprint().as_str(), "system/busybox-1.36.0");
        assert_eq!(p.requires.len(), 1);
        assert!(p.is_essential());
    }
}
