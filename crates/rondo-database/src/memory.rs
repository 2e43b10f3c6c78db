//! In-memory package database.

use crate::error::{DatabaseError, Result};
use crate::{PackageDatabase, Record};
use dashmap::DashMap;
use rondo_core::{FileManifest, Fingerprint, Package, Selector};

/// Package store backed by concurrent hash maps.
///
/// Indexes: by fingerprint, by `(category, name)`, and by provided
/// `(category, name)` so selector queries stay cheap.
#[derive(Debug, Default)]
pub struct InMemoryDatabase {
    records: DashMap<Fingerprint, Record>,
    by_name: DashMap<(String, String), Vec<Fingerprint>>,
    by_provide: DashMap<(String, String), Vec<Fingerprint>>,
    by_file: DashMap<String, Fingerprint>,
}

impl InMemoryDatabase {
    /// Create an empty database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a database pre-populated with packages.
    pub fn with_packages(packages: impl IntoIterator<Item = Package>) -> Result<Self> {
        let db = Self::new();
        for package in packages {
            db.create(package)?;
        }
        Ok(db)
    }

    fn index_keys(package: &Package) -> (Vec<(String, String)>, (String, String)) {
        let provides = package
            .provides
            .iter()
            .filter(|sel| sel.is_concrete())
            .map(|sel| (sel.category.clone(), sel.name.clone()))
            .collect();
        (provides, package.family())
    }

    fn drop_from_index(index: &DashMap<(String, String), Vec<Fingerprint>>, key: &(String, String), fp: &Fingerprint) {
        if let Some(mut list) = index.get_mut(key) {
            list.retain(|candidate| candidate != fp);
            let empty = list.is_empty();
            drop(list);
            if empty {
                index.remove_if(key, |_, v| v.is_empty());
            }
        }
    }

    /// Packages whose `(category, name)` could match the selector. With a
    /// wildcard selector this falls back to a full scan.
    fn name_candidates(&self, selector: &Selector) -> Vec<Fingerprint> {
        if selector.is_concrete() {
            self.by_name
                .get(&(selector.category.clone(), selector.name.clone()))
                .map(|v| v.clone())
                .unwrap_or_default()
        } else {
            self.records.iter().map(|r| r.key().clone()).collect()
        }
    }
}

impl PackageDatabase for InMemoryDatabase {
    fn get(&self, fingerprint: &Fingerprint) -> Option<Package> {
        self.records.get(fingerprint).map(|r| r.package.clone())
    }

    fn find_by_name(&self, category: &str, name: &str) -> Vec<Package> {
        let mut out: Vec<Package> = self
            .by_name
            .get(&(category.to_string(), name.to_string()))
            .map(|fps| {
                fps.iter()
                    .filter_map(|fp| self.get(fp))
                    .collect()
            })
            .unwrap_or_default();
        out.sort_by(|a, b| a.version.cmp(&b.version));
        out
    }

    fn query(&self, selector: &Selector) -> Vec<Package> {
        let mut out: Vec<Package> = self
            .name_candidates(selector)
            .iter()
            .filter_map(|fp| self.get(fp))
            .filter(|p| selector.matches(p))
            .collect();
        out.sort_by_key(Package::fingerprint);
        out
    }

    fn providers_of(&self, selector: &Selector) -> Vec<Package> {
        let fps: Vec<Fingerprint> = if selector.is_concrete() {
            self.by_provide
                .get(&(selector.category.clone(), selector.name.clone()))
                .map(|v| v.clone())
                .unwrap_or_default()
        } else {
            self.records.iter().map(|r| r.key().clone()).collect()
        };

        let mut out: Vec<Package> = fps
            .iter()
            .filter_map(|fp| self.get(fp))
            .filter(|p| p.provides.iter().any(|provided| provided_matches(provided, selector)))
            .collect();
        out.sort_by_key(Package::fingerprint);
        out.dedup_by_key(|p| p.fingerprint());
        out
    }

    fn create(&self, package: Package) -> Result<Fingerprint> {
        package.validate()?;
        let fp = package.fingerprint();
        let (provides, family) = Self::index_keys(&package);

        // Replace any previous record under the same fingerprint.
        if self.records.contains_key(&fp) {
            self.remove(&fp)?;
        }

        self.by_name.entry(family).or_default().push(fp.clone());
        for key in provides {
            self.by_provide.entry(key).or_default().push(fp.clone());
        }
        self.records.insert(fp.clone(), Record::new(package));
        Ok(fp)
    }

    fn remove(&self, fingerprint: &Fingerprint) -> Result<()> {
        let (_, record) = self
            .records
            .remove(fingerprint)
            .ok_or_else(|| DatabaseError::NotFound(fingerprint.clone()))?;

        let (provides, family) = Self::index_keys(&record.package);
        Self::drop_from_index(&self.by_name, &family, fingerprint);
        for key in &provides {
            Self::drop_from_index(&self.by_provide, key, fingerprint);
        }
        for entry in &record.files.files {
            self.by_file
                .remove_if(&entry.path, |_, owner| owner == fingerprint);
        }
        Ok(())
    }

    fn files_of(&self, fingerprint: &Fingerprint) -> Option<FileManifest> {
        self.records
            .get(fingerprint)
            .map(|r| r.files.clone())
            .filter(|m| !m.is_empty())
    }

    fn set_files(&self, fingerprint: &Fingerprint, manifest: FileManifest) -> Result<()> {
        let mut record = self
            .records
            .get_mut(fingerprint)
            .ok_or_else(|| DatabaseError::NotFound(fingerprint.clone()))?;
        for entry in &record.files.files {
            self.by_file
                .remove_if(&entry.path, |_, owner| owner == fingerprint);
        }
        for entry in &manifest.files {
            self.by_file.insert(entry.path.clone(), fingerprint.clone());
        }
        record.files = manifest;
        Ok(())
    }

    fn all(&self) -> Vec<Package> {
        let mut out: Vec<Package> = self.records.iter().map(|r| r.package.clone()).collect();
        out.sort_by_key(Package::fingerprint);
        out
    }

    fn owner_of(&self, path: &str) -> Option<Fingerprint> {
        self.by_file.get(path).map(|fp| fp.clone())
    }

    fn mark_broken(&self, fingerprint: &Fingerprint, broken: bool) -> Result<()> {
        let mut record = self
            .records
            .get_mut(fingerprint)
            .ok_or_else(|| DatabaseError::NotFound(fingerprint.clone()))?;
        record.broken = broken;
        Ok(())
    }

    fn broken(&self) -> Vec<Fingerprint> {
        let mut out: Vec<Fingerprint> = self
            .records
            .iter()
            .filter(|r| r.broken)
            .map(|r| r.key().clone())
            .collect();
        out.sort();
        out
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}

/// Whether a `provides` declaration satisfies a selector. The provider's
/// declared category/name must match the selector's pattern; when the
/// declaration pins a version, the selector constraint is checked against
/// it, otherwise the declaration stands for every version.
fn provided_matches(provided: &Selector, wanted: &Selector) -> bool {
    let name_ok = (wanted.category == "*" || wanted.category == provided.category)
        && (wanted.name == "*" || wanted.name == provided.name);
    if !name_ok {
        return false;
    }
    match provided.constraint.version() {
        Some(version) => wanted.constraint.matches(version),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rondo_core::{FileEntry, Version};

    fn pkg(fp: &str) -> Package {
        let sel = Selector::parse(fp).unwrap();
        let version = sel.constraint.version().cloned().unwrap();
        Package::new(sel.category, sel.name, version)
    }

    #[test]
    fn create_and_get() {
        let db = InMemoryDatabase::new();
        let fp = db.create(pkg("system/busybox-1.36.0")).unwrap();
        assert_eq!(fp.as_str(), "system/busybox-1.36.0");
        assert!(db.contains(&fp));
        assert_eq!(db.get(&fp).unwrap().name, "busybox");
    }

    #[test]
    fn create_rejects_invalid_packages() {
        let db = InMemoryDatabase::new();

        let mut contradictory = pkg("apps/foo-1.0");
        let sel = Selector::parse("libs/bar>=1").unwrap();
        contradictory.requires.push(sel.clone());
        contradictory.conflicts.push(sel);
        assert!(matches!(
            db.create(contradictory),
            Err(DatabaseError::Invalid(_))
        ));

        let mut self_provider = pkg("apps/foo-1.0");
        self_provider
            .provides
            .push(Selector::parse("apps/foo-1.0").unwrap());
        assert!(matches!(
            db.create(self_provider),
            Err(DatabaseError::Invalid(_))
        ));

        assert!(db.is_empty());
    }

    #[test]
    fn find_by_name_sorted_by_version() {
        let db = InMemoryDatabase::with_packages([
            pkg("libs/zlib-1.3"),
            pkg("libs/zlib-1.2.11"),
            pkg("libs/zlib-1.2.13"),
        ])
        .unwrap();
        let versions: Vec<String> = db
            .find_by_name("libs", "zlib")
            .iter()
            .map(|p| p.version.to_string())
            .collect();
        assert_eq!(versions, vec!["1.2.11", "1.2.13", "1.3"]);
    }

    #[test]
    fn query_honors_constraint() {
        let db = InMemoryDatabase::with_packages([
            pkg("libs/libx-1.0"),
            pkg("libs/libx-2.0"),
        ])
        .unwrap();
        let sel = Selector::parse("libs/libx>=2").unwrap();
        let hits = db.query(&sel);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].version, Version::parse("2.0").unwrap());
    }

    #[test]
    fn providers_resolve_virtuals() {
        let mut provider = pkg("shells/dash-0.5");
        provider
            .provides
            .push(Selector::parse("virtual/sh").unwrap());
        let db = InMemoryDatabase::with_packages([provider]).unwrap();

        let sel = Selector::parse("virtual/sh").unwrap();
        assert!(db.query(&sel).is_empty());
        let providers = db.providers_of(&sel);
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].name, "dash");

        let all = crate::candidates(&db, &sel);
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn versioned_provide_respects_constraint() {
        let mut provider = pkg("shells/dash-0.5");
        provider
            .provides
            .push(Selector::parse("virtual/sh-1.0").unwrap());
        let db = InMemoryDatabase::with_packages([provider]).unwrap();

        assert_eq!(
            db.providers_of(&Selector::parse("virtual/sh>=0.9").unwrap())
                .len(),
            1
        );
        assert!(db
            .providers_of(&Selector::parse("virtual/sh>=2").unwrap())
            .is_empty());
    }

    #[test]
    fn remove_clears_indexes() {
        let db = InMemoryDatabase::new();
        let fp = db.create(pkg("system/busybox-1.36.0")).unwrap();
        db.set_files(
            &fp,
            FileManifest::new(vec![FileEntry {
                path: "bin/busybox".to_string(),
                digest: "00".to_string(),
                mode: 0o755,
            }]),
        )
        .unwrap();
        assert_eq!(db.owner_of("bin/busybox"), Some(fp.clone()));

        db.remove(&fp).unwrap();
        assert!(db.get(&fp).is_none());
        assert!(db.owner_of("bin/busybox").is_none());
        assert!(db.find_by_name("system", "busybox").is_empty());
    }

    #[test]
    fn broken_marker() {
        let db = InMemoryDatabase::new();
        let fp = db.create(pkg("apps/foo-1.0")).unwrap();
        assert!(db.broken().is_empty());
        db.mark_broken(&fp, true).unwrap();
        assert_eq!(db.broken(), vec![fp.clone()]);
        db.mark_broken(&fp, false).unwrap();
        assert!(db.broken().is_empty());
    }

    #[test]
    fn all_is_sorted_by_fingerprint() {
        let db = InMemoryDatabase::with_packages([
            pkg("b/two-1.0"),
            pkg("a/one-1.0"),
            pkg("c/three-1.0"),
        ])
        .unwrap();
        let fps: Vec<String> = db.all().iter().map(|p| p.fingerprint().to_string()).collect();
        assert_eq!(fps, vec!["a/one-1.0", "b/two-1.0", "c/three-1.0"]);
    }
}
