//! On-disk package database.
//!
//! Layout under the database directory:
//!
//! ```text
//! db/
//!   records/<category>__<name>-<version>.json   one record per package
//!   index.json                                  (category,name) -> fingerprints
//! ```
//!
//! Every write is staged to a `.tmp` sibling, fsynced, then renamed into
//! place so the database stays readable across a process crash. Opening the
//! database sweeps orphaned temp files left by a crashed writer.

use crate::error::{DatabaseError, Result};
use crate::memory::InMemoryDatabase;
use crate::{PackageDatabase, Record};
use parking_lot::Mutex;
use rondo_core::{FileManifest, Fingerprint, Package, Selector};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const RECORDS_DIR: &str = "records";
const INDEX_FILE: &str = "index.json";
const TEMP_SUFFIX: &str = ".tmp";

/// Persistent package database with an in-memory read mirror.
///
/// Reads are served from the mirror; every mutation is written through to
/// disk before the mirror is updated, under a single writer mutex.
#[derive(Debug)]
pub struct FilesystemDatabase {
    root: PathBuf,
    mirror: InMemoryDatabase,
    write_lock: Mutex<()>,
}

impl FilesystemDatabase {
    /// Open (or initialize) a database directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let records_dir = root.join(RECORDS_DIR);
        fs::create_dir_all(&records_dir).map_err(|e| DatabaseError::io(&records_dir, &e))?;

        recover(&records_dir)?;
        recover(&root)?;

        let mirror = InMemoryDatabase::new();
        let mut loaded = 0usize;
        for entry in fs::read_dir(&records_dir).map_err(|e| DatabaseError::io(&records_dir, &e))? {
            let entry = entry.map_err(|e| DatabaseError::io(&records_dir, &e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let record = read_record(&path)?;
            let fp = record.package.fingerprint();
            mirror.create(record.package.clone())?;
            if !record.files.is_empty() {
                mirror.set_files(&fp, record.files.clone())?;
            }
            if record.broken {
                mirror.mark_broken(&fp, true)?;
            }
            loaded += 1;
        }

        debug!(path = %root.display(), packages = loaded, "opened system database");

        Ok(Self {
            root,
            mirror,
            write_lock: Mutex::new(()),
        })
    }

    /// The database directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.root
            .join(RECORDS_DIR)
            .join(format!("{}.json", sanitize(fingerprint.as_str())))
    }

    fn load_record(&self, fingerprint: &Fingerprint) -> Result<Record> {
        read_record(&self.record_path(fingerprint))
    }

    fn store_record(&self, record: &Record) -> Result<()> {
        let path = self.record_path(&record.package.fingerprint());
        let bytes = serde_json::to_vec_pretty(record).map_err(|e| DatabaseError::Corrupt {
            path: path.clone(),
            message: e.to_string(),
        })?;
        staged_write(&path, &bytes)
    }

    fn write_index(&self) -> Result<()> {
        let mut index: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for package in self.mirror.all() {
            index
                .entry(format!("{}/{}", package.category, package.name))
                .or_default()
                .push(package.fingerprint().to_string());
        }
        let path = self.root.join(INDEX_FILE);
        let bytes = serde_json::to_vec_pretty(&index).map_err(|e| DatabaseError::Corrupt {
            path: path.clone(),
            message: e.to_string(),
        })?;
        staged_write(&path, &bytes)
    }
}

impl PackageDatabase for FilesystemDatabase {
    fn get(&self, fingerprint: &Fingerprint) -> Option<Package> {
        self.mirror.get(fingerprint)
    }

    fn find_by_name(&self, category: &str, name: &str) -> Vec<Package> {
        self.mirror.find_by_name(category, name)
    }

    fn query(&self, selector: &Selector) -> Vec<Package> {
        self.mirror.query(selector)
    }

    fn providers_of(&self, selector: &Selector) -> Vec<Package> {
        self.mirror.providers_of(selector)
    }

    fn create(&self, package: Package) -> Result<Fingerprint> {
        // Reject invalid definitions before anything is staged to disk.
        package.validate()?;
        let _guard = self.write_lock.lock();
        let record = Record::new(package.clone());
        self.store_record(&record)?;
        let fp = self.mirror.create(package)?;
        self.write_index()?;
        Ok(fp)
    }

    fn remove(&self, fingerprint: &Fingerprint) -> Result<()> {
        let _guard = self.write_lock.lock();
        let path = self.record_path(fingerprint);
        if !path.exists() {
            return Err(DatabaseError::NotFound(fingerprint.clone()));
        }
        fs::remove_file(&path).map_err(|e| DatabaseError::io(&path, &e))?;
        self.mirror.remove(fingerprint)?;
        self.write_index()
    }

    fn files_of(&self, fingerprint: &Fingerprint) -> Option<FileManifest> {
        self.mirror.files_of(fingerprint)
    }

    fn set_files(&self, fingerprint: &Fingerprint, manifest: FileManifest) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut record = self.load_record(fingerprint)?;
        record.files = manifest.clone();
        self.store_record(&record)?;
        self.mirror.set_files(fingerprint, manifest)
    }

    fn all(&self) -> Vec<Package> {
        self.mirror.all()
    }

    fn owner_of(&self, path: &str) -> Option<Fingerprint> {
        self.mirror.owner_of(path)
    }

    fn mark_broken(&self, fingerprint: &Fingerprint, broken: bool) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut record = self.load_record(fingerprint)?;
        record.broken = broken;
        self.store_record(&record)?;
        self.mirror.mark_broken(fingerprint, broken)
    }

    fn broken(&self) -> Vec<Fingerprint> {
        self.mirror.broken()
    }

    fn len(&self) -> usize {
        self.mirror.len()
    }
}

/// Record filenames cannot contain the path separator.
fn sanitize(fingerprint: &str) -> String {
    fingerprint.replace('/', "__")
}

fn read_record(path: &Path) -> Result<Record> {
    let raw = fs::read(path).map_err(|e| DatabaseError::io(path, &e))?;
    serde_json::from_slice(&raw).map_err(|e| DatabaseError::Corrupt {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Temp file + fsync + rename, then fsync the parent directory so the
/// rename itself is durable.
fn staged_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension(format!(
        "{}{TEMP_SUFFIX}",
        path.extension().and_then(|e| e.to_str()).unwrap_or("json")
    ));
    {
        let mut file = File::create(&tmp).map_err(|e| DatabaseError::io(&tmp, &e))?;
        file.write_all(bytes).map_err(|e| DatabaseError::io(&tmp, &e))?;
        file.sync_all().map_err(|e| DatabaseError::io(&tmp, &e))?;
    }
    fs::rename(&tmp, path).map_err(|e| DatabaseError::io(path, &e))?;

    #[cfg(unix)]
    if let Some(parent) = path.parent()
        && let Ok(dir) = File::open(parent)
    {
        let _ = dir.sync_all();
    }

    Ok(())
}

/// Remove temp files left behind by a crashed writer.
fn recover(dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(dir).map_err(|e| DatabaseError::io(dir, &e))? {
        let entry = entry.map_err(|e| DatabaseError::io(dir, &e))?;
        let path = entry.path();
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if name.ends_with(TEMP_SUFFIX) {
            warn!(path = %path.display(), "removing orphaned temp file");
            fs::remove_file(&path).map_err(|e| DatabaseError::io(&path, &e))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rondo_core::FileEntry;

    fn pkg(fp: &str) -> Package {
        let sel = Selector::parse(fp).unwrap();
        let version = sel.constraint.version().cloned().unwrap();
        Package::new(sel.category, sel.name, version)
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let db = FilesystemDatabase::open(dir.path()).unwrap();
            let fp = db.create(pkg("system/busybox-1.36.0")).unwrap();
            db.set_files(
                &fp,
                FileManifest::new(vec![FileEntry {
                    path: "bin/busybox".to_string(),
                    digest: "aa".to_string(),
                    mode: 0o755,
                }]),
            )
            .unwrap();
        }

        let db = FilesystemDatabase::open(dir.path()).unwrap();
        let fp = Fingerprint::new("system/busybox-1.36.0");
        assert!(db.contains(&fp));
        assert_eq!(db.files_of(&fp).unwrap().len(), 1);
        assert_eq!(db.owner_of("bin/busybox"), Some(fp));
    }

    #[test]
    fn remove_deletes_record_file() {
        let dir = tempfile::tempdir().unwrap();
        let db = FilesystemDatabase::open(dir.path()).unwrap();
        let fp = db.create(pkg("apps/foo-1.0")).unwrap();
        assert!(dir.path().join("records/apps__foo-1.0.json").exists());

        db.remove(&fp).unwrap();
        assert!(!dir.path().join("records/apps__foo-1.0.json").exists());

        let reopened = FilesystemDatabase::open(dir.path()).unwrap();
        assert!(reopened.is_empty());
    }

    #[test]
    fn create_rejects_invalid_packages_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let db = FilesystemDatabase::open(dir.path()).unwrap();

        let mut bad = pkg("apps/foo-1.0");
        bad.provides.push(Selector::parse("apps/foo-1.0").unwrap());
        assert!(matches!(db.create(bad), Err(DatabaseError::Invalid(_))));

        // Nothing was staged or recorded.
        assert!(!dir.path().join("records/apps__foo-1.0.json").exists());
        assert!(db.is_empty());
    }

    #[test]
    fn open_sweeps_orphaned_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("records")).unwrap();
        fs::write(dir.path().join("records/partial.json.tmp"), b"{").unwrap();

        let db = FilesystemDatabase::open(dir.path()).unwrap();
        assert!(db.is_empty());
        assert!(!dir.path().join("records/partial.json.tmp").exists());
    }

    #[test]
    fn broken_marker_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let db = FilesystemDatabase::open(dir.path()).unwrap();
            let fp = db.create(pkg("apps/foo-1.0")).unwrap();
            db.mark_broken(&fp, true).unwrap();
        }
        let db = FilesystemDatabase::open(dir.path()).unwrap();
        assert_eq!(db.broken(), vec![Fingerprint::new("apps/foo-1.0")]);
    }

    #[test]
    fn index_file_lists_families() {
        let dir = tempfile::tempdir().unwrap();
        let db = FilesystemDatabase::open(dir.path()).unwrap();
        db.create(pkg("libs/zlib-1.2")).unwrap();
        db.create(pkg("libs/zlib-1.3")).unwrap();

        let raw = fs::read_to_string(dir.path().join("index.json")).unwrap();
        let index: BTreeMap<String, Vec<String>> = serde_json::from_str(&raw).unwrap();
        assert_eq!(index["libs/zlib"].len(), 2);
    }
}
