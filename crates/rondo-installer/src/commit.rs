//! Commit phase: serial application of steps under the transaction lock.
//!
//! Steps mutate the rootfs and the system database together: a step is
//! durable only once its files are placed, the touched directories synced,
//! and the database record written (the database stages and fsyncs its own
//! writes). On failure every completed step of this transaction is unwound
//! in reverse; removals that cannot be restored leave the package marked
//! broken in the database.

use crate::error::{InstallerError, Result};
use crate::options::InstallerOptions;
use crate::plan::Step;
use crate::protect::{ConfigProtect, protected_sibling};
use crate::stage::StagedArtifact;
use crate::system::System;
use ahash::AHashSet;
use rondo_core::{Context, FileEntry, FileManifest, Package};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// What a finished commit applied.
#[derive(Debug)]
pub struct CommitOutcome {
    /// Steps applied, in order.
    pub applied: Vec<Step>,
}

/// Bookkeeping for unwinding one applied (or partially applied) step.
#[derive(Debug)]
struct AppliedStep {
    step: Step,
    /// Files placed into the rootfs so far.
    placed: FileManifest,
    /// Removed package and its manifest, for broken-marker restoration.
    removed_old: Option<(Package, FileManifest)>,
    /// Whether the new package's database record exists.
    record_created: bool,
}

impl AppliedStep {
    fn new(step: Step) -> Self {
        Self {
            step,
            placed: FileManifest::default(),
            removed_old: None,
            record_created: false,
        }
    }
}

/// Apply the steps serially. The caller holds the transaction lock.
///
/// Cancellation is honored between steps only: the step in flight always
/// runs to its boundary.
pub fn commit(
    ctx: &Context,
    system: &System,
    steps: Vec<(Step, Option<StagedArtifact>)>,
    protect: &ConfigProtect,
    options: &InstallerOptions,
) -> Result<CommitOutcome> {
    let mut applied: Vec<AppliedStep> = Vec::new();

    for (step, stage) in steps {
        if ctx.is_cancelled() {
            return Err(unwind(system, applied, InstallerError::Interrupted));
        }

        debug!(step = %step.describe(), "commit step starting");
        applied.push(AppliedStep::new(step));
        let current = applied
            .last_mut()
            .unwrap_or_else(|| unreachable!("just pushed"));

        if let Err(err) = apply_step(system, current, stage.as_ref(), protect, options) {
            return Err(unwind(system, applied, err));
        }
    }

    info!(steps = applied.len(), "commit complete");
    Ok(CommitOutcome {
        applied: applied.into_iter().map(|a| a.step).collect(),
    })
}

fn apply_step(
    system: &System,
    applied: &mut AppliedStep,
    stage: Option<&StagedArtifact>,
    protect: &ConfigProtect,
    options: &InstallerOptions,
) -> Result<()> {
    let step = applied.step.clone();
    match step {
        Step::Uninstall(old) => {
            let manifest = system.database.files_of(&old.fingerprint()).unwrap_or_default();
            remove_files(&system.target, &manifest, protect)?;
            system.database.remove(&old.fingerprint())?;
            applied.removed_old = Some((old, manifest));
        }
        Step::Install(new) => {
            let stage = stage.ok_or_else(|| InstallerError::Broken {
                fingerprint: new.fingerprint(),
                message: "no staged artifact for install step".to_string(),
            })?;
            check_conflicts(system, &stage.manifest, None, &new, options)?;
            place_files(system, applied, stage, protect)?;
            system.database.create(new.clone())?;
            applied.record_created = true;
            system
                .database
                .set_files(&new.fingerprint(), applied.placed.clone())?;
        }
        Step::Upgrade { from, to } => {
            let stage = stage.ok_or_else(|| InstallerError::Broken {
                fingerprint: to.fingerprint(),
                message: "no staged artifact for upgrade step".to_string(),
            })?;
            check_conflicts(system, &stage.manifest, Some(&from), &to, options)?;

            let old_manifest = system
                .database
                .files_of(&from.fingerprint())
                .unwrap_or_default();
            remove_files(&system.target, &old_manifest, protect)?;
            system.database.remove(&from.fingerprint())?;
            applied.removed_old = Some((from, old_manifest));

            place_files(system, applied, stage, protect)?;
            system.database.create(to.clone())?;
            applied.record_created = true;
            system
                .database
                .set_files(&to.fingerprint(), applied.placed.clone())?;
        }
    }
    Ok(())
}

/// File-conflict set: any staged path owned by an installed package other
/// than the one this step replaces aborts the transaction unless `force`.
fn check_conflicts(
    system: &System,
    manifest: &FileManifest,
    replacing: Option<&Package>,
    incoming: &Package,
    options: &InstallerOptions,
) -> Result<()> {
    if options.force {
        return Ok(());
    }
    let replaced_fp = replacing.map(Package::fingerprint);
    for path in manifest.paths() {
        if let Some(owner) = system.database.owner_of(path)
            && Some(&owner) != replaced_fp.as_ref()
        {
            return Err(InstallerError::FileConflict {
                path: path.to_string(),
                owner,
                newowner: incoming.fingerprint(),
            });
        }
    }
    Ok(())
}

/// Remove an uninstalled package's files, leaving protected paths alone.
fn remove_files(target: &Path, manifest: &FileManifest, protect: &ConfigProtect) -> Result<()> {
    for entry in &manifest.files {
        if protect.is_protected(&entry.path) {
            debug!(path = entry.path, "config-protect: keeping file");
            continue;
        }
        let path = target.join(&entry.path);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(InstallerError::io(&path, &e)),
        }
    }
    Ok(())
}

/// Move staged files into the rootfs. Protected paths that already exist
/// on disk are written to their `.new` sibling instead; the manifest
/// records what actually landed. Placement is incremental so a failure
/// leaves an accurate record for unwinding.
fn place_files(
    system: &System,
    applied: &mut AppliedStep,
    stage: &StagedArtifact,
    protect: &ConfigProtect,
) -> Result<()> {
    let mut touched_dirs: AHashSet<PathBuf> = AHashSet::new();

    for entry in &stage.manifest.files {
        let src = stage.dir.path().join(&entry.path);

        let final_rel = if protect.is_protected(&entry.path)
            && system.target.join(&entry.path).exists()
        {
            let sibling = protected_sibling(&entry.path);
            debug!(path = entry.path, sibling, "config-protect: diverting");
            sibling
        } else {
            entry.path.clone()
        };
        let dst = system.target.join(&final_rel);

        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent).map_err(|e| InstallerError::io(parent, &e))?;
            touched_dirs.insert(parent.to_path_buf());
        }

        move_into_place(&src, &dst)?;
        applied.placed.files.push(FileEntry {
            path: final_rel,
            digest: entry.digest.clone(),
            mode: entry.mode,
        });
    }

    sync_dirs(&touched_dirs);
    Ok(())
}

/// Rename when possible (stage lives under the target root, so this is the
/// common case); fall back to copy for cross-device setups.
fn move_into_place(src: &Path, dst: &Path) -> Result<()> {
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(src, dst).map_err(|e| InstallerError::io(dst, &e))?;
            fs::remove_file(src).map_err(|e| InstallerError::io(src, &e))?;
            Ok(())
        }
    }
}

#[cfg(unix)]
fn sync_dirs(dirs: &AHashSet<PathBuf>) {
    for dir in dirs {
        if let Ok(handle) = fs::File::open(dir) {
            let _ = handle.sync_all();
        }
    }
}

#[cfg(not(unix))]
fn sync_dirs(_dirs: &AHashSet<PathBuf>) {}

/// Best-effort reverse unwind of this transaction's applied steps.
///
/// Installed files and records come back out cleanly; removals cannot be
/// restored from nothing, so their packages are re-recorded with the
/// broken marker set.
fn unwind(system: &System, applied: Vec<AppliedStep>, cause: InstallerError) -> InstallerError {
    warn!(
        steps = applied.len(),
        cause = %cause,
        "commit failed, unwinding transaction"
    );

    for record in applied.into_iter().rev() {
        for entry in &record.placed.files {
            let path = system.target.join(&entry.path);
            let _ = fs::remove_file(&path);
        }
        if record.record_created
            && let Some(target) = record.step.target()
        {
            let _ = system.database.remove(&target.fingerprint());
        }
        if let Some((old, manifest)) = record.removed_old {
            let fingerprint = old.fingerprint();
            let restored = system
                .database
                .create(old)
                .and_then(|_| system.database.set_files(&fingerprint, manifest))
                .and_then(|()| system.database.mark_broken(&fingerprint, true));
            match restored {
                Ok(()) => warn!(package = %fingerprint, "package marked broken after unwind"),
                Err(e) => warn!(package = %fingerprint, error = %e, "could not restore record"),
            }
        }
    }

    cause
}
