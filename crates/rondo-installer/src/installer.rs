//! The installer: operation entry points and the transaction pipeline.

use crate::audit::{self, AuditRecord};
use crate::commit;
use crate::download::{self, DownloadedArtifact};
use crate::error::{InstallerError, Result};
use crate::lock::{LOCK_TIMEOUT, TransactionLock};
use crate::options::InstallerOptions;
use crate::plan::{self, Operation, Step, TransactionPlan};
use crate::protect::ConfigProtect;
use crate::stage::{StagedArtifact, stage_artifact};
use crate::system::System;
use ahash::AHashMap;
use rondo_core::{Context, Fingerprint, Selector, SolverType};
use rondo_repository::{ArtifactResolver, Repository};
use std::sync::Arc;
use tracing::{info, warn};

/// What a transaction did, for callers and the UI.
#[derive(Debug, Clone, Default)]
pub struct TransactionSummary {
    /// Fingerprints installed (including upgrade targets).
    pub installed: Vec<Fingerprint>,
    /// Fingerprints removed (including upgrade sources).
    pub removed: Vec<Fingerprint>,
    /// True when the transaction stopped after populating the cache.
    pub download_only: bool,
}

impl TransactionSummary {
    /// Whether the transaction changed nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.installed.is_empty() && self.removed.is_empty() && !self.download_only
    }

    fn from_steps(steps: &[Step]) -> Self {
        let mut summary = Self::default();
        for step in steps {
            if let Some(target) = step.target() {
                summary.installed.push(target.fingerprint());
            }
            if let Some(removal) = step.removal() {
                summary.removed.push(removal.fingerprint());
            }
        }
        summary
    }
}

/// The transaction executor.
#[derive(Debug)]
pub struct Installer {
    options: InstallerOptions,
    resolver: ArtifactResolver,
}

impl Installer {
    /// Build an installer over the configured repositories.
    #[must_use]
    pub fn new(options: InstallerOptions, repositories: Vec<Arc<dyn Repository>>) -> Self {
        Self {
            options,
            resolver: ArtifactResolver::new(repositories),
        }
    }

    /// The effective options.
    #[must_use]
    pub fn options(&self) -> &InstallerOptions {
        &self.options
    }

    /// Install the targets and their requirements.
    pub async fn install(
        &self,
        ctx: &Context,
        targets: &[Selector],
        system: &System,
    ) -> Result<TransactionSummary> {
        self.execute(ctx, Operation::Install(targets.to_vec()), system, &self.options)
            .await
    }

    /// Remove the targets.
    pub async fn uninstall(
        &self,
        ctx: &Context,
        targets: &[Selector],
        system: &System,
    ) -> Result<TransactionSummary> {
        self.execute(
            ctx,
            Operation::Uninstall(targets.to_vec()),
            system,
            &self.options,
        )
        .await
    }

    /// Move every installed family to its best available version.
    pub async fn upgrade(&self, ctx: &Context, system: &System) -> Result<TransactionSummary> {
        self.execute(ctx, Operation::Upgrade, system, &self.options)
            .await
    }

    /// Atomically replace one package set with another. The solver is
    /// pinned to the deterministic backend so the combined solve is
    /// reproducible.
    pub async fn swap(
        &self,
        ctx: &Context,
        remove: &[Selector],
        add: &[Selector],
        system: &System,
    ) -> Result<TransactionSummary> {
        let mut options = self.options.clone();
        options.solver.solver_type = SolverType::SingleCoreSimple;
        self.execute(
            ctx,
            Operation::Swap {
                remove: remove.to_vec(),
                add: add.to_vec(),
            },
            system,
            &options,
        )
        .await
    }

    /// Run the full pipeline for one operation.
    async fn execute(
        &self,
        ctx: &Context,
        operation: Operation,
        system: &System,
        options: &InstallerOptions,
    ) -> Result<TransactionSummary> {
        // Plan: pure, side-effect free.
        let world = self.resolver.world()?;
        let plan = plan::plan(&operation, &world, system, options)?;
        if plan.is_empty() {
            info!(operation = operation.name(), "nothing to do");
            return Ok(TransactionSummary::default());
        }

        for step in &plan.steps {
            info!(step = %step.describe(), "planned");
        }

        if options.ask && !options.yes && !confirm(&plan)? {
            return Err(InstallerError::Interrupted);
        }

        // Download: everything fetched and verified before any mutation.
        let artifacts = download::download_all(
            ctx,
            &self.resolver,
            &plan.steps,
            options,
            &system.cache_dir(),
        )
        .await?;

        if options.download_only {
            self.finalize(system, &operation, &plan, "download-only");
            return Ok(TransactionSummary {
                download_only: true,
                ..TransactionSummary::default()
            });
        }

        // Stage: extract into per-step temp dirs under the target root.
        let staged = self.stage_all(ctx, &plan, &artifacts, system)?;

        // Commit: serial, under the process-wide lock.
        let protect = ConfigProtect::new(&ctx.config().config_protect);
        let _lock = TransactionLock::acquire(&system.lock_path(), LOCK_TIMEOUT)?;
        let outcome = commit::commit(ctx, system, staged, &protect, options);

        match outcome {
            Ok(outcome) => {
                self.finalize(system, &operation, &plan, "ok");
                Ok(TransactionSummary::from_steps(&outcome.applied))
            }
            Err(err) => {
                self.finalize(system, &operation, &plan, &format!("failed: {err}"));
                Err(err)
            }
        }
    }

    fn stage_all(
        &self,
        ctx: &Context,
        plan: &TransactionPlan,
        artifacts: &AHashMap<Fingerprint, DownloadedArtifact>,
        system: &System,
    ) -> Result<Vec<(Step, Option<StagedArtifact>)>> {
        let mut staged = Vec::with_capacity(plan.steps.len());
        for step in &plan.steps {
            if ctx.is_cancelled() {
                return Err(InstallerError::Interrupted);
            }
            let stage = match step.target() {
                Some(target) => {
                    let fingerprint = target.fingerprint();
                    let artifact = artifacts.get(&fingerprint).ok_or_else(|| {
                        rondo_repository::RepositoryError::NoArtifact(fingerprint.clone())
                    })?;
                    Some(stage_artifact(
                        &fingerprint,
                        &artifact.path,
                        artifact.descriptor.compression,
                        &system.target,
                    )?)
                }
                None => None,
            };
            staged.push((step.clone(), stage));
        }
        Ok(staged)
    }

    /// Release-side bookkeeping: audit record under the database path.
    fn finalize(
        &self,
        system: &System,
        operation: &Operation,
        plan: &TransactionPlan,
        outcome: &str,
    ) {
        let record = AuditRecord::new(
            operation.name(),
            plan.steps.iter().map(Step::describe).collect(),
            plan.assertions.digest(),
            outcome,
        );
        let db_path = audit_dir(system);
        audit::append(&db_path, &record);
    }
}

/// The audit log lives under the target root, beside the lock and cache.
fn audit_dir(system: &System) -> std::path::PathBuf {
    system.target.join(".rondo")
}

fn confirm(plan: &TransactionPlan) -> Result<bool> {
    let summary: Vec<String> = plan.steps.iter().map(Step::describe).collect();
    let prompt = format!("Apply {} steps?\n  {}", summary.len(), summary.join("\n  "));
    dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .map_err(|e| {
            warn!(error = %e, "confirmation failed, aborting");
            InstallerError::Interrupted
        })
}
