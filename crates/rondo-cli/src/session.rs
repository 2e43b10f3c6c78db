//! Session setup: configuration merge, databases, repositories.
//!
//! Configuration hierarchy: built-in defaults, then the configuration file,
//! then `RONDO_*` environment variables, then command-line flags.

use crate::commands::{Cli, SolverFlags, SystemFlags, TransactionFlags};
use anyhow::Context as _;
use rondo_core::{Config, Context};
use rondo_database::FilesystemDatabase;
use rondo_installer::{InstallerOptions, System};
use rondo_repository::{HttpRepository, LocalRepository, Repository, RetryConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Everything a command needs to act on the system.
#[derive(Debug)]
pub struct Session {
    /// Process context: configuration plus cancellation.
    pub ctx: Context,
    /// The system under management.
    pub system: System,
    /// Configured repositories, priority order.
    pub repositories: Vec<Arc<dyn Repository>>,
}

impl Session {
    /// Executor options derived from configuration and flags.
    #[must_use]
    pub fn installer_options(
        &self,
        txn: &TransactionFlags,
        preserve_essential: bool,
    ) -> InstallerOptions {
        let config = self.ctx.config();
        InstallerOptions {
            concurrency: config.general.concurrency,
            no_deps: txn.nodeps,
            only_deps: txn.onlydeps,
            force: txn.force,
            preserve_system_essential_data: preserve_essential,
            ask: !txn.yes,
            yes: txn.yes,
            download_only: txn.download_only,
            check_signatures: config.general.check_signatures,
            solver: config.solver.clone(),
        }
    }
}

/// Build a session from global and per-command flags.
pub async fn open(
    cli: &Cli,
    system_flags: &SystemFlags,
    solver_flags: &SolverFlags,
) -> anyhow::Result<Session> {
    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;

    if let Some(path) = &system_flags.system_dbpath {
        config.system.db_path.clone_from(path);
    }
    if let Some(path) = &system_flags.system_target {
        config.system.rootfs.clone_from(path);
    }
    if let Some(solver_type) = &solver_flags.solver_type {
        config.solver.solver_type = solver_type.parse().context("parsing --solver-type")?;
    }
    if let Some(attempts) = solver_flags.solver_attempts {
        config.solver.max_attempts = attempts;
    }
    if let Some(rate) = solver_flags.solver_rate {
        config.solver.learning_rate = rate;
    }
    if let Some(discount) = solver_flags.solver_discount {
        config.solver.discount = discount;
    }

    let repositories = open_repositories(&config).await?;
    debug!(
        repositories = repositories.len(),
        db = %config.system.db_path.display(),
        target = %config.system.rootfs.display(),
        "session ready"
    );

    let database = FilesystemDatabase::open(&config.system.db_path)
        .context("opening system database")?;
    let system = System::new(Arc::new(database), &config.system.rootfs);

    Ok(Session {
        ctx: Context::new(config),
        system,
        repositories,
    })
}

async fn open_repositories(config: &Config) -> anyhow::Result<Vec<Arc<dyn Repository>>> {
    let retry = RetryConfig::new(config.general.retries);
    let timeout = Duration::from_secs(config.general.download_timeout_secs);

    let mut repositories: Vec<Arc<dyn Repository>> = Vec::new();
    for repo in config.active_repositories() {
        let repository: Arc<dyn Repository> = if let Some(path) = repo.url.strip_prefix("dir://") {
            Arc::new(
                LocalRepository::open(path, repo.priority, repo.verify_key.clone())
                    .with_context(|| format!("opening repository '{}'", repo.name))?,
            )
        } else if repo.url.starts_with("http://") || repo.url.starts_with("https://") {
            Arc::new(
                HttpRepository::open(
                    &repo.url,
                    repo.priority,
                    repo.verify_key.clone(),
                    timeout,
                    retry.clone(),
                )
                .await
                .with_context(|| format!("opening repository '{}'", repo.name))?,
            )
        } else {
            anyhow::bail!(
                "repository '{}': unsupported url '{}' (expected dir:// or http(s)://)",
                repo.name,
                repo.url
            );
        };
        repositories.push(repository);
    }
    Ok(repositories)
}

/// Parse user package arguments into selectors.
pub fn parse_targets(inputs: &[String]) -> anyhow::Result<Vec<rondo_core::Selector>> {
    inputs
        .iter()
        .map(|input| {
            rondo_core::Selector::parse(input)
                .with_context(|| format!("invalid package string '{input}'"))
        })
        .collect()
}
