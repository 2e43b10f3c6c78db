//! `rondo reclaim` - adopt packages whose files already live in the rootfs.
//!
//! For every repository package whose entire file manifest is present under
//! the target root, a record is created in the system database. Useful
//! after reinstalling the database or adopting a pre-populated image.

use crate::commands::{Cli, SolverFlags, SystemFlags};
use crate::output;
use crate::session;
use clap::Args;
use rondo_database::PackageDatabase;
use rondo_repository::ArtifactResolver;
use tracing::debug;

/// Arguments for the reclaim command.
#[derive(Args, Debug, Clone)]
pub struct ReclaimArgs {
    #[command(flatten)]
    pub system: SystemFlags,

    #[command(flatten)]
    pub solver: SolverFlags,
}

/// Run the reclaim command.
pub async fn run(cli: &Cli, args: &ReclaimArgs) -> anyhow::Result<()> {
    let session = session::open(cli, &args.system, &args.solver).await?;
    let resolver = ArtifactResolver::new(session.repositories.clone());
    let world = resolver.world()?;

    let mut reclaimed = 0usize;
    for package in world.all() {
        let fingerprint = package.fingerprint();
        if session.system.database.contains(&fingerprint) {
            continue;
        }
        let Some(manifest) = resolver.manifest_of(&fingerprint) else {
            continue;
        };
        if manifest.is_empty() {
            continue;
        }
        let complete = manifest
            .paths()
            .all(|path| session.system.target.join(path).exists());
        if !complete {
            continue;
        }

        debug!(package = %fingerprint, files = manifest.len(), "reclaiming");
        session.system.database.create(package)?;
        session.system.database.set_files(&fingerprint, manifest)?;
        reclaimed += 1;
    }

    if reclaimed == 0 {
        output::info("nothing to reclaim");
    } else {
        output::success(&format!("{reclaimed} package(s) reclaimed"));
    }
    Ok(())
}
