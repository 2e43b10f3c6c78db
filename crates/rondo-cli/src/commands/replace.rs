//! `rondo replace` - swap one package set for another.
//!
//! ```text
//! $ rondo replace -y system/busybox --for shells/bash --for system/coreutils
//! ```
//!
//! Both sets enter a single solve; the executor completes both sides or
//! neither. Essential system data is always preserved here, and the solve
//! runs on the deterministic backend.

use crate::commands::{Cli, SolverFlags, SystemFlags, TransactionFlags};
use crate::output;
use crate::session::{self, parse_targets};
use clap::Args;
use rondo_installer::Installer;

/// Arguments for the replace command.
#[derive(Args, Debug, Clone)]
pub struct ReplaceArgs {
    /// Packages to remove
    #[arg(required = true, value_name = "PACKAGE")]
    pub packages: Vec<String>,

    /// Packages to install in place of the removed ones
    #[arg(long = "for", required = true, value_name = "PACKAGE")]
    pub for_packages: Vec<String>,

    #[command(flatten)]
    pub system: SystemFlags,

    #[command(flatten)]
    pub solver: SolverFlags,

    #[command(flatten)]
    pub txn: TransactionFlags,
}

/// Run the replace command.
pub async fn run(cli: &Cli, args: &ReplaceArgs) -> anyhow::Result<()> {
    let session = session::open(cli, &args.system, &args.solver).await?;
    let remove = parse_targets(&args.packages)?;
    let add = parse_targets(&args.for_packages)?;

    let options = session.installer_options(&args.txn, true);
    let installer = Installer::new(options, session.repositories.clone());
    let summary = installer
        .swap(&session.ctx, &remove, &add, &session.system)
        .await?;

    if summary.is_empty() {
        output::info("nothing to do");
    } else {
        output::success(&format!(
            "{} package(s) removed, {} installed",
            summary.removed.len(),
            summary.installed.len()
        ));
    }
    Ok(())
}
