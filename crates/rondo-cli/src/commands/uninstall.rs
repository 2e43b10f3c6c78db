//! `rondo uninstall`

use crate::commands::{Cli, SolverFlags, SystemFlags, TransactionFlags};
use crate::output;
use crate::session::{self, parse_targets};
use clap::Args;
use rondo_installer::Installer;

/// Arguments for the uninstall command.
#[derive(Args, Debug, Clone)]
pub struct UninstallArgs {
    /// Packages to remove
    #[arg(required = true, value_name = "PACKAGE")]
    pub packages: Vec<String>,

    /// Allow removing packages marked essential
    #[arg(long = "allow-essential")]
    pub allow_essential: bool,

    #[command(flatten)]
    pub system: SystemFlags,

    #[command(flatten)]
    pub solver: SolverFlags,

    #[command(flatten)]
    pub txn: TransactionFlags,
}

/// Run the uninstall command.
pub async fn run(cli: &Cli, args: &UninstallArgs) -> anyhow::Result<()> {
    let session = session::open(cli, &args.system, &args.solver).await?;
    let targets = parse_targets(&args.packages)?;

    let options = session.installer_options(&args.txn, !args.allow_essential);
    let installer = Installer::new(options, session.repositories.clone());
    let summary = installer
        .uninstall(&session.ctx, &targets, &session.system)
        .await?;

    if summary.is_empty() {
        output::info("nothing to do");
    } else {
        output::success(&format!("{} package(s) removed", summary.removed.len()));
    }
    Ok(())
}
