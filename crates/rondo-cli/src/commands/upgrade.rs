//! `rondo upgrade`

use crate::commands::{Cli, SolverFlags, SystemFlags, TransactionFlags};
use crate::output;
use crate::session;
use clap::Args;
use rondo_installer::Installer;

/// Arguments for the upgrade command.
#[derive(Args, Debug, Clone)]
pub struct UpgradeArgs {
    #[command(flatten)]
    pub system: SystemFlags,

    #[command(flatten)]
    pub solver: SolverFlags,

    #[command(flatten)]
    pub txn: TransactionFlags,
}

/// Run the upgrade command.
pub async fn run(cli: &Cli, args: &UpgradeArgs) -> anyhow::Result<()> {
    let session = session::open(cli, &args.system, &args.solver).await?;

    let options = session.installer_options(&args.txn, true);
    let installer = Installer::new(options, session.repositories.clone());
    let summary = installer.upgrade(&session.ctx, &session.system).await?;

    if summary.is_empty() {
        output::info("system is up to date");
    } else {
        output::success(&format!("{} package(s) upgraded", summary.installed.len()));
    }
    Ok(())
}
