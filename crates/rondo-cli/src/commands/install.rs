//! `rondo install`

use crate::commands::{Cli, SolverFlags, SystemFlags, TransactionFlags};
use crate::output;
use crate::session::{self, parse_targets};
use clap::Args;
use rondo_installer::Installer;

/// Arguments for the install command.
#[derive(Args, Debug, Clone)]
pub struct InstallArgs {
    /// Packages to install, e.g. shells/bash or shells/bash>=5
    #[arg(required = true, value_name = "PACKAGE")]
    pub packages: Vec<String>,

    #[command(flatten)]
    pub system: SystemFlags,

    #[command(flatten)]
    pub solver: SolverFlags,

    #[command(flatten)]
    pub txn: TransactionFlags,
}

/// Run the install command.
pub async fn run(cli: &Cli, args: &InstallArgs) -> anyhow::Result<()> {
    let session = session::open(cli, &args.system, &args.solver).await?;
    let targets = parse_targets(&args.packages)?;

    let options = session.installer_options(&args.txn, false);
    let installer = Installer::new(options, session.repositories.clone());
    let summary = installer
        .install(&session.ctx, &targets, &session.system)
        .await?;

    if summary.download_only {
        output::success("artifacts downloaded");
    } else if summary.is_empty() {
        output::info("nothing to do");
    } else {
        output::success(&format!("{} package(s) installed", summary.installed.len()));
    }
    Ok(())
}
