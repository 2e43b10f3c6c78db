//! `rondo search`

use crate::commands::{Cli, SolverFlags, SystemFlags};
use crate::output;
use crate::session;
use clap::Args;
use comfy_table::{Table, presets::UTF8_FULL_CONDENSED};
use rondo_core::Package;
use rondo_database::PackageDatabase;
use rondo_repository::ArtifactResolver;

/// Arguments for the search command.
#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    /// Substring matched against package fingerprints
    #[arg(value_name = "PATTERN")]
    pub pattern: String,

    /// Search the installed system instead of repositories
    #[arg(long)]
    pub installed: bool,

    #[command(flatten)]
    pub system: SystemFlags,

    #[command(flatten)]
    pub solver: SolverFlags,
}

/// Run the search command.
pub async fn run(cli: &Cli, args: &SearchArgs) -> anyhow::Result<()> {
    let session = session::open(cli, &args.system, &args.solver).await?;

    let packages: Vec<Package> = if args.installed {
        session.system.database.all()
    } else {
        let resolver = ArtifactResolver::new(session.repositories.clone());
        resolver.world()?.all()
    };

    let pattern = args.pattern.to_lowercase();
    let matches: Vec<&Package> = packages
        .iter()
        .filter(|p| p.fingerprint().as_str().to_lowercase().contains(&pattern))
        .collect();

    if matches.is_empty() {
        output::info("no packages found");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec!["Package", "Version", "Description"]);
    for package in matches {
        table.add_row(vec![
            format!("{}/{}", package.category, package.name),
            package.version.to_string(),
            package.description.clone().unwrap_or_default(),
        ]);
    }
    println!("{table}");
    Ok(())
}
