//! Rondo CLI - a solver-driven system package manager.

mod commands;
mod output;
mod session;

use clap::Parser;
use commands::{Cli, Commands};
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Verbosity ladder: -q errors only, default warnings, -v info, -vv
    // debug, more trace.
    let log_level = match cli.verbose {
        0 if cli.quiet => Level::ERROR,
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            output::error(&format!("failed to start runtime: {e}"));
            return ExitCode::from(3);
        }
    };

    match runtime.block_on(run_command(&cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            output::error(&format!("{err:#}"));
            ExitCode::from(exit_code_for(&err))
        }
    }
}

async fn run_command(cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Install(args) => commands::install::run(cli, args).await,
        Commands::Uninstall(args) => commands::uninstall::run(cli, args).await,
        Commands::Upgrade(args) => commands::upgrade::run(cli, args).await,
        Commands::Replace(args) => commands::replace::run(cli, args).await,
        Commands::Search(args) => commands::search::run(cli, args).await,
        Commands::Reclaim(args) => commands::reclaim::run(cli, args).await,
    }
}

/// Exit codes: 0 success, 1 general error, 2 unsatisfiable constraints,
/// 3 I/O or lock failure.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    if let Some(installer) = err.downcast_ref::<rondo_installer::InstallerError>() {
        return installer.exit_code();
    }
    if let Some(solver) = err.downcast_ref::<rondo_solver::SolverError>() {
        return match solver {
            rondo_solver::SolverError::Unsatisfiable { .. } => 2,
            _ => 1,
        };
    }
    if err.downcast_ref::<rondo_database::DatabaseError>().is_some()
        || err.downcast_ref::<std::io::Error>().is_some()
    {
        return 3;
    }
    1
}
