//! Command-line definitions.

pub mod install;
pub mod reclaim;
pub mod replace;
pub mod search;
pub mod uninstall;
pub mod upgrade;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Top-level CLI.
#[derive(Parser, Debug)]
#[command(
    name = "rondo",
    version,
    about = "A solver-driven system package manager"
)]
pub struct Cli {
    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only print errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install packages and their requirements
    #[command(alias = "i")]
    Install(install::InstallArgs),

    /// Uninstall packages
    #[command(alias = "rm")]
    Uninstall(uninstall::UninstallArgs),

    /// Upgrade every installed package to its best available version
    #[command(alias = "u")]
    Upgrade(upgrade::UpgradeArgs),

    /// Replace a set of packages with another set in one transaction
    #[command(alias = "r")]
    Replace(replace::ReplaceArgs),

    /// Search packages in repositories or the installed system
    #[command(alias = "s")]
    Search(search::SearchArgs),

    /// Rebuild the system database from files present in the rootfs
    Reclaim(reclaim::ReclaimArgs),
}

/// System location flags shared by every mutating command.
#[derive(Args, Debug, Clone, Default)]
pub struct SystemFlags {
    /// System db path
    #[arg(long = "system-dbpath", value_name = "PATH")]
    pub system_dbpath: Option<PathBuf>,

    /// System root path
    #[arg(long = "system-target", value_name = "PATH")]
    pub system_target: Option<PathBuf>,
}

/// Solver tuning flags.
#[derive(Args, Debug, Clone, Default)]
pub struct SolverFlags {
    /// Solver strategy (simple, parallel, qlearning)
    #[arg(long = "solver-type", value_name = "TYPE")]
    pub solver_type: Option<String>,

    /// Solver maximum attempts
    #[arg(long = "solver-attempts", value_name = "N")]
    pub solver_attempts: Option<usize>,

    /// Solver learning rate
    #[arg(long = "solver-rate", value_name = "RATE")]
    pub solver_rate: Option<f32>,

    /// Solver discount rate
    #[arg(long = "solver-discount", value_name = "RATE")]
    pub solver_discount: Option<f32>,
}

/// Transaction behavior flags.
#[derive(Args, Debug, Clone, Default)]
pub struct TransactionFlags {
    /// Don't ask questions
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Skip errors and keep going (potentially harmful)
    #[arg(long)]
    pub force: bool,

    /// Don't consider package dependencies (harmful!)
    #[arg(long)]
    pub nodeps: bool,

    /// Consider **only** package dependencies
    #[arg(long)]
    pub onlydeps: bool,

    /// Download artifacts without committing anything
    #[arg(long = "download-only")]
    pub download_only: bool,
}
