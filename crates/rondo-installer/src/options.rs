//! Executor options.

use rondo_core::SolverConfig;

/// Options controlling a transaction.
#[derive(Debug, Clone)]
pub struct InstallerOptions {
    /// Download and verification workers.
    pub concurrency: usize,
    /// Skip relevance-cone expansion; only requested packages move.
    pub no_deps: bool,
    /// Install requirements but not the requested roots themselves.
    pub only_deps: bool,
    /// Continue past non-fatal file conflicts and revdep breakage.
    pub force: bool,
    /// Refuse to remove packages labeled essential.
    pub preserve_system_essential_data: bool,
    /// Ask for confirmation before committing.
    pub ask: bool,
    /// Answer yes to every question.
    pub yes: bool,
    /// Populate the artifact cache and stop before staging.
    pub download_only: bool,
    /// Require valid artifact signatures.
    pub check_signatures: bool,
    /// Solver selection and tuning.
    pub solver: SolverConfig,
}

impl Default for InstallerOptions {
    fn default() -> Self {
        Self {
            concurrency: num_cpus::get(),
            no_deps: false,
            only_deps: false,
            force: false,
            preserve_system_essential_data: false,
            ask: false,
            yes: false,
            download_only: false,
            check_signatures: false,
            solver: SolverConfig::default(),
        }
    }
}
