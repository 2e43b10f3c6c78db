//! Transaction planning: solve, order, diff.

use crate::error::{InstallerError, Result};
use crate::options::InstallerOptions;
use crate::system::System;
use ahash::AHashSet;
use rondo_core::{Fingerprint, Package, Selector, VersionConstraint};
use rondo_database::PackageDatabase;
use rondo_solver::{Assertions, Request, SolveOptions, solve};
use tracing::{debug, info};

/// A user-facing transaction operation.
#[derive(Debug, Clone)]
pub enum Operation {
    /// Install the targets (and their requirements).
    Install(Vec<Selector>),
    /// Remove the targets.
    Uninstall(Vec<Selector>),
    /// Move every installed family to its best available version.
    Upgrade,
    /// Atomically remove one set and install another.
    Swap {
        /// Packages leaving the system.
        remove: Vec<Selector>,
        /// Packages replacing them.
        add: Vec<Selector>,
    },
}

impl Operation {
    /// Short name for logs and the audit trail.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Install(_) => "install",
            Self::Uninstall(_) => "uninstall",
            Self::Upgrade => "upgrade",
            Self::Swap { .. } => "swap",
        }
    }

    /// The selectors requested for installation, used by `only_deps`.
    fn install_roots(&self) -> &[Selector] {
        match self {
            Self::Install(targets) => targets,
            Self::Swap { add, .. } => add,
            _ => &[],
        }
    }
}

/// One step of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Place a new package.
    Install(Package),
    /// Remove an installed package.
    Uninstall(Package),
    /// Replace an installed package with another version of its family.
    Upgrade {
        /// The installed package leaving.
        from: Package,
        /// The package replacing it.
        to: Package,
    },
}

impl Step {
    /// The package this step installs, if any.
    #[must_use]
    pub fn target(&self) -> Option<&Package> {
        match self {
            Self::Install(p) | Self::Upgrade { to: p, .. } => Some(p),
            Self::Uninstall(_) => None,
        }
    }

    /// The package this step removes, if any.
    #[must_use]
    pub fn removal(&self) -> Option<&Package> {
        match self {
            Self::Uninstall(p) | Self::Upgrade { from: p, .. } => Some(p),
            Self::Install(_) => None,
        }
    }

    /// Human-readable description.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Install(p) => format!("install {}", p.fingerprint()),
            Self::Uninstall(p) => format!("uninstall {}", p.fingerprint()),
            Self::Upgrade { from, to } => {
                format!("upgrade {} -> {}", from.fingerprint(), to.fingerprint())
            }
        }
    }
}

/// A planned transaction: ordered steps plus the assertions they came from.
#[derive(Debug, Clone)]
pub struct TransactionPlan {
    /// Steps in execution order: uninstalls first (reverse dependency
    /// order), then installs and upgrades in dependency order.
    pub steps: Vec<Step>,
    /// The solver's assertion set.
    pub assertions: Assertions,
}

impl TransactionPlan {
    /// Whether the plan changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Plan a transaction. Pure: no side effects on failure or success.
pub fn plan(
    operation: &Operation,
    world: &dyn PackageDatabase,
    system: &System,
    options: &InstallerOptions,
) -> Result<TransactionPlan> {
    let request = build_request(operation, world, &*system.database)?;
    if request.is_empty() {
        return Ok(TransactionPlan {
            steps: Vec::new(),
            assertions: Assertions::default(),
        });
    }

    let solve_options = SolveOptions {
        solver: options.solver.clone(),
        concurrency: options.concurrency,
        no_deps: options.no_deps,
    };
    let result = solve(world, &*system.database, &request, &solve_options)?;

    let steps = diff(
        &result.assertions,
        &*system.database,
        operation,
        options,
    )?;

    guard_essential(&steps, options)?;
    guard_revdeps(&steps, operation, options)?;

    info!(
        operation = operation.name(),
        steps = steps.len(),
        attempts = result.stats.attempts,
        "transaction planned"
    );
    Ok(TransactionPlan {
        steps,
        assertions: result.assertions,
    })
}

/// Translate an operation into a solver request.
fn build_request(
    operation: &Operation,
    world: &dyn PackageDatabase,
    system: &dyn PackageDatabase,
) -> Result<Request> {
    let mut request = Request::new();
    match operation {
        Operation::Install(targets) => {
            for selector in targets {
                request = request.install(selector.clone());
            }
        }
        Operation::Uninstall(targets) => {
            for selector in targets {
                request = request.uninstall(selector.clone());
            }
        }
        Operation::Swap { remove, add } => {
            for selector in remove {
                request = request.uninstall(selector.clone());
            }
            for selector in add {
                request = request.install(selector.clone());
            }
        }
        Operation::Upgrade => {
            // One install entry per installed family that has something
            // newer in the world; the strict lower bound keeps the current
            // version out of the candidate set.
            for installed in system.all() {
                let newer = Selector::new(
                    installed.category.clone(),
                    installed.name.clone(),
                    VersionConstraint::Greater(installed.version.clone()),
                );
                if !world.query(&newer).is_empty() {
                    debug!(package = %installed.fingerprint(), "upgrade candidate");
                    request = request.install(newer);
                }
            }
        }
    }
    Ok(request)
}

/// Diff the assertion set against the installed state into ordered steps.
fn diff(
    assertions: &Assertions,
    system: &dyn PackageDatabase,
    operation: &Operation,
    options: &InstallerOptions,
) -> Result<Vec<Step>> {
    let installed: AHashSet<Fingerprint> =
        system.all().iter().map(Package::fingerprint).collect();

    let mut removals: Vec<Package> = assertions
        .to_remove()
        .into_iter()
        .filter(|p| installed.contains(&p.fingerprint()))
        .cloned()
        .collect();

    // Installation order comes from the orderer over the true-set.
    let ordered = assertions.ensure_order(system)?;
    let mut additions: Vec<Package> = ordered
        .iter()
        .map(|a| a.package.clone())
        .filter(|p| !installed.contains(&p.fingerprint()))
        .collect();

    // only_deps: the requested roots stay out; their requirements land.
    if options.only_deps {
        let roots = operation.install_roots();
        additions.retain(|p| !roots.iter().any(|sel| sel.matches(p)));
    }

    // Same-family removal + addition collapse into an upgrade at the
    // addition's position.
    let mut steps: Vec<Step> = Vec::new();
    let mut upgraded: AHashSet<Fingerprint> = AHashSet::new();
    let mut install_steps: Vec<Step> = Vec::new();
    for addition in additions.drain(..) {
        if let Some(old) = removals
            .iter()
            .find(|r| r.same_family(&addition))
            .cloned()
        {
            upgraded.insert(old.fingerprint());
            install_steps.push(Step::Upgrade {
                from: old,
                to: addition,
            });
        } else {
            install_steps.push(Step::Install(addition));
        }
    }
    removals.retain(|r| !upgraded.contains(&r.fingerprint()));

    // Pure removals run first, dependents before their dependencies.
    let removal_assertions = Assertions::new(
        removals
            .iter()
            .map(|package| rondo_solver::Assertion {
                package: package.clone(),
                value: true,
            })
            .collect(),
    );
    let mut removal_order: Vec<Package> = removal_assertions
        .ensure_order(system)?
        .iter()
        .map(|a| a.package.clone())
        .collect();
    removal_order.reverse();
    steps.extend(removal_order.into_iter().map(Step::Uninstall));
    steps.extend(install_steps);

    Ok(steps)
}

/// Essential-data guard: reject at plan time.
fn guard_essential(steps: &[Step], options: &InstallerOptions) -> Result<()> {
    if !options.preserve_system_essential_data {
        return Ok(());
    }
    for step in steps {
        if let Step::Uninstall(package) = step
            && package.is_essential()
        {
            return Err(InstallerError::EssentialProtected(package.fingerprint()));
        }
    }
    Ok(())
}

/// Uninstall refuses cascades: packages removed beyond the request are
/// installed packages whose requirements the removal breaks.
fn guard_revdeps(
    steps: &[Step],
    operation: &Operation,
    options: &InstallerOptions,
) -> Result<()> {
    let Operation::Uninstall(targets) = operation else {
        return Ok(());
    };
    if options.force {
        return Ok(());
    }

    let victims: Vec<Fingerprint> = steps
        .iter()
        .filter_map(Step::removal)
        .filter(|p| !targets.iter().any(|sel| sel.matches(p)))
        .map(Package::fingerprint)
        .collect();

    if victims.is_empty() {
        Ok(())
    } else {
        Err(InstallerError::RequiresBroken { victims })
    }
}
