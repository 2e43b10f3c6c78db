//! Solver backends.
//!
//! All backends share one propagation engine and one contract: satisfy
//! every hard clause of the compiled formula or report an unsatisfiable
//! core. The objective (fewest removals, then fewest new installs, then
//! highest versions) is realized by deterministic value ordering — demand
//! clauses branch over candidates best-first and free variables try their
//! preferred polarity first — so the first complete assignment found is
//! minimal under the lexicographic preference.

use crate::assertion::{Assertion, Assertions};
use crate::compiler::{Clause, Formula, VarId, compile};
use crate::error::{CoreEntry, SolverError};
use crate::types::{Request, SolveResult, SolveStats};
use ahash::AHashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rondo_core::{SolverConfig, SolverType};
use rondo_database::PackageDatabase;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::Instant;
use tracing::{debug, info};

/// Fixed PRNG seed for the QLearning backend; exploration is randomized but
/// reproducible.
const QLEARNING_SEED: u64 = 0x524f_4e44;

/// Options controlling a solve.
#[derive(Debug, Clone)]
pub struct SolveOptions {
    /// Backend selection and tuning.
    pub solver: SolverConfig,
    /// Worker bound for the parallel backend.
    pub concurrency: usize,
    /// Skip relevance-cone expansion.
    pub no_deps: bool,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            solver: SolverConfig::default(),
            concurrency: num_cpus::get(),
            no_deps: false,
        }
    }
}

/// Solve a request against the world and system databases.
///
/// Returns a total assignment over the relevance cone or an
/// [`SolverError::Unsatisfiable`] carrying a diagnostic core.
pub fn solve(
    world: &dyn PackageDatabase,
    system: &dyn PackageDatabase,
    request: &Request,
    options: &SolveOptions,
) -> Result<SolveResult, SolverError> {
    let start = Instant::now();
    let formula = compile(world, system, request, options.no_deps)?;

    let mut result = match options.solver.solver_type {
        SolverType::SingleCoreSimple => solve_backtracking(&formula, None),
        SolverType::ParallelSimple => solve_parallel(&formula, options.concurrency.max(1)),
        SolverType::QLearning => solve_qlearning(&formula, &options.solver),
    }?;

    result.stats.variables = formula.variables();
    result.stats.clauses = formula.clauses.len();
    result.stats.duration = start.elapsed();

    info!(
        backend = %options.solver.solver_type,
        variables = result.stats.variables,
        attempts = result.stats.attempts,
        backtracks = result.stats.backtracks,
        "solve complete"
    );
    Ok(result)
}

fn build_result(formula: &Formula, values: &[bool], stats: SolveStats) -> SolveResult {
    let assertions = Assertions::new(
        formula
            .packages
            .iter()
            .enumerate()
            .map(|(var, package)| Assertion {
                package: package.clone(),
                value: values[var],
            })
            .collect(),
    );
    SolveResult { assertions, stats }
}

// ============================================================================
// Propagation engine
// ============================================================================

/// Partial assignment with a trail for chronological backtracking.
struct Engine<'f> {
    formula: &'f Formula,
    values: Vec<Option<bool>>,
    trail: Vec<VarId>,
}

impl<'f> Engine<'f> {
    fn new(formula: &'f Formula) -> Self {
        Self {
            formula,
            values: vec![None; formula.variables()],
            trail: Vec::with_capacity(formula.variables()),
        }
    }

    fn mark(&self) -> usize {
        self.trail.len()
    }

    fn undo_to(&mut self, mark: usize) {
        while self.trail.len() > mark {
            let var = self.trail.pop().unwrap_or_default();
            self.values[var] = None;
        }
    }

    /// Assign a variable; `Err(())` on contradiction with an existing value.
    fn assign(&mut self, var: VarId, value: bool) -> Result<(), ()> {
        match self.values[var] {
            Some(existing) if existing == value => Ok(()),
            Some(_) => Err(()),
            None => {
                self.values[var] = Some(value);
                self.trail.push(var);
                Ok(())
            }
        }
    }

    /// Unit propagation to fixpoint; `Err(clause_index)` on conflict.
    fn propagate(&mut self) -> Result<(), usize> {
        loop {
            let mark = self.trail.len();
            for (idx, clause) in self.formula.clauses.iter().enumerate() {
                self.propagate_clause(clause).map_err(|()| idx)?;
            }
            if self.trail.len() == mark {
                return Ok(());
            }
        }
    }

    fn propagate_clause(&mut self, clause: &Clause) -> Result<(), ()> {
        match clause {
            Clause::Install { candidates, .. } => self.propagate_demand(candidates),
            Clause::Remove { victims, .. } => {
                for &victim in victims {
                    self.assign(victim, false)?;
                }
                Ok(())
            }
            Clause::Requires {
                owner, candidates, ..
            } => match self.values[*owner] {
                Some(true) => self.propagate_demand(candidates),
                Some(false) => Ok(()),
                None => {
                    if candidates.iter().all(|&c| self.values[c] == Some(false)) {
                        self.assign(*owner, false)?;
                    }
                    Ok(())
                }
            },
            Clause::Conflicts { owner, victims, .. } => match self.values[*owner] {
                Some(true) => {
                    for &victim in victims {
                        self.assign(victim, false)?;
                    }
                    Ok(())
                }
                Some(false) => Ok(()),
                None => {
                    if victims.iter().any(|&v| self.values[v] == Some(true)) {
                        self.assign(*owner, false)?;
                    }
                    Ok(())
                }
            },
            Clause::AtMostOne { members } => {
                let truths = members
                    .iter()
                    .filter(|&&m| self.values[m] == Some(true))
                    .count();
                if truths > 1 {
                    return Err(());
                }
                if truths == 1 {
                    for &member in members {
                        if self.values[member].is_none() {
                            self.assign(member, false)?;
                        }
                    }
                }
                Ok(())
            }
        }
    }

    /// "At least one candidate true": conflict when all are false, unit
    /// assignment when a single one is left open.
    fn propagate_demand(&mut self, candidates: &[VarId]) -> Result<(), ()> {
        if candidates.iter().any(|&c| self.values[c] == Some(true)) {
            return Ok(());
        }
        let mut open = candidates.iter().filter(|&&c| self.values[c].is_none());
        match (open.next(), open.next()) {
            (None, _) => Err(()),
            (Some(&only), None) => self.assign(only, true),
            _ => Ok(()),
        }
    }

    /// The first unsatisfied demand clause with open candidates, in clause
    /// order: request clauses first, then requires of active owners.
    fn pick_demand(&self) -> Option<(usize, Vec<VarId>)> {
        for (idx, clause) in self.formula.clauses.iter().enumerate() {
            let candidates = match clause {
                Clause::Install { candidates, .. } => candidates,
                Clause::Requires {
                    owner, candidates, ..
                } if self.values[*owner] == Some(true) => candidates,
                _ => continue,
            };
            if candidates.iter().any(|&c| self.values[c] == Some(true)) {
                continue;
            }
            let open: Vec<VarId> = candidates
                .iter()
                .copied()
                .filter(|&c| self.values[c].is_none())
                .collect();
            if !open.is_empty() {
                return Some((idx, open));
            }
        }
        None
    }

    /// The first unassigned variable in fingerprint order.
    fn pick_unassigned(&self) -> Option<VarId> {
        self.values.iter().position(Option::is_none)
    }

    fn snapshot(&self) -> Vec<bool> {
        self.values
            .iter()
            .map(|v| v.unwrap_or(false))
            .collect()
    }
}

// ============================================================================
// SingleCoreSimple: deterministic backtracking
// ============================================================================

struct Search<'f> {
    engine: Engine<'f>,
    stats: SolveStats,
    conflicts: Vec<usize>,
    stop: Option<&'f AtomicBool>,
    cancelled: bool,
}

impl<'f> Search<'f> {
    fn new(formula: &'f Formula, stop: Option<&'f AtomicBool>) -> Self {
        Self {
            engine: Engine::new(formula),
            stats: SolveStats::default(),
            conflicts: Vec::new(),
            stop,
            cancelled: false,
        }
    }

    fn stopped(&mut self) -> bool {
        if self.stop.is_some_and(|s| s.load(Ordering::Relaxed)) {
            self.cancelled = true;
            return true;
        }
        false
    }

    fn record_conflict(&mut self, clause: usize) {
        self.stats.backtracks += 1;
        if !self.conflicts.contains(&clause) {
            self.conflicts.push(clause);
        }
    }

    /// Seed the search with forced assignments (used by the parallel
    /// backend to hand each worker a disjoint subtree).
    fn with_prefix(mut self, prefix: &[(VarId, bool)]) -> Option<Self> {
        for &(var, value) in prefix {
            if self.engine.assign(var, value).is_err() {
                return None;
            }
        }
        Some(self)
    }

    fn run(&mut self) -> Option<Vec<bool>> {
        if self.stopped() {
            return None;
        }

        let mark = self.engine.mark();
        if let Err(clause) = self.engine.propagate() {
            self.record_conflict(clause);
            self.engine.undo_to(mark);
            return None;
        }

        // Branch on the first open demand clause, candidates best-first.
        if let Some((clause_idx, open)) = self.engine.pick_demand() {
            for (i, &candidate) in open.iter().enumerate() {
                self.stats.attempts += 1;
                let sub = self.engine.mark();
                // Earlier candidates have exhausted their subtrees; pin
                // them false so each arm explores a disjoint space.
                let pinned = open[..i]
                    .iter()
                    .all(|&prev| self.engine.assign(prev, false).is_ok());
                if pinned && self.engine.assign(candidate, true).is_ok()
                    && let Some(solution) = self.run()
                {
                    return Some(solution);
                }
                self.engine.undo_to(sub);
                if self.cancelled {
                    return None;
                }
            }
            self.record_conflict(clause_idx);
            self.engine.undo_to(mark);
            return None;
        }

        // No open demand: branch a free variable, preferred polarity first.
        if let Some(var) = self.engine.pick_unassigned() {
            let preferred = self.engine.formula.installed[var];
            for value in [preferred, !preferred] {
                self.stats.attempts += 1;
                let sub = self.engine.mark();
                if self.engine.assign(var, value).is_ok()
                    && let Some(solution) = self.run()
                {
                    return Some(solution);
                }
                self.engine.undo_to(sub);
                if self.cancelled {
                    return None;
                }
            }
            self.engine.undo_to(mark);
            return None;
        }

        Some(self.engine.snapshot())
    }

    fn into_core(self) -> Vec<CoreEntry> {
        let formula = self.engine.formula;
        let mut core: Vec<CoreEntry> = self
            .conflicts
            .iter()
            .flat_map(|&idx| formula.core_entries(&formula.clauses[idx]))
            .collect();
        if core.is_empty() {
            // No conflict was ever recorded; fall back to the request.
            core = formula
                .clauses
                .iter()
                .filter(|c| matches!(c, Clause::Install { .. } | Clause::Remove { .. }))
                .flat_map(|c| formula.core_entries(c))
                .collect();
        }
        core
    }
}

fn solve_backtracking(
    formula: &Formula,
    stop: Option<&AtomicBool>,
) -> Result<SolveResult, SolverError> {
    let mut search = Search::new(formula, stop);
    match search.run() {
        Some(values) => Ok(build_result(formula, &values, search.stats)),
        None if search.cancelled => Err(SolverError::Interrupted),
        None => Err(SolverError::unsatisfiable(search.into_core())),
    }
}

// ============================================================================
// ParallelSimple: disjoint subtrees, first result wins
// ============================================================================

fn solve_parallel(formula: &Formula, concurrency: usize) -> Result<SolveResult, SolverError> {
    // Propagate the root once to find the first branch point.
    let mut root = Engine::new(formula);
    if let Err(clause) = root.propagate() {
        return Err(SolverError::unsatisfiable(
            formula.core_entries(&formula.clauses[clause]),
        ));
    }

    let arms: Vec<Vec<(VarId, bool)>> = if let Some((_, open)) = root.pick_demand() {
        open.iter()
            .enumerate()
            .map(|(i, &candidate)| {
                let mut arm: Vec<(VarId, bool)> =
                    open[..i].iter().map(|&prev| (prev, false)).collect();
                arm.push((candidate, true));
                arm
            })
            .collect()
    } else if let Some(var) = root.pick_unassigned() {
        let preferred = formula.installed[var];
        vec![vec![(var, preferred)], vec![(var, !preferred)]]
    } else {
        // Propagation alone produced a total assignment.
        return Ok(build_result(formula, &root.snapshot(), SolveStats::default()));
    };

    let workers = concurrency.min(arms.len()).max(1);
    debug!(arms = arms.len(), workers, "parallel solve starting");

    let stop = AtomicBool::new(false);
    let (tx, rx) = mpsc::channel::<(usize, Option<(Vec<bool>, SolveStats)>, Vec<CoreEntry>)>();

    std::thread::scope(|scope| {
        for (worker, chunk) in arms.chunks(arms.len().div_ceil(workers)).enumerate() {
            let tx = tx.clone();
            let stop = &stop;
            scope.spawn(move || {
                for arm in chunk {
                    if stop.load(Ordering::Relaxed) {
                        return;
                    }
                    let Some(mut search) = Search::new(formula, Some(stop)).with_prefix(arm)
                    else {
                        continue;
                    };
                    if let Some(values) = search.run() {
                        stop.store(true, Ordering::Relaxed);
                        let _ = tx.send((worker, Some((values, search.stats)), Vec::new()));
                        return;
                    }
                    if search.cancelled {
                        return;
                    }
                    let _ = tx.send((worker, None, search.into_core()));
                }
            });
        }
        drop(tx);

        let mut cores: Vec<CoreEntry> = Vec::new();
        let mut failures = 0usize;
        while let Ok((_, outcome, core)) = rx.recv() {
            match outcome {
                Some((values, stats)) => {
                    return Ok(build_result(formula, &values, stats));
                }
                None => {
                    failures += 1;
                    cores.extend(core);
                    if failures == arms.len() {
                        return Err(SolverError::unsatisfiable(cores));
                    }
                }
            }
        }
        // Every worker exited without a result (all cancelled or failed).
        Err(SolverError::unsatisfiable(cores))
    })
}

// ============================================================================
// QLearning: episode-based heuristic search
// ============================================================================

fn solve_qlearning(formula: &Formula, config: &SolverConfig) -> Result<SolveResult, SolverError> {
    let mut q: AHashMap<(VarId, bool), f32> = AHashMap::new();
    let mut rng = StdRng::seed_from_u64(QLEARNING_SEED);
    let mut stats = SolveStats::default();
    let mut conflicts: Vec<usize> = Vec::new();

    // Bias the table toward the minimal-transaction polarity so early
    // episodes already walk sensible assignments.
    for var in 0..formula.variables() {
        q.insert((var, formula.installed[var]), 0.5);
        q.insert((var, !formula.installed[var]), 0.0);
    }

    for episode in 0..config.max_attempts {
        stats.attempts = episode as u64 + 1;
        let epsilon = (0.9 * (1.0 - episode as f32 / config.max_attempts as f32)).max(0.05);

        let mut engine = Engine::new(formula);
        let mut path: Vec<(VarId, bool)> = Vec::new();
        let mut failed = false;

        if let Err(clause) = engine.propagate() {
            // The formula conflicts before any decision is taken.
            return Err(SolverError::unsatisfiable(
                formula.core_entries(&formula.clauses[clause]),
            ));
        }

        loop {
            let decision = if let Some((_, open)) = engine.pick_demand() {
                let pick = if rng.random::<f32>() < epsilon {
                    open[rng.random_range(0..open.len())]
                } else {
                    // Greedy: best Q, ties to the compiler's best-first order.
                    *open
                        .iter()
                        .max_by(|&&a, &&b| {
                            let qa = q.get(&(a, true)).copied().unwrap_or_default();
                            let qb = q.get(&(b, true)).copied().unwrap_or_default();
                            qa.partial_cmp(&qb).unwrap_or(std::cmp::Ordering::Equal)
                        })
                        .unwrap_or(&open[0])
                };
                Some((pick, true))
            } else {
                engine.pick_unassigned().map(|var| {
                    let value = if rng.random::<f32>() < epsilon {
                        rng.random::<bool>()
                    } else {
                        let q_true = q.get(&(var, true)).copied().unwrap_or_default();
                        let q_false = q.get(&(var, false)).copied().unwrap_or_default();
                        q_true >= q_false
                    };
                    (var, value)
                })
            };

            let Some((var, value)) = decision else {
                break;
            };
            path.push((var, value));

            if engine.assign(var, value).is_err() {
                failed = true;
                break;
            }
            if let Err(clause) = engine.propagate() {
                stats.backtracks += 1;
                if !conflicts.contains(&clause) {
                    conflicts.push(clause);
                }
                failed = true;
                break;
            }
        }

        let reward = if failed { -1.0 } else { 1.0 };
        let depth = path.len();
        for (i, (var, value)) in path.into_iter().enumerate() {
            let credit = reward * config.discount.powi((depth - 1 - i) as i32);
            let entry = q.entry((var, value)).or_default();
            *entry += config.learning_rate * (credit - *entry);
        }

        if !failed {
            // A candidate assignment is never returned unvalidated.
            let values = engine.snapshot();
            if formula.check(&values).is_none() {
                debug!(episodes = stats.attempts, "qlearning converged");
                return Ok(build_result(formula, &values, stats));
            }
        }
    }

    let core: Vec<CoreEntry> = if conflicts.is_empty() {
        formula
            .clauses
            .iter()
            .filter(|c| matches!(c, Clause::Install { .. } | Clause::Remove { .. }))
            .flat_map(|c| formula.core_entries(c))
            .collect()
    } else {
        conflicts
            .iter()
            .flat_map(|&idx| formula.core_entries(&formula.clauses[idx]))
            .collect()
    };
    Err(SolverError::unsatisfiable(core))
}
