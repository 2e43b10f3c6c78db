//! Constraint compiler.
//!
//! Lowers the world, the installed system and a user request into a
//! propositional formula. One boolean variable per package in the relevance
//! cone (`x_P` = "P is installed in the final state"); clauses encode the
//! request, requires/conflicts edges, the at-most-one-per-family rule, and
//! a soft keep-installed preference that produces minimal transactions.
//!
//! Only packages reachable from the request through requires, conflicts and
//! provides edges enter the formula, plus installed packages that require a
//! cone member (reverse dependencies must be decidable too).

use crate::error::{CoreEntry, SolverError};
use crate::types::{Request, RequestOp};
use ahash::{AHashMap, AHashSet};
use petgraph::graph::DiGraph;
use rondo_core::{Fingerprint, Package, Selector};
use rondo_database::{PackageDatabase, candidates};
use std::collections::VecDeque;
use tracing::debug;

/// Variable identifier: index into [`Formula::packages`].
pub type VarId = usize;

/// A hard clause of the formula.
#[derive(Debug, Clone)]
pub enum Clause {
    /// Request: at least one candidate must be installed.
    Install {
        /// The requested selector.
        selector: Selector,
        /// Matching packages (direct or via provides), best first.
        candidates: Vec<VarId>,
    },
    /// Request: none of the victims may remain installed.
    Remove {
        /// The requested selector.
        selector: Selector,
        /// Matching installed packages.
        victims: Vec<VarId>,
    },
    /// `x_owner -> (x_c1 | x_c2 | ...)`.
    Requires {
        /// The requiring package.
        owner: VarId,
        /// Its requirement selector.
        selector: Selector,
        /// Matching packages, best first.
        candidates: Vec<VarId>,
        /// Same-name packages excluded by the version constraint; reported
        /// in unsatisfiable cores when `candidates` dries up.
        near_misses: Vec<Fingerprint>,
    },
    /// `x_owner -> (!x_v1 & !x_v2 & ...)`.
    Conflicts {
        /// The conflicting package.
        owner: VarId,
        /// Its conflict selector.
        selector: Selector,
        /// Matching packages.
        victims: Vec<VarId>,
    },
    /// At most one member of a `(category, name)` family installed.
    AtMostOne {
        /// Family members.
        members: Vec<VarId>,
    },
}

/// A compiled formula over the relevance cone.
#[derive(Debug, Clone)]
pub struct Formula {
    /// Cone packages sorted by fingerprint; the index is the variable id.
    pub packages: Vec<Package>,
    /// Fingerprint -> variable id.
    pub index: AHashMap<Fingerprint, VarId>,
    /// Hard clauses, request clauses first.
    pub clauses: Vec<Clause>,
    /// Whether each variable's package is currently installed.
    pub installed: Vec<bool>,
}

impl Formula {
    /// Number of variables.
    #[must_use]
    pub fn variables(&self) -> usize {
        self.packages.len()
    }

    /// Check a total assignment against every hard clause; returns the
    /// index of the first violated clause.
    #[must_use]
    pub fn check(&self, values: &[bool]) -> Option<usize> {
        self.clauses.iter().position(|clause| match clause {
            Clause::Install { candidates, .. } => !candidates.iter().any(|&c| values[c]),
            Clause::Remove { victims, .. } => victims.iter().any(|&v| values[v]),
            Clause::Requires {
                owner, candidates, ..
            } => values[*owner] && !candidates.iter().any(|&c| values[c]),
            Clause::Conflicts { owner, victims, .. } => {
                values[*owner] && victims.iter().any(|&v| values[v])
            }
            Clause::AtMostOne { members } => {
                members.iter().filter(|&&m| values[m]).count() > 1
            }
        })
    }

    /// Core entries describing a clause, for unsatisfiable diagnostics.
    #[must_use]
    pub(crate) fn core_entries(&self, clause: &Clause) -> Vec<CoreEntry> {
        let owner_fp = |var: VarId| self.packages[var].fingerprint();
        match clause {
            Clause::Install {
                selector,
                candidates,
            } => {
                let mut out = vec![CoreEntry {
                    package: None,
                    selector: selector.clone(),
                }];
                if candidates.is_empty() {
                    out.extend(self.near_miss_entries(selector));
                }
                out
            }
            Clause::Remove { selector, .. } => vec![CoreEntry {
                package: None,
                selector: selector.clone(),
            }],
            Clause::Requires {
                owner,
                selector,
                near_misses,
                ..
            } => {
                let mut out = vec![CoreEntry {
                    package: Some(owner_fp(*owner)),
                    selector: selector.clone(),
                }];
                for near in near_misses {
                    out.push(CoreEntry {
                        package: Some(near.clone()),
                        selector: Selector::parse(near.as_str()).unwrap_or_else(|_| selector.clone()),
                    });
                }
                out
            }
            Clause::Conflicts {
                owner, selector, ..
            } => vec![CoreEntry {
                package: Some(owner_fp(*owner)),
                selector: selector.clone(),
            }],
            Clause::AtMostOne { members } => members
                .iter()
                .map(|&m| {
                    let fp = owner_fp(m);
                    CoreEntry {
                        selector: Selector::parse(fp.as_str()).unwrap_or_else(|_| {
                            Selector::any(
                                self.packages[m].category.clone(),
                                self.packages[m].name.clone(),
                            )
                        }),
                        package: Some(fp),
                    }
                })
                .collect(),
        }
    }

    fn near_miss_entries(&self, selector: &Selector) -> Vec<CoreEntry> {
        self.packages
            .iter()
            .filter(|p| {
                p.category == selector.category && p.name == selector.name && !selector.matches(p)
            })
            .map(|p| {
                let fp = p.fingerprint();
                CoreEntry {
                    selector: Selector::parse(fp.as_str())
                        .unwrap_or_else(|_| selector.clone()),
                    package: Some(fp),
                }
            })
            .collect()
    }
}

/// Compile a request against the world and system databases.
///
/// `no_deps` skips relevance-cone expansion: only the packages named by the
/// request (and their installed family members) get variables.
pub fn compile(
    world: &dyn PackageDatabase,
    system: &dyn PackageDatabase,
    request: &Request,
    no_deps: bool,
) -> Result<Formula, SolverError> {
    let mut cone = Cone::new(world, system);

    // Seed the cone from the request, resolving each selector up front so
    // unknown packages fail before any search work happens.
    let mut request_roots: Vec<(Selector, RequestOp, Vec<Package>)> = Vec::new();
    for (selector, op) in &request.entries {
        let matches = match op {
            RequestOp::Install => {
                let mut m = candidates(world, selector);
                for hit in candidates(system, selector) {
                    if !m.iter().any(|p| p.fingerprint() == hit.fingerprint()) {
                        m.push(hit);
                    }
                }
                m
            }
            RequestOp::Uninstall => candidates(system, selector),
        };
        if matches.is_empty() {
            return Err(SolverError::UnknownPackage {
                selector: selector.clone(),
            });
        }
        for package in &matches {
            cone.add(package.clone());
        }
        request_roots.push((selector.clone(), *op, matches));
    }

    if !no_deps {
        cone.expand();
        cone.absorb_revdeps();
    }

    let formula = cone.into_formula(&request_roots, no_deps);
    debug!(
        variables = formula.variables(),
        clauses = formula.clauses.len(),
        "formula compiled"
    );

    detect_require_cycles(&formula)?;
    Ok(formula)
}

/// The relevance cone under construction.
struct Cone<'a> {
    world: &'a dyn PackageDatabase,
    system: &'a dyn PackageDatabase,
    members: AHashMap<Fingerprint, Package>,
    queue: VecDeque<Fingerprint>,
}

impl<'a> Cone<'a> {
    fn new(world: &'a dyn PackageDatabase, system: &'a dyn PackageDatabase) -> Self {
        Self {
            world,
            system,
            members: AHashMap::new(),
            queue: VecDeque::new(),
        }
    }

    fn add(&mut self, package: Package) {
        let fp = package.fingerprint();
        if !self.members.contains_key(&fp) {
            self.queue.push_back(fp.clone());
            self.members.insert(fp, package);
        }
    }

    /// Matches for a selector across both databases.
    fn resolve(&self, selector: &Selector) -> Vec<Package> {
        let mut out = candidates(self.world, selector);
        for hit in candidates(self.system, selector) {
            if !out.iter().any(|p| p.fingerprint() == hit.fingerprint()) {
                out.push(hit);
            }
        }
        out
    }

    /// BFS over requires/conflicts edges; installed family members join so
    /// the at-most-one rule can see them.
    fn expand(&mut self) {
        while let Some(fp) = self.queue.pop_front() {
            let package = self.members[&fp].clone();

            for selector in package.requires.iter().chain(package.conflicts.iter()) {
                let hits = self.resolve(selector);
                if hits.is_empty() && selector.is_concrete() {
                    // A dead requirement: pull in the same-name versions the
                    // constraint excludes so unsat cores can cite them.
                    for near in self
                        .world
                        .find_by_name(&selector.category, &selector.name)
                        .into_iter()
                        .chain(
                            self.system
                                .find_by_name(&selector.category, &selector.name),
                        )
                    {
                        self.add(near);
                    }
                }
                for hit in hits {
                    self.add(hit);
                }
            }
            for sibling in self.system.find_by_name(&package.category, &package.name) {
                self.add(sibling);
            }
        }
    }

    /// Installed packages requiring a cone member join the cone, repeated
    /// to fixpoint; their own edges expand through the queue again.
    fn absorb_revdeps(&mut self) {
        loop {
            let mut newcomers: Vec<Package> = Vec::new();
            for installed in self.system.all() {
                if self.members.contains_key(&installed.fingerprint()) {
                    continue;
                }
                let touches_cone = installed.requires.iter().any(|sel| {
                    self.members.values().any(|member| {
                        sel.matches(member)
                            || member
                                .provides
                                .iter()
                                .any(|p| p.category == sel.category && p.name == sel.name)
                    })
                });
                if touches_cone {
                    newcomers.push(installed);
                }
            }
            if newcomers.is_empty() {
                break;
            }
            for package in newcomers {
                self.add(package);
            }
            self.expand();
        }
    }

    fn into_formula(
        self,
        request_roots: &[(Selector, RequestOp, Vec<Package>)],
        no_deps: bool,
    ) -> Formula {
        let mut packages: Vec<Package> = self.members.into_values().collect();
        packages.sort_by_key(Package::fingerprint);

        let index: AHashMap<Fingerprint, VarId> = packages
            .iter()
            .enumerate()
            .map(|(i, p)| (p.fingerprint(), i))
            .collect();

        let installed: Vec<bool> = packages
            .iter()
            .map(|p| self.system.contains(&p.fingerprint()))
            .collect();

        // Candidate ordering inside demand clauses drives the objective:
        // keep installed packages first, then prefer higher versions.
        let order_candidates = |vars: &mut Vec<VarId>| {
            vars.sort_by(|&a, &b| {
                installed[b]
                    .cmp(&installed[a])
                    .then_with(|| packages[b].version.cmp(&packages[a].version))
                    .then_with(|| packages[a].fingerprint().cmp(&packages[b].fingerprint()))
            });
        };

        let to_vars = |matches: &[Package]| -> Vec<VarId> {
            matches
                .iter()
                .filter_map(|p| index.get(&p.fingerprint()).copied())
                .collect()
        };

        let mut clauses = Vec::new();

        for (selector, op, matches) in request_roots {
            match op {
                RequestOp::Install => {
                    let mut vars = to_vars(matches);
                    order_candidates(&mut vars);
                    clauses.push(Clause::Install {
                        selector: selector.clone(),
                        candidates: vars,
                    });
                }
                RequestOp::Uninstall => {
                    clauses.push(Clause::Remove {
                        selector: selector.clone(),
                        victims: to_vars(matches),
                    });
                }
            }
        }

        if !no_deps {
            for (owner, package) in packages.iter().enumerate() {
                for selector in &package.requires {
                    let matches: Vec<Package> = packages
                        .iter()
                        .filter(|p| {
                            selector.matches(p)
                                || p.provides.iter().any(|provided| {
                                    provided.category == selector.category
                                        && provided.name == selector.name
                                        && provided
                                            .constraint
                                            .version()
                                            .is_none_or(|v| selector.constraint.matches(v))
                                })
                        })
                        .cloned()
                        .collect();
                    let mut vars = to_vars(&matches);
                    vars.retain(|&v| v != owner);
                    order_candidates(&mut vars);

                    let near_misses: Vec<Fingerprint> = packages
                        .iter()
                        .filter(|p| {
                            p.category == selector.category
                                && p.name == selector.name
                                && !selector.matches(p)
                        })
                        .map(Package::fingerprint)
                        .collect();

                    clauses.push(Clause::Requires {
                        owner,
                        selector: selector.clone(),
                        candidates: vars,
                        near_misses,
                    });
                }

                for selector in &package.conflicts {
                    let mut vars: Vec<VarId> = packages
                        .iter()
                        .enumerate()
                        .filter(|(_, p)| selector.matches(p))
                        .map(|(i, _)| i)
                        .collect();
                    vars.retain(|&v| v != owner);
                    if !vars.is_empty() {
                        clauses.push(Clause::Conflicts {
                            owner,
                            selector: selector.clone(),
                            victims: vars,
                        });
                    }
                }
            }
        }

        // One installed package per (category, name) pair.
        let mut families: AHashMap<(String, String), Vec<VarId>> = AHashMap::new();
        for (var, package) in packages.iter().enumerate() {
            families.entry(package.family()).or_default().push(var);
        }
        let mut family_keys: Vec<_> = families.keys().cloned().collect();
        family_keys.sort();
        for key in family_keys {
            let members = &families[&key];
            if members.len() > 1 {
                clauses.push(Clause::AtMostOne {
                    members: members.clone(),
                });
            }
        }

        Formula {
            packages,
            index,
            clauses,
            installed,
        }
    }
}

/// Circular requires are rejected at compile time: walk the requires edges
/// between cone members and report any strongly connected component as an
/// unsatisfiable core.
fn detect_require_cycles(formula: &Formula) -> Result<(), SolverError> {
    let mut graph: DiGraph<VarId, ()> = DiGraph::new();
    let nodes: Vec<_> = (0..formula.variables())
        .map(|v| graph.add_node(v))
        .collect();

    for clause in &formula.clauses {
        if let Clause::Requires {
            owner, candidates, ..
        } = clause
        {
            for &candidate in candidates {
                graph.update_edge(nodes[*owner], nodes[candidate], ());
            }
        }
    }

    let mut core: Vec<CoreEntry> = Vec::new();
    for scc in petgraph::algo::tarjan_scc(&graph) {
        let is_cycle =
            scc.len() > 1 || scc.first().is_some_and(|&n| graph.find_edge(n, n).is_some());
        if !is_cycle {
            continue;
        }
        let members: AHashSet<VarId> = scc.iter().map(|&n| graph[n]).collect();
        for &var in &members {
            for clause in &formula.clauses {
                if let Clause::Requires {
                    owner,
                    selector,
                    candidates,
                    ..
                } = clause
                    && *owner == var
                    && candidates.iter().any(|c| members.contains(c))
                {
                    core.push(CoreEntry {
                        package: Some(formula.packages[var].fingerprint()),
                        selector: selector.clone(),
                    });
                }
            }
        }
    }

    if core.is_empty() {
        Ok(())
    } else {
        Err(SolverError::unsatisfiable(core))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rondo_core::Version;
    use rondo_database::InMemoryDatabase;

    fn pkg(fp: &str, requires: &[&str]) -> Package {
        let sel = Selector::parse(fp).unwrap();
        let mut p = Package::new(
            sel.category,
            sel.name,
            sel.constraint.version().cloned().unwrap(),
        );
        for req in requires {
            p.requires.push(Selector::parse(req).unwrap());
        }
        p
    }

    fn db(packages: Vec<Package>) -> InMemoryDatabase {
        InMemoryDatabase::with_packages(packages).unwrap()
    }

    #[test]
    fn cone_is_bounded_to_reachable_packages() {
        let world = db(vec![
            pkg("apps/foo-1.0", &["libs/bar"]),
            pkg("libs/bar-1.0", &[]),
            pkg("apps/unrelated-1.0", &[]),
        ]);
        let system = db(vec![]);
        let request = Request::new().install(Selector::parse("apps/foo").unwrap());

        let formula = compile(&world, &system, &request, false).unwrap();
        assert_eq!(formula.variables(), 2);
        assert!(!formula
            .index
            .contains_key(&Fingerprint::new("apps/unrelated-1.0")));
    }

    #[test]
    fn unknown_package_is_rejected() {
        let world = db(vec![]);
        let system = db(vec![]);
        let request = Request::new().install(Selector::parse("apps/ghost").unwrap());
        let err = compile(&world, &system, &request, false).unwrap_err();
        assert!(matches!(err, SolverError::UnknownPackage { .. }));
    }

    #[test]
    fn families_span_world_and_system() {
        let world = db(vec![pkg("apps/foo-2.0", &[])]);
        let system = db(vec![pkg("apps/foo-1.0", &[])]);
        let request = Request::new().install(Selector::parse("apps/foo>=2").unwrap());

        let formula = compile(&world, &system, &request, false).unwrap();
        assert_eq!(formula.variables(), 2);
        assert!(formula
            .clauses
            .iter()
            .any(|c| matches!(c, Clause::AtMostOne { members } if members.len() == 2)));
    }

    #[test]
    fn provides_are_candidates() {
        let mut provider = pkg("shells/dash-0.5", &[]);
        provider
            .provides
            .push(Selector::parse("virtual/sh").unwrap());
        let world = db(vec![pkg("apps/tool-1.0", &["virtual/sh"]), provider]);
        let system = db(vec![]);
        let request = Request::new().install(Selector::parse("apps/tool").unwrap());

        let formula = compile(&world, &system, &request, false).unwrap();
        let requires = formula
            .clauses
            .iter()
            .find_map(|c| match c {
                Clause::Requires {
                    selector,
                    candidates,
                    ..
                } if selector.name == "sh" => Some(candidates.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(requires.len(), 1);
        assert_eq!(
            formula.packages[requires[0]].fingerprint().as_str(),
            "shells/dash-0.5"
        );
    }

    #[test]
    fn circular_requires_fail_at_compile_time() {
        let world = db(vec![
            pkg("apps/a-1.0", &["apps/b"]),
            pkg("apps/b-1.0", &["apps/a"]),
        ]);
        let system = db(vec![]);
        let request = Request::new().install(Selector::parse("apps/a").unwrap());

        let err = compile(&world, &system, &request, false).unwrap_err();
        let SolverError::Unsatisfiable { core } = err else {
            panic!("expected unsatisfiable");
        };
        assert_eq!(core.len(), 2);
    }

    #[test]
    fn no_deps_skips_expansion() {
        let world = db(vec![
            pkg("apps/foo-1.0", &["libs/bar"]),
            pkg("libs/bar-1.0", &[]),
        ]);
        let system = db(vec![]);
        let request = Request::new().install(Selector::parse("apps/foo").unwrap());

        let formula = compile(&world, &system, &request, true).unwrap();
        assert_eq!(formula.variables(), 1);
        assert!(formula
            .clauses
            .iter()
            .all(|c| !matches!(c, Clause::Requires { .. })));
    }

    #[test]
    fn installed_revdeps_join_the_cone() {
        let world = db(vec![pkg("libs/bar-1.0", &[])]);
        let system = db(vec![
            pkg("libs/bar-1.0", &[]),
            pkg("apps/consumer-1.0", &["libs/bar"]),
        ]);
        let request = Request::new().uninstall(Selector::parse("libs/bar").unwrap());

        let formula = compile(&world, &system, &request, false).unwrap();
        assert!(formula
            .index
            .contains_key(&Fingerprint::new("apps/consumer-1.0")));
    }

    #[test]
    fn version_ordering_prefers_higher_candidates() {
        let world = db(vec![
            pkg("apps/tool-1.0", &["libs/x>=1"]),
            pkg("libs/x-1.0", &[]),
            pkg("libs/x-2.0", &[]),
        ]);
        let system = db(vec![]);
        let request = Request::new().install(Selector::parse("apps/tool").unwrap());

        let formula = compile(&world, &system, &request, false).unwrap();
        let candidates = formula
            .clauses
            .iter()
            .find_map(|c| match c {
                Clause::Requires { candidates, .. } => Some(candidates.clone()),
                _ => None,
            })
            .unwrap();
        let first = &formula.packages[candidates[0]];
        assert_eq!(first.version, Version::parse("2.0").unwrap());
    }
}
