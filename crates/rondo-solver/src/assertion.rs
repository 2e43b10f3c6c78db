//! Assertions and the assertion orderer.
//!
//! An assertion pairs a package with a presence boolean. The orderer
//! linearizes the true-valued assertions so that every package is preceded
//! by the packages its `requires` resolve to within the set. Sorting is a
//! layered Kahn pass over the induced dependency DAG: each layer is the
//! current zero-in-degree set, emitted in fingerprint order, which makes
//! the output bitwise-deterministic for a fixed input.

use crate::error::OrderError;
use ahash::{AHashMap, AHashSet};
use petgraph::graph::{DiGraph, NodeIndex};
use rondo_core::{Fingerprint, Package};
use rondo_database::PackageDatabase;

/// A package paired with its presence in the target state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assertion {
    /// The package.
    pub package: Package,
    /// `true` = present in the final state, `false` = absent.
    pub value: bool,
}

/// An ordered collection of assertions, the output of one solve.
///
/// Assertions are immutable once produced; the ordering entry points return
/// new collections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assertions {
    items: Vec<Assertion>,
}

impl Assertions {
    /// Wrap a list of assertions.
    #[must_use]
    pub fn new(items: Vec<Assertion>) -> Self {
        Self { items }
    }

    /// All assertions.
    #[must_use]
    pub fn iter(&self) -> std::slice::Iter<'_, Assertion> {
        self.items.iter()
    }

    /// Number of assertions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the collection is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The assertion for a fingerprint, if present.
    #[must_use]
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<&Assertion> {
        self.items
            .iter()
            .find(|a| a.package.fingerprint() == *fingerprint)
    }

    /// Packages asserted present, in collection order.
    #[must_use]
    pub fn to_install(&self) -> Vec<&Package> {
        self.items
            .iter()
            .filter(|a| a.value)
            .map(|a| &a.package)
            .collect()
    }

    /// Packages asserted absent, in collection order.
    #[must_use]
    pub fn to_remove(&self) -> Vec<&Package> {
        self.items
            .iter()
            .filter(|a| !a.value)
            .map(|a| &a.package)
            .collect()
    }

    /// Deterministic digest of the assertion set: BLAKE3 over the sorted
    /// `fingerprint=value` lines. Used by the audit log and idempotence
    /// checks.
    #[must_use]
    pub fn digest(&self) -> String {
        let mut lines: Vec<String> = self
            .items
            .iter()
            .map(|a| format!("{}={}", a.package.fingerprint(), a.value))
            .collect();
        lines.sort();
        let mut hasher = blake3::Hasher::new();
        for line in lines {
            hasher.update(line.as_bytes());
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize().as_bytes())
    }

    /// Order the true-valued assertions relative to a single root: the
    /// root's transitive requirements come first, then the root, then
    /// everything else.
    ///
    /// Superseded by [`Assertions::ensure_order`], which orders the whole
    /// set globally; kept because the two prune differently and existing
    /// callers depend on the root-relative result.
    #[deprecated(note = "use ensure_order; this prunes to the root's requirement closure first")]
    pub fn order(
        &self,
        db: &dyn PackageDatabase,
        root: &Fingerprint,
    ) -> Result<Assertions, OrderError> {
        let graph = OrderGraph::build(self, db);
        let root_idx = *graph
            .by_fingerprint
            .get(root)
            .ok_or_else(|| OrderError::RootNotFound(root.clone()))?;

        // Requirement closure of the root, root included.
        let mut closure: AHashSet<NodeIndex> = AHashSet::new();
        let mut stack = vec![root_idx];
        while let Some(node) = stack.pop() {
            if closure.insert(node) {
                for dep in graph
                    .graph
                    .neighbors_directed(node, petgraph::Direction::Incoming)
                {
                    stack.push(dep);
                }
            }
        }

        let mut ordered = graph.layered_sort(|n| closure.contains(&n))?;
        ordered.extend(graph.layered_sort(|n| !closure.contains(&n))?);

        Ok(Assertions::new(
            ordered
                .into_iter()
                .map(|idx| Assertion {
                    package: graph.graph[idx].clone(),
                    value: true,
                })
                .collect(),
        ))
    }

    /// Produce a global ordering of all true-valued assertions.
    ///
    /// On success the returned length equals the number of true-valued
    /// input assertions and no package precedes any of its requirements
    /// present in the set.
    pub fn ensure_order(&self, db: &dyn PackageDatabase) -> Result<Assertions, OrderError> {
        let graph = OrderGraph::build(self, db);
        let ordered = graph.layered_sort(|_| true)?;
        debug_assert_eq!(ordered.len(), graph.graph.node_count());
        Ok(Assertions::new(
            ordered
                .into_iter()
                .map(|idx| Assertion {
                    package: graph.graph[idx].clone(),
                    value: true,
                })
                .collect(),
        ))
    }
}

impl IntoIterator for Assertions {
    type Item = Assertion;
    type IntoIter = std::vec::IntoIter<Assertion>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Assertions {
    type Item = &'a Assertion;
    type IntoIter = std::slice::Iter<'a, Assertion>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Dependency DAG over the true-valued assertions. An edge `D -> P` means
/// `P` requires `D`, so `D` must be emitted first.
struct OrderGraph {
    graph: DiGraph<Package, ()>,
    by_fingerprint: AHashMap<Fingerprint, NodeIndex>,
}

impl OrderGraph {
    fn build(assertions: &Assertions, db: &dyn PackageDatabase) -> Self {
        let mut graph = DiGraph::new();
        let mut by_fingerprint = AHashMap::new();

        for assertion in assertions.iter().filter(|a| a.value) {
            let fp = assertion.package.fingerprint();
            if !by_fingerprint.contains_key(&fp) {
                let idx = graph.add_node(assertion.package.clone());
                by_fingerprint.insert(fp, idx);
            }
        }

        // Requires edges resolved against the set itself: a requirement is
        // matched directly, through a member's provides entries, or through
        // the database for selectors that only resolve there.
        let nodes: Vec<NodeIndex> = graph.node_indices().collect();
        for &node in &nodes {
            let package = graph[node].clone();
            for selector in &package.requires {
                let mut matched = false;
                for &dep in &nodes {
                    if dep == node {
                        continue;
                    }
                    let dep_pkg = &graph[dep];
                    if selector.matches(dep_pkg)
                        || dep_pkg.provides.iter().any(|p| {
                            p.category == selector.category && p.name == selector.name
                        })
                    {
                        graph.update_edge(dep, node, ());
                        matched = true;
                    }
                }
                if !matched {
                    // Resolve through the database: the selector may name a
                    // fingerprint that only the db can expand to a package
                    // present in the set under a different selector shape.
                    for hit in db.query(selector) {
                        if let Some(&dep) = by_fingerprint.get(&hit.fingerprint())
                            && dep != node
                        {
                            graph.update_edge(dep, node, ());
                        }
                    }
                }
            }
        }

        Self {
            graph,
            by_fingerprint,
        }
    }

    /// Layered Kahn sort over the nodes selected by `filter`. Edges from
    /// unselected nodes are treated as already satisfied.
    fn layered_sort(
        &self,
        filter: impl Fn(NodeIndex) -> bool,
    ) -> Result<Vec<NodeIndex>, OrderError> {
        let selected: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|&n| filter(n))
            .collect();
        let selected_set: AHashSet<NodeIndex> = selected.iter().copied().collect();

        let mut in_degree: AHashMap<NodeIndex, usize> = selected
            .iter()
            .map(|&n| {
                let deg = self
                    .graph
                    .neighbors_directed(n, petgraph::Direction::Incoming)
                    .filter(|dep| selected_set.contains(dep))
                    .count();
                (n, deg)
            })
            .collect();

        let mut ordered = Vec::with_capacity(selected.len());
        while !in_degree.is_empty() {
            let mut layer: Vec<NodeIndex> = in_degree
                .iter()
                .filter(|&(_, &deg)| deg == 0)
                .map(|(&n, _)| n)
                .collect();
            if layer.is_empty() {
                return Err(self.cycle_error(&in_degree));
            }
            layer.sort_by_key(|&n| self.graph[n].fingerprint());

            for &node in &layer {
                in_degree.remove(&node);
                ordered.push(node);
                for dependent in self
                    .graph
                    .neighbors_directed(node, petgraph::Direction::Outgoing)
                {
                    if let Some(deg) = in_degree.get_mut(&dependent) {
                        *deg = deg.saturating_sub(1);
                    }
                }
            }
        }

        Ok(ordered)
    }

    /// A stuck Kahn pass means a back-edge. Narrow the leftover nodes down
    /// to the actual strongly connected components for the error.
    fn cycle_error(&self, leftover: &AHashMap<NodeIndex, usize>) -> OrderError {
        let members: AHashSet<NodeIndex> = leftover.keys().copied().collect();
        let sub = self.graph.filter_map(
            |idx, pkg| members.contains(&idx).then(|| pkg.fingerprint()),
            |_, _| Some(()),
        );

        let mut cycle: Vec<Fingerprint> = Vec::new();
        for scc in petgraph::algo::tarjan_scc(&sub) {
            let is_cycle = scc.len() > 1
                || scc
                    .first()
                    .is_some_and(|&n| sub.find_edge(n, n).is_some());
            if is_cycle {
                cycle.extend(scc.iter().map(|&n| sub[n].clone()));
            }
        }
        if cycle.is_empty() {
            cycle = sub.node_indices().map(|n| sub[n].clone()).collect();
        }
        cycle.sort();
        OrderError::Cycle { cycle }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rondo_core::{Selector, Version};
    use rondo_database::InMemoryDatabase;

    fn pkg(name: &str, requires: &[&str]) -> Package {
        let mut p = Package::new("test", name, Version::parse("1.0").unwrap());
        for req in requires {
            p.requires.push(Selector::any("test", *req));
        }
        p
    }

    fn asserted(packages: Vec<Package>) -> Assertions {
        Assertions::new(
            packages
                .into_iter()
                .map(|package| Assertion {
                    package,
                    value: true,
                })
                .collect(),
        )
    }

    fn names(assertions: &Assertions) -> Vec<String> {
        assertions.iter().map(|a| a.package.name.clone()).collect()
    }

    #[test]
    fn orders_simple_chain() {
        let foo = pkg("foo", &["bar"]);
        let root = foo.fingerprint();
        let assertions = asserted(vec![foo, pkg("baz", &["bar"]), pkg("bar", &[])]);
        let db = InMemoryDatabase::new();

        #[allow(deprecated)]
        let ordered_old = assertions.order(&db, &root).unwrap();
        assert_eq!(ordered_old.iter().next().unwrap().package.name, "bar");

        let ordered = assertions.ensure_order(&db).unwrap();
        assert_eq!(ordered.len(), 3);
        assert_eq!(names(&ordered), vec!["bar", "baz", "foo"]);
    }

    #[test]
    fn errors_on_cycles() {
        let foo = pkg("foo", &["bar"]);
        let root = foo.fingerprint();
        let assertions = asserted(vec![
            foo,
            pkg("baz", &["bar"]),
            pkg("bar", &["baz"]),
        ]);
        let db = InMemoryDatabase::new();

        #[allow(deprecated)]
        let err = assertions.order(&db, &root).unwrap_err();
        assert!(matches!(err, OrderError::Cycle { .. }));

        let err = assertions.ensure_order(&db).unwrap_err();
        let OrderError::Cycle { cycle } = err else {
            panic!("expected cycle error");
        };
        let cycle_names: Vec<&str> = cycle.iter().map(Fingerprint::as_str).collect();
        assert_eq!(cycle_names, vec!["test/bar-1.0", "test/baz-1.0"]);
    }

    #[test]
    fn orders_extended_set() {
        let foo = pkg("foo", &["bar"]);
        let root = foo.fingerprint();
        let assertions = asserted(vec![
            foo,
            pkg("baz2", &["foobaz"]),
            pkg("baz", &["bar"]),
            pkg("bar", &[]),
            pkg("foobaz", &[]),
        ]);
        let db = InMemoryDatabase::new();

        #[allow(deprecated)]
        let ordered_old = assertions.order(&db, &root).unwrap();
        let old_names = names(&ordered_old);
        assert_eq!(old_names[0], "bar");
        assert_ne!(old_names[1], "foobaz");

        let ordered = assertions.ensure_order(&db).unwrap();
        assert_eq!(ordered.len(), 5);
        let new_names = names(&ordered);
        assert_eq!(new_names[0], "bar");
        assert_eq!(new_names[1], "foobaz");
    }

    #[test]
    fn ordering_is_deterministic() {
        let assertions = asserted(vec![
            pkg("foo", &["bar"]),
            pkg("baz", &["bar"]),
            pkg("bar", &[]),
            pkg("qux", &[]),
        ]);
        let db = InMemoryDatabase::new();
        let first = assertions.ensure_order(&db).unwrap();
        for _ in 0..10 {
            assert_eq!(assertions.ensure_order(&db).unwrap(), first);
        }
    }

    #[test]
    fn requirements_resolve_through_provides() {
        let mut provider = pkg("dash", &[]);
        provider.provides.push(Selector::any("test", "sh"));
        let consumer = pkg("script-runner", &["sh"]);
        let assertions = asserted(vec![consumer, provider]);
        let db = InMemoryDatabase::new();

        let ordered = assertions.ensure_order(&db).unwrap();
        assert_eq!(names(&ordered), vec!["dash", "script-runner"]);
    }

    #[test]
    fn order_errors_on_missing_root() {
        let assertions = asserted(vec![pkg("foo", &[])]);
        let db = InMemoryDatabase::new();
        #[allow(deprecated)]
        let err = assertions
            .order(&db, &Fingerprint::new("test/ghost-1.0"))
            .unwrap_err();
        assert!(matches!(err, OrderError::RootNotFound(_)));
    }

    #[test]
    fn digest_is_order_insensitive() {
        let a = asserted(vec![pkg("a", &[]), pkg("b", &[])]);
        let b = asserted(vec![pkg("b", &[]), pkg("a", &[])]);
        assert_eq!(a.digest(), b.digest());
    }
}
