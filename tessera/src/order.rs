//! Typechecking order of definitions.
//!
//! Mutually recursive definitions form one group;
//! every group comes after all groups it depends on.

use crate::cancel::{Cancel, Cancelled};
use crate::concrete::Concrete;
use crate::store::DefId;
use fnv::{FnvHashMap, FnvHashSet};
use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;

/// Definitions that are typechecked together.
pub type Group = Vec<Arc<Concrete>>;

/// Sequence of groups, where each group depends only on previous groups.
#[derive(Clone, Debug, Default)]
pub struct Order(pub Vec<Group>);

impl Order {
    pub fn groups(&self) -> &[Group] {
        &self.0
    }

    /// Identifiers of the definitions, group by group.
    pub fn ids(&self) -> Vec<Vec<DefId>> {
        let group = |g: &Group| g.iter().map(|c| c.def).collect();
        self.0.iter().map(group).collect()
    }

    /// Number of definitions.
    pub fn len(&self) -> usize {
        self.0.iter().map(|g| g.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Index of the group containing a definition.
    pub fn position(&self, def: DefId) -> Option<usize> {
        self.0.iter().position(|g| g.iter().any(|c| c.def == def))
    }
}

/// Order definitions by their references.
///
/// Only references between the given definitions are considered.
/// Groups without mutual constraints are emitted in the order in which
/// their first members appear in the input, and
/// members of a group keep their input order.
/// The result is all or nothing: on cancellation, no order is returned.
pub fn order(defs: &[Arc<Concrete>], cancel: &Cancel) -> Result<Order, Cancelled> {
    let mut graph = DiGraph::<usize, ()>::new();
    let mut nodes = FnvHashMap::default();
    for (i, c) in defs.iter().enumerate() {
        nodes.insert(c.def, graph.add_node(i));
    }
    // edge A -> B means that A refers to B
    for c in defs {
        let source = nodes[&c.def];
        for target in c.refs.iter().filter_map(|r| nodes.get(r)) {
            graph.add_edge(source, *target, ());
        }
    }

    let mut components: Vec<Vec<usize>> = tarjan_scc(&graph)
        .into_iter()
        .map(|scc| scc.into_iter().map(|n| graph[n]).collect())
        .collect();
    components.iter_mut().for_each(|c| c.sort_unstable());
    cancel.check()?;

    let mut component = vec![0; defs.len()];
    for (ci, members) in components.iter().enumerate() {
        members.iter().for_each(|i| component[*i] = ci)
    }

    // number of unfinished dependencies and users per component
    let mut pending = vec![0; components.len()];
    let mut users: Vec<FnvHashSet<usize>> = vec![FnvHashSet::default(); components.len()];
    for edge in graph.raw_edges() {
        let (user, dep) = (graph[edge.source()], graph[edge.target()]);
        let (user, dep) = (component[user], component[dep]);
        if user != dep && users[dep].insert(user) {
            pending[user] += 1
        }
    }

    // Kahn's algorithm, preferring components whose first member comes first
    let mut ready: BinaryHeap<_> = (0..components.len())
        .filter(|ci| pending[*ci] == 0)
        .map(|ci| Reverse((components[ci][0], ci)))
        .collect();
    let mut groups = Vec::with_capacity(components.len());
    while let Some(Reverse((_, ci))) = ready.pop() {
        cancel.check()?;
        groups.push(components[ci].iter().map(|i| defs[*i].clone()).collect());
        for user in &users[ci] {
            pending[*user] -= 1;
            if pending[*user] == 0 {
                ready.push(Reverse((components[*user][0], *user)))
            }
        }
    }
    Ok(Order(groups))
}

/// Two-pass typechecking order.
///
/// The first pass contains the last modified definition
/// together with everything it depends on in the batch;
/// the second pass contains the rest of the batch.
#[derive(Clone, Debug, Default)]
pub struct Plan {
    pub first: Order,
    pub rest: Order,
    pub last: Option<DefId>,
}

impl Plan {
    pub fn len(&self) -> usize {
        self.first.len() + self.rest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.first.is_empty() && self.rest.is_empty()
    }

    /// Both passes, one after the other.
    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.first.groups().iter().chain(self.rest.groups())
    }
}

/// Split a batch around the last modified definition and order both parts.
///
/// If the last modified definition is not part of the batch,
/// everything is ordered in the second pass.
pub fn plan(
    defs: &[Arc<Concrete>],
    last: Option<DefId>,
    cancel: &Cancel,
) -> Result<Plan, Cancelled> {
    let last = last.filter(|l| defs.iter().any(|c| c.def == *l));
    let mut closure = FnvHashSet::default();
    if let Some(l) = last {
        let by_id: FnvHashMap<_, _> = defs.iter().map(|c| (c.def, c)).collect();
        let mut todo = Vec::from([l]);
        while let Some(def) = todo.pop() {
            if closure.insert(def) {
                let refs = by_id.get(&def).into_iter().flat_map(|c| &c.refs);
                todo.extend(refs.filter(|r| by_id.contains_key(r)))
            }
        }
    }
    let (first, rest): (Vec<_>, Vec<_>) = defs
        .iter()
        .cloned()
        .partition(|c| closure.contains(&c.def));
    Ok(Plan {
        first: order(&first, cancel)?,
        rest: order(&rest, cancel)?,
        last,
    })
}

#[cfg(test)]
fn concretes(src: &str) -> Vec<Arc<Concrete>> {
    let store = crate::Store::new();
    let drafts = crate::concrete::drafts(&[], &tessera_syntax::parse(src));
    let ids: Vec<_> = drafts
        .iter()
        .map(|d| store.declare(d.name.clone(), d.kind, d.infix))
        .collect();
    let mut ns = crate::namespace::Namespace::from_definitions(&store.live());
    let ignore = crate::observe::Ignore;
    let root = ids.into_iter().zip(drafts.iter());
    let cs = crate::resolve::resolve_group(root, &mut ns, &ignore, &Cancel::new());
    cs.unwrap().into_iter().map(Arc::new).collect()
}

#[cfg(test)]
fn names(order: &Order, defs: &[Arc<Concrete>]) -> Vec<Vec<usize>> {
    let index = |d: &DefId| defs.iter().position(|c| c.def == *d).unwrap();
    let ids = order.ids();
    ids.iter().map(|g| g.iter().map(index).collect()).collect()
}

#[test]
fn acyclic() {
    // f => g, g => 1
    let defs = concretes("def f := g. def g := 1.");
    let order = order(&defs, &Cancel::new()).unwrap();
    assert_eq!(names(&order, &defs), [[1], [0]]);
}

#[test]
fn mutual_recursion() {
    let defs = concretes("def f := g. def g := f.");
    let order = order(&defs, &Cancel::new()).unwrap();
    assert_eq!(names(&order, &defs), [[0, 1]]);
}

#[test]
fn source_order() {
    let src = "def a := d. def b := 1. def c := e c. def d := 2. def e := c a. def f := b.";
    let defs = concretes(src);
    let order = order(&defs, &Cancel::new()).unwrap();
    let groups: Vec<Vec<usize>> = vec![vec![1], vec![3], vec![0], vec![2, 4], vec![5]];
    assert_eq!(names(&order, &defs), groups);

    for c in &defs {
        for r in &c.refs {
            let (user, dep) = (order.position(c.def), order.position(*r));
            assert!(dep <= user);
        }
    }
}

#[test]
fn two_passes() {
    let defs = concretes("def a := 1. def b := a. def c := b. def d := a.");
    let last = plan(&defs, Some(defs[1].def), &Cancel::new()).unwrap();
    assert_eq!(names(&last.first, &defs), [[0], [1]]);
    assert_eq!(names(&last.rest, &defs), [[2], [3]]);
    assert_eq!(last.len(), 4);

    let all = plan(&defs, None, &Cancel::new()).unwrap();
    assert!(all.first.is_empty());
    assert_eq!(all.rest.len(), 4);
}

#[test]
fn cancelled() {
    let defs = concretes("def f := g. def g := 1.");
    let cancel = Cancel::new();
    cancel.cancel();
    assert!(order(&defs, &cancel).is_err());
    assert!(plan(&defs, Some(defs[0].def), &cancel).is_err());
}
