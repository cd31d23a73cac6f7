//! Impact propagation.
//!
//! Propagation answers "who breaks if this breaks": starting from a glitched service, it walks the
//! [`ReverseDependencyIndex`] depth-first, in pre-order, and records every dependent it reaches under the glitched
//! service's name. Only reachability matters here, not distance, so a visited set is enough to guarantee termination
//! on cyclic graphs.
//!
//! The walk uses an explicit stack of frames rather than recursion, so arbitrarily deep dependency chains cannot
//! exhaust the call stack.
use indexmap::{IndexMap, IndexSet};

use crate::ReverseDependencyIndex;

/// Services already expanded during a single propagation.
pub type VisitedSet = IndexSet<String>;

/// Dependents reached from each glitched root, in discovery order.
///
/// Entries are raw: the same dependent can be recorded more than once when several paths lead to it. Use [`distinct`]
/// to collapse them.
pub type ImpactMap = IndexMap<String, Vec<String>>;

struct Frame<'a> {
    dependents: &'a [String],
    cursor: usize,
}

impl<'a> Frame<'a> {
    fn new(index: &'a ReverseDependencyIndex, service: &str) -> Self {
        Self {
            dependents: index.dependents(service),
            cursor: 0,
        }
    }

    fn next_dependent(&mut self) -> Option<&'a String> {
        let dependents = self.dependents;
        let dependent = dependents.get(self.cursor)?;
        self.cursor += 1;
        Some(dependent)
    }
}

/// Propagates the impact of a glitch on `root`, starting the walk at `current`.
///
/// `current` is marked as visited, and then each of its direct dependents is appended to `impact[root]`. Dependents
/// that have not yet been visited are expanded in turn, depth-first. Dependents that were already visited are still
/// recorded (once per edge that reaches them) but never expanded again.
///
/// No entry is created for `root` when nothing depends on `current`.
///
/// Returns the number of services expanded during the walk, including `current`.
pub fn propagate(
    root: &str, current: &str, index: &ReverseDependencyIndex, visited: &mut VisitedSet, impact: &mut ImpactMap,
) -> usize {
    visited.insert(current.to_owned());

    let mut expanded = 1;
    let mut reached = Vec::new();
    let mut stack = vec![Frame::new(index, current)];

    while let Some(frame) = stack.last_mut() {
        let Some(dependent) = frame.next_dependent() else {
            stack.pop();
            continue;
        };

        reached.push(dependent.clone());

        if visited.insert(dependent.clone()) {
            expanded += 1;
            stack.push(Frame::new(index, dependent));
        }
    }

    if !reached.is_empty() {
        impact.entry(root.to_owned()).or_default().extend(reached);
    }

    expanded
}

/// Removes duplicates from a raw impact list, keeping the first occurrence of each service.
pub fn distinct(nodes: &[String]) -> Vec<String> {
    let mut seen = IndexSet::with_capacity(nodes.len());
    for node in nodes {
        seen.insert(node.as_str());
    }

    seen.into_iter().map(str::to_owned).collect()
}

/// Computes the distinct set of services transitively impacted by a glitch on `root`, in discovery order.
pub fn impact_of(root: &str, index: &ReverseDependencyIndex) -> Vec<String> {
    let mut visited = VisitedSet::new();
    let mut impact = ImpactMap::new();
    propagate(root, root, index, &mut visited, &mut impact);

    impact.get(root).map(|nodes| distinct(nodes)).unwrap_or_default()
}
