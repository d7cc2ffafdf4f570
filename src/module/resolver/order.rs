//! Resolution order
//!
//! Orders newly resolved revisions providers first, so RESOLVED events go
//! out in dependency order.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::debug;

use crate::module::model::{RevisionId, Wire};

/// Topological sort of `revisions` over `wires` (providers before consumers)
///
/// Members of wiring cycles cannot be ordered; they are appended in id order.
pub(crate) fn resolution_order(revisions: &BTreeSet<RevisionId>, wires: &[Wire]) -> Vec<RevisionId> {
    let mut in_degree: BTreeMap<RevisionId, usize> = revisions.iter().map(|r| (*r, 0)).collect();
    let mut consumers: BTreeMap<RevisionId, BTreeSet<RevisionId>> = BTreeMap::new();

    for wire in wires {
        let (provider, consumer) = (wire.provider(), wire.requirer());
        if provider == consumer || !revisions.contains(&provider) || !revisions.contains(&consumer) {
            continue;
        }
        if consumers.entry(provider).or_default().insert(consumer) {
            if let Some(degree) = in_degree.get_mut(&consumer) {
                *degree += 1;
            }
        }
    }

    // Kahn's algorithm
    let mut queue: VecDeque<RevisionId> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| *id)
        .collect();

    let mut result = Vec::with_capacity(revisions.len());
    while let Some(revision) = queue.pop_front() {
        result.push(revision);
        if let Some(dependents) = consumers.get(&revision) {
            for dependent in dependents {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(*dependent);
                    }
                }
            }
        }
    }

    if result.len() != revisions.len() {
        let placed: BTreeSet<RevisionId> = result.iter().copied().collect();
        let cyclic: Vec<RevisionId> = revisions.difference(&placed).copied().collect();
        debug!("Wiring cycle among revisions {:?}", cyclic);
        result.extend(cyclic);
    }

    result
}
