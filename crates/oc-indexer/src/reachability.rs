//! Transitive-closure (reachability) computation over the relations graph.
//!
//! The `reachability` table is a materialized "can X reach Y, and in how
//! many hops" index used for O(1) impact-analysis lookups. It is not kept
//! transactionally consistent with `relations` during indexing — it is
//! refreshed in a separate pass, either on first index or when detected
//! stale.

use std::collections::{HashMap, VecDeque};

use oc_core::SymbolId;
use oc_storage::graph::GraphStore;
use rayon::prelude::*;

use crate::error::IndexerError;

/// Default BFS depth cap for closure computation, matching the point past
/// which impact-analysis results stop being actionable.
pub const DEFAULT_MAX_DEPTH: u32 = 10;

/// Whether a full closure computation should run: the reachability table
/// is empty but there are relations it should have been built from.
pub fn should_compute_closure(store: &GraphStore) -> Result<bool, IndexerError> {
    if store.count_relations()? == 0 {
        return Ok(false);
    }
    Ok(store.count_reachability()? == 0)
}

/// Whether the existing reachability table is stale relative to the
/// current relations graph: a one-hop edge exists that isn't reflected in
/// the materialized closure.
pub fn is_reachability_stale(store: &GraphStore) -> Result<bool, IndexerError> {
    let edges = store.get_all_relation_edges()?;
    for (source, target) in edges {
        if source == target {
            continue;
        }
        if !store.can_reach(source, target)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Rebuild the reachability table from scratch via BFS from every node
/// that has an outgoing edge. Returns the number of reachability rows
/// written.
///
/// Clears the table first, so this is safe to call on both first-index
/// and drift-repair paths.
pub fn compute_transitive_closure(
    store: &mut GraphStore,
    max_depth: u32,
) -> Result<usize, IndexerError> {
    store.clear_reachability()?;

    let edges = store.get_all_relation_edges()?;
    if edges.is_empty() {
        return Ok(0);
    }

    let adjacency = build_adjacency(&edges);
    let roots: Vec<SymbolId> = adjacency.keys().copied().collect();

    let rows: Vec<(SymbolId, SymbolId, u32)> = roots
        .par_iter()
        .flat_map(|&root| bfs_from(root, &adjacency, max_depth))
        .collect();

    store.add_reachability_batch(&rows, 1000)?;
    Ok(rows.len())
}

/// Recompute the closure only if it's missing or stale, otherwise a no-op.
/// Returns the number of rows written, or `None` if nothing needed doing.
pub fn refresh_reachability(
    store: &mut GraphStore,
    max_depth: u32,
) -> Result<Option<usize>, IndexerError> {
    if should_compute_closure(store)? || is_reachability_stale(store)? {
        Ok(Some(compute_transitive_closure(store, max_depth)?))
    } else {
        Ok(None)
    }
}

fn build_adjacency(edges: &[(SymbolId, SymbolId)]) -> HashMap<SymbolId, Vec<SymbolId>> {
    let mut adjacency: HashMap<SymbolId, Vec<SymbolId>> = HashMap::new();
    for &(source, target) in edges {
        adjacency.entry(source).or_default().push(target);
    }
    adjacency
}

/// BFS from a single root, capped at `max_depth` hops. Cycles are handled
/// by the `visited` set; the root itself is never emitted as its own
/// reachability row.
fn bfs_from(
    root: SymbolId,
    adjacency: &HashMap<SymbolId, Vec<SymbolId>>,
    max_depth: u32,
) -> Vec<(SymbolId, SymbolId, u32)> {
    let mut visited = std::collections::HashSet::new();
    visited.insert(root);
    let mut queue: VecDeque<(SymbolId, u32)> = VecDeque::new();
    queue.push_back((root, 0));
    let mut rows = Vec::new();

    while let Some((current, depth)) = queue.pop_front() {
        if depth >= max_depth {
            continue;
        }
        if let Some(neighbors) = adjacency.get(&current) {
            for &next in neighbors {
                if visited.insert(next) {
                    rows.push((root, next, depth + 1));
                    queue.push_back((next, depth + 1));
                }
            }
        }
    }

    rows
}
