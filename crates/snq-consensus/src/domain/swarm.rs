//! Swarm partitioning
//!
//! Storage swarms are recomputed from scratch every block, so the assignment
//! depends only on the final active set and never on the order in which nodes
//! joined or left.

use std::collections::BTreeMap;

use shared_types::PublicKey;

use super::node::SwarmId;
use crate::config::SwarmConfig;

/// Number of swarms for `active` nodes.
pub fn swarm_count(active: usize, config: &SwarmConfig) -> usize {
    if active < config.min_swarm_size {
        return 0;
    }

    let ideal = config.ideal_swarm_size.max(1);
    let threshold = config.split_threshold();
    let mut swarms = 1usize;
    while active >= (swarms + 1) * ideal && active - swarms * ideal >= threshold {
        swarms += 1;
    }
    while swarms > 1 && active / swarms < config.min_swarm_size {
        swarms -= 1;
    }
    swarms
}

/// Id of swarm `index` out of `count`.
pub fn swarm_id(index: usize, count: usize) -> SwarmId {
    let spacing = u64::MAX / count.max(1) as u64;
    index as u64 * spacing
}

/// Assign every active node to a swarm.
///
/// Nodes are dealt into contiguous key ranges; the first `n % swarms` swarms
/// take one extra member. Returns an empty map below the minimum swarm size.
pub fn compute_swarms(active: &[PublicKey], config: &SwarmConfig) -> BTreeMap<PublicKey, SwarmId> {
    let mut keys = active.to_vec();
    keys.sort_unstable();
    keys.dedup();

    let count = swarm_count(keys.len(), config);
    let mut assignment = BTreeMap::new();
    if count == 0 {
        return assignment;
    }

    let base = keys.len() / count;
    let extra = keys.len() % count;
    let mut members = keys.into_iter();
    for index in 0..count {
        let size = base + usize::from(index < extra);
        let id = swarm_id(index, count);
        for key in members.by_ref().take(size) {
            assignment.insert(key, id);
        }
    }
    assignment
}
