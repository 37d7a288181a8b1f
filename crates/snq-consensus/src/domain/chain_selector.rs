//! Chain selection
//!
//! Checkpoints outrank work: a chain with more checkpoints wins regardless of
//! cumulative difficulty. Work breaks ties in checkpoint count, and the
//! incumbent keeps its place on a full tie.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use shared_types::Hash;

use crate::error::{ConsensusError, ConsensusResult};

/// What chain selection needs to know about a fork.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSummary {
    pub tip: Hash,
    pub height: u64,
    pub checkpoint_count: usize,
    pub cumulative_difficulty: u128,
}

/// Order two chains by preference; `Greater` means `a` is preferred.
pub fn compare_chains(a: &ChainSummary, b: &ChainSummary) -> Ordering {
    a.checkpoint_count
        .cmp(&b.checkpoint_count)
        .then(a.cumulative_difficulty.cmp(&b.cumulative_difficulty))
}

/// Pick the preferred tip among `candidates`, favoring `incumbent` on ties.
pub fn select_best(incumbent: &ChainSummary, candidates: &[ChainSummary]) -> Hash {
    let mut best = incumbent;
    for candidate in candidates {
        if compare_chains(candidate, best) == Ordering::Greater {
            best = candidate;
        }
    }
    best.tip
}

/// Heights derived from a chain's two most recent checkpoints.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImmutabilityWindow {
    /// Second most recent checkpoint; nothing at or below it may change
    pub immutable_height: Option<u64>,
    pub latest_checkpoint_height: Option<u64>,
}

impl ImmutabilityWindow {
    /// Build from checkpoint heights in ascending order.
    pub fn from_heights(heights: &[u64]) -> Self {
        let mut recent = heights.iter().rev();
        let latest_checkpoint_height = recent.next().copied();
        let immutable_height = recent.next().copied();
        Self {
            immutable_height,
            latest_checkpoint_height,
        }
    }

    /// Check that a branch diverging at `divergence_height` may be adopted.
    pub fn check_rewrite(&self, divergence_height: u64) -> ConsensusResult<()> {
        match self.immutable_height {
            Some(immutable_height) if divergence_height <= immutable_height => {
                Err(ConsensusError::ReorgPastImmutableHeight {
                    divergence_height,
                    immutable_height,
                })
            }
            _ => Ok(()),
        }
    }
}
