//! # Quorum Derivation
//!
//! Every node must arrive at the same committee for a height from the same
//! chain state, with nothing but the registry and a block hash as input.
//!
//! ## Algorithm
//!
//! 1. `seed = Keccak256(block_hash(height - offset) || type tag || height)`
//! 2. Candidates are taken in public-key order, then shuffled with a seeded
//!    Fisher-Yates. Each draw hashes the running state with a round counter
//!    and reduces the first eight bytes by rejection sampling, so indices
//!    carry no modulo bias.
//! 3. Validators are the first `validators` shuffled active nodes.
//! 4. Workers continue the same random stream over the remaining candidates.
//!
//! ```text
//!   active (sorted) ──shuffle──► [ v0 v1 .. v9 | rest.. ]
//!                                  validators     └─► worker candidates
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use shared_types::{Hash, PublicKey};

use super::registry::RegistrySnapshot;
use crate::config::QuorumSizes;
use crate::error::{ConsensusError, ConsensusResult};

/// Kinds of quorum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum QuorumType {
    /// Tests workers and votes on state changes, every block
    Obligations,
    /// Signs checkpoints at checkpoint heights
    Checkpointing,
}

impl QuorumType {
    pub const ALL: [QuorumType; 2] = [QuorumType::Obligations, QuorumType::Checkpointing];

    fn tag(&self) -> u8 {
        match self {
            Self::Obligations => 0,
            Self::Checkpointing => 1,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Obligations => "obligations",
            Self::Checkpointing => "checkpointing",
        }
    }
}

/// Committee for one height. Order is significant: votes address
/// validators and workers by index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quorum {
    pub quorum_type: QuorumType,
    pub height: u64,
    pub validators: Vec<PublicKey>,
    pub workers: Vec<PublicKey>,
}

impl Quorum {
    /// The "no quorum" value.
    pub fn empty(quorum_type: QuorumType, height: u64) -> Self {
        Self {
            quorum_type,
            height,
            validators: Vec::new(),
            workers: Vec::new(),
        }
    }

    /// False when the network was too small to form a committee.
    pub fn is_available(&self) -> bool {
        !self.validators.is_empty() && !self.workers.is_empty()
    }

    pub fn validator(&self, index: u16) -> Option<&PublicKey> {
        self.validators.get(usize::from(index))
    }

    pub fn worker(&self, index: u16) -> Option<&PublicKey> {
        self.workers.get(usize::from(index))
    }
}

/// Seed for the quorum of `quorum_type` at `height`.
pub fn quorum_seed(block_hash: &Hash, quorum_type: QuorumType, height: u64) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(block_hash);
    hasher.update([quorum_type.tag()]);
    hasher.update(height.to_le_bytes());
    hasher.finalize().into()
}

/// Keccak-driven stream of unbiased indices.
struct SeededRng {
    state: Hash,
    round: u64,
}

impl SeededRng {
    fn new(seed: &Hash) -> Self {
        Self {
            state: *seed,
            round: 0,
        }
    }

    fn next_u64(&mut self) -> u64 {
        let mut hasher = Keccak256::new();
        hasher.update(self.state);
        hasher.update(self.round.to_le_bytes());
        self.state = hasher.finalize().into();
        self.round += 1;

        let mut word = [0u8; 8];
        word.copy_from_slice(&self.state[..8]);
        u64::from_le_bytes(word)
    }

    /// Uniform value in `0..bound`. `bound` must be non-zero.
    fn below(&mut self, bound: u64) -> u64 {
        // Largest multiple of `bound` that fits, minus one.
        let remainder = (u64::MAX % bound + 1) % bound;
        let zone = u64::MAX - remainder;
        loop {
            let x = self.next_u64();
            if x <= zone {
                return x % bound;
            }
        }
    }

    fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.below(i as u64 + 1) as usize;
            items.swap(i, j);
        }
    }
}

/// Fisher-Yates shuffle of `items` driven by `seed`.
pub fn shuffle_with_seed<T: Clone>(items: &[T], seed: &Hash) -> Vec<T> {
    let mut result = items.to_vec();
    SeededRng::new(seed).shuffle(&mut result);
    result
}

/// Number of workers tested out of `candidates`.
fn worker_count(candidates: usize, sizes: &QuorumSizes) -> usize {
    let scaled = candidates / sizes.nth_of_network.max(1);
    candidates.min(sizes.min_workers.max(scaled))
}

/// Derive the quorum of `quorum_type` at `height` from `snapshot`.
///
/// Returns the empty quorum when fewer than `validators + 1` nodes are
/// active or no worker candidate remains.
pub fn derive_quorum(
    snapshot: &RegistrySnapshot,
    height: u64,
    seed: &Hash,
    quorum_type: QuorumType,
    sizes: &QuorumSizes,
) -> ConsensusResult<Quorum> {
    let active = snapshot.active_keys();
    if active.len() < sizes.min_nodes() {
        return Ok(Quorum::empty(quorum_type, height));
    }

    let mut rng = SeededRng::new(seed);
    let mut shuffled = active;
    rng.shuffle(&mut shuffled);
    let rest = shuffled.split_off(sizes.validators);
    let validators = shuffled;

    let mut candidates = match quorum_type {
        QuorumType::Obligations => {
            let chosen: HashSet<&PublicKey> = validators.iter().collect();
            snapshot
                .registered_keys()
                .into_iter()
                .filter(|key| !chosen.contains(key))
                .collect()
        }
        QuorumType::Checkpointing => rest,
    };
    rng.shuffle(&mut candidates);
    candidates.truncate(worker_count(candidates.len(), sizes));

    if candidates.is_empty() {
        return Ok(Quorum::empty(quorum_type, height));
    }

    let quorum = Quorum {
        quorum_type,
        height,
        validators,
        workers: candidates,
    };
    check_unique_members(&quorum)?;
    Ok(quorum)
}

fn check_unique_members(quorum: &Quorum) -> ConsensusResult<()> {
    let mut seen = HashSet::with_capacity(quorum.validators.len() + quorum.workers.len());
    for key in quorum.validators.iter().chain(quorum.workers.iter()) {
        if !seen.insert(*key) {
            return Err(ConsensusError::Internal(format!(
                "{} quorum at height {} contains {} twice",
                quorum.quorum_type.label(),
                quorum.height,
                key.short()
            )));
        }
    }
    Ok(())
}
