//! Checkpoints
//!
//! A checkpoint is a block hash at a checkpoint height signed by at least
//! `min_votes` validators of that height's checkpointing quorum. Once a
//! chain holds two checkpoints, nothing at or below the older one can be
//! rewritten.

use serde::{Deserialize, Serialize};
use shared_types::Hash;

use super::quorum::Quorum;
use super::vote::{checkpoint_message, verify_aggregate, QuorumSignature};
use crate::config::QuorumSizes;
use crate::error::ConsensusResult;
use crate::ports::outbound::VoteVerifier;

/// The block a checkpoint vote is about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CheckpointId {
    pub height: u64,
    pub block_hash: Hash,
}

/// Vote collection progress for one block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckpointStatus {
    Collecting,
    /// Terminal
    Checkpointed,
    /// No retained fork contains the block
    Abandoned,
}

/// Aggregated checkpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub height: u64,
    pub block_hash: Hash,
    /// Sorted by voter index
    pub signatures: Vec<QuorumSignature>,
}

impl Checkpoint {
    pub fn new(height: u64, block_hash: Hash, mut signatures: Vec<QuorumSignature>) -> Self {
        signatures.sort_by_key(|sig| sig.voter_index);
        Self {
            height,
            block_hash,
            signatures,
        }
    }

    pub fn id(&self) -> CheckpointId {
        CheckpointId {
            height: self.height,
            block_hash: self.block_hash,
        }
    }

    pub fn vote_count(&self) -> usize {
        self.signatures.len()
    }

    pub fn signing_message(&self) -> Hash {
        checkpoint_message(self.height, &self.block_hash)
    }
}

pub fn is_checkpoint_height(height: u64, interval: u64) -> bool {
    interval != 0 && height % interval == 0
}

/// Verify every signature of `checkpoint` against its quorum and the
/// threshold.
pub fn verify_checkpoint(
    checkpoint: &Checkpoint,
    quorum: &Quorum,
    sizes: &QuorumSizes,
    verifier: &dyn VoteVerifier,
) -> ConsensusResult<()> {
    verify_aggregate(
        quorum,
        &checkpoint.signing_message(),
        &checkpoint.signatures,
        sizes.min_votes,
        verifier,
    )
}
