//! Checkpoint vote pool
//!
//! Collects checkpoint votes per block until the threshold is reached.
//!
//! ```text
//!   Collecting ──(min_votes reached)──► Checkpointed   (terminal)
//!       │
//!       └──(block left every retained fork)──► Abandoned
//! ```
//!
//! A block that becomes reachable again reopens its collection with the
//! votes it already had.

use std::collections::BTreeMap;

use super::checkpoint::{Checkpoint, CheckpointId, CheckpointStatus};
use super::quorum::Quorum;
use super::vote::{verify_member, QuorumSignature, Vote, VotePayload};
use crate::config::QuorumSizes;
use crate::error::{ConsensusError, ConsensusResult};
use crate::ports::outbound::VoteVerifier;

/// Result of an accepted submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VoteOutcome {
    /// Vote stored, threshold not reached yet
    Pending { votes: usize, required: usize },
    /// This vote completed the checkpoint
    Checkpointed(Checkpoint),
    /// Checkpoint already formed; nothing changed
    AlreadyCheckpointed,
}

#[derive(Debug)]
struct VoteCollection {
    status: CheckpointStatus,
    votes: BTreeMap<u16, QuorumSignature>,
}

impl VoteCollection {
    fn new() -> Self {
        Self {
            status: CheckpointStatus::Collecting,
            votes: BTreeMap::new(),
        }
    }
}

/// Vote collections keyed by block.
#[derive(Debug, Default)]
pub struct VotePool {
    collections: BTreeMap<CheckpointId, VoteCollection>,
}

impl VotePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `vote` against `quorum` and store it.
    pub fn submit(
        &mut self,
        vote: &Vote,
        quorum: &Quorum,
        sizes: &QuorumSizes,
        verifier: &dyn VoteVerifier,
    ) -> ConsensusResult<VoteOutcome> {
        let VotePayload::Checkpoint { height, block_hash } = vote.payload else {
            return Err(ConsensusError::UnexpectedVoteKind {
                kind: vote.payload.kind(),
            });
        };
        let id = CheckpointId { height, block_hash };

        verify_member(
            quorum,
            vote.voter_index,
            &vote.payload.signing_message(),
            &vote.signature,
            verifier,
        )?;

        if self.status(&id) == Some(CheckpointStatus::Checkpointed) {
            return Ok(VoteOutcome::AlreadyCheckpointed);
        }

        let collection = self.collections.entry(id).or_insert_with(VoteCollection::new);
        if collection.votes.contains_key(&vote.voter_index) {
            return Err(ConsensusError::DuplicateVote {
                voter_index: vote.voter_index,
                height,
            });
        }
        collection.status = CheckpointStatus::Collecting;
        collection
            .votes
            .insert(vote.voter_index, vote.quorum_signature());

        if collection.votes.len() >= sizes.min_votes {
            collection.status = CheckpointStatus::Checkpointed;
            let signatures = collection.votes.values().copied().collect();
            return Ok(VoteOutcome::Checkpointed(Checkpoint::new(
                height, block_hash, signatures,
            )));
        }

        Ok(VoteOutcome::Pending {
            votes: collection.votes.len(),
            required: sizes.min_votes,
        })
    }

    /// Mark a checkpoint learned from a block. Returns true if it was not
    /// already checkpointed.
    pub fn record_checkpoint(&mut self, checkpoint: &Checkpoint) -> bool {
        let collection = self
            .collections
            .entry(checkpoint.id())
            .or_insert_with(VoteCollection::new);
        for sig in &checkpoint.signatures {
            collection.votes.entry(sig.voter_index).or_insert(*sig);
        }
        let fresh = collection.status != CheckpointStatus::Checkpointed;
        collection.status = CheckpointStatus::Checkpointed;
        fresh
    }

    pub fn status(&self, id: &CheckpointId) -> Option<CheckpointStatus> {
        self.collections.get(id).map(|c| c.status)
    }

    pub fn vote_count(&self, id: &CheckpointId) -> usize {
        self.collections.get(id).map_or(0, |c| c.votes.len())
    }

    /// Abandon collecting entries for which `unreachable` holds.
    pub fn abandon_where(&mut self, unreachable: impl Fn(&CheckpointId) -> bool) -> usize {
        let mut abandoned = 0;
        for (id, collection) in self.collections.iter_mut() {
            if collection.status == CheckpointStatus::Collecting && unreachable(id) {
                collection.status = CheckpointStatus::Abandoned;
                abandoned += 1;
            }
        }
        abandoned
    }

    /// Forget everything below `height`.
    pub fn prune_below(&mut self, height: u64) -> usize {
        let before = self.collections.len();
        self.collections.retain(|id, _| id.height >= height);
        before - self.collections.len()
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }
}
