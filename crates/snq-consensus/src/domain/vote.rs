//! Quorum votes and signature checks
//!
//! A vote signs a BLAKE3 digest of its payload. Checkpoint and state-change
//! digests live in separate hash domains, so a signature for one can never be
//! replayed as the other.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use shared_crypto::VoteDigest;
use shared_types::{Hash, PublicKey, Signature};

use super::quorum::{Quorum, QuorumType};
use super::state_change::NewState;
use crate::error::{ConsensusError, ConsensusResult, MembershipFailure};
use crate::ports::outbound::VoteVerifier;

const CHECKPOINT_DOMAIN: &str = "snq checkpoint vote v1";
const STATE_CHANGE_DOMAIN: &str = "snq state change vote v1";

/// One validator's signature inside an aggregate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumSignature {
    pub voter_index: u16,
    pub signature: Signature,
}

/// What a vote is for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VotePayload {
    Checkpoint {
        height: u64,
        block_hash: Hash,
    },
    StateChange {
        height: u64,
        worker_index: u16,
        new_state: NewState,
    },
}

impl VotePayload {
    /// Height of the quorum that casts the vote.
    pub fn height(&self) -> u64 {
        match self {
            Self::Checkpoint { height, .. } | Self::StateChange { height, .. } => *height,
        }
    }

    pub fn quorum_type(&self) -> QuorumType {
        match self {
            Self::Checkpoint { .. } => QuorumType::Checkpointing,
            Self::StateChange { .. } => QuorumType::Obligations,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Checkpoint { .. } => "checkpoint",
            Self::StateChange { .. } => "state_change",
        }
    }

    /// Digest the voter signs.
    pub fn signing_message(&self) -> Hash {
        match self {
            Self::Checkpoint { height, block_hash } => checkpoint_message(*height, block_hash),
            Self::StateChange {
                height,
                worker_index,
                new_state,
            } => state_change_message(*height, *worker_index, *new_state),
        }
    }
}

/// A single signed vote.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub voter_index: u16,
    pub signature: Signature,
    pub payload: VotePayload,
}

impl Vote {
    pub fn quorum_signature(&self) -> QuorumSignature {
        QuorumSignature {
            voter_index: self.voter_index,
            signature: self.signature,
        }
    }
}

pub fn checkpoint_message(height: u64, block_hash: &Hash) -> Hash {
    VoteDigest::new(CHECKPOINT_DOMAIN)
        .u64(height)
        .bytes(block_hash)
        .finish()
}

pub fn state_change_message(height: u64, worker_index: u16, new_state: NewState) -> Hash {
    VoteDigest::new(STATE_CHANGE_DOMAIN)
        .u64(height)
        .u16(worker_index)
        .tag(new_state.tag())
        .finish()
}

/// Check that `voter_index` addresses a validator whose key signed `message`.
pub fn verify_member(
    quorum: &Quorum,
    voter_index: u16,
    message: &Hash,
    signature: &Signature,
    verifier: &dyn VoteVerifier,
) -> ConsensusResult<PublicKey> {
    let key = quorum
        .validator(voter_index)
        .ok_or(ConsensusError::NotAQuorumMember {
            voter_index,
            reason: MembershipFailure::IndexOutOfRange,
        })?;
    if !verifier.verify(key, message, signature) {
        return Err(ConsensusError::NotAQuorumMember {
            voter_index,
            reason: MembershipFailure::BadSignature,
        });
    }
    Ok(*key)
}

/// Check an aggregate: unique indices, valid members, at least `min_votes`.
pub fn verify_aggregate(
    quorum: &Quorum,
    message: &Hash,
    signatures: &[QuorumSignature],
    min_votes: usize,
    verifier: &dyn VoteVerifier,
) -> ConsensusResult<()> {
    let mut seen = HashSet::with_capacity(signatures.len());
    for sig in signatures {
        if !seen.insert(sig.voter_index) {
            return Err(ConsensusError::DuplicateVoterIndex {
                voter_index: sig.voter_index,
            });
        }
        verify_member(quorum, sig.voter_index, message, &sig.signature, verifier)?;
    }
    if signatures.len() < min_votes {
        return Err(ConsensusError::InsufficientVotes {
            have: signatures.len(),
            need: min_votes,
        });
    }
    Ok(())
}
