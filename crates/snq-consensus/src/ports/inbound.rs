//! Driving ports (Inbound API)

use std::sync::Arc;

use shared_types::{Hash, PublicKey};

use crate::domain::{
    Block, Checkpoint, Quorum, QuorumType, ServiceNodeEntry, StateChangeTx, Vote, VoteOutcome,
};
use crate::error::ConsensusResult;
use crate::fork_table::Reorg;

/// Outcome of an accepted block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockVerdict {
    pub hash: Hash,
    pub height: u64,
    /// Canonical tip after chain selection
    pub canonical_tip: Hash,
    /// The block is on the canonical chain after selection
    pub became_canonical: bool,
    pub reorg: Option<Reorg>,
}

/// A quorum as seen from one fork.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuorumView {
    /// Block at the quorum height on this fork
    pub block_hash: Hash,
    /// Tip of the fork the quorum was read from
    pub tip: Hash,
    pub canonical: bool,
    pub quorum: Arc<Quorum>,
}

/// Service node consensus API
pub trait ServiceNodeApi: Send + Sync {
    /// Apply a candidate block on top of its parent's state.
    ///
    /// The parent may be any retained block; the result is inserted as a new
    /// fork state and chain selection runs afterwards.
    fn apply_block(&self, block: &Block) -> ConsensusResult<BlockVerdict>;

    /// Quorum of `quorum_type` at `height`.
    ///
    /// Reads the fork ending at `fork_id`, or the canonical chain when
    /// `None`. With `include_alt`, quorums at the same height from other
    /// retained forks with a different block at that height follow.
    fn get_quorum(
        &self,
        quorum_type: QuorumType,
        height: u64,
        fork_id: Option<Hash>,
        include_alt: bool,
    ) -> ConsensusResult<Vec<QuorumView>>;

    /// Checkpoint at `height` on the canonical chain.
    fn get_checkpoint(&self, height: u64) -> Option<Checkpoint>;

    /// Canonical registry entries, optionally filtered to `keys`.
    fn get_registry_state(&self, keys: &[PublicKey]) -> Vec<ServiceNodeEntry>;

    /// Submit one checkpoint vote received from the network.
    fn submit_checkpoint_vote(&self, vote: &Vote) -> ConsensusResult<VoteOutcome>;

    /// Validate a state change for the mempool and admit it on success.
    fn validate_state_change_tx(&self, tx: &StateChangeTx, kept_by_block: bool)
        -> ConsensusResult<()>;

    /// Pick the preferred chain among `tips` and the incumbent, and make it
    /// canonical.
    fn select_canonical(&self, tips: &[Hash]) -> ConsensusResult<Hash>;

    fn canonical_tip(&self) -> Hash;

    /// Hashes of all retained fork tips.
    fn tips(&self) -> Vec<Hash>;

    /// Drop a losing branch. Returns the removed block hashes.
    fn discard_fork(&self, tip: &Hash) -> ConsensusResult<Vec<Hash>>;

    /// State changes admitted to the pool and not yet mined.
    fn pending_state_changes(&self) -> Vec<StateChangeTx>;

    /// Second most recent canonical checkpoint height.
    fn immutable_height(&self) -> Option<u64>;
}
