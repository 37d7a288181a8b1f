//! Candidate blocks as seen by the consensus core
//!
//! Proof-of-work and general transaction validity are checked upstream; the
//! core only reads what affects the registry, quorums and checkpoints.

use serde::{Deserialize, Serialize};
use shared_types::{Hash, PublicKey};

use super::checkpoint::Checkpoint;
use super::state_change::StateChangeTx;

/// Stakes a new service node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationTx {
    pub service_node_key: PublicKey,
    pub owner: Hash,
    pub stake: u64,
}

/// Transactions in block order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transaction {
    Registration(RegistrationTx),
    StateChange(StateChangeTx),
    /// Anything the core does not interpret
    Standard { tx_hash: Hash },
}

/// A block already accepted by proof-of-work validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub height: u64,
    pub hash: Hash,
    pub prev_hash: Hash,
    /// Work contributed by this block
    pub difficulty: u128,
    pub hard_fork_version: u8,
    pub transactions: Vec<Transaction>,
    /// Aggregated votes for an earlier block on the same chain
    pub checkpoint: Option<Checkpoint>,
}

/// Head of a fork.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTip {
    pub height: u64,
    pub hash: Hash,
    pub cumulative_difficulty: u128,
    pub hard_fork_version: u8,
}
