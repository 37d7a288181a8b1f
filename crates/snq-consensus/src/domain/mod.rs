//! Domain layer: pure consensus logic with no locking and no I/O.

pub mod block;
pub mod chain_selector;
pub mod checkpoint;
pub mod node;
pub mod quorum;
pub mod registry;
pub mod state_change;
pub mod swarm;
pub mod vote;
pub mod vote_pool;

pub use block::{Block, ChainTip, RegistrationTx, Transaction};
pub use chain_selector::{compare_chains, select_best, ChainSummary, ImmutabilityWindow};
pub use checkpoint::{
    is_checkpoint_height, verify_checkpoint, Checkpoint, CheckpointId, CheckpointStatus,
};
pub use node::{NodeStatus, ServiceNodeEntry, SwarmId, UNASSIGNED_SWARM_ID};
pub use quorum::{derive_quorum, quorum_seed, shuffle_with_seed, Quorum, QuorumType};
pub use registry::RegistrySnapshot;
pub use state_change::{
    validate_state_change, NewState, PendingStateChanges, StateChangeContext, StateChangeKey,
    StateChangeLedger, StateChangeRecord, StateChangeTx,
};
pub use swarm::{compute_swarms, swarm_count, swarm_id};
pub use vote::{
    checkpoint_message, state_change_message, verify_aggregate, verify_member, QuorumSignature,
    Vote, VotePayload,
};
pub use vote_pool::{VoteOutcome, VotePool};
