//! # snq-consensus
//!
//! Service node quorum and checkpoint consensus for a proof-of-work chain.
//!
//! ## Architecture
//!
//! A rotating committee of staked service nodes is derived from chain state
//! every block. Every fourth block a larger committee signs a checkpoint;
//! the second most recent checkpoint makes everything at or below it
//! immutable. Obligations quorums vote separately to decommission or
//! deregister misbehaving nodes.
//!
//! ```text
//!   candidate block
//!        │
//!        ▼
//!  ┌───────────────┐  parent state   ┌──────────────┐
//!  │ ServiceNode   │ ◄────────────── │  ForkTable   │
//!  │ Service       │ ──────────────► │ (Arc states) │
//!  └──────┬────────┘   child state   └──────┬───────┘
//!         │                                 │
//!         ▼                                 ▼
//!  ┌──────────────┐                 ┌───────────────┐
//!  │  VotePool    │ ── checkpoint ─►│ Chain Selector│
//!  └──────────────┘                 └───────────────┘
//! ```
//!
//! Each retained block owns an immutable `ConsensusState`. Applying a block
//! clones its parent's state and edits the clone, so competing forks never
//! see each other's registry, quorums or checkpoints.
//!
//! ## Chain Selection
//!
//! 1. More accepted checkpoints
//! 2. Greater cumulative difficulty
//! 3. The incumbent keeps ties
//!
//! ## Usage
//!
//! ```rust,ignore
//! use snq_consensus::{ServiceNodeApi, ServiceNodeConfig, ServiceNodeService};
//! use snq_consensus::adapters::{Ed25519VoteVerifier, InMemoryChainView};
//!
//! let service = ServiceNodeService::new(
//!     ServiceNodeConfig::default().with_env_overrides()?,
//!     genesis,
//!     Arc::new(InMemoryChainView::new(12)),
//!     Arc::new(Ed25519VoteVerifier::new()),
//! )?;
//!
//! let verdict = service.apply_block(&block)?;
//! ```

pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod fork_table;
pub mod logging;
pub mod metrics;
pub mod ports;
pub mod service;
pub mod state;

/// Deterministic keys and a chain harness for tests.
///
/// Requires feature: `test-utils`
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// =============================================================================
// RE-EXPORTS
// =============================================================================

pub use config::{HardForkRules, QuorumSizes, ServiceNodeConfig, SwarmConfig};
pub use domain::{
    Block, ChainSummary, ChainTip, Checkpoint, CheckpointId, CheckpointStatus, NewState,
    NodeStatus, Quorum, QuorumSignature, QuorumType, RegistrationTx, RegistrySnapshot,
    ServiceNodeEntry, StateChangeTx, Transaction, Vote, VoteOutcome, VotePayload,
};
pub use error::{ConfigError, ConsensusError, ConsensusResult, MembershipFailure};
pub use fork_table::{ForkTable, Reorg};
pub use ports::{BlockVerdict, BlockchainView, QuorumView, ServiceNodeApi, VoteVerifier};
pub use service::ServiceNodeService;
pub use state::{ApplyContext, ConsensusState};
