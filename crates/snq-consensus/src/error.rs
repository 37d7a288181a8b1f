//! Error types for the service node consensus core
//!
//! Every rejection carries a precise reason so callers can tell a
//! malformed input from an internal fault.

use shared_types::{Hash, PublicKey};
use thiserror::Error;

use crate::domain::QuorumType;

/// Why a voter failed the quorum membership check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipFailure {
    /// Voter index does not address a validator of the quorum.
    IndexOutOfRange,
    /// Signature does not verify under the validator at that index.
    BadSignature,
}

impl std::fmt::Display for MembershipFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IndexOutOfRange => f.write_str("index out of range"),
            Self::BadSignature => f.write_str("bad signature"),
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{quorum} quorum needs at least one validator")]
    NoValidators { quorum: &'static str },

    #[error("{quorum} quorum min_votes {min_votes} must be in 1..={validators}")]
    MinVotesOutOfRange {
        quorum: &'static str,
        min_votes: usize,
        validators: usize,
    },

    #[error("{field} must be non-zero")]
    ZeroValue { field: &'static str },

    #[error("{field} ({value}) must be at least {min}")]
    WindowTooSmall {
        field: &'static str,
        value: u64,
        min: u64,
    },

    #[error("Invalid config document: {0}")]
    Parse(String),

    #[error("Invalid value for {var}: {value}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Consensus core errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsensusError {
    // =========================================================================
    // Block application
    // =========================================================================
    /// Parent block is not a retained fork
    #[error("Unknown parent {parent:?} for block at height {height}")]
    UnknownParent { height: u64, parent: Hash },

    /// Block already applied
    #[error("Block already known: {hash:?}")]
    AlreadyKnown { hash: Hash },

    /// Block height does not follow its parent
    #[error("Height mismatch: expected {expected}, got {actual}")]
    HeightMismatch { expected: u64, actual: u64 },

    /// Branch would rewrite history at or below the immutable height
    #[error(
        "Reorg past immutable height: diverges at {divergence_height}, immutable at {immutable_height}"
    )]
    ReorgPastImmutableHeight {
        divergence_height: u64,
        immutable_height: u64,
    },

    /// Registration for a key that is already registered
    #[error("Duplicate registration for {key:?}")]
    DuplicateRegistration { key: PublicKey },

    /// Embedded checkpoint is not at an earlier checkpoint height
    #[error("Invalid checkpoint height {height} in block {block_height}")]
    InvalidCheckpointHeight { height: u64, block_height: u64 },

    /// Embedded checkpoint names a block that is not on this chain
    #[error("Checkpoint at height {height} is not on this chain")]
    CheckpointNotOnChain { height: u64, block_hash: Hash },

    /// Feature gated behind a hard fork that is not active yet
    #[error("{feature} requires hard fork {required}, active is {active}")]
    FeatureNotActive {
        feature: &'static str,
        required: u8,
        active: u8,
    },

    // =========================================================================
    // Votes and quorums
    // =========================================================================
    /// No quorum of the given type at the height on any retained fork
    #[error("Unknown {quorum_type:?} quorum at height {height}")]
    UnknownQuorum { quorum_type: QuorumType, height: u64 },

    /// Voter is not a validator of the quorum
    #[error("Voter {voter_index} is not a quorum member: {reason}")]
    NotAQuorumMember {
        voter_index: u16,
        reason: MembershipFailure,
    },

    /// Voter already voted on this checkpoint
    #[error("Duplicate vote from voter {voter_index} at height {height}")]
    DuplicateVote { voter_index: u16, height: u64 },

    /// Same voter index appears twice in one aggregate
    #[error("Duplicate voter index {voter_index}")]
    DuplicateVoterIndex { voter_index: u16 },

    /// Aggregate is below the quorum threshold
    #[error("Insufficient votes: have {have}, need {need}")]
    InsufficientVotes { have: usize, need: usize },

    /// Vote payload cannot be submitted through this path
    #[error("Unexpected vote kind: {kind}")]
    UnexpectedVoteKind { kind: &'static str },

    // =========================================================================
    // State changes
    // =========================================================================
    /// State change carries a fee
    #[error("State change must carry zero fee, got {fee}")]
    NonZeroFee { fee: u64 },

    /// Quorum height is outside the state change lifetime
    #[error("State change too old: quorum height {quorum_height}, current {current_height}")]
    TooOld {
        quorum_height: u64,
        current_height: u64,
    },

    /// Worker index does not address a worker of the quorum
    #[error("Worker index {index} out of range ({workers} workers)")]
    WorkerIndexOutOfRange { index: u16, workers: usize },

    /// Another voter set was already accepted for this state change
    #[error("Conflicting voter permutation for {target:?}")]
    ConflictingPermutation { target: PublicKey },

    /// This exact state change was already accepted
    #[error("Duplicate state change for {target:?}")]
    DuplicateStateChange { target: PublicKey },

    /// Target is not in the registry
    #[error("Unknown target {target:?}")]
    UnknownTarget { target: PublicKey },

    /// Target has already been deregistered
    #[error("Target already deregistered: {target:?}")]
    TargetDeregistered { target: PublicKey },

    /// Target registered after the quorum that voted on it
    #[error(
        "Stale target {target:?}: registered at {registration_height}, quorum at {quorum_height}"
    )]
    StaleTarget {
        target: PublicKey,
        registration_height: u64,
        quorum_height: u64,
    },

    /// State change does not apply to the target's current status
    #[error("Invalid transition for {target:?}: {from} -> {to}")]
    InvalidStateTransition {
        target: PublicKey,
        from: &'static str,
        to: &'static str,
    },

    // =========================================================================
    // Fork table
    // =========================================================================
    /// Tip is not a retained fork
    #[error("Unknown fork {tip:?}")]
    UnknownFork { tip: Hash },

    /// The canonical branch cannot be discarded
    #[error("Cannot discard canonical fork {tip:?}")]
    CannotDiscardCanonical { tip: Hash },

    /// Configuration rejected
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Invariant violation
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConsensusError {
    /// True for recoverable rejections of caller input.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, Self::Internal(_) | Self::Config(_))
    }

    /// Stable snake_case label for logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::UnknownParent { .. } => "unknown_parent",
            Self::AlreadyKnown { .. } => "already_known",
            Self::HeightMismatch { .. } => "height_mismatch",
            Self::ReorgPastImmutableHeight { .. } => "reorg_past_immutable_height",
            Self::DuplicateRegistration { .. } => "duplicate_registration",
            Self::InvalidCheckpointHeight { .. } => "invalid_checkpoint_height",
            Self::CheckpointNotOnChain { .. } => "checkpoint_not_on_chain",
            Self::FeatureNotActive { .. } => "feature_not_active",
            Self::UnknownQuorum { .. } => "unknown_quorum",
            Self::NotAQuorumMember { .. } => "not_a_quorum_member",
            Self::DuplicateVote { .. } => "duplicate_vote",
            Self::DuplicateVoterIndex { .. } => "duplicate_voter_index",
            Self::InsufficientVotes { .. } => "insufficient_votes",
            Self::UnexpectedVoteKind { .. } => "unexpected_vote_kind",
            Self::NonZeroFee { .. } => "non_zero_fee",
            Self::TooOld { .. } => "too_old",
            Self::WorkerIndexOutOfRange { .. } => "worker_index_out_of_range",
            Self::ConflictingPermutation { .. } => "conflicting_permutation",
            Self::DuplicateStateChange { .. } => "duplicate_state_change",
            Self::UnknownTarget { .. } => "unknown_target",
            Self::TargetDeregistered { .. } => "target_deregistered",
            Self::StaleTarget { .. } => "stale_target",
            Self::InvalidStateTransition { .. } => "invalid_state_transition",
            Self::UnknownFork { .. } => "unknown_fork",
            Self::CannotDiscardCanonical { .. } => "cannot_discard_canonical",
            Self::Config(_) => "config",
            Self::Internal(_) => "internal",
        }
    }
}

/// Result type for consensus operations
pub type ConsensusResult<T> = Result<T, ConsensusError>;
