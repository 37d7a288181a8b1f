//! # Consensus Metrics
//!
//! Prometheus metrics for block application, voting and chain selection.
//!
//! ## Usage
//!
//! Enable with the `metrics` feature:
//! ```toml
//! snq-consensus = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `snq_blocks_applied_total` - Counter of blocks accepted into a fork
//! - `snq_blocks_rejected_total` - Counter of rejected blocks (by reason)
//! - `snq_votes_accepted_total` - Counter of checkpoint votes stored
//! - `snq_votes_rejected_total` - Counter of rejected checkpoint votes (by reason)
//! - `snq_checkpoints_formed_total` - Counter of checkpoints formed from pool votes
//! - `snq_reorgs_total` - Counter of canonical reorgs
//! - `snq_reorg_depth` - Gauge of the depth of the last reorg
//! - `snq_state_changes_rejected_total` - Counter of rejected state changes (by reason)
//! - `snq_live_forks` - Gauge of retained fork tips

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{
    register_gauge, register_int_counter, register_int_counter_vec, Gauge, IntCounter,
    IntCounterVec,
};

#[cfg(feature = "metrics")]
lazy_static! {
    /// Blocks accepted into a fork
    pub static ref BLOCKS_APPLIED: IntCounter = register_int_counter!(
        "snq_blocks_applied_total",
        "Total number of blocks applied"
    )
    .expect("Failed to create BLOCKS_APPLIED metric");

    /// Blocks rejected, labeled by reason
    pub static ref BLOCKS_REJECTED: IntCounterVec = register_int_counter_vec!(
        "snq_blocks_rejected_total",
        "Total number of blocks rejected",
        &["reason"]
    )
    .expect("Failed to create BLOCKS_REJECTED metric");

    /// Checkpoint votes stored
    pub static ref VOTES_ACCEPTED: IntCounter = register_int_counter!(
        "snq_votes_accepted_total",
        "Total number of checkpoint votes accepted"
    )
    .expect("Failed to create VOTES_ACCEPTED metric");

    /// Checkpoint votes rejected, labeled by reason
    pub static ref VOTES_REJECTED: IntCounterVec = register_int_counter_vec!(
        "snq_votes_rejected_total",
        "Total number of checkpoint votes rejected",
        &["reason"]
    )
    .expect("Failed to create VOTES_REJECTED metric");

    /// Checkpoints formed from pool votes
    pub static ref CHECKPOINTS_FORMED: IntCounter = register_int_counter!(
        "snq_checkpoints_formed_total",
        "Total number of checkpoints formed"
    )
    .expect("Failed to create CHECKPOINTS_FORMED metric");

    /// Canonical reorgs
    pub static ref REORGS: IntCounter = register_int_counter!(
        "snq_reorgs_total",
        "Total number of canonical reorgs"
    )
    .expect("Failed to create REORGS metric");

    /// Depth of the most recent reorg
    pub static ref REORG_DEPTH: Gauge = register_gauge!(
        "snq_reorg_depth",
        "Canonical blocks abandoned by the last reorg"
    )
    .expect("Failed to create REORG_DEPTH metric");

    /// State changes rejected, labeled by reason
    pub static ref STATE_CHANGES_REJECTED: IntCounterVec = register_int_counter_vec!(
        "snq_state_changes_rejected_total",
        "Total number of state change transactions rejected",
        &["reason"]
    )
    .expect("Failed to create STATE_CHANGES_REJECTED metric");

    /// Retained fork tips
    pub static ref LIVE_FORKS: Gauge = register_gauge!(
        "snq_live_forks",
        "Number of retained fork tips"
    )
    .expect("Failed to create LIVE_FORKS metric");
}

// =============================================================================
// METRIC RECORDING FUNCTIONS
// =============================================================================

#[cfg(feature = "metrics")]
pub fn record_block_applied() {
    BLOCKS_APPLIED.inc();
}

#[cfg(feature = "metrics")]
pub fn record_block_rejected(reason: &str) {
    BLOCKS_REJECTED.with_label_values(&[reason]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_vote_accepted() {
    VOTES_ACCEPTED.inc();
}

#[cfg(feature = "metrics")]
pub fn record_vote_rejected(reason: &str) {
    VOTES_REJECTED.with_label_values(&[reason]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_checkpoint_formed() {
    CHECKPOINTS_FORMED.inc();
}

#[cfg(feature = "metrics")]
pub fn record_reorg(depth: u64) {
    REORGS.inc();
    REORG_DEPTH.set(depth as f64);
}

#[cfg(feature = "metrics")]
pub fn record_state_change_rejected(reason: &str) {
    STATE_CHANGES_REJECTED.with_label_values(&[reason]).inc();
}

#[cfg(feature = "metrics")]
pub fn set_live_forks(count: usize) {
    LIVE_FORKS.set(count as f64);
}

// =============================================================================
// NO-OP IMPLEMENTATIONS (when metrics feature is disabled)
// =============================================================================

#[cfg(not(feature = "metrics"))]
pub fn record_block_applied() {}

#[cfg(not(feature = "metrics"))]
pub fn record_block_rejected(_reason: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_vote_accepted() {}

#[cfg(not(feature = "metrics"))]
pub fn record_vote_rejected(_reason: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_checkpoint_formed() {}

#[cfg(not(feature = "metrics"))]
pub fn record_reorg(_depth: u64) {}

#[cfg(not(feature = "metrics"))]
pub fn record_state_change_rejected(_reason: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn set_live_forks(_count: usize) {}
