//! Per-fork consensus state
//!
//! A `ConsensusState` is the complete consensus view as of one block. It is
//! never mutated after construction: applying a block clones the parent
//! (cheaply, every collection sits behind an `Arc`) and edits the clone, so
//! the parent stays valid for any sibling fork and a failed application
//! leaves nothing behind.
//!
//! ## Block application order
//!
//! 1. Expire unlocked stakes and aged tombstones
//! 2. Transactions in block order (registrations, state changes)
//! 3. Embedded checkpoint
//! 4. Reward winner
//! 5. Swarms
//! 6. Quorums for the new height
//! 7. Prune bounded windows

use std::collections::BTreeMap;
use std::sync::Arc;

use shared_types::{short_hex, Hash, PublicKey};
use tracing::{debug, info};

use crate::config::ServiceNodeConfig;
use crate::domain::{
    compute_swarms, derive_quorum, is_checkpoint_height, quorum_seed, validate_state_change,
    verify_checkpoint, Block, ChainSummary, ChainTip, Checkpoint, ImmutabilityWindow, NewState,
    NodeStatus, Quorum, QuorumType, RegistrySnapshot, StateChangeContext, StateChangeLedger,
    StateChangeRecord, StateChangeTx, Transaction,
};
use crate::error::{ConsensusError, ConsensusResult};
use crate::ports::outbound::{BlockchainView, VoteVerifier};

/// Collaborators needed while applying a block.
#[derive(Clone, Copy)]
pub struct ApplyContext<'a> {
    pub config: &'a ServiceNodeConfig,
    pub verifier: &'a dyn VoteVerifier,
    pub chain: &'a dyn BlockchainView,
}

/// Consensus view at one tip.
#[derive(Clone, Debug)]
pub struct ConsensusState {
    tip: ChainTip,
    registry: RegistrySnapshot,
    block_hashes: Arc<BTreeMap<u64, Hash>>,
    quorums: Arc<BTreeMap<(u64, QuorumType), Arc<Quorum>>>,
    /// Recent checkpoints; the two newest are always kept
    checkpoints: Arc<BTreeMap<u64, Checkpoint>>,
    checkpoint_count: usize,
    state_changes: StateChangeLedger,
}

impl ConsensusState {
    /// State at a trusted starting block.
    pub fn genesis(tip: ChainTip, mut registry: RegistrySnapshot) -> Self {
        registry.set_height(tip.height);
        let mut block_hashes = BTreeMap::new();
        block_hashes.insert(tip.height, tip.hash);
        Self {
            tip,
            registry,
            block_hashes: Arc::new(block_hashes),
            quorums: Arc::new(BTreeMap::new()),
            checkpoints: Arc::new(BTreeMap::new()),
            checkpoint_count: 0,
            state_changes: StateChangeLedger::default(),
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn tip(&self) -> &ChainTip {
        &self.tip
    }

    pub fn height(&self) -> u64 {
        self.tip.height
    }

    pub fn hash(&self) -> Hash {
        self.tip.hash
    }

    pub fn registry(&self) -> &RegistrySnapshot {
        &self.registry
    }

    /// Hash of this chain's block at `height`, within the history window.
    pub fn block_hash_at(&self, height: u64) -> Option<Hash> {
        self.block_hashes.get(&height).copied()
    }

    pub fn contains_block(&self, height: u64, hash: &Hash) -> bool {
        self.block_hashes.get(&height) == Some(hash)
    }

    /// Available quorum of `quorum_type` at `height`.
    pub fn quorum(&self, quorum_type: QuorumType, height: u64) -> Option<&Arc<Quorum>> {
        self.quorums.get(&(height, quorum_type))
    }

    pub fn checkpoint(&self, height: u64) -> Option<&Checkpoint> {
        self.checkpoints.get(&height)
    }

    /// Retained checkpoints in ascending height order.
    pub fn checkpoints(&self) -> impl Iterator<Item = &Checkpoint> {
        self.checkpoints.values()
    }

    /// Checkpoints ever accepted on this chain.
    pub fn checkpoint_count(&self) -> usize {
        self.checkpoint_count
    }

    pub fn immutability_window(&self) -> ImmutabilityWindow {
        let recent: Vec<u64> = self.checkpoints.keys().rev().take(2).rev().copied().collect();
        ImmutabilityWindow::from_heights(&recent)
    }

    pub fn summary(&self) -> ChainSummary {
        ChainSummary {
            tip: self.tip.hash,
            height: self.tip.height,
            checkpoint_count: self.checkpoint_count,
            cumulative_difficulty: self.tip.cumulative_difficulty,
        }
    }

    pub fn state_changes(&self) -> &StateChangeLedger {
        &self.state_changes
    }

    /// Validate a state change against this chain.
    ///
    /// `extra_ledgers` are consulted for duplicates after the chain's own
    /// records, e.g. the pending pool.
    pub fn validate_state_change(
        &self,
        tx: &StateChangeTx,
        current_height: u64,
        kept_by_block: bool,
        extra_ledgers: &[&StateChangeLedger],
        ctx: &ApplyContext<'_>,
    ) -> ConsensusResult<StateChangeRecord> {
        let mut ledgers: Vec<&StateChangeLedger> = Vec::with_capacity(1 + extra_ledgers.len());
        ledgers.push(&self.state_changes);
        ledgers.extend_from_slice(extra_ledgers);

        let quorum = self.quorum(QuorumType::Obligations, tx.quorum_height);
        let context = StateChangeContext {
            registry: &self.registry,
            quorum: quorum.map(Arc::as_ref),
            ledgers: &ledgers,
            current_height,
            sizes: &ctx.config.obligations,
            lifetime: ctx.config.state_change_tx_lifetime,
            verifier: ctx.verifier,
        };
        validate_state_change(tx, &context, kept_by_block)
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Apply `block` on top of this state, returning the child state.
    pub fn apply_block(&self, block: &Block, ctx: &ApplyContext<'_>) -> ConsensusResult<Self> {
        if block.prev_hash != self.tip.hash {
            return Err(ConsensusError::UnknownParent {
                height: block.height,
                parent: block.prev_hash,
            });
        }
        let expected = self.tip.height + 1;
        if block.height != expected {
            return Err(ConsensusError::HeightMismatch {
                expected,
                actual: block.height,
            });
        }

        let config = ctx.config;
        let forks = &config.hard_forks;
        let height = block.height;
        let version = block.hard_fork_version;
        let service_nodes_active = version >= forks.service_nodes;

        let mut next = self.clone();
        next.registry.set_height(height);

        let expired = next
            .registry
            .expire(height, config.state_change_tx_lifetime);
        if !expired.is_empty() {
            debug!(height, count = expired.len(), "Expired service node entries");
        }

        Arc::make_mut(&mut next.block_hashes).insert(height, block.hash);

        for tx in &block.transactions {
            match tx {
                Transaction::Registration(registration) => {
                    require_fork("service node registration", forks.service_nodes, version)?;
                    next.registry
                        .register(registration, height, config.stake_lock_blocks)?;
                    debug!(
                        height,
                        key = %registration.service_node_key.short(),
                        "Registered service node"
                    );
                }
                Transaction::StateChange(state_change) => {
                    require_fork("state change", forks.service_nodes, version)?;
                    let record = next.validate_state_change(state_change, height, true, &[], ctx)?;
                    next.apply_state_change(&record, height)?;
                }
                Transaction::Standard { .. } => {}
            }
        }

        if let Some(checkpoint) = &block.checkpoint {
            require_fork("checkpoint", forks.checkpointing, version)?;
            next.accept_embedded_checkpoint(checkpoint, height, ctx)?;
        }

        next.tip = ChainTip {
            height,
            hash: block.hash,
            cumulative_difficulty: self.tip.cumulative_difficulty.saturating_add(block.difficulty),
            hard_fork_version: version,
        };

        if service_nodes_active {
            if let Some(winner) = next.registry.select_reward_winner() {
                next.registry.mark_rewarded(&winner, height);
            }
        }

        if version >= forks.swarms {
            let assignment = compute_swarms(&next.registry.active_keys(), &config.swarm);
            next.registry.assign_swarms(&assignment);
        }

        if service_nodes_active {
            next.derive_quorum_at(QuorumType::Obligations, height, ctx)?;
            if version >= forks.checkpointing && is_checkpoint_height(height, config.checkpoint_interval)
            {
                next.derive_quorum_at(QuorumType::Checkpointing, height, ctx)?;
            }
        }

        next.prune_windows(config);
        Ok(next)
    }

    /// Copy of this state with `checkpoint` recorded, or `None` if the chain
    /// does not contain the block or already has it checkpointed.
    pub fn with_checkpoint(&self, checkpoint: &Checkpoint) -> Option<Self> {
        if !self.contains_block(checkpoint.height, &checkpoint.block_hash)
            || self.checkpoints.contains_key(&checkpoint.height)
        {
            return None;
        }
        let mut next = self.clone();
        next.insert_checkpoint(checkpoint.clone());
        Some(next)
    }

    fn insert_checkpoint(&mut self, checkpoint: Checkpoint) {
        Arc::make_mut(&mut self.checkpoints).insert(checkpoint.height, checkpoint);
        self.checkpoint_count += 1;
    }

    fn accept_embedded_checkpoint(
        &mut self,
        checkpoint: &Checkpoint,
        block_height: u64,
        ctx: &ApplyContext<'_>,
    ) -> ConsensusResult<()> {
        if checkpoint.height >= block_height
            || !is_checkpoint_height(checkpoint.height, ctx.config.checkpoint_interval)
        {
            return Err(ConsensusError::InvalidCheckpointHeight {
                height: checkpoint.height,
                block_height,
            });
        }
        if !self.contains_block(checkpoint.height, &checkpoint.block_hash) {
            return Err(ConsensusError::CheckpointNotOnChain {
                height: checkpoint.height,
                block_hash: checkpoint.block_hash,
            });
        }
        let quorum = self
            .quorum(QuorumType::Checkpointing, checkpoint.height)
            .ok_or(ConsensusError::UnknownQuorum {
                quorum_type: QuorumType::Checkpointing,
                height: checkpoint.height,
            })?;
        verify_checkpoint(checkpoint, quorum, &ctx.config.checkpointing, ctx.verifier)?;

        if !self.checkpoints.contains_key(&checkpoint.height) {
            debug!(
                height = checkpoint.height,
                block = %short_hex(&checkpoint.block_hash),
                votes = checkpoint.vote_count(),
                "Accepted embedded checkpoint"
            );
            self.insert_checkpoint(checkpoint.clone());
        }
        Ok(())
    }

    fn apply_state_change(&mut self, record: &StateChangeRecord, height: u64) -> ConsensusResult<()> {
        let target: PublicKey = record.target;
        let current = self
            .registry
            .get(&target)
            .map(|entry| entry.status)
            .ok_or(ConsensusError::UnknownTarget { target })?;
        let next_status = record.new_state.next_status(current, height).ok_or(
            ConsensusError::InvalidStateTransition {
                target,
                from: current.label(),
                to: record.new_state.label(),
            },
        )?;

        match record.new_state {
            NewState::IpChangePenalty => self.registry.mark_rewarded(&target, height),
            NewState::Deregister | NewState::Decommission | NewState::Recommission => {
                self.registry.set_status(&target, next_status)?
            }
        }
        self.state_changes.insert(record);

        info!(
            height,
            target = %target.short(),
            change = record.new_state.label(),
            quorum_height = record.quorum_height,
            "Applied state change"
        );
        if let NodeStatus::Deregistered { .. } = next_status {
            debug!(target = %target.short(), "Service node tombstoned");
        }
        Ok(())
    }

    fn seed_hash(&self, height: u64, ctx: &ApplyContext<'_>) -> ConsensusResult<Hash> {
        let seed_height = height.saturating_sub(ctx.config.quorum_seed_offset);
        self.block_hash_at(seed_height)
            .or_else(|| ctx.chain.block_hash_at(seed_height))
            .ok_or_else(|| {
                ConsensusError::Internal(format!("no block hash at seed height {seed_height}"))
            })
    }

    fn derive_quorum_at(
        &mut self,
        quorum_type: QuorumType,
        height: u64,
        ctx: &ApplyContext<'_>,
    ) -> ConsensusResult<()> {
        let hash = self.seed_hash(height, ctx)?;
        let seed = quorum_seed(&hash, quorum_type, height);
        let quorum = derive_quorum(
            &self.registry,
            height,
            &seed,
            quorum_type,
            ctx.config.sizes(quorum_type),
        )?;
        if quorum.is_available() {
            Arc::make_mut(&mut self.quorums).insert((height, quorum_type), Arc::new(quorum));
        }
        Ok(())
    }

    fn prune_windows(&mut self, config: &ServiceNodeConfig) {
        let height = self.tip.height;
        let floor = height.saturating_sub(config.history_window);

        if self.block_hashes.keys().next().is_some_and(|h| *h < floor) {
            Arc::make_mut(&mut self.block_hashes).retain(|h, _| *h >= floor);
        }
        if self.quorums.keys().next().is_some_and(|(h, _)| *h < floor) {
            Arc::make_mut(&mut self.quorums).retain(|(h, _), _| *h >= floor);
        }

        // Always keep the two newest checkpoints; they define immutability.
        let keep_from = self
            .checkpoints
            .keys()
            .rev()
            .nth(1)
            .map_or(floor, |second| floor.min(*second));
        if self.checkpoints.keys().next().is_some_and(|h| *h < keep_from) {
            Arc::make_mut(&mut self.checkpoints).retain(|h, _| *h >= keep_from);
        }

        self.state_changes
            .prune_expired(height, config.state_change_tx_lifetime);
    }
}

fn require_fork(feature: &'static str, required: u8, active: u8) -> ConsensusResult<()> {
    if active < required {
        return Err(ConsensusError::FeatureNotActive {
            feature,
            required,
            active,
        });
    }
    Ok(())
}
