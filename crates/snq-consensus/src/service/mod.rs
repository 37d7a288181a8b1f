//! Service Node Consensus Service
//!
//! Wires the fork table, the checkpoint vote pool and the pending state-change
//! pool behind the `ServiceNodeApi` port.
//!
//! # Locking
//!
//! New fork states are computed from `Arc` snapshots outside any lock and
//! published under a short write section on the fork table. When more than
//! one lock is held they are taken in the order: forks, vote pool, pending.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use shared_types::{short_hex, Hash, PublicKey};
use tracing::{debug, error, info, warn};

use crate::config::ServiceNodeConfig;
use crate::domain::{
    select_best, Block, ChainSummary, Checkpoint, CheckpointId, CheckpointStatus,
    PendingStateChanges, QuorumType, ServiceNodeEntry, StateChangeTx, Vote, VoteOutcome,
    VotePayload, VotePool,
};
use crate::error::{ConsensusError, ConsensusResult};
use crate::fork_table::{ForkTable, Reorg};
use crate::{log_block_event, log_vote_event};
use crate::metrics;
use crate::ports::{BlockVerdict, BlockchainView, QuorumView, ServiceNodeApi, VoteVerifier};
use crate::state::{ApplyContext, ConsensusState};

/// Service node consensus service
pub struct ServiceNodeService<C, V>
where
    C: BlockchainView,
    V: VoteVerifier,
{
    config: ServiceNodeConfig,
    chain: Arc<C>,
    verifier: Arc<V>,
    forks: RwLock<ForkTable>,
    vote_pool: Mutex<VotePool>,
    pending: Mutex<PendingStateChanges>,
}

impl<C, V> ServiceNodeService<C, V>
where
    C: BlockchainView,
    V: VoteVerifier,
{
    /// Create a service rooted at a trusted `genesis` state.
    pub fn new(
        config: ServiceNodeConfig,
        genesis: ConsensusState,
        chain: Arc<C>,
        verifier: Arc<V>,
    ) -> ConsensusResult<Self> {
        config.validate()?;
        info!(
            "[snq] Consensus service starting at height {} ({})",
            genesis.height(),
            short_hex(&genesis.hash())
        );
        Ok(Self {
            config,
            chain,
            verifier,
            forks: RwLock::new(ForkTable::new(genesis)),
            vote_pool: Mutex::new(VotePool::new()),
            pending: Mutex::new(PendingStateChanges::new()),
        })
    }

    pub fn config(&self) -> &ServiceNodeConfig {
        &self.config
    }

    /// Snapshot of the canonical tip state.
    pub fn canonical_state(&self) -> ConsensusResult<Arc<ConsensusState>> {
        self.forks.read().canonical_state().map(Arc::clone)
    }

    /// Snapshot of the state after block `hash`, if retained.
    pub fn fork_state(&self, hash: &Hash) -> Option<Arc<ConsensusState>> {
        self.forks.read().get(hash).map(Arc::clone)
    }

    pub fn checkpoint_status(&self, id: &CheckpointId) -> Option<CheckpointStatus> {
        self.vote_pool.lock().status(id)
    }

    fn apply_context(&self) -> ApplyContext<'_> {
        ApplyContext {
            config: &self.config,
            verifier: self.verifier.as_ref(),
            chain: self.chain.as_ref(),
        }
    }

    // =========================================================================
    // Block application
    // =========================================================================

    fn try_apply_block(&self, block: &Block) -> ConsensusResult<BlockVerdict> {
        loop {
            let parent = resolve_parent(&self.forks.read(), block)?;
            let child = Arc::new(parent.apply_block(block, &self.apply_context())?);
            if let Some(verdict) = self.publish_block(block, &parent, child)? {
                return Ok(verdict);
            }
            log_block_event!(
                debug,
                "Parent state changed during application, retrying",
                block.height,
                short_hex(&block.hash)
            );
        }
    }

    /// Insert `child` if `parent` is still the retained state of the block's
    /// parent. Returns `None` when the parent moved on (a checkpoint landed)
    /// and the child must be rebuilt.
    fn publish_block(
        &self,
        block: &Block,
        parent: &Arc<ConsensusState>,
        child: Arc<ConsensusState>,
    ) -> ConsensusResult<Option<BlockVerdict>> {
        let (verdict, canonical) = {
            let mut forks = self.forks.write();
            let current = resolve_parent(&forks, block)?;
            if !Arc::ptr_eq(&current, parent) {
                return Ok(None);
            }
            forks.insert(child, block.prev_hash)?;

            if let Some(checkpoint) = &block.checkpoint {
                if self.vote_pool.lock().record_checkpoint(checkpoint) {
                    log_block_event!(
                        debug,
                        "Checkpoint learned from block",
                        checkpoint.height,
                        short_hex(&checkpoint.block_hash)
                    );
                }
                spread_checkpoint(&mut forks, checkpoint)?;
            }

            let reorg = self.reselect(&mut forks)?;
            self.prune_forks(&mut forks)?;
            self.abandon_unreachable(&forks);

            let verdict = BlockVerdict {
                hash: block.hash,
                height: block.height,
                canonical_tip: forks.canonical_tip(),
                became_canonical: forks.is_canonical(&block.hash),
                reorg,
            };
            (verdict, Arc::clone(forks.canonical_state()?))
        };

        self.pending.lock().prune(
            canonical.state_changes(),
            canonical.height() + 1,
            self.config.state_change_tx_lifetime,
        );

        log_block_event!(
            debug,
            "Block applied",
            block.height,
            short_hex(&block.hash),
            canonical = verdict.became_canonical
        );
        Ok(Some(verdict))
    }

    /// Re-run chain selection over every retained tip.
    fn reselect(&self, forks: &mut ForkTable) -> ConsensusResult<Option<Reorg>> {
        let canonical = Arc::clone(forks.canonical_state()?);
        let window = canonical.immutability_window();
        let candidates: Vec<ChainSummary> = forks
            .tips()
            .iter()
            .filter(|state| state.hash() != canonical.hash())
            .filter(|state| {
                forks
                    .divergence_height(&state.hash())
                    .is_ok_and(|divergence| window.check_rewrite(divergence).is_ok())
            })
            .map(|state| state.summary())
            .collect();

        let best = select_best(&canonical.summary(), &candidates);
        let reorg = forks.set_canonical(best)?;
        if let Some(reorg) = &reorg {
            log_reorg(reorg);
        }
        Ok(reorg)
    }

    /// Drop branches that diverge at or below the immutable height and
    /// states older than the retention window.
    ///
    /// Canonical ancestors below the immutable height stay until they age
    /// out, so a late block built on one is reported as a rewrite rather than
    /// an unknown parent.
    fn prune_forks(&self, forks: &mut ForkTable) -> ConsensusResult<()> {
        let canonical = Arc::clone(forks.canonical_state()?);
        let window = canonical.immutability_window();

        let dead: Vec<Hash> = forks
            .tips()
            .iter()
            .map(|state| state.hash())
            .filter(|tip| !forks.is_canonical(tip))
            .filter(|tip| {
                forks
                    .divergence_height(tip)
                    .is_ok_and(|divergence| window.check_rewrite(divergence).is_err())
            })
            .collect();
        for tip in &dead {
            let removed = forks.discard(tip)?;
            debug!(tip = %short_hex(tip), removed = removed.len(), "Dropped dead branch");
        }

        let floor = canonical
            .height()
            .saturating_sub(self.config.fork_retention);
        let removed = forks.prune_below(floor);
        if removed > 0 {
            debug!(floor, removed, "Pruned fork states");
        }
        metrics::set_live_forks(forks.tips().len());
        Ok(())
    }

    /// Abandon vote collections for blocks no retained fork contains, and
    /// forget collections older than the history window.
    fn abandon_unreachable(&self, forks: &ForkTable) {
        let tip_height = forks.canonical_state().map_or(0, |state| state.height());
        let mut pool = self.vote_pool.lock();
        let abandoned = pool.abandon_where(|id| {
            forks
                .states_containing(id.height, &id.block_hash)
                .is_empty()
        });
        if abandoned > 0 {
            debug!(abandoned, "Abandoned checkpoint vote collections");
        }
        pool.prune_below(tip_height.saturating_sub(self.config.history_window));
    }

    // =========================================================================
    // Checkpoint votes
    // =========================================================================

    fn try_submit_checkpoint_vote(&self, vote: &Vote) -> ConsensusResult<VoteOutcome> {
        let VotePayload::Checkpoint { height, block_hash } = vote.payload else {
            return Err(ConsensusError::UnexpectedVoteKind {
                kind: vote.payload.kind(),
            });
        };

        let required = self.config.hard_forks.checkpointing;
        let active = self.chain.active_hard_fork_version();
        if active < required {
            return Err(ConsensusError::FeatureNotActive {
                feature: "checkpoint voting",
                required,
                active,
            });
        }

        let quorum = {
            let forks = self.forks.read();
            let quorum = forks
                .states_containing(height, &block_hash)
                .iter()
                .filter_map(|hash| forks.get(hash))
                .find_map(|state| state.quorum(QuorumType::Checkpointing, height).map(Arc::clone));
            quorum
        }
        .ok_or(ConsensusError::UnknownQuorum {
            quorum_type: QuorumType::Checkpointing,
            height,
        })?;

        let outcome = self.vote_pool.lock().submit(
            vote,
            &quorum,
            &self.config.checkpointing,
            self.verifier.as_ref(),
        )?;

        match &outcome {
            VoteOutcome::Pending { votes, required } => {
                metrics::record_vote_accepted();
                log_vote_event!(
                    debug,
                    "Checkpoint vote accepted",
                    height,
                    vote.voter_index,
                    block = %short_hex(&block_hash),
                    votes,
                    required
                );
            }
            VoteOutcome::Checkpointed(checkpoint) => {
                metrics::record_vote_accepted();
                metrics::record_checkpoint_formed();
                info!(
                    "[snq] Checkpoint formed at height {} ({}) with {} votes",
                    height,
                    short_hex(&block_hash),
                    checkpoint.vote_count()
                );
                let mut forks = self.forks.write();
                spread_checkpoint(&mut forks, checkpoint)?;
                self.reselect(&mut forks)?;
                self.prune_forks(&mut forks)?;
            }
            VoteOutcome::AlreadyCheckpointed => {
                log_vote_event!(
                    debug,
                    "Vote for formed checkpoint ignored",
                    height,
                    vote.voter_index
                );
            }
        }
        Ok(outcome)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    fn quorum_view(
        forks: &ForkTable,
        state: &ConsensusState,
        quorum_type: QuorumType,
        height: u64,
    ) -> Option<QuorumView> {
        let quorum = state.quorum(quorum_type, height)?;
        let block_hash = state.block_hash_at(height)?;
        let canonical = forks
            .canonical_state()
            .is_ok_and(|canonical| canonical.contains_block(height, &block_hash));
        Some(QuorumView {
            block_hash,
            tip: state.hash(),
            canonical,
            quorum: Arc::clone(quorum),
        })
    }
}

/// Parent state of `block`, provided the block is new and its branch does not
/// rewrite history at or below the immutable height.
fn resolve_parent(forks: &ForkTable, block: &Block) -> ConsensusResult<Arc<ConsensusState>> {
    if forks.contains(&block.hash) {
        return Err(ConsensusError::AlreadyKnown { hash: block.hash });
    }
    let parent = forks
        .get(&block.prev_hash)
        .map(Arc::clone)
        .ok_or(ConsensusError::UnknownParent {
            height: block.height,
            parent: block.prev_hash,
        })?;
    let divergence = forks.divergence_height(&block.prev_hash)?;
    forks
        .canonical_state()?
        .immutability_window()
        .check_rewrite(divergence)?;
    Ok(parent)
}

/// Record `checkpoint` in every retained state whose chain contains its block.
fn spread_checkpoint(forks: &mut ForkTable, checkpoint: &Checkpoint) -> ConsensusResult<usize> {
    let mut updated = 0;
    for hash in forks.states_containing(checkpoint.height, &checkpoint.block_hash) {
        let next = forks
            .get(&hash)
            .and_then(|state| state.with_checkpoint(checkpoint));
        if let Some(next) = next {
            forks.replace(Arc::new(next))?;
            updated += 1;
        }
    }
    Ok(updated)
}

fn log_reorg(reorg: &Reorg) {
    metrics::record_reorg(reorg.depth);
    info!(
        "[snq] Reorg: {} -> {} (common height {}, depth {})",
        short_hex(&reorg.old_tip),
        short_hex(&reorg.new_tip),
        reorg.common_height,
        reorg.depth
    );
}

fn log_rejection(operation: &'static str, err: &ConsensusError) {
    if err.is_rejection() {
        warn!(operation, reason = err.reason(), "[snq] {}", err);
    } else {
        error!(operation, "[snq] {}", err);
    }
}

impl<C, V> ServiceNodeApi for ServiceNodeService<C, V>
where
    C: BlockchainView,
    V: VoteVerifier,
{
    fn apply_block(&self, block: &Block) -> ConsensusResult<BlockVerdict> {
        let result = self.try_apply_block(block);
        match &result {
            Ok(_) => metrics::record_block_applied(),
            Err(err) => {
                metrics::record_block_rejected(err.reason());
                log_rejection("apply_block", err);
            }
        }
        result
    }

    fn get_quorum(
        &self,
        quorum_type: QuorumType,
        height: u64,
        fork_id: Option<Hash>,
        include_alt: bool,
    ) -> ConsensusResult<Vec<QuorumView>> {
        let forks = self.forks.read();
        let base_hash = fork_id.unwrap_or_else(|| forks.canonical_tip());
        let base = forks
            .get(&base_hash)
            .ok_or(ConsensusError::UnknownFork { tip: base_hash })?;

        let mut views = Vec::new();
        let mut seen = HashSet::new();
        if let Some(view) = Self::quorum_view(&forks, base, quorum_type, height) {
            seen.insert(view.block_hash);
            views.push(view);
        }

        if include_alt {
            let mut alternatives: Vec<QuorumView> = forks
                .tips()
                .iter()
                .filter_map(|state| Self::quorum_view(&forks, state, quorum_type, height))
                .collect();
            alternatives.sort_by_key(|view| (view.block_hash, view.tip));
            for view in alternatives {
                if seen.insert(view.block_hash) {
                    views.push(view);
                }
            }
        }
        Ok(views)
    }

    fn get_checkpoint(&self, height: u64) -> Option<Checkpoint> {
        let forks = self.forks.read();
        forks.canonical_state().ok()?.checkpoint(height).cloned()
    }

    fn get_registry_state(&self, keys: &[PublicKey]) -> Vec<ServiceNodeEntry> {
        let forks = self.forks.read();
        let Ok(state) = forks.canonical_state() else {
            return Vec::new();
        };
        let registry = state.registry();
        if keys.is_empty() {
            return registry.entries().cloned().collect();
        }
        keys.iter()
            .filter_map(|key| registry.get(key).cloned())
            .collect()
    }

    fn submit_checkpoint_vote(&self, vote: &Vote) -> ConsensusResult<VoteOutcome> {
        let result = self.try_submit_checkpoint_vote(vote);
        if let Err(err) = &result {
            metrics::record_vote_rejected(err.reason());
            debug!(
                voter = vote.voter_index,
                height = vote.payload.height(),
                reason = err.reason(),
                "Checkpoint vote rejected"
            );
        }
        result
    }

    fn validate_state_change_tx(
        &self,
        tx: &StateChangeTx,
        kept_by_block: bool,
    ) -> ConsensusResult<()> {
        let canonical = self.canonical_state()?;
        let mut pending = self.pending.lock();
        let result = canonical.validate_state_change(
            tx,
            canonical.height() + 1,
            kept_by_block,
            &[pending.ledger()],
            &self.apply_context(),
        );

        match result {
            Ok(record) => {
                debug!(
                    worker_index = tx.worker_index,
                    quorum_height = tx.quorum_height,
                    change = tx.new_state.label(),
                    kept_by_block,
                    "State change admitted to pool"
                );
                pending.add(record, tx.clone());
                Ok(())
            }
            Err(err) => {
                metrics::record_state_change_rejected(err.reason());
                debug!(
                    worker_index = tx.worker_index,
                    quorum_height = tx.quorum_height,
                    reason = err.reason(),
                    "State change rejected"
                );
                Err(err)
            }
        }
    }

    fn select_canonical(&self, tips: &[Hash]) -> ConsensusResult<Hash> {
        let mut forks = self.forks.write();
        let canonical = Arc::clone(forks.canonical_state()?);
        let window = canonical.immutability_window();

        let mut candidates = Vec::with_capacity(tips.len());
        for tip in tips {
            let state = forks
                .get(tip)
                .ok_or(ConsensusError::UnknownFork { tip: *tip })?;
            if *tip == canonical.hash() {
                continue;
            }
            let divergence = forks.divergence_height(tip)?;
            if let Err(err) = window.check_rewrite(divergence) {
                debug!(tip = %short_hex(tip), reason = err.reason(), "Candidate skipped");
                continue;
            }
            candidates.push(state.summary());
        }

        let best = select_best(&canonical.summary(), &candidates);
        if let Some(reorg) = forks.set_canonical(best)? {
            log_reorg(&reorg);
        }
        Ok(best)
    }

    fn canonical_tip(&self) -> Hash {
        self.forks.read().canonical_tip()
    }

    fn tips(&self) -> Vec<Hash> {
        let mut tips: Vec<Hash> = self
            .forks
            .read()
            .tips()
            .iter()
            .map(|state| state.hash())
            .collect();
        tips.sort();
        tips
    }

    fn discard_fork(&self, tip: &Hash) -> ConsensusResult<Vec<Hash>> {
        let mut forks = self.forks.write();
        let removed = forks.discard(tip).inspect_err(|err| log_rejection("discard_fork", err))?;
        info!(
            "[snq] Discarded fork {} ({} states)",
            short_hex(tip),
            removed.len()
        );
        self.abandon_unreachable(&forks);
        metrics::set_live_forks(forks.tips().len());
        Ok(removed)
    }

    fn pending_state_changes(&self) -> Vec<StateChangeTx> {
        self.pending.lock().transactions()
    }

    fn immutable_height(&self) -> Option<u64> {
        let forks = self.forks.read();
        let window = forks.canonical_state().ok()?.immutability_window();
        window.immutable_height
    }
}
