//! State-change transactions
//!
//! An obligations quorum votes to deregister, decommission, recommission or
//! penalize one of the workers it tested. The aggregated votes travel as a
//! transaction that every node validates against its own view of the quorum.
//!
//! ## Replay rules
//!
//! For a (target, new state, quorum height) tuple only one voter set is
//! accepted. A second, different voter set is a `ConflictingPermutation`; the
//! same set again is a `DuplicateStateChange`. Both checks are skipped when
//! the transaction is already part of a block (`kept_by_block`), because a
//! block from a competing fork may legitimately carry its own permutation.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shared_types::{Hash, PublicKey};

use super::node::NodeStatus;
use super::quorum::{Quorum, QuorumType};
use super::registry::RegistrySnapshot;
use super::vote::{state_change_message, verify_aggregate, QuorumSignature};
use crate::config::QuorumSizes;
use crate::error::{ConsensusError, ConsensusResult};
use crate::ports::outbound::VoteVerifier;

/// Requested change to a worker's status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NewState {
    Deregister,
    Decommission,
    Recommission,
    IpChangePenalty,
}

impl NewState {
    pub(crate) fn tag(&self) -> u8 {
        match self {
            Self::Deregister => 0,
            Self::Decommission => 1,
            Self::Recommission => 2,
            Self::IpChangePenalty => 3,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Deregister => "deregister",
            Self::Decommission => "decommission",
            Self::Recommission => "recommission",
            Self::IpChangePenalty => "ip_change_penalty",
        }
    }

    pub fn requires_zero_fee(&self) -> bool {
        !matches!(self, Self::Recommission)
    }

    /// Status after applying this change at `height`, or `None` if the
    /// change does not apply to `current`.
    pub fn next_status(&self, current: NodeStatus, height: u64) -> Option<NodeStatus> {
        match (self, current) {
            (Self::Deregister, NodeStatus::Active | NodeStatus::Decommissioned { .. }) => {
                Some(NodeStatus::Deregistered { at: height })
            }
            (Self::Decommission, NodeStatus::Active) => {
                Some(NodeStatus::Decommissioned { since: height })
            }
            (Self::Recommission, NodeStatus::Decommissioned { .. }) => Some(NodeStatus::Active),
            (Self::IpChangePenalty, NodeStatus::Active) => Some(NodeStatus::Active),
            _ => None,
        }
    }
}

/// Aggregated state-change votes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChangeTx {
    /// Height of the obligations quorum that voted
    pub quorum_height: u64,
    /// Index of the target in that quorum's workers
    pub worker_index: u16,
    pub new_state: NewState,
    pub votes: Vec<QuorumSignature>,
    pub fee: u64,
}

impl StateChangeTx {
    pub fn signing_message(&self) -> Hash {
        state_change_message(self.quorum_height, self.worker_index, self.new_state)
    }

    /// Voter indices in ascending order.
    pub fn voter_set(&self) -> Vec<u16> {
        let mut voters: Vec<u16> = self.votes.iter().map(|v| v.voter_index).collect();
        voters.sort_unstable();
        voters
    }
}

/// Identity of a state change independent of who voted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateChangeKey {
    pub target: PublicKey,
    pub new_state: NewState,
    pub quorum_height: u64,
}

/// A validated state change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChangeRecord {
    pub target: PublicKey,
    pub new_state: NewState,
    pub quorum_height: u64,
    /// Sorted
    pub voters: Vec<u16>,
}

impl StateChangeRecord {
    pub fn key(&self) -> StateChangeKey {
        StateChangeKey {
            target: self.target,
            new_state: self.new_state,
            quorum_height: self.quorum_height,
        }
    }
}

/// Accepted state changes still inside their lifetime.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StateChangeLedger {
    records: Arc<BTreeMap<StateChangeKey, Vec<u16>>>,
}

impl StateChangeLedger {
    pub fn voters(&self, key: &StateChangeKey) -> Option<&[u16]> {
        self.records.get(key).map(Vec::as_slice)
    }

    pub fn contains(&self, key: &StateChangeKey) -> bool {
        self.records.contains_key(key)
    }

    /// Record `record`. The first voter set for a key wins.
    pub fn insert(&mut self, record: &StateChangeRecord) {
        if self.records.contains_key(&record.key()) {
            return;
        }
        Arc::make_mut(&mut self.records).insert(record.key(), record.voters.clone());
    }

    /// Drop records whose quorum is older than `lifetime` at `current_height`.
    pub fn prune_expired(&mut self, current_height: u64, lifetime: u64) {
        let expired = self
            .records
            .keys()
            .any(|key| key.quorum_height.saturating_add(lifetime) < current_height);
        if expired {
            Arc::make_mut(&mut self.records)
                .retain(|key, _| key.quorum_height.saturating_add(lifetime) >= current_height);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Everything a state change is validated against.
pub struct StateChangeContext<'a> {
    pub registry: &'a RegistrySnapshot,
    /// Obligations quorum at the transaction's quorum height
    pub quorum: Option<&'a Quorum>,
    /// Previously accepted records, chain first, then any pending pool
    pub ledgers: &'a [&'a StateChangeLedger],
    pub current_height: u64,
    pub sizes: &'a QuorumSizes,
    pub lifetime: u64,
    pub verifier: &'a dyn VoteVerifier,
}

/// Validate `tx`; on success return the record to store.
pub fn validate_state_change(
    tx: &StateChangeTx,
    ctx: &StateChangeContext<'_>,
    kept_by_block: bool,
) -> ConsensusResult<StateChangeRecord> {
    if tx.new_state.requires_zero_fee() && tx.fee != 0 {
        return Err(ConsensusError::NonZeroFee { fee: tx.fee });
    }

    if tx.quorum_height.saturating_add(ctx.lifetime) < ctx.current_height {
        return Err(ConsensusError::TooOld {
            quorum_height: tx.quorum_height,
            current_height: ctx.current_height,
        });
    }

    let quorum = ctx
        .quorum
        .filter(|q| q.is_available())
        .ok_or(ConsensusError::UnknownQuorum {
            quorum_type: QuorumType::Obligations,
            height: tx.quorum_height,
        })?;

    let target = *quorum
        .worker(tx.worker_index)
        .ok_or(ConsensusError::WorkerIndexOutOfRange {
            index: tx.worker_index,
            workers: quorum.workers.len(),
        })?;

    verify_aggregate(
        quorum,
        &tx.signing_message(),
        &tx.votes,
        ctx.sizes.min_votes,
        ctx.verifier,
    )?;

    let record = StateChangeRecord {
        target,
        new_state: tx.new_state,
        quorum_height: tx.quorum_height,
        voters: tx.voter_set(),
    };

    if !kept_by_block {
        let key = record.key();
        for ledger in ctx.ledgers {
            if let Some(voters) = ledger.voters(&key) {
                return Err(if voters == record.voters.as_slice() {
                    ConsensusError::DuplicateStateChange { target }
                } else {
                    ConsensusError::ConflictingPermutation { target }
                });
            }
        }
    }

    let entry = ctx
        .registry
        .get(&target)
        .ok_or(ConsensusError::UnknownTarget { target })?;
    if let NodeStatus::Deregistered { .. } = entry.status {
        return Err(ConsensusError::TargetDeregistered { target });
    }
    if entry.registration_height > tx.quorum_height {
        return Err(ConsensusError::StaleTarget {
            target,
            registration_height: entry.registration_height,
            quorum_height: tx.quorum_height,
        });
    }
    if tx.new_state.next_status(entry.status, ctx.current_height).is_none() {
        return Err(ConsensusError::InvalidStateTransition {
            target,
            from: entry.status.label(),
            to: tx.new_state.label(),
        });
    }

    Ok(record)
}

/// State changes admitted to the mempool but not yet mined.
#[derive(Debug, Default)]
pub struct PendingStateChanges {
    entries: Vec<(StateChangeRecord, StateChangeTx)>,
    ledger: StateChangeLedger,
}

impl PendingStateChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ledger(&self) -> &StateChangeLedger {
        &self.ledger
    }

    /// Queue `tx`, replacing any queued transaction for the same target,
    /// new state and quorum height.
    pub fn add(&mut self, record: StateChangeRecord, tx: StateChangeTx) {
        let key = record.key();
        let before = self.entries.len();
        self.entries.retain(|(queued, _)| queued.key() != key);
        if self.entries.len() != before {
            self.rebuild_ledger();
        }
        self.ledger.insert(&record);
        self.entries.push((record, tx));
    }

    pub fn transactions(&self) -> Vec<StateChangeTx> {
        self.entries.iter().map(|(_, tx)| tx.clone()).collect()
    }

    /// Drop entries already mined on `chain` or past their lifetime.
    pub fn prune(&mut self, chain: &StateChangeLedger, current_height: u64, lifetime: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(record, _)| {
            !chain.contains(&record.key())
                && record.quorum_height.saturating_add(lifetime) >= current_height
        });
        let removed = before - self.entries.len();
        if removed > 0 {
            self.rebuild_ledger();
        }
        removed
    }

    fn rebuild_ledger(&mut self) {
        let mut ledger = StateChangeLedger::default();
        for (record, _) in &self.entries {
            ledger.insert(record);
        }
        self.ledger = ledger;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
