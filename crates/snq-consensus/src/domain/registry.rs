//! Copy-on-write service node registry
//!
//! A snapshot is shared between forks through an `Arc`. Mutation goes through
//! `Arc::make_mut`, so a fork that edits its registry gets a private copy and
//! every other holder keeps seeing the old version.

use std::collections::BTreeMap;
use std::sync::Arc;

use shared_types::PublicKey;

use super::block::RegistrationTx;
use super::node::{NodeStatus, ServiceNodeEntry, SwarmId, UNASSIGNED_SWARM_ID};
use crate::error::{ConsensusError, ConsensusResult};

/// Registry as of one block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegistrySnapshot {
    height: u64,
    nodes: Arc<BTreeMap<PublicKey, ServiceNodeEntry>>,
}

impl RegistrySnapshot {
    pub fn new(height: u64) -> Self {
        Self {
            height,
            nodes: Arc::new(BTreeMap::new()),
        }
    }

    /// Seed a registry from existing entries, e.g. when starting from a
    /// trusted state instead of genesis.
    pub fn from_entries(height: u64, entries: impl IntoIterator<Item = ServiceNodeEntry>) -> Self {
        let nodes = entries
            .into_iter()
            .map(|entry| (entry.public_key, entry))
            .collect();
        Self {
            height,
            nodes: Arc::new(nodes),
        }
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    /// Number of entries, tombstones included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, key: &PublicKey) -> Option<&ServiceNodeEntry> {
        self.nodes.get(key)
    }

    /// Entries in public-key order.
    pub fn entries(&self) -> impl Iterator<Item = &ServiceNodeEntry> {
        self.nodes.values()
    }

    /// Active keys in public-key order.
    pub fn active_keys(&self) -> Vec<PublicKey> {
        self.nodes
            .values()
            .filter(|entry| entry.status.is_active())
            .map(|entry| entry.public_key)
            .collect()
    }

    /// Active and decommissioned keys in public-key order.
    pub fn registered_keys(&self) -> Vec<PublicKey> {
        self.nodes
            .values()
            .filter(|entry| entry.status.is_registered())
            .map(|entry| entry.public_key)
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.nodes.values().filter(|e| e.status.is_active()).count()
    }

    /// Active node that has waited longest for a reward.
    ///
    /// Nodes registered at the snapshot height are not yet eligible. Ties go
    /// to the earlier registration, then the lower key.
    pub fn select_reward_winner(&self) -> Option<PublicKey> {
        self.nodes
            .values()
            .filter(|entry| entry.status.is_active() && entry.registration_height < self.height)
            .min_by_key(|entry| {
                (
                    entry.last_reward_height,
                    entry.registration_height,
                    entry.public_key,
                )
            })
            .map(|entry| entry.public_key)
    }

    // =========================================================================
    // Mutation (only reachable while a fork builds its next state)
    // =========================================================================

    pub(crate) fn set_height(&mut self, height: u64) {
        self.height = height;
    }

    /// Add a node. A tombstoned key may register again as a new incarnation.
    pub(crate) fn register(
        &mut self,
        tx: &RegistrationTx,
        height: u64,
        stake_lock_blocks: u64,
    ) -> ConsensusResult<()> {
        if let Some(existing) = self.nodes.get(&tx.service_node_key) {
            if existing.status.is_registered() {
                return Err(ConsensusError::DuplicateRegistration {
                    key: tx.service_node_key,
                });
            }
        }
        let entry = ServiceNodeEntry::from_registration(tx, height, stake_lock_blocks);
        Arc::make_mut(&mut self.nodes).insert(tx.service_node_key, entry);
        Ok(())
    }

    pub(crate) fn set_status(&mut self, key: &PublicKey, status: NodeStatus) -> ConsensusResult<()> {
        let entry = Arc::make_mut(&mut self.nodes)
            .get_mut(key)
            .ok_or(ConsensusError::UnknownTarget { target: *key })?;
        entry.status = status;
        if !status.is_active() {
            entry.swarm_id = UNASSIGNED_SWARM_ID;
        }
        Ok(())
    }

    pub(crate) fn mark_rewarded(&mut self, key: &PublicKey, height: u64) {
        if let Some(entry) = Arc::make_mut(&mut self.nodes).get_mut(key) {
            entry.last_reward_height = height;
        }
    }

    /// Drop entries whose stake unlocked at or before `height`, and
    /// tombstones older than `tombstone_lifetime`. Returns the removed keys.
    pub(crate) fn expire(&mut self, height: u64, tombstone_lifetime: u64) -> Vec<PublicKey> {
        let expired: Vec<PublicKey> = self
            .nodes
            .values()
            .filter(|entry| match entry.status {
                NodeStatus::Deregistered { at } => at.saturating_add(tombstone_lifetime) < height,
                _ => entry.expiry_height <= height,
            })
            .map(|entry| entry.public_key)
            .collect();

        if !expired.is_empty() {
            let nodes = Arc::make_mut(&mut self.nodes);
            for key in &expired {
                nodes.remove(key);
            }
        }
        expired
    }

    /// Overwrite swarm ids. Nodes missing from `assignment` become unassigned.
    pub(crate) fn assign_swarms(&mut self, assignment: &BTreeMap<PublicKey, SwarmId>) {
        let changed = self.nodes.values().any(|entry| {
            let next = assignment
                .get(&entry.public_key)
                .copied()
                .unwrap_or(UNASSIGNED_SWARM_ID);
            entry.swarm_id != next
        });
        if !changed {
            return;
        }
        for entry in Arc::make_mut(&mut self.nodes).values_mut() {
            entry.swarm_id = assignment
                .get(&entry.public_key)
                .copied()
                .unwrap_or(UNASSIGNED_SWARM_ID);
        }
    }
}
