//! Service node registry entries

use serde::{Deserialize, Serialize};
use shared_types::{Hash, PublicKey};

use super::block::RegistrationTx;

/// Swarm identifier. Swarms split the id space evenly.
pub type SwarmId = u64;

/// Assigned to every node while the network is too small for a swarm.
pub const UNASSIGNED_SWARM_ID: SwarmId = u64::MAX;

/// Lifecycle status of a registered node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    /// Eligible for quorums, rewards and swarms
    Active,
    /// Temporarily out of quorums and rewards, still tested as a worker
    Decommissioned { since: u64 },
    /// Removed by a quorum; kept as a tombstone until it ages out
    Deregistered { at: u64 },
}

impl NodeStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Active or decommissioned.
    pub fn is_registered(&self) -> bool {
        !matches!(self, Self::Deregistered { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Decommissioned { .. } => "decommissioned",
            Self::Deregistered { .. } => "deregistered",
        }
    }
}

/// One registered service node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceNodeEntry {
    pub public_key: PublicKey,
    pub owner: Hash,
    pub stake: u64,
    pub registration_height: u64,
    /// Height at which the stake unlocks and the entry is removed
    pub expiry_height: u64,
    pub status: NodeStatus,
    pub swarm_id: SwarmId,
    /// Height of the last reward, or registration for new nodes
    pub last_reward_height: u64,
}

impl ServiceNodeEntry {
    pub fn from_registration(tx: &RegistrationTx, height: u64, stake_lock_blocks: u64) -> Self {
        Self {
            public_key: tx.service_node_key,
            owner: tx.owner,
            stake: tx.stake,
            registration_height: height,
            expiry_height: height.saturating_add(stake_lock_blocks),
            status: NodeStatus::Active,
            swarm_id: UNASSIGNED_SWARM_ID,
            last_reward_height: height,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}
