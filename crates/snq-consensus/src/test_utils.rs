//! Test utilities for service node consensus.
//!
//! Deterministic Ed25519 key sets, block builders and a `ChainBuilder`
//! harness driving a real `ServiceNodeService`. Enable with the `test-utils`
//! feature flag.
//!
//! # Example
//!
//! ```rust
//! use snq_consensus::test_utils::ChainBuilder;
//! use snq_consensus::ServiceNodeApi;
//!
//! let builder = ChainBuilder::new(30).unwrap();
//! let tip = builder.extend(builder.tip(), 0, 3, 1).unwrap();
//! assert_eq!(builder.service.canonical_tip(), tip);
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use shared_crypto::Ed25519KeyPair;
use shared_types::{Hash, PublicKey, Signature};

use crate::adapters::{Ed25519VoteVerifier, InMemoryChainView};
use crate::config::ServiceNodeConfig;
use crate::domain::{
    checkpoint_message, state_change_message, Block, ChainTip, Checkpoint, NewState, Quorum,
    QuorumSignature, QuorumType, RegistrationTx, RegistrySnapshot, StateChangeTx, Transaction,
    Vote, VoteOutcome, VotePayload,
};
use crate::error::{ConsensusError, ConsensusResult};
use crate::ports::ServiceNodeApi;
use crate::service::ServiceNodeService;
use crate::state::ConsensusState;

/// Service wired to the in-memory adapters.
pub type TestService = ServiceNodeService<InMemoryChainView, Ed25519VoteVerifier>;

/// Hash of the test block on `branch` at `height`.
///
/// Distinct branches never collide, and the height is readable from the
/// first eight bytes.
pub fn block_hash(branch: u8, height: u64) -> Hash {
    let mut hash = [branch; 32];
    hash[..8].copy_from_slice(&height.to_le_bytes());
    hash
}

/// Genesis state at height 0 with an empty registry.
pub fn genesis_state(hard_fork_version: u8) -> ConsensusState {
    ConsensusState::genesis(
        ChainTip {
            height: 0,
            hash: block_hash(0, 0),
            cumulative_difficulty: 0,
            hard_fork_version,
        },
        RegistrySnapshot::new(0),
    )
}

/// Block extending `parent` on `branch`.
pub fn child_block(
    parent: &ConsensusState,
    branch: u8,
    difficulty: u128,
    transactions: Vec<Transaction>,
) -> Block {
    let height = parent.height() + 1;
    Block {
        height,
        hash: block_hash(branch, height),
        prev_hash: parent.hash(),
        difficulty,
        hard_fork_version: parent.tip().hard_fork_version,
        transactions,
        checkpoint: None,
    }
}

// =============================================================================
// Key sets
// =============================================================================

/// A set of service node keys with their signing halves.
pub struct TestNetwork {
    keys: BTreeMap<PublicKey, Ed25519KeyPair>,
}

impl TestNetwork {
    /// `count` keys derived from fixed seeds.
    pub fn new(count: usize) -> Self {
        Self::with_offset(0, count)
    }

    /// `count` keys from seeds starting at `offset`; disjoint offsets give
    /// disjoint key sets.
    pub fn with_offset(offset: u64, count: usize) -> Self {
        let keys = (0..count as u64)
            .map(|i| {
                let mut seed = [0x5A; 32];
                seed[..8].copy_from_slice(&(offset + i + 1).to_le_bytes());
                let pair = Ed25519KeyPair::from_seed(seed);
                (pair.public_key(), pair)
            })
            .collect();
        Self { keys }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Public keys in ascending order.
    pub fn keys(&self) -> Vec<PublicKey> {
        self.keys.keys().copied().collect()
    }

    /// One registration transaction per key.
    pub fn registrations(&self) -> Vec<Transaction> {
        self.keys
            .keys()
            .map(|key| {
                Transaction::Registration(RegistrationTx {
                    service_node_key: *key,
                    owner: *key.as_bytes(),
                    stake: 1,
                })
            })
            .collect()
    }

    pub fn sign(&self, key: &PublicKey, message: &[u8]) -> ConsensusResult<Signature> {
        self.keys
            .get(key)
            .map(|pair| pair.sign(message))
            .ok_or_else(|| ConsensusError::Internal(format!("no test key for {}", key.short())))
    }

    fn validator(quorum: &Quorum, index: u16) -> ConsensusResult<&PublicKey> {
        quorum.validator(index).ok_or_else(|| {
            ConsensusError::Internal(format!("validator index {index} outside quorum"))
        })
    }

    /// Checkpoint vote from validator `voter_index` of `quorum`.
    pub fn checkpoint_vote(
        &self,
        quorum: &Quorum,
        voter_index: u16,
        block_hash: Hash,
    ) -> ConsensusResult<Vote> {
        let payload = VotePayload::Checkpoint {
            height: quorum.height,
            block_hash,
        };
        let key = Self::validator(quorum, voter_index)?;
        Ok(Vote {
            voter_index,
            signature: self.sign(key, &payload.signing_message())?,
            payload,
        })
    }

    /// Checkpoint signed by the first `voters` validators of `quorum`.
    pub fn checkpoint(
        &self,
        quorum: &Quorum,
        block_hash: Hash,
        voters: usize,
    ) -> ConsensusResult<Checkpoint> {
        let message = checkpoint_message(quorum.height, &block_hash);
        let signatures = (0..voters as u16)
            .map(|voter_index| {
                let key = Self::validator(quorum, voter_index)?;
                Ok(QuorumSignature {
                    voter_index,
                    signature: self.sign(key, &message)?,
                })
            })
            .collect::<ConsensusResult<Vec<_>>>()?;
        Ok(Checkpoint::new(quorum.height, block_hash, signatures))
    }

    /// Zero-fee state change on worker `worker_index` signed by `voters`.
    pub fn state_change(
        &self,
        quorum: &Quorum,
        worker_index: u16,
        new_state: NewState,
        voters: &[u16],
    ) -> ConsensusResult<StateChangeTx> {
        let message = state_change_message(quorum.height, worker_index, new_state);
        let votes = voters
            .iter()
            .map(|&voter_index| {
                let key = Self::validator(quorum, voter_index)?;
                Ok(QuorumSignature {
                    voter_index,
                    signature: self.sign(key, &message)?,
                })
            })
            .collect::<ConsensusResult<Vec<_>>>()?;
        Ok(StateChangeTx {
            quorum_height: quorum.height,
            worker_index,
            new_state,
            votes,
            fee: 0,
        })
    }
}

// =============================================================================
// Chain builder
// =============================================================================

/// A running service with `node_count` nodes registered in block 1.
pub struct ChainBuilder {
    pub network: TestNetwork,
    pub chain: Arc<InMemoryChainView>,
    pub service: TestService,
}

impl ChainBuilder {
    pub fn new(node_count: usize) -> ConsensusResult<Self> {
        Self::with_config(node_count, ServiceNodeConfig::default())
    }

    pub fn with_config(node_count: usize, config: ServiceNodeConfig) -> ConsensusResult<Self> {
        let version = config.hard_forks.checkpointing;
        let network = TestNetwork::new(node_count);
        let genesis = genesis_state(version);
        let chain = Arc::new(InMemoryChainView::new(version));
        chain.set_block_hash(0, genesis.hash());

        let registration = child_block(&genesis, 0, 1, network.registrations());
        let service = ServiceNodeService::new(
            config,
            genesis,
            Arc::clone(&chain),
            Arc::new(Ed25519VoteVerifier::new()),
        )?;
        service.apply_block(&registration)?;
        chain.set_block_hash(registration.height, registration.hash);

        Ok(Self {
            network,
            chain,
            service,
        })
    }

    pub fn tip(&self) -> Hash {
        self.service.canonical_tip()
    }

    pub fn state(&self, hash: &Hash) -> ConsensusResult<Arc<ConsensusState>> {
        self.service
            .fork_state(hash)
            .ok_or(ConsensusError::UnknownFork { tip: *hash })
    }

    /// Empty block on top of `parent`.
    pub fn block_on(&self, parent: &Hash, branch: u8, difficulty: u128) -> ConsensusResult<Block> {
        let state = self.state(parent)?;
        Ok(child_block(&state, branch, difficulty, Vec::new()))
    }

    /// Apply `count` empty blocks on `branch` starting at `parent`. Returns
    /// the new tip.
    pub fn extend(
        &self,
        parent: Hash,
        branch: u8,
        count: u64,
        difficulty: u128,
    ) -> ConsensusResult<Hash> {
        let mut cursor = parent;
        for _ in 0..count {
            let block = self.block_on(&cursor, branch, difficulty)?;
            self.service.apply_block(&block)?;
            cursor = block.hash;
        }
        Ok(cursor)
    }

    /// Checkpointing quorum at the height of block `block_hash`.
    pub fn checkpoint_quorum(&self, block_hash: &Hash) -> ConsensusResult<Arc<Quorum>> {
        let state = self.state(block_hash)?;
        let height = state.height();
        state
            .quorum(QuorumType::Checkpointing, height)
            .map(Arc::clone)
            .ok_or(ConsensusError::UnknownQuorum {
                quorum_type: QuorumType::Checkpointing,
                height,
            })
    }

    /// Obligations quorum at `height` on the chain ending at `tip`.
    pub fn obligations_quorum(&self, tip: &Hash, height: u64) -> ConsensusResult<Arc<Quorum>> {
        self.state(tip)?
            .quorum(QuorumType::Obligations, height)
            .map(Arc::clone)
            .ok_or(ConsensusError::UnknownQuorum {
                quorum_type: QuorumType::Obligations,
                height,
            })
    }

    /// Submit votes from the first `voters` validators for `block_hash`.
    /// Returns the outcome of the last vote.
    pub fn vote_checkpoint(&self, block_hash: Hash, voters: usize) -> ConsensusResult<VoteOutcome> {
        let quorum = self.checkpoint_quorum(&block_hash)?;
        let mut outcome = VoteOutcome::Pending {
            votes: 0,
            required: self.service.config().checkpointing.min_votes,
        };
        for voter_index in 0..voters as u16 {
            let vote = self.network.checkpoint_vote(&quorum, voter_index, block_hash)?;
            outcome = self.service.submit_checkpoint_vote(&vote)?;
        }
        Ok(outcome)
    }

    /// Block at the canonical height `height`, read from the canonical state.
    pub fn canonical_hash_at(&self, height: u64) -> ConsensusResult<Hash> {
        self.service
            .canonical_state()?
            .block_hash_at(height)
            .ok_or_else(|| {
                ConsensusError::Internal(format!("no canonical block at height {height}"))
            })
    }
}
