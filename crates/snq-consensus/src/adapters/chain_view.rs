//! In-memory blockchain view
//!
//! Backs `BlockchainView` with a height index the host fills in as it
//! accepts blocks. Suitable for embedding and tests.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use shared_types::Hash;

use crate::ports::outbound::BlockchainView;

#[derive(Debug, Default)]
pub struct InMemoryChainView {
    hashes: RwLock<BTreeMap<u64, Hash>>,
    hard_fork_version: RwLock<u8>,
}

impl InMemoryChainView {
    pub fn new(hard_fork_version: u8) -> Self {
        Self {
            hashes: RwLock::new(BTreeMap::new()),
            hard_fork_version: RwLock::new(hard_fork_version),
        }
    }

    pub fn set_block_hash(&self, height: u64, hash: Hash) {
        self.hashes.write().insert(height, hash);
    }

    /// Forget every hash above `height`, e.g. after a reorg.
    pub fn truncate_above(&self, height: u64) {
        self.hashes.write().retain(|h, _| *h <= height);
    }

    pub fn set_hard_fork_version(&self, version: u8) {
        *self.hard_fork_version.write() = version;
    }
}

impl BlockchainView for InMemoryChainView {
    fn block_hash_at(&self, height: u64) -> Option<Hash> {
        self.hashes.read().get(&height).copied()
    }

    fn active_hard_fork_version(&self) -> u8 {
        *self.hard_fork_version.read()
    }
}
