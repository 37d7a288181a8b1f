//! Outbound ports: what the consensus core needs from its host.

use shared_types::{Hash, PublicKey, Signature};

/// Read access to the host blockchain.
pub trait BlockchainView: Send + Sync {
    /// Hash of the main-chain block at `height`, if the host has it.
    ///
    /// Only consulted for heights older than the history a fork tracks.
    fn block_hash_at(&self, height: u64) -> Option<Hash>;

    /// Hard fork version of the host's current tip.
    fn active_hard_fork_version(&self) -> u8;
}

/// Signature verification for quorum votes.
pub trait VoteVerifier: Send + Sync {
    fn verify(&self, key: &PublicKey, message: &[u8], signature: &Signature) -> bool;
}
