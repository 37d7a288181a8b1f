//! Ed25519 vote verification adapter

use shared_crypto::verify_signature;
use shared_types::{PublicKey, Signature};
use tracing::trace;

use crate::ports::outbound::VoteVerifier;

/// Verifies votes with the service node's Ed25519 key.
#[derive(Clone, Copy, Debug, Default)]
pub struct Ed25519VoteVerifier;

impl Ed25519VoteVerifier {
    pub fn new() -> Self {
        Self
    }
}

impl VoteVerifier for Ed25519VoteVerifier {
    fn verify(&self, key: &PublicKey, message: &[u8], signature: &Signature) -> bool {
        match verify_signature(key, message, signature) {
            Ok(()) => true,
            Err(err) => {
                trace!(key = %key.short(), error = %err, "[snq] Vote signature rejected");
                false
            }
        }
    }
}
