//! # Adapters Layer (Hexagonal Architecture)
//!
//! Implements the outbound ports for hosts that do not bring their own.

mod chain_view;
mod ed25519_verifier;

pub use chain_view::InMemoryChainView;
pub use ed25519_verifier::Ed25519VoteVerifier;
