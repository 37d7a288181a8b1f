//! # Shared Crypto
//!
//! Cryptographic primitives used by service node quorums.
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `hashing` | BLAKE3 | Domain-separated vote digests |
//! | `signatures` | Ed25519 | Service node vote signatures |
//!
//! ## Security Properties
//!
//! - **Ed25519**: Deterministic nonces, no RNG dependency when signing
//! - **BLAKE3**: `derive_key` mode keeps checkpoint and state-change digests
//!   in separate domains

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod errors;
pub mod hashing;
pub mod signatures;

// Re-exports
pub use errors::CryptoError;
pub use hashing::VoteDigest;
pub use signatures::{verify_signature, Ed25519KeyPair};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
