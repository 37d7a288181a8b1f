//! # Vote Digests
//!
//! Votes sign a 32-byte BLAKE3 digest rather than the raw payload. Each vote
//! kind hashes under its own `derive_key` context, so two kinds never share
//! a digest even when their payload bytes coincide.

use shared_types::Hash;

/// Incremental digest bound to one context string.
///
/// Integers are absorbed little-endian.
#[derive(Clone)]
pub struct VoteDigest {
    inner: blake3::Hasher,
}

impl VoteDigest {
    /// Start a digest for `context`, e.g. `"snq checkpoint vote v1"`.
    pub fn new(context: &str) -> Self {
        Self {
            inner: blake3::Hasher::new_derive_key(context),
        }
    }

    /// Absorb raw bytes.
    pub fn bytes(mut self, data: &[u8]) -> Self {
        self.inner.update(data);
        self
    }

    /// Absorb a `u64`.
    pub fn u64(self, value: u64) -> Self {
        self.bytes(&value.to_le_bytes())
    }

    /// Absorb a `u16`.
    pub fn u16(self, value: u16) -> Self {
        self.bytes(&value.to_le_bytes())
    }

    /// Absorb a single tag byte.
    pub fn tag(self, value: u8) -> Self {
        self.bytes(&[value])
    }

    /// The 32-byte digest.
    pub fn finish(&self) -> Hash {
        *self.inner.finalize().as_bytes()
    }
}

impl std::fmt::Debug for VoteDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoteDigest").finish_non_exhaustive()
    }
}
