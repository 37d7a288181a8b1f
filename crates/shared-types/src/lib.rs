//! # Shared Types Crate
//!
//! Primitive identifiers used across the service node workspace.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: keys, signatures and hashes are defined once
//!   and shared by the consensus core, the crypto helpers and the test suite.
//! - **Fixed width**: every identifier is a fixed-size byte array so it can be
//!   copied, ordered and used as a map key without allocation.

pub mod entities;
pub mod errors;

pub use entities::*;
pub use errors::*;
