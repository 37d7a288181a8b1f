//! Ports layer (Hexagonal Architecture)
//!
//! - `inbound`: what the host blockchain calls
//! - `outbound`: what the consensus core needs from the host

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;
