//! Strata Core Library
//!
//! This crate provides the transport-independent pieces of the strata
//! transport: resolving a multiaddr into the stack of layers it requires,
//! and the canonical unsigned varint used to length-prefix protocol frames.
//!
//! # Modules
//!
//! - [`address`]: AddressStack resolution and its reverse mapping
//! - [`varint`]: Canonical unsigned LEB128 encoding for `u64`
//! - [`error`]: Error types

pub mod address;
pub mod error;
pub mod varint;

#[cfg(test)]
mod test_vectors;

pub use address::{peer_id, AddressStack, HostFamily};
pub use error::{Error, Result, VarintError};
pub use libp2p_identity::PeerId;
pub use multiaddr::{Multiaddr, Protocol};
pub use varint::UVarint;
