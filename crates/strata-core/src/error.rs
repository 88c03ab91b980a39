//! Error types for strata core

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Varint decoding failures
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum VarintError {
    /// Value does not fit in 64 bits
    #[error("varint overflows 64 bits")]
    Overflow,

    /// Input ended before the terminating byte
    #[error("varint is incomplete")]
    Incomplete,

    /// Encoding carries a redundant trailing zero group
    #[error("varint is not minimally encoded")]
    NonCanonical,
}

/// strata core error types
#[derive(Debug, Error)]
pub enum Error {
    /// Varint decoding error
    #[error("varint error: {0}")]
    Varint(#[from] VarintError),

    /// Address could not be parsed
    #[error("invalid address: {0}")]
    InvalidAddress(#[from] multiaddr::Error),
}
