//! strata-probe library
//!
//! Command-line configuration and the probe exchange used by the
//! `strata-probe` binary.

pub mod config;
pub mod probe;
