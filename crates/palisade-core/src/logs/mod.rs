//! Logging setup shared across Palisade binaries.

pub mod logger;
