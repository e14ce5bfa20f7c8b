//! Small, dependency-free helpers shared across modules.

pub mod headers;
