//! Fan-out request execution across multiple backends.

pub mod executor;
