//! Backend resilience: circuit breaking against repeated upstream failures.

pub mod circuit_breaker;
