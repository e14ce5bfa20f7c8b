//! Path-pattern matching and request dispatch.
//!
//! - [`path_matcher`] — longest-prefix glob matching shared by routes,
//!   composite routes, and per-backend endpoint overrides.
//! - [`dispatcher`] — resolves a request against an [`crate::config::merge::EffectiveConfig`]
//!   and decides which backend(s) it should reach.

pub mod dispatcher;
pub mod path_matcher;
