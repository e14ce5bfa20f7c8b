//! Configuration loading, merging, and validation.
//!
//! - [`merge`] — global + tenant-overlay resolution into an [`merge::EffectiveConfig`].
//! - [`validation`] — comprehensive, non-fatal structural checks.

pub mod merge;
pub mod validation;
