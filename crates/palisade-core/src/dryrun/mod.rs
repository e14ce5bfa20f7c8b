//! Dry-run shadow traffic and response comparison.

pub mod shadow;
