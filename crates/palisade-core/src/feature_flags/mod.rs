//! Feature-flag evaluation: a priority-ordered chain of evaluators with
//! explicit no-decision and fatal-error sentinels.

pub mod aggregator;
