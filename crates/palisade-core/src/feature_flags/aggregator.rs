//! Feature flag evaluator aggregation: several evaluators, tried
//! in priority order, each returning a decision, "no decision", or a fatal
//! error — never an exception escaping to the caller.

use crate::models::config::FeatureFlagsConfig;
use crate::models::error::{FlagEvalError, GatewayError};
use std::sync::Arc;

/// The default priority an evaluator gets if it doesn't name one. The
/// built-in file-backed evaluator uses [`FILE_EVALUATOR_WEIGHT`] instead,
/// so it only answers once every higher-priority evaluator has passed.
pub const DEFAULT_EVALUATOR_WEIGHT: i64 = 100;
pub const FILE_EVALUATOR_WEIGHT: i64 = 1000;

/// A single source of feature-flag decisions.
///
/// `evaluate` must return [`FlagEvalError::NoDecision`] when it has no
/// opinion on `flag`, not an arbitrary error — that's how the aggregator
/// tells "this evaluator doesn't know" apart from "this evaluator is
/// broken".
pub trait FlagEvaluator: Send + Sync {
    fn name(&self) -> &str;
    fn weight(&self) -> i64 {
        DEFAULT_EVALUATOR_WEIGHT
    }
    /// Where this evaluator came from, used only to disambiguate its `name`
    /// against another evaluator registered under the same one.
    fn origin_module(&self) -> &str {
        "custom"
    }
    fn evaluate(&self, flag: &str, tenant: &str) -> Result<bool, FlagEvalError>;
}

/// The built-in evaluator backed by a tenant's merged `feature_flags.flags`
/// map. Registered with [`FILE_EVALUATOR_WEIGHT`], the lowest priority —
/// tried last, as the fallback once every evaluator layered above it has
/// passed.
pub struct FileFlagEvaluator {
    flags: FeatureFlagsConfig,
}

impl FileFlagEvaluator {
    pub fn new(flags: FeatureFlagsConfig) -> Self {
        Self { flags }
    }
}

impl FlagEvaluator for FileFlagEvaluator {
    fn name(&self) -> &str {
        "file"
    }

    fn weight(&self) -> i64 {
        FILE_EVALUATOR_WEIGHT
    }

    fn origin_module(&self) -> &str {
        "feature_flags::aggregator"
    }

    fn evaluate(&self, flag: &str, _tenant: &str) -> Result<bool, FlagEvalError> {
        self.flags.flags.get(flag).copied().ok_or(FlagEvalError::NoDecision)
    }
}

/// Tries every registered evaluator ascending by weight — lower weight wins,
/// tried first — stopping at the first decision or fatal error. Evaluators
/// sharing a weight are ordered by identifier for deterministic results.
pub struct FlagAggregator {
    evaluators: Vec<(String, Arc<dyn FlagEvaluator>)>,
}

impl FlagAggregator {
    pub fn new() -> Self {
        Self { evaluators: Vec::new() }
    }

    /// Registers `evaluator`, assigning it a unique identifier: the first
    /// registration under a given `name()` keeps it verbatim; a later
    /// collision gets `{name}-{origin_module}-{counter}` appended so both
    /// evaluators stay individually addressable in logs and errors.
    pub fn register(&mut self, evaluator: Arc<dyn FlagEvaluator>) {
        let base_name = evaluator.name().to_string();
        let id = if self.evaluators.iter().any(|(id, _)| id == &base_name) {
            let mut counter = 2;
            loop {
                let candidate = format!("{}-{}-{}", base_name, evaluator.origin_module(), counter);
                if !self.evaluators.iter().any(|(id, _)| id == &candidate) {
                    break candidate;
                }
                counter += 1;
            }
        } else {
            base_name
        };

        self.evaluators.push((id, evaluator));
        self.evaluators.sort_by_key(|(id, e)| (e.weight(), id.clone()));
    }

    /// Evaluates `flag` for `tenant` against every registered evaluator in
    /// priority order.
    ///
    /// - The first `Ok` decision wins.
    /// - `NoDecision` moves on to the next evaluator.
    /// - `Fatal` aborts evaluation immediately with [`GatewayError::EvaluatorFatal`].
    /// - `Other` is logged and treated like `NoDecision` — a misbehaving
    ///   evaluator shouldn't block every flag it doesn't actively veto.
    /// - If nothing answers, returns [`GatewayError::NoDecision`].
    pub fn evaluate(&self, flag: &str, tenant: &str) -> Result<bool, GatewayError> {
        for (id, evaluator) in &self.evaluators {
            match evaluator.evaluate(flag, tenant) {
                Ok(decision) => return Ok(decision),
                Err(FlagEvalError::NoDecision) => continue,
                Err(FlagEvalError::Fatal(message)) => {
                    return Err(GatewayError::EvaluatorFatal {
                        evaluator: id.clone(),
                        flag: flag.to_string(),
                        message,
                    })
                }
                Err(FlagEvalError::Other(message)) => {
                    log::warn!("feature flag evaluator '{}' errored on '{}': {}", id, flag, message);
                    continue;
                }
            }
        }
        Err(GatewayError::NoDecision { flag: flag.to_string() })
    }

    /// The resolved, collision-free identifiers of every registered
    /// evaluator, in priority order. Exposed mainly for tests and diagnostics.
    pub fn evaluator_ids(&self) -> Vec<String> {
        self.evaluators.iter().map(|(id, _)| id.clone()).collect()
    }
}

impl Default for FlagAggregator {
    fn default() -> Self {
        Self::new()
    }
}
