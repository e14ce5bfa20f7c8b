//! Gateway-wide error taxonomy.
//!
//! `GatewayError` collects every failure kind the core can produce, grouped
//! by concern (config, routing, tenant, resilience, upstream, composite,
//! feature-flag). The core stays framework-agnostic, so instead of
//! implementing a concrete `ResponseError` for some web framework here, each
//! variant carries the HTTP status code a host should use via
//! [`GatewayError::status_code`].

use thiserror::Error;

/// Errors surfaced while merging, validating, or resolving configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("backend '{id}' has no URL and no tenant overlay supplies one")]
    MissingBackendUrl { id: String },

    #[error("backend '{id}' has an invalid URL: {reason}")]
    InvalidBackendUrl { id: String, reason: String },

    #[error("no default backend configured")]
    MissingDefaultBackend,

    #[error("malformed route pattern '{pattern}': {reason}")]
    MalformedPattern { pattern: String, reason: String },
}

/// Top-level gateway error.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// ConfigError: invalid URL, missing default backend, malformed pattern.
    /// Fatal to startup.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// RoutingError: no route matched and no default backend is configured.
    #[error("no route matches path '{path}'")]
    RouteNotFound { path: String },

    /// TenantError: the tenant header is required but absent.
    #[error("required tenant header '{header}' is missing")]
    TenantRequired { header: String },

    /// ResilienceError: circuit open.
    #[error("circuit breaker open for backend '{backend}'")]
    CircuitOpen { backend: String },

    /// ResilienceError: retries exhausted.
    #[error("retries exhausted for backend '{backend}'")]
    RetriesExhausted { backend: String },

    /// UpstreamError: transport failure.
    #[error("upstream '{backend}' unreachable: {message}")]
    UpstreamUnreachable { backend: String, message: String },

    /// UpstreamError: timeout.
    #[error("upstream '{backend}' timed out after {timeout_ms}ms")]
    UpstreamTimeout { backend: String, timeout_ms: u64 },

    /// CompositeError: all sub-requests failed, or the transformer itself
    /// failed.
    #[error("composite route failed: {message}")]
    CompositeFailed { message: String },

    /// FeatureFlagError: non-fatal "no decision" sentinel.
    #[error("no evaluator produced a decision for flag '{flag}'")]
    NoDecision { flag: String },

    /// FeatureFlagError: an evaluator raised a fatal error, stopping the
    /// chain.
    #[error("evaluator '{evaluator}' raised a fatal error for flag '{flag}': {message}")]
    EvaluatorFatal {
        evaluator: String,
        flag: String,
        message: String,
    },

    /// A transformer or evaluator panicked; caught at the boundary and
    /// converted here.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// The HTTP status code a host should respond with for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::Config(_) => 500,
            GatewayError::RouteNotFound { .. } => 404,
            GatewayError::TenantRequired { .. } => 400,
            GatewayError::CircuitOpen { .. } => 503,
            GatewayError::RetriesExhausted { .. } => 502,
            GatewayError::UpstreamUnreachable { .. } => 502,
            GatewayError::UpstreamTimeout { .. } => 504,
            GatewayError::CompositeFailed { .. } => 500,
            GatewayError::NoDecision { .. } => 404,
            GatewayError::EvaluatorFatal { .. } => 500,
            GatewayError::Internal(_) => 500,
        }
    }

    /// Short machine-readable kind, used for structured event payloads and
    /// error response bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Config(_) => "config",
            GatewayError::RouteNotFound { .. } => "routing",
            GatewayError::TenantRequired { .. } => "tenant",
            GatewayError::CircuitOpen { .. } => "circuit_open",
            GatewayError::RetriesExhausted { .. } => "retries_exhausted",
            GatewayError::UpstreamUnreachable { .. } => "upstream_unreachable",
            GatewayError::UpstreamTimeout { .. } => "upstream_timeout",
            GatewayError::CompositeFailed { .. } => "composite_failed",
            GatewayError::NoDecision { .. } => "no_decision",
            GatewayError::EvaluatorFatal { .. } => "evaluator_fatal",
            GatewayError::Internal(_) => "internal",
        }
    }
}

/// Sentinel errors returned by feature-flag evaluators.
///
/// These replace exception-for-control-flow: an evaluator's `Result`
/// discriminates explicitly between "I have no opinion" and "stop asking,
/// something is badly wrong".
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FlagEvalError {
    #[error("evaluator has no decision for this flag")]
    NoDecision,

    #[error("evaluator fatal error: {0}")]
    Fatal(String),

    #[error("evaluator error: {0}")]
    Other(String),
}
