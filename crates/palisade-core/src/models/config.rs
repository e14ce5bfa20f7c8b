//! Configuration model for the Palisade gateway core.
//!
//! These types are the typed representation of the gateway's data model:
//! backends, routes, composite routes, feature flags, health checks, and
//! circuit breakers, plus the global/tenant-overlay split that
//! [`crate::config::merge`] resolves into an [`EffectiveConfig`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Short textual identifier for a backend, unique within a configuration.
pub type BackendId = String;

/// Opaque tenant identity. The empty string means "no tenant / global".
pub type TenantId = String;

/// How a backend's Host header should be set on the forwarded request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum HostnameHandling {
    /// Keep the client's original Host header untouched.
    #[default]
    PreserveOriginal,
    /// Set Host to the backend's own host.
    UseBackend,
    /// Set Host to `custom_hostname`. Falls back to `PreserveOriginal` if
    /// `custom_hostname` is empty.
    UseCustom,
}

/// Path rewriting rule applied before a request is forwarded to a backend.
///
/// Applied in order: strip `strip_base_path` (if it is a prefix of the
/// incoming path), then prepend `base_path_rewrite`. Empty fields are
/// no-ops.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct PathRewriting {
    #[serde(default)]
    pub strip_base_path: Option<String>,
    #[serde(default)]
    pub base_path_rewrite: Option<String>,
}

/// Header rewriting rule applied before a request is forwarded to a backend.
///
/// `set_headers` is applied before `remove_headers`; a header name present in
/// both is therefore removed.
/// Header name comparisons for removal are case-insensitive.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct HeaderRewriting {
    #[serde(default)]
    pub hostname_handling: HostnameHandling,
    #[serde(default)]
    pub custom_hostname: Option<String>,
    #[serde(default)]
    pub set_headers: HashMap<String, String>,
    #[serde(default)]
    pub remove_headers: Vec<String>,
}

/// Per-endpoint override of a backend's rewriting rules.
///
/// When the incoming path matches `pattern` (glob, `*` trailing wildcard
/// supported) the whole `path_rewriting`/`header_rewriting` block is
/// substituted for the backend-level one — endpoint overrides are
/// whole-field, never deep-merged with the backend defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub pattern: String,
    #[serde(default)]
    pub path_rewriting: Option<PathRewriting>,
    #[serde(default)]
    pub header_rewriting: Option<HeaderRewriting>,
}

/// A single upstream service addressed by [`BackendId`].
///
/// `url` must parse as an absolute URL or the backend is rejected at load,
/// *unless* at least one tenant overlay supplies a non-empty `url` for the
/// same id.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BackendConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub path_rewriting: PathRewriting,
    #[serde(default)]
    pub header_rewriting: HeaderRewriting,
    #[serde(default)]
    pub endpoints: HashMap<String, EndpointConfig>,
    #[serde(default)]
    pub circuit_breaker_override: Option<CircuitBreakerConfig>,
}

impl BackendConfig {
    /// Finds the first endpoint whose glob `pattern` matches `path`, if any.
    /// First match in map-iteration order is returned; callers needing
    /// determinism should keep one matching endpoint per backend.
    pub fn matching_endpoint(&self, path: &str) -> Option<&EndpointConfig> {
        self.endpoints
            .values()
            .find(|ep| crate::routing::path_matcher::glob_matches(&ep.pattern, path))
    }
}

/// Either a single backend, or a comma-separated group load-balanced by
/// simple round robin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum RouteTarget {
    Single(BackendId),
    Group(Vec<BackendId>),
}

impl RouteTarget {
    pub fn backends(&self) -> &[BackendId] {
        match self {
            RouteTarget::Single(id) => std::slice::from_ref(id),
            RouteTarget::Group(ids) => ids,
        }
    }

    /// Parses the wire form `"a,b,c"` into a group, or `"a"` into a single.
    pub fn parse(raw: &str) -> Self {
        if raw.contains(',') {
            RouteTarget::Group(raw.split(',').map(|s| s.trim().to_string()).collect())
        } else {
            RouteTarget::Single(raw.trim().to_string())
        }
    }
}

/// Per-route feature-flag gating and dry-run configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RouteConfig {
    #[serde(default)]
    pub feature_flag_id: Option<String>,
    #[serde(default)]
    pub alternative_backend: Option<BackendId>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub dry_run_backend: Option<BackendId>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// A route entry: pattern, target, and optional gating configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub pattern: String,
    pub target: RouteTarget,
    #[serde(default)]
    pub config: RouteConfig,
}

/// Fan-out strategy selector for a composite route.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CompositeStrategy {
    Merge,
    Combine,
    First,
    /// A transformer registered at runtime under this name via
    /// `GatewayModule::register_custom_endpoint`.
    Custom(String),
}

/// A single inbound path fanned out to multiple backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeRoute {
    pub pattern: String,
    pub backends: Vec<BackendId>,
    pub strategy: CompositeStrategy,
    #[serde(default = "default_composite_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_composite_timeout_ms() -> u64 {
    10_000
}

/// Circuit breaker tuning for a backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CircuitBreakerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u64,
    #[serde(default = "default_open_timeout_ms")]
    pub open_timeout_ms: u64,
}

fn default_true() -> bool {
    true
}
fn default_failure_threshold() -> u64 {
    5
}
fn default_open_timeout_ms() -> u64 {
    30_000
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            failure_threshold: default_failure_threshold(),
            open_timeout_ms: default_open_timeout_ms(),
        }
    }
}

/// Health check tuning, globally and per-backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_health_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_health_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_recent_request_threshold_ms")]
    pub recent_request_threshold_ms: u64,
    #[serde(default = "default_expected_status_codes")]
    pub expected_status_codes: Vec<u16>,
    #[serde(default)]
    pub health_endpoints: HashMap<BackendId, String>,
    #[serde(default)]
    pub per_backend_overrides: HashMap<BackendId, Box<HealthCheckConfig>>,
}

fn default_health_interval_ms() -> u64 {
    15_000
}
fn default_health_timeout_ms() -> u64 {
    2_000
}
fn default_recent_request_threshold_ms() -> u64 {
    10_000
}
fn default_expected_status_codes() -> Vec<u16> {
    vec![200, 204]
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            interval_ms: default_health_interval_ms(),
            timeout_ms: default_health_timeout_ms(),
            recent_request_threshold_ms: default_recent_request_threshold_ms(),
            expected_status_codes: default_expected_status_codes(),
            health_endpoints: HashMap::new(),
            per_backend_overrides: HashMap::new(),
        }
    }
}

impl HealthCheckConfig {
    /// Resolves the effective config for `backend`, applying its
    /// per-backend override (if any) whole-block, same as endpoint overrides
    /// for path/header rewriting.
    pub fn effective_for(&self, backend: &str) -> HealthCheckConfig {
        match self.per_backend_overrides.get(backend) {
            Some(over) => (**over).clone(),
            None => self.clone(),
        }
    }

    pub fn health_endpoint_for(&self, backend: &str) -> &str {
        self.health_endpoints
            .get(backend)
            .map(|s| s.as_str())
            .unwrap_or("/")
    }
}

/// Response cache tuning: the shape a tenant overlay's `cache_enabled` flag
/// and optional `cache` override resolve against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_cache_ttl_ms")]
    pub ttl_ms: u64,
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
    #[serde(default = "default_cache_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    #[serde(default = "default_vary_headers")]
    pub vary_headers: Vec<String>,
}

fn default_cache_ttl_ms() -> u64 {
    300_000
}
fn default_cache_capacity() -> usize {
    10_000
}
fn default_cache_sweep_interval_ms() -> u64 {
    30_000
}
fn default_vary_headers() -> Vec<String> {
    vec!["Accept".to_string(), "Accept-Encoding".to_string()]
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_ms: default_cache_ttl_ms(),
            capacity: default_cache_capacity(),
            sweep_interval_ms: default_cache_sweep_interval_ms(),
            vary_headers: default_vary_headers(),
        }
    }
}

/// Feature flags, global baseline shape. A tenant overlay carries
/// the same shape; only `flags` participates in the union-with-tenant-wins
/// merge.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct FeatureFlagsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub flags: HashMap<String, bool>,
}

/// The root configuration document loaded at startup.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GlobalConfig {
    #[serde(default)]
    pub backend_services: HashMap<BackendId, BackendConfig>,
    #[serde(default)]
    pub default_backend: Option<BackendId>,
    #[serde(default)]
    pub routes: HashMap<String, Route>,
    #[serde(default)]
    pub composite_routes: HashMap<String, CompositeRoute>,
    #[serde(default)]
    pub backend_circuit_breakers: HashMap<BackendId, CircuitBreakerConfig>,
    #[serde(default = "default_tenant_id_header")]
    pub tenant_id_header: String,
    #[serde(default)]
    pub require_tenant_id: bool,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub feature_flags: FeatureFlagsConfig,
    #[serde(default)]
    pub health_check: HealthCheckConfig,
}

fn default_tenant_id_header() -> String {
    "X-Tenant-ID".to_string()
}

/// A tenant-specific overlay on top of [`GlobalConfig`]. Every field is
/// optional; absence means "inherit from global".
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TenantOverlay {
    #[serde(default)]
    pub backend_services: HashMap<BackendId, BackendConfig>,
    #[serde(default)]
    pub default_backend: Option<BackendId>,
    #[serde(default)]
    pub routes: HashMap<String, Route>,
    #[serde(default)]
    pub composite_routes: HashMap<String, CompositeRoute>,
    #[serde(default)]
    pub backend_circuit_breakers: HashMap<BackendId, CircuitBreakerConfig>,
    #[serde(default)]
    pub tenant_id_header: Option<String>,
    #[serde(default)]
    pub require_tenant_id: bool,
    #[serde(default)]
    pub cache_enabled: bool,
    #[serde(default)]
    pub cache: Option<CacheConfig>,
    #[serde(default)]
    pub circuit_breaker: Option<CircuitBreakerConfig>,
    #[serde(default)]
    pub feature_flags: FeatureFlagsConfig,
}

impl GlobalConfig {
    /// Validates backend URLs and route patterns. This is intentionally
    /// global-only: a backend with an empty URL is valid at this layer if
    /// some tenant might supply it later; that case is only an error once an
    /// [`EffectiveConfig`](crate::config::merge::EffectiveConfig) is
    /// resolved and a proxy is actually instantiated for it.
    pub fn validate(&self) -> Result<(), crate::models::error::ConfigError> {
        use crate::models::error::ConfigError;

        for (id, backend) in &self.backend_services {
            if !backend.url.is_empty() && reqwest::Url::parse(&backend.url).is_err() {
                return Err(ConfigError::InvalidBackendUrl {
                    id: id.clone(),
                    reason: "not an absolute URL".to_string(),
                });
            }
        }

        for pattern in self.routes.keys().chain(self.composite_routes.keys()) {
            if pattern.is_empty() {
                return Err(ConfigError::MalformedPattern {
                    pattern: pattern.clone(),
                    reason: "pattern must not be empty".to_string(),
                });
            }
        }

        Ok(())
    }
}
