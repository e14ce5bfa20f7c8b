//! Config merger: resolves a [`GlobalConfig`] and an optional
//! [`TenantOverlay`] into a single [`EffectiveConfig`] used to route one
//! request.

use crate::models::config::{
    BackendConfig, CacheConfig, CircuitBreakerConfig, CompositeRoute, FeatureFlagsConfig,
    GlobalConfig, Route, TenantOverlay,
};
use std::collections::HashMap;

/// The per-tenant merged view of configuration used to route a specific
/// request.
#[derive(Debug, Clone)]
pub struct EffectiveConfig {
    pub backend_services: HashMap<String, BackendConfig>,
    pub default_backend: Option<String>,
    pub routes: HashMap<String, Route>,
    pub composite_routes: HashMap<String, CompositeRoute>,
    pub backend_circuit_breakers: HashMap<String, CircuitBreakerConfig>,
    pub tenant_id_header: String,
    pub require_tenant_id: bool,
    pub cache: CacheConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub feature_flags: FeatureFlagsConfig,
}

/// Merges `global` with an optional tenant `overlay`, field by field,
/// tenant-overlay-wins. Merging never fails: invalid URLs are only reported
/// once a proxy is actually instantiated for a resolved backend.
pub fn merge(global: &GlobalConfig, overlay: Option<&TenantOverlay>) -> EffectiveConfig {
    let Some(t) = overlay else {
        return EffectiveConfig {
            backend_services: global.backend_services.clone(),
            default_backend: global.default_backend.clone(),
            routes: global.routes.clone(),
            composite_routes: global.composite_routes.clone(),
            backend_circuit_breakers: global.backend_circuit_breakers.clone(),
            tenant_id_header: global.tenant_id_header.clone(),
            require_tenant_id: global.require_tenant_id,
            cache: global.cache.clone(),
            circuit_breaker: global.circuit_breaker.clone(),
            feature_flags: global.feature_flags.clone(),
        };
    };

    EffectiveConfig {
        backend_services: merge_backend_services(&global.backend_services, &t.backend_services),
        default_backend: non_empty_or(t.default_backend.as_deref(), global.default_backend.as_deref())
            .map(str::to_string),
        routes: merge_union_tenant_wins(&global.routes, &t.routes),
        composite_routes: merge_union_tenant_wins(&global.composite_routes, &t.composite_routes),
        backend_circuit_breakers: merge_union_tenant_wins(
            &global.backend_circuit_breakers,
            &t.backend_circuit_breakers,
        ),
        tenant_id_header: non_empty_or(t.tenant_id_header.as_deref(), Some(&global.tenant_id_header))
            .unwrap_or(&global.tenant_id_header)
            .to_string(),
        require_tenant_id: global.require_tenant_id || t.require_tenant_id,
        cache: if t.cache_enabled {
            t.cache.clone().unwrap_or_else(|| global.cache.clone())
        } else {
            global.cache.clone()
        },
        circuit_breaker: match &t.circuit_breaker {
            Some(cb) if cb.enabled => cb.clone(),
            _ => global.circuit_breaker.clone(),
        },
        feature_flags: FeatureFlagsConfig {
            enabled: global.feature_flags.enabled || t.feature_flags.enabled,
            flags: merge_union_tenant_wins(&global.feature_flags.flags, &t.feature_flags.flags),
        },
    }
}

/// `backend_services`: union; for a key present in both, the tenant's
/// non-empty `url` overrides. An empty tenant URL means "inherit" — the
/// whole tenant entry is skipped and the global one wins, except a tenant
/// entry for a backend the global side doesn't know about is still added
/// (covers purely tenant-scoped backends).
fn merge_backend_services(
    global: &HashMap<String, BackendConfig>,
    tenant: &HashMap<String, BackendConfig>,
) -> HashMap<String, BackendConfig> {
    let mut merged = global.clone();
    for (id, tenant_backend) in tenant {
        match merged.get(id) {
            Some(global_backend) if tenant_backend.url.is_empty() => {
                // Inherit the global URL but still let the tenant override
                // the rewriting/endpoint fields it supplied, since those are
                // not "inherit on empty" the way the URL is.
                let mut effective = tenant_backend.clone();
                effective.url = global_backend.url.clone();
                merged.insert(id.clone(), effective);
            }
            _ => {
                merged.insert(id.clone(), tenant_backend.clone());
            }
        }
    }
    merged
}

/// Union of two maps where the tenant wins on key collision.
fn merge_union_tenant_wins<V: Clone>(
    global: &HashMap<String, V>,
    tenant: &HashMap<String, V>,
) -> HashMap<String, V> {
    let mut merged = global.clone();
    for (k, v) in tenant {
        merged.insert(k.clone(), v.clone());
    }
    merged
}

fn non_empty_or<'a>(preferred: Option<&'a str>, fallback: Option<&'a str>) -> Option<&'a str> {
    match preferred {
        Some(s) if !s.is_empty() => Some(s),
        _ => fallback,
    }
}
