//! Black-box scenarios driven entirely through `GatewayModule`'s public
//! surface against real loopback backends, mirroring how `palisade-server`
//! itself calls into this crate.

mod support;

use ahash::HashMap as AHashMap;
use palisade_core::gateway::{GatewayModule, TenantConfigStore};
use palisade_core::models::config::{
    BackendConfig, CacheConfig, CircuitBreakerConfig, CompositeRoute, CompositeStrategy,
    FeatureFlagsConfig, GlobalConfig, Route, RouteConfig, RouteTarget, TenantOverlay,
};
use palisade_core::models::error::GatewayError;
use palisade_core::models::event::GatewayEvent;
use palisade_core::events::EventSink;
use palisade_core::routing::dispatcher::RequestContext;
use reqwest::Method;
use std::sync::{Arc, Mutex};
use support::spawn_canned_backend;

struct FixedStore {
    global: GlobalConfig,
    overlays: AHashMap<String, TenantOverlay>,
}

impl TenantConfigStore for FixedStore {
    fn global_config(&self) -> GlobalConfig {
        self.global.clone()
    }
    fn tenant_overlay(&self, tenant_id: &str) -> Option<TenantOverlay> {
        self.overlays.get(tenant_id).cloned()
    }
}

#[derive(Default)]
struct CollectingSink {
    events: Mutex<Vec<String>>,
}

impl EventSink for CollectingSink {
    fn emit(&self, event: GatewayEvent) {
        self.events.lock().unwrap().push(event.event_type.as_str().to_string());
    }
}

fn backend(url: impl Into<String>) -> BackendConfig {
    BackendConfig { url: url.into(), ..Default::default() }
}

fn get(path: &str, tenant: Option<&str>) -> RequestContext {
    RequestContext {
        tenant_id: tenant.map(str::to_string),
        method: Method::GET,
        path: path.to_string(),
        headers: Vec::new(),
        body: Vec::new(),
        original_host: "client.example".to_string(),
    }
}

async fn started_module(global: GlobalConfig, overlays: AHashMap<String, TenantOverlay>) -> Arc<GatewayModule> {
    started_module_with_sink(global, overlays, None).await
}

async fn started_module_with_sink(
    global: GlobalConfig,
    overlays: AHashMap<String, TenantOverlay>,
    sink: Option<Arc<dyn EventSink>>,
) -> Arc<GatewayModule> {
    let store = Arc::new(FixedStore { global, overlays });
    let module = Arc::new(GatewayModule::new(store, sink));
    module.start().await.expect("module starts");
    module
}

// Scenario: a single backend behind a single route answers every request.
#[tokio::test]
async fn single_backend_happy_path() {
    let (url, calls) = spawn_canned_backend(200, r#"{"ok":true}"#).await;

    let mut global = GlobalConfig::default();
    global.backend_services.insert("api".to_string(), backend(url));
    global.default_backend = Some("api".to_string());

    let module = started_module(global, AHashMap::default()).await;
    let outcome = module.dispatch(None, get("/anything", None)).await.unwrap();

    assert_eq!(outcome.response.status, 200);
    assert_eq!(outcome.response.body, br#"{"ok":true}"#);
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    module.stop().await;
}

// Scenario: a tenant overlay points the same backend id at a different URL.
#[tokio::test]
async fn tenant_overlay_overrides_backend_url() {
    let (global_url, global_calls) = spawn_canned_backend(200, r#"{"tier":"global"}"#).await;
    let (tenant_url, tenant_calls) = spawn_canned_backend(200, r#"{"tier":"tenant"}"#).await;

    let mut global = GlobalConfig::default();
    global.backend_services.insert("api".to_string(), backend(global_url));
    global.routes.insert(
        "/api/*".to_string(),
        Route { pattern: "/api/*".to_string(), target: RouteTarget::Single("api".to_string()), config: RouteConfig::default() },
    );

    let mut overlay = TenantOverlay::default();
    overlay.backend_services.insert("api".to_string(), backend(tenant_url));

    let mut overlays = AHashMap::default();
    overlays.insert("acme".to_string(), overlay);

    let module = started_module(global, overlays).await;

    let global_outcome = module.dispatch(None, get("/api/users", None)).await.unwrap();
    assert_eq!(global_outcome.response.body, br#"{"tier":"global"}"#);

    let tenant_outcome = module.dispatch(Some("acme"), get("/api/users", Some("acme"))).await.unwrap();
    assert_eq!(tenant_outcome.response.body, br#"{"tier":"tenant"}"#);

    assert_eq!(global_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(tenant_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    module.stop().await;
}

// Scenario: the gating flag is off, so the alternative backend serves the
// request instead of the primary target.
#[tokio::test]
async fn feature_flag_off_routes_to_alternative() {
    let (primary_url, primary_calls) = spawn_canned_backend(200, r#"{"variant":"new"}"#).await;
    let (legacy_url, legacy_calls) = spawn_canned_backend(200, r#"{"variant":"legacy"}"#).await;

    let mut global = GlobalConfig::default();
    global.backend_services.insert("checkout-v2".to_string(), backend(primary_url));
    global.backend_services.insert("checkout-v1".to_string(), backend(legacy_url));
    global.feature_flags = FeatureFlagsConfig {
        enabled: true,
        flags: [("new-checkout".to_string(), false)].into_iter().collect(),
    };
    global.routes.insert(
        "/checkout".to_string(),
        Route {
            pattern: "/checkout".to_string(),
            target: RouteTarget::Single("checkout-v2".to_string()),
            config: RouteConfig {
                feature_flag_id: Some("new-checkout".to_string()),
                alternative_backend: Some("checkout-v1".to_string()),
                ..Default::default()
            },
        },
    );

    let module = started_module(global, AHashMap::default()).await;
    let outcome = module.dispatch(None, get("/checkout", None)).await.unwrap();

    assert_eq!(outcome.response.body, br#"{"variant":"legacy"}"#);
    assert_eq!(legacy_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(primary_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    module.stop().await;
}

// Scenario: a backend passing through upstream 500s is recorded as a
// breaker failure (not a success), so after `failure_threshold` of them the
// breaker opens and the next call fails fast with `CircuitOpen` instead of
// reaching the backend at all.
#[tokio::test]
async fn circuit_opens_after_threshold_failures() {
    let (url, calls) = spawn_canned_backend(500, r#"{"error":"boom"}"#).await;

    let mut global = GlobalConfig::default();
    global.backend_services.insert("flaky".to_string(), backend(url));
    global.backend_circuit_breakers.insert(
        "flaky".to_string(),
        CircuitBreakerConfig { enabled: true, failure_threshold: 2, open_timeout_ms: 60_000 },
    );
    // Admission checks (and therefore circuit-open short-circuiting) only
    // happen on the explicit-route path, not the bare default-backend path.
    global.routes.insert(
        "/x".to_string(),
        Route { pattern: "/x".to_string(), target: RouteTarget::Single("flaky".to_string()), config: RouteConfig::default() },
    );

    let sink = Arc::new(CollectingSink::default());
    let module = started_module_with_sink(global, AHashMap::default(), Some(sink.clone())).await;

    let first = module.dispatch(None, get("/x", None)).await.unwrap();
    assert_eq!(first.response.status, 500);
    let second = module.dispatch(None, get("/x", None)).await.unwrap();
    assert_eq!(second.response.status, 500);

    let third = module.dispatch(None, get("/x", None)).await.unwrap_err();
    assert!(matches!(third, GatewayError::CircuitOpen { .. }));
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    assert!(sink.events.lock().unwrap().contains(&"circuit_breaker_open".to_string()));
    module.stop().await;
}

// Scenario: a cacheable GET is served from cache on the second call; the
// backend only ever sees the first.
#[tokio::test]
async fn repeated_get_is_served_from_cache() {
    let (url, calls) = spawn_canned_backend(200, r#"{"cached":true}"#).await;

    let mut global = GlobalConfig::default();
    global.backend_services.insert("api".to_string(), backend(url));
    global.default_backend = Some("api".to_string());
    global.cache = CacheConfig { enabled: true, ttl_ms: 60_000, capacity: 10, sweep_interval_ms: 30_000, vary_headers: vec![] };

    let module = started_module(global, AHashMap::default()).await;

    let first = module.dispatch(None, get("/same", None)).await.unwrap();
    assert!(!first.served_from_cache);
    let second = module.dispatch(None, get("/same", None)).await.unwrap();
    assert!(second.served_from_cache);
    assert_eq!(second.response.body, br#"{"cached":true}"#);

    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    module.stop().await;
}

// Scenario: a composite route merges two backends' JSON bodies into one.
#[tokio::test]
async fn composite_route_merges_backend_responses() {
    let (url_a, _) = spawn_canned_backend(200, r#"{"profile":{"name":"ana"}}"#).await;
    let (url_b, _) = spawn_canned_backend(200, r#"{"orders":[1,2,3]}"#).await;

    let mut global = GlobalConfig::default();
    global.backend_services.insert("profile-svc".to_string(), backend(url_a));
    global.backend_services.insert("orders-svc".to_string(), backend(url_b));
    global.composite_routes.insert(
        "/dashboard".to_string(),
        CompositeRoute {
            pattern: "/dashboard".to_string(),
            backends: vec!["profile-svc".to_string(), "orders-svc".to_string()],
            strategy: CompositeStrategy::Merge,
            timeout_ms: 5_000,
        },
    );

    let module = started_module(global, AHashMap::default()).await;
    let outcome = module.dispatch(None, get("/dashboard", None)).await.unwrap();

    let value: serde_json::Value = serde_json::from_slice(&outcome.response.body).unwrap();
    assert_eq!(value["profile"]["name"], "ana");
    assert_eq!(value["orders"], serde_json::json!([1, 2, 3]));
    module.stop().await;
}
