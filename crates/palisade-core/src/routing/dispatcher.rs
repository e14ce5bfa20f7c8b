//! Request dispatch: resolves one request against an
//! [`EffectiveConfig`], selecting between a composite route, an explicit
//! route, or the tenant's default backend, then drives it through caching,
//! circuit breaking, and optional dry-run shadowing.

use crate::cache::response_cache::{cache_key, ResponseCache};
use crate::composite::executor::CompositeExecutor;
use crate::config::merge::EffectiveConfig;
use crate::dryrun::shadow::ShadowRunner;
use crate::events::SharedEventSink;
use crate::feature_flags::aggregator::FlagAggregator;
use crate::health::checker::HealthChecker;
use crate::models::cache::CachedResponse;
use crate::models::config::{BackendId, CompositeRoute, Route, RouteTarget};
use crate::models::error::GatewayError;
use crate::models::event::{EventType, GatewayEvent};
use crate::proxy::backend_proxy::{BackendProxy, ProxyResponse};
use crate::resilience::circuit_breaker::{Admission, CircuitBreaker};
use crate::routing::path_matcher::PathMatcher;
use ahash::HashMap as AHashMap;
use reqwest::Method;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Everything dispatch needs to know about one inbound request, decoupled
/// from any particular web framework.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub tenant_id: Option<String>,
    pub method: Method,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub original_host: String,
}

#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub response: ProxyResponse,
    pub backend_id: Option<BackendId>,
    pub served_from_cache: bool,
}

/// Owns the runtime state derived from one tenant's [`EffectiveConfig`]:
/// compiled route matchers, one circuit breaker per backend, the flag
/// aggregator, and the optional cache/health/shadow collaborators. The
/// composite executor is shared across every tenant's dispatcher (registered
/// custom transformers apply gateway-wide), so it's passed in rather than
/// built here.
pub struct Dispatcher {
    effective: EffectiveConfig,
    routes: PathMatcher<Route>,
    composite_routes: PathMatcher<CompositeRoute>,
    proxy: Arc<BackendProxy>,
    composite_executor: Arc<CompositeExecutor>,
    breakers: AHashMap<BackendId, Arc<CircuitBreaker>>,
    rotations: AHashMap<String, AtomicUsize>,
    flags: FlagAggregator,
    cache: Option<Arc<ResponseCache>>,
    health: Option<Arc<HealthChecker>>,
    shadow: Option<Arc<ShadowRunner>>,
    sink: Option<SharedEventSink>,
}

impl Dispatcher {
    pub fn new(
        effective: EffectiveConfig,
        proxy: Arc<BackendProxy>,
        composite_executor: Arc<CompositeExecutor>,
        cache: Option<Arc<ResponseCache>>,
        health: Option<Arc<HealthChecker>>,
        shadow: Option<Arc<ShadowRunner>>,
        sink: Option<SharedEventSink>,
    ) -> Self {
        let routes = PathMatcher::from_entries(
            effective.routes.values().map(|r| (r.pattern.clone(), r.clone())),
        );
        let composite_routes = PathMatcher::from_entries(
            effective
                .composite_routes
                .values()
                .map(|r| (r.pattern.clone(), r.clone())),
        );

        let mut breakers = AHashMap::default();
        for (id, backend) in &effective.backend_services {
            let config = backend
                .circuit_breaker_override
                .clone()
                .or_else(|| effective.backend_circuit_breakers.get(id).cloned())
                .unwrap_or_else(|| effective.circuit_breaker.clone());
            let breaker = CircuitBreaker::new(id.clone(), config);
            let breaker = match &sink {
                Some(s) => breaker.with_sink(Arc::clone(s)),
                None => breaker,
            };
            breakers.insert(id.clone(), Arc::new(breaker));
        }

        let mut rotations = AHashMap::default();
        for route in effective.routes.values() {
            if matches!(route.target, RouteTarget::Group(_)) {
                rotations.insert(route.pattern.clone(), AtomicUsize::new(0));
            }
        }

        let mut flags = FlagAggregator::new();
        flags.register(Arc::new(crate::feature_flags::aggregator::FileFlagEvaluator::new(
            effective.feature_flags.clone(),
        )));

        Self {
            effective,
            routes,
            composite_routes,
            proxy,
            composite_executor,
            breakers,
            rotations,
            flags,
            cache,
            health,
            shadow,
            sink,
        }
    }

    /// Allows a host to layer evaluators above the built-in file evaluator
    ///.
    pub fn register_flag_evaluator(&mut self, evaluator: Arc<dyn crate::feature_flags::aggregator::FlagEvaluator>) {
        self.flags.register(evaluator);
    }

    pub async fn dispatch(&self, req: RequestContext) -> Result<DispatchOutcome, GatewayError> {
        self.emit(EventType::RequestReceived, &req);

        if self.effective.require_tenant_id && req.tenant_id.is_none() {
            return Err(GatewayError::TenantRequired {
                header: self.effective.tenant_id_header.clone(),
            });
        }

        let cacheable = self.cache.as_ref().filter(|c| c.enabled() && req.method == Method::GET);

        let outcome = if let Some(cache) = cacheable {
            let vary_values: Vec<(String, String)> = cache
                .vary_headers()
                .iter()
                .filter_map(|name| {
                    req.headers
                        .iter()
                        .find(|(n, _)| n.eq_ignore_ascii_case(name))
                        .map(|(n, v)| (n.clone(), v.clone()))
                })
                .collect();
            let key = cache_key(req.method.as_str(), &req.path, &vary_values);

            let cached_before = cache.get(&key).await.is_some();
            let req_for_compute = req.clone();
            let ttl = cache.ttl();
            let response = cache
                .get_or_compute(key, || async move {
                    let (resp, _backend) = self.execute(&req_for_compute).await?;
                    Ok::<_, GatewayError>(CachedResponse::new(resp.status, resp.headers, resp.body, ttl))
                })
                .await?;
            DispatchOutcome {
                response: cached_into_proxy_response(&response),
                backend_id: None,
                served_from_cache: cached_before,
            }
        } else {
            let (response, backend_id) = self.execute(&req).await?;
            DispatchOutcome { response, backend_id, served_from_cache: false }
        };

        self.emit(EventType::RequestProxied, &req);
        Ok(outcome)
    }

    async fn execute(&self, req: &RequestContext) -> Result<(ProxyResponse, Option<BackendId>), GatewayError> {
        if let Some(composite) = self.composite_routes.find(&req.path) {
            let response = self.execute_composite(req, composite).await?;
            return Ok((response, None));
        }

        if let Some(route) = self.routes.find(&req.path) {
            return self.execute_route(req, route).await;
        }

        match &self.effective.default_backend {
            Some(backend_id) => self
                .execute_backend(req, backend_id, Duration::from_millis(5_000))
                .await
                .map(|r| (r, Some(backend_id.clone()))),
            None => Err(GatewayError::RouteNotFound { path: req.path.clone() }),
        }
    }

    async fn execute_composite(
        &self,
        req: &RequestContext,
        composite: &CompositeRoute,
    ) -> Result<ProxyResponse, GatewayError> {
        let backends: Vec<(BackendId, crate::models::config::BackendConfig)> = composite
            .backends
            .iter()
            .filter_map(|id| self.effective.backend_services.get(id).map(|b| (id.clone(), b.clone())))
            .collect();

        if backends.is_empty() {
            return Err(GatewayError::CompositeFailed {
                message: format!("composite route '{}' has no resolvable backends", composite.pattern),
            });
        }

        let timeout = Duration::from_millis(composite.timeout_ms);
        self.composite_executor
            .execute(
                &backends,
                req.method.clone(),
                &req.path,
                req.headers.clone(),
                &req.original_host,
                req.body.clone(),
                timeout,
                timeout,
                &composite.strategy,
            )
            .await
    }

    async fn execute_route(
        &self,
        req: &RequestContext,
        route: &Route,
    ) -> Result<(ProxyResponse, Option<BackendId>), GatewayError> {
        let tenant = req.tenant_id.as_deref().unwrap_or("");
        let candidates = self.resolve_target_backends(route, tenant)?;

        let rotation = self.rotations.get(&route.pattern);
        let backend_id = self.select_backend(&candidates, rotation).await?;
        let timeout = Duration::from_millis(route.config.timeout_ms.unwrap_or(5_000));
        let response = self.execute_backend(req, &backend_id, timeout).await?;

        if route.config.dry_run {
            if let (Some(shadow_id), Some(shadow_runner)) = (&route.config.dry_run_backend, &self.shadow) {
                if let Some(backend) = self.effective.backend_services.get(shadow_id) {
                    shadow_runner.fire(
                        response.clone(),
                        shadow_id.clone(),
                        backend.clone(),
                        req.method.clone(),
                        req.path.clone(),
                        req.headers.clone(),
                        req.original_host.clone(),
                        req.body.clone(),
                        Duration::from_millis(route.config.timeout_ms.unwrap_or(5_000)),
                        vec!["Content-Type".to_string()],
                    );
                }
            }
        }

        Ok((response, Some(backend_id)))
    }

    /// Applies the route's feature-flag gate. `NoDecision` fails open to the
    /// route's primary target — an unanswered flag should not change
    /// behavior an operator never asked for.
    fn resolve_target_backends(&self, route: &Route, tenant: &str) -> Result<Vec<BackendId>, GatewayError> {
        let Some(flag_id) = &route.config.feature_flag_id else {
            return Ok(route.target.backends().to_vec());
        };

        match self.flags.evaluate(flag_id, tenant) {
            Ok(true) => Ok(route.target.backends().to_vec()),
            Ok(false) => route
                .config
                .alternative_backend
                .clone()
                .map(|b| vec![b])
                .ok_or_else(|| GatewayError::RouteNotFound { path: route.pattern.clone() }),
            Err(GatewayError::NoDecision { .. }) => Ok(route.target.backends().to_vec()),
            Err(e) => Err(e),
        }
    }

    /// Picks one backend from `candidates`, skipping any whose circuit is
    /// open and any known-unhealthy backend, round-robining across the rest.
    async fn select_backend(
        &self,
        candidates: &[BackendId],
        rotation: Option<&AtomicUsize>,
    ) -> Result<BackendId, GatewayError> {
        if candidates.is_empty() {
            return Err(GatewayError::RouteNotFound { path: String::new() });
        }

        let start = rotation.map(|r| r.fetch_add(1, Ordering::Relaxed)).unwrap_or(0);

        for offset in 0..candidates.len() {
            let candidate = &candidates[(start + offset) % candidates.len()];
            if let Some(health) = &self.health {
                if let Some(status) = health.status_of(candidate).await {
                    if !status.healthy {
                        continue;
                    }
                }
            }
            if let Some(breaker) = self.breakers.get(candidate) {
                if breaker.admit().await == Admission::Rejected {
                    continue;
                }
            }
            return Ok(candidate.clone());
        }

        Err(GatewayError::CircuitOpen { backend: candidates[0].clone() })
    }

    async fn execute_backend(
        &self,
        req: &RequestContext,
        backend_id: &str,
        timeout: Duration,
    ) -> Result<ProxyResponse, GatewayError> {
        let backend = self
            .effective
            .backend_services
            .get(backend_id)
            .ok_or_else(|| GatewayError::RouteNotFound { path: req.path.clone() })?;

        let result = self
            .proxy
            .forward(
                backend_id,
                backend,
                req.method.clone(),
                &req.path,
                req.headers.clone(),
                &req.original_host,
                req.body.clone(),
                timeout,
            )
            .await;

        if let Some(health) = &self.health {
            health.note_traffic(backend_id).await;
        }

        if let Some(breaker) = self.breakers.get(backend_id) {
            match &result {
                Ok(resp) if resp.status < 500 => breaker.record_success().await,
                _ => breaker.record_failure().await,
            }
        }

        result
    }

    fn emit(&self, event_type: EventType, req: &RequestContext) {
        if let Some(sink) = &self.sink {
            sink.emit(GatewayEvent::new(event_type).with("path", req.path.clone()));
        }
    }
}

fn cached_into_proxy_response(cached: &CachedResponse) -> ProxyResponse {
    ProxyResponse {
        status: cached.status,
        headers: cached.headers.clone(),
        body: cached.body.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::{
        BackendConfig, CompositeStrategy, RouteConfig,
    };

    fn empty_effective() -> EffectiveConfig {
        EffectiveConfig {
            backend_services: Default::default(),
            default_backend: None,
            routes: Default::default(),
            composite_routes: Default::default(),
            backend_circuit_breakers: Default::default(),
            tenant_id_header: "X-Tenant-ID".to_string(),
            require_tenant_id: false,
            cache: Default::default(),
            circuit_breaker: Default::default(),
            feature_flags: Default::default(),
        }
    }

    fn dispatcher(effective: EffectiveConfig) -> Dispatcher {
        let proxy = Arc::new(BackendProxy::new());
        let composite_executor = Arc::new(CompositeExecutor::new(Arc::clone(&proxy)));
        Dispatcher::new(effective, proxy, composite_executor, None, None, None, None)
    }

    fn req(path: &str, tenant: Option<&str>) -> RequestContext {
        RequestContext {
            tenant_id: tenant.map(|t| t.to_string()),
            method: Method::GET,
            path: path.to_string(),
            headers: Vec::new(),
            body: Vec::new(),
            original_host: "client.example".to_string(),
        }
    }

    fn route(pattern: &str, target: RouteTarget, config: RouteConfig) -> Route {
        Route { pattern: pattern.to_string(), target, config }
    }

    #[tokio::test]
    async fn tenant_required_rejects_when_header_missing() {
        let mut effective = empty_effective();
        effective.require_tenant_id = true;
        let d = dispatcher(effective);
        let err = d.dispatch(req("/anything", None)).await.unwrap_err();
        assert!(matches!(err, GatewayError::TenantRequired { .. }));
    }

    #[test]
    fn resolve_target_backends_no_flag_returns_primary_target() {
        let effective = empty_effective();
        let d = dispatcher(effective);
        let r = route("/a", RouteTarget::Single("svc-a".to_string()), RouteConfig::default());
        let backends = d.resolve_target_backends(&r, "tenant-a").unwrap();
        assert_eq!(backends, vec!["svc-a".to_string()]);
    }

    #[test]
    fn resolve_target_backends_flag_true_returns_primary() {
        let mut effective = empty_effective();
        effective.feature_flags.flags.insert("beta".to_string(), true);
        let d = dispatcher(effective);
        let r = route(
            "/a",
            RouteTarget::Single("svc-a".to_string()),
            RouteConfig { feature_flag_id: Some("beta".to_string()), ..Default::default() },
        );
        let backends = d.resolve_target_backends(&r, "tenant-a").unwrap();
        assert_eq!(backends, vec!["svc-a".to_string()]);
    }

    #[test]
    fn resolve_target_backends_flag_false_returns_alternative() {
        let mut effective = empty_effective();
        effective.feature_flags.flags.insert("beta".to_string(), false);
        let d = dispatcher(effective);
        let r = route(
            "/a",
            RouteTarget::Single("svc-a".to_string()),
            RouteConfig {
                feature_flag_id: Some("beta".to_string()),
                alternative_backend: Some("svc-old".to_string()),
                ..Default::default()
            },
        );
        let backends = d.resolve_target_backends(&r, "tenant-a").unwrap();
        assert_eq!(backends, vec!["svc-old".to_string()]);
    }

    #[test]
    fn resolve_target_backends_flag_false_without_alternative_errors() {
        let mut effective = empty_effective();
        effective.feature_flags.flags.insert("beta".to_string(), false);
        let d = dispatcher(effective);
        let r = route(
            "/a",
            RouteTarget::Single("svc-a".to_string()),
            RouteConfig { feature_flag_id: Some("beta".to_string()), ..Default::default() },
        );
        let err = d.resolve_target_backends(&r, "tenant-a").unwrap_err();
        assert!(matches!(err, GatewayError::RouteNotFound { .. }));
    }

    #[test]
    fn resolve_target_backends_no_decision_fails_open_to_primary() {
        let effective = empty_effective();
        let d = dispatcher(effective);
        let r = route(
            "/a",
            RouteTarget::Single("svc-a".to_string()),
            RouteConfig {
                feature_flag_id: Some("unknown-flag".to_string()),
                alternative_backend: Some("svc-old".to_string()),
                ..Default::default()
            },
        );
        let backends = d.resolve_target_backends(&r, "tenant-a").unwrap();
        assert_eq!(backends, vec!["svc-a".to_string()]);
    }

    #[tokio::test]
    async fn select_backend_round_robins_when_all_healthy() {
        let mut effective = empty_effective();
        effective.backend_services.insert("a".to_string(), BackendConfig {
            url: "http://a.example".to_string(),
            path_rewriting: Default::default(),
            header_rewriting: Default::default(),
            endpoints: Default::default(),
            circuit_breaker_override: None,
        });
        effective.backend_services.insert("b".to_string(), BackendConfig {
            url: "http://b.example".to_string(),
            path_rewriting: Default::default(),
            header_rewriting: Default::default(),
            endpoints: Default::default(),
            circuit_breaker_override: None,
        });
        let d = dispatcher(effective);
        let candidates = vec!["a".to_string(), "b".to_string()];
        let rotation = AtomicUsize::new(0);
        let first = d.select_backend(&candidates, Some(&rotation)).await.unwrap();
        let second = d.select_backend(&candidates, Some(&rotation)).await.unwrap();
        assert_eq!(first, "a");
        assert_eq!(second, "b");
    }

    #[tokio::test]
    async fn select_backend_skips_open_circuit() {
        let mut effective = empty_effective();
        effective.backend_services.insert("a".to_string(), BackendConfig {
            url: "http://a.example".to_string(),
            path_rewriting: Default::default(),
            header_rewriting: Default::default(),
            endpoints: Default::default(),
            circuit_breaker_override: Some(crate::models::config::CircuitBreakerConfig {
                enabled: true,
                failure_threshold: 1,
                open_timeout_ms: 60_000,
            }),
        });
        effective.backend_services.insert("b".to_string(), BackendConfig {
            url: "http://b.example".to_string(),
            path_rewriting: Default::default(),
            header_rewriting: Default::default(),
            endpoints: Default::default(),
            circuit_breaker_override: None,
        });
        let d = dispatcher(effective);
        d.breakers.get("a").unwrap().record_failure().await;

        let candidates = vec!["a".to_string(), "b".to_string()];
        let chosen = d.select_backend(&candidates, None).await.unwrap();
        assert_eq!(chosen, "b");
    }

    #[tokio::test]
    async fn execute_precedence_composite_route_wins_over_explicit_route() {
        let mut effective = empty_effective();
        effective.routes.insert(
            "/shared".to_string(),
            route("/shared", RouteTarget::Single("missing-backend".to_string()), RouteConfig::default()),
        );
        effective.composite_routes.insert(
            "/shared".to_string(),
            CompositeRoute {
                pattern: "/shared".to_string(),
                backends: vec!["also-missing".to_string()],
                strategy: CompositeStrategy::Merge,
                timeout_ms: 1_000,
            },
        );
        let d = dispatcher(effective);

        // Both an explicit route and a composite route exist for the same
        // pattern; the composite's distinct failure mode (CompositeFailed,
        // not RouteNotFound) proves it was tried first.
        let err = d.execute(&req("/shared", None)).await.unwrap_err();
        assert!(matches!(err, GatewayError::CompositeFailed { .. }));
    }

    #[tokio::test]
    async fn execute_falls_back_to_default_backend_when_no_route_matches() {
        let mut effective = empty_effective();
        effective.default_backend = Some("unknown".to_string());
        let d = dispatcher(effective);
        let err = d.execute(&req("/nope", None)).await.unwrap_err();
        assert!(matches!(err, GatewayError::RouteNotFound { .. }));
    }

    #[tokio::test]
    async fn execute_errors_when_nothing_matches_and_no_default() {
        let effective = empty_effective();
        let d = dispatcher(effective);
        let err = d.execute(&req("/nope", None)).await.unwrap_err();
        assert!(matches!(err, GatewayError::RouteNotFound { .. }));
    }
}
