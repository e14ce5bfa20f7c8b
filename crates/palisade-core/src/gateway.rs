//! Top-level module lifecycle: owns the shared collaborators
//! (backend proxy, composite executor, health checker, shadow runner) and
//! one [`Dispatcher`] per known tenant, rebuilding dispatchers whenever
//! configuration changes structurally. External capabilities the host must
//! supply — a router, an HTTP transport, and a tenant configuration store —
//! are expressed as traits here rather than concrete framework types, so the
//! core stays framework-agnostic.

use crate::cache::response_cache::{spawn_sweeper, ResponseCache};
use crate::composite::executor::{CompositeExecutor, CustomTransformer};
use crate::dryrun::shadow::ShadowRunner;
use crate::events::{EventSink, SharedEventSink};
use crate::health::checker::HealthChecker;
use crate::models::config::{
    BackendConfig, BackendId, CompositeRoute, CompositeStrategy, GlobalConfig, Route, RouteConfig,
    RouteTarget, TenantId, TenantOverlay,
};
use crate::models::error::GatewayError;
use crate::models::event::{EventType, GatewayEvent};
use crate::proxy::backend_proxy::BackendProxy;
use crate::routing::dispatcher::{DispatchOutcome, Dispatcher, RequestContext};
use ahash::HashMap as AHashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

/// Upper bound on concurrently in-flight shadow (dry-run) requests across
/// every tenant, bounding the worker budget dry-run fan-out consumes.
const DEFAULT_SHADOW_CONCURRENCY: usize = 16;

/// Router capability the host provides: register/unregister a
/// pattern with whatever HTTP framework is fronting the gateway. Supports
/// exact and trailing-wildcard patterns, same vocabulary as
/// [`crate::routing::path_matcher`].
pub trait RouteRegistrar: Send + Sync {
    fn register_pattern(&self, pattern: &str);
    fn unregister_pattern(&self, pattern: &str);
}

/// Pooled HTTP client capability the host provides. The default
/// core construction path builds its own `reqwest::Client`; a host that
/// wants different pooling/TLS settings supplies one of these instead.
pub trait HttpTransport: Send + Sync {
    fn client(&self) -> reqwest::Client;
}

/// Tenant configuration storage capability the host provides:
/// the global document, and an on-demand overlay per tenant.
pub trait TenantConfigStore: Send + Sync {
    fn global_config(&self) -> GlobalConfig;
    fn tenant_overlay(&self, tenant_id: &str) -> Option<TenantOverlay>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModuleState {
    Stopped,
    Running,
}

/// The gateway's single process-wide instance; no mutable state lives
/// outside it. Structural changes (adding a backend, a route, a tenant) go
/// through `&self` methods that take the module lock implicitly via the
/// inner `RwLock`s; per-request work only takes read locks.
pub struct GatewayModule {
    config_store: Arc<dyn TenantConfigStore>,
    router: RwLock<Option<Arc<dyn RouteRegistrar>>>,
    proxy: Arc<BackendProxy>,
    composite_executor: Arc<CompositeExecutor>,
    health: RwLock<Option<Arc<HealthChecker>>>,
    shadow: Arc<ShadowRunner>,
    sink: Option<SharedEventSink>,
    state: RwLock<ModuleState>,
    global: RwLock<GlobalConfig>,
    dispatchers: RwLock<AHashMap<TenantId, Arc<Dispatcher>>>,
    default_dispatcher: RwLock<Option<Arc<Dispatcher>>>,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl GatewayModule {
    /// Builds a module around the default `reqwest`-backed transport. Call
    /// [`GatewayModule::new_with_transport`] to supply a custom one.
    pub fn new(config_store: Arc<dyn TenantConfigStore>, sink: Option<SharedEventSink>) -> Self {
        let proxy = Arc::new(BackendProxy::new());
        Self::new_with_proxy(config_store, proxy, sink)
    }

    /// Builds a module whose backend proxy is driven by a host-supplied
    /// [`HttpTransport`] rather than the crate's default client settings.
    pub fn new_with_transport(
        config_store: Arc<dyn TenantConfigStore>,
        transport: Arc<dyn HttpTransport>,
        sink: Option<SharedEventSink>,
    ) -> Self {
        let proxy = Arc::new(BackendProxy::from_client(transport.client()));
        Self::new_with_proxy(config_store, proxy, sink)
    }

    fn new_with_proxy(
        config_store: Arc<dyn TenantConfigStore>,
        proxy: Arc<BackendProxy>,
        sink: Option<SharedEventSink>,
    ) -> Self {
        let composite_executor = Arc::new(CompositeExecutor::new(Arc::clone(&proxy)));
        let shadow = {
            let runner = ShadowRunner::new(Arc::clone(&proxy), DEFAULT_SHADOW_CONCURRENCY);
            Arc::new(match &sink {
                Some(s) => runner.with_sink(Arc::clone(s)),
                None => runner,
            })
        };

        Self {
            config_store,
            router: RwLock::new(None),
            proxy,
            composite_executor,
            health: RwLock::new(None),
            shadow,
            sink,
            state: RwLock::new(ModuleState::Stopped),
            global: RwLock::new(GlobalConfig::default()),
            dispatchers: RwLock::new(AHashMap::default()),
            default_dispatcher: RwLock::new(None),
            background: Mutex::new(Vec::new()),
        }
    }

    /// Supplies the host's router so runtime route mutations propagate to
    /// the hosting framework, not just the core's own matchers.
    pub async fn set_router(&self, router: Arc<dyn RouteRegistrar>) {
        *self.router.write().await = Some(router);
    }

    /// Registers a fan-out response transformer under `name`, available to
    /// every composite route across every tenant (the executor is shared).
    pub async fn register_custom_endpoint(&self, name: impl Into<String>, transformer: CustomTransformer) {
        self.composite_executor.register_transformer(name.into(), transformer).await;
    }

    /// Starts the module: loads the global config, validates it, builds the
    /// default (no-tenant) dispatcher, and spawns the health checker.
    /// Idempotent — calling `start` while already running is a no-op.
    pub async fn start(&self) -> Result<(), GatewayError> {
        if *self.state.read().await == ModuleState::Running {
            return Ok(());
        }

        let global = self.config_store.global_config();
        global.validate()?;

        let backend_urls: AHashMap<BackendId, String> = global
            .backend_services
            .iter()
            .map(|(id, b)| (id.clone(), b.url.clone()))
            .collect();
        let mut health_checker = HealthChecker::new(global.health_check.clone(), backend_urls);
        if let Some(s) = &self.sink {
            health_checker = health_checker.with_sink(Arc::clone(s));
        }
        let health = Arc::new(health_checker);
        health.spawn().await;

        *self.global.write().await = global;
        *self.health.write().await = Some(Arc::clone(&health));

        let default_dispatcher = self.build_dispatcher(None).await;
        *self.default_dispatcher.write().await = Some(default_dispatcher);

        self.emit(EventType::ModuleStarted, &[]);
        *self.state.write().await = ModuleState::Running;
        Ok(())
    }

    /// Stops the module: aborts background tasks, drops every cached
    /// dispatcher. Idempotent.
    pub async fn stop(&self) {
        if *self.state.read().await == ModuleState::Stopped {
            return;
        }

        let mut handles = self.background.lock().await;
        for handle in handles.drain(..) {
            handle.abort();
        }
        drop(handles);

        if let Some(health) = self.health.read().await.as_ref() {
            health.abort_all().await;
        }

        self.dispatchers.write().await.clear();
        *self.default_dispatcher.write().await = None;

        self.emit(EventType::ModuleStopped, &[]);
        *self.state.write().await = ModuleState::Stopped;
    }

    /// Defers the tenant's merge + dispatcher construction to this safe
    /// phase, away from the request path.
    pub async fn on_tenant_registered(&self, tenant_id: TenantId) {
        let overlay = self.config_store.tenant_overlay(&tenant_id);
        let dispatcher = self.build_dispatcher(overlay.as_ref()).await;
        self.dispatchers.write().await.insert(tenant_id, dispatcher);
    }

    pub async fn on_tenant_removed(&self, tenant_id: &str) {
        self.dispatchers.write().await.remove(tenant_id);
    }

    /// Resolves `tenant_id` (or the tenant-less default) to a dispatcher and
    /// runs the request through it. Lazily builds a tenant's dispatcher on
    /// first use if `on_tenant_registered` was never called for it.
    pub async fn dispatch(
        &self,
        tenant_id: Option<&str>,
        req: RequestContext,
    ) -> Result<DispatchOutcome, GatewayError> {
        if *self.state.read().await != ModuleState::Running {
            return Err(GatewayError::Internal("gateway module is not running".to_string()));
        }

        let dispatcher = match tenant_id {
            None => self
                .default_dispatcher
                .read()
                .await
                .clone()
                .ok_or_else(|| GatewayError::Internal("default dispatcher not initialized".to_string()))?,
            Some(id) => {
                if let Some(d) = self.dispatchers.read().await.get(id) {
                    Arc::clone(d)
                } else {
                    self.on_tenant_registered(id.to_string()).await;
                    Arc::clone(
                        self.dispatchers
                            .read()
                            .await
                            .get(id)
                            .expect("just inserted"),
                    )
                }
            }
        };

        let result = dispatcher.dispatch(req).await;
        if let Err(e) = &result {
            self.emit(EventType::RequestFailed, &[("error", e.kind().into())]);
        }
        result
    }

    /// Adds or overwrites a backend's URL, leaving its rewriting rules and
    /// endpoint overrides untouched if it already existed. Also registers the
    /// backend with the health checker so it starts getting probed
    /// immediately, without waiting on a restart.
    pub async fn add_backend(&self, id: BackendId, url: String) {
        self.mutate_global(|g| {
            g.backend_services.entry(id.clone()).or_insert_with(BackendConfig::default).url = url.clone();
        })
        .await;
        if let Some(health) = self.health.read().await.as_ref() {
            health.add_backend(id.clone(), url).await;
        }
        self.emit(EventType::BackendAdded, &[("backend", id.into())]);
    }

    pub async fn remove_backend(&self, id: &str) {
        self.mutate_global(|g| {
            g.backend_services.remove(id);
        })
        .await;
        if let Some(health) = self.health.read().await.as_ref() {
            health.remove_backend(id).await;
        }
        self.emit(EventType::BackendRemoved, &[("backend", id.to_string().into())]);
    }

    /// Adds a single-backend route at `pattern`, with default (ungated,
    /// non-dry-run) routing config.
    pub async fn add_backend_route(&self, id: BackendId, pattern: String) {
        self.mutate_global(|g| {
            g.routes.insert(
                pattern.clone(),
                Route {
                    pattern: pattern.clone(),
                    target: RouteTarget::Single(id.clone()),
                    config: RouteConfig::default(),
                },
            );
        })
        .await;
        if let Some(router) = self.router.read().await.as_ref() {
            router.register_pattern(&pattern);
        }
    }

    pub async fn add_composite_route(&self, pattern: String, backends: Vec<BackendId>, strategy: CompositeStrategy) {
        self.mutate_global(|g| {
            g.composite_routes.insert(
                pattern.clone(),
                CompositeRoute {
                    pattern: pattern.clone(),
                    backends: backends.clone(),
                    strategy: strategy.clone(),
                    timeout_ms: 10_000,
                },
            );
        })
        .await;
        if let Some(router) = self.router.read().await.as_ref() {
            router.register_pattern(&pattern);
        }
    }

    /// Applies `f` to the in-memory global config, then rebuilds every
    /// cached dispatcher against the new merge inputs.
    async fn mutate_global(&self, f: impl FnOnce(&mut GlobalConfig)) {
        {
            let mut global = self.global.write().await;
            f(&mut global);
        }
        self.rebuild_all_dispatchers().await;
    }

    async fn rebuild_all_dispatchers(&self) {
        let default_dispatcher = self.build_dispatcher(None).await;
        *self.default_dispatcher.write().await = Some(default_dispatcher);

        let tenant_ids: Vec<TenantId> = self.dispatchers.read().await.keys().cloned().collect();
        for tenant_id in tenant_ids {
            let overlay = self.config_store.tenant_overlay(&tenant_id);
            let dispatcher = self.build_dispatcher(overlay.as_ref()).await;
            self.dispatchers.write().await.insert(tenant_id, dispatcher);
        }
    }

    async fn build_dispatcher(&self, overlay: Option<&TenantOverlay>) -> Arc<Dispatcher> {
        let effective = {
            let global = self.global.read().await;
            crate::config::merge::merge(&*global, overlay)
        };

        let cache = Arc::new(ResponseCache::new(effective.cache.clone()));
        if effective.cache.enabled {
            let handle = spawn_sweeper(Arc::clone(&cache));
            self.background.lock().await.push(handle);
        }

        let health = self.health.read().await.clone();

        Arc::new(Dispatcher::new(
            effective,
            Arc::clone(&self.proxy),
            Arc::clone(&self.composite_executor),
            Some(cache),
            health,
            Some(Arc::clone(&self.shadow)),
            self.sink.clone(),
        ))
    }

    fn emit(&self, event_type: EventType, fields: &[(&str, serde_json::Value)]) {
        if let Some(sink) = &self.sink {
            let mut event = GatewayEvent::new(event_type);
            for (key, value) in fields {
                event = event.with(key, value.clone());
            }
            sink.emit(event);
        }
    }
}
