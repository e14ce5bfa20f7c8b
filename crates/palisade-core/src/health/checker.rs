//! Background health checking: periodic DNS + HTTP probes per
//! backend, suppressed while the backend has seen real traffic recently so
//! probing doesn't compete with production load.
//!
//! Backends can be added and removed at runtime ([`HealthChecker::add_backend`],
//! [`HealthChecker::remove_backend`]): each owns its probe loop, tracked
//! internally so a removal can abort exactly that task rather than leaving it
//! to run against a backend the gateway no longer knows about.

use crate::events::SharedEventSink;
use crate::models::config::{BackendId, HealthCheckConfig};
use crate::models::event::{EventType, GatewayEvent};
use crate::models::health::{BackendHealth, RecentTraffic};
use ahash::HashMap as AHashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

/// Shared health state plus the machinery to keep it current.
pub struct HealthChecker {
    config: HealthCheckConfig,
    backend_urls: RwLock<AHashMap<BackendId, String>>,
    status: Arc<RwLock<AHashMap<BackendId, BackendHealth>>>,
    recent_traffic: RwLock<AHashMap<BackendId, Arc<RecentTraffic>>>,
    tasks: Mutex<AHashMap<BackendId, tokio::task::JoinHandle<()>>>,
    client: reqwest::Client,
    sink: Option<SharedEventSink>,
}

impl HealthChecker {
    pub fn new(config: HealthCheckConfig, backend_urls: AHashMap<BackendId, String>) -> Self {
        let recent_traffic = backend_urls
            .keys()
            .map(|id| (id.clone(), Arc::new(RecentTraffic::new())))
            .collect();
        Self {
            config,
            backend_urls: RwLock::new(backend_urls),
            status: Arc::new(RwLock::new(AHashMap::default())),
            recent_traffic: RwLock::new(recent_traffic),
            tasks: Mutex::new(AHashMap::default()),
            client: reqwest::Client::new(),
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: SharedEventSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Records that `backend` just handled real traffic, suppressing the
    /// next scheduled probe if it falls inside `recent_request_threshold_ms`.
    pub async fn note_traffic(&self, backend: &str) {
        if let Some(traffic) = self.recent_traffic.read().await.get(backend) {
            traffic.mark_now();
        }
    }

    pub async fn status_of(&self, backend: &str) -> Option<BackendHealth> {
        self.status.read().await.get(backend).cloned()
    }

    pub async fn snapshot(&self) -> AHashMap<BackendId, BackendHealth> {
        self.status.read().await.clone()
    }

    /// Whether `backend` is currently registered for probing.
    pub async fn has_backend(&self, backend: &str) -> bool {
        self.backend_urls.read().await.contains_key(backend)
    }

    /// Spawns one probing loop per backend known at construction time that
    /// has health checking enabled. Idempotent-per-backend: calling this
    /// again only starts loops for backends that don't already have one.
    pub async fn spawn(self: &Arc<Self>) {
        if !self.config.enabled {
            return;
        }
        let backends: Vec<BackendId> = self.backend_urls.read().await.keys().cloned().collect();
        for backend in backends {
            self.ensure_task(backend).await;
        }
    }

    /// Adds (or updates the URL of) a backend and starts probing it. Config
    /// updates therefore take effect atomically: the new backend is probed
    /// from this call onward without waiting for a restart.
    pub async fn add_backend(self: &Arc<Self>, id: BackendId, url: String) {
        self.backend_urls.write().await.insert(id.clone(), url);
        self.recent_traffic
            .write()
            .await
            .entry(id.clone())
            .or_insert_with(|| Arc::new(RecentTraffic::new()));
        self.ensure_task(id).await;
    }

    /// Removes a backend: aborts its probe loop and drops its stale health
    /// entry so a later `status_of` can't return it.
    pub async fn remove_backend(&self, id: &str) {
        self.backend_urls.write().await.remove(id);
        self.recent_traffic.write().await.remove(id);
        self.status.write().await.remove(id);
        if let Some(handle) = self.tasks.lock().await.remove(id) {
            handle.abort();
        }
    }

    /// Starts `backend`'s probe loop if health checking is enabled and no
    /// loop is already running for it (replacing one that died).
    async fn ensure_task(self: &Arc<Self>, backend: BackendId) {
        if !self.config.enabled {
            return;
        }
        let mut tasks = self.tasks.lock().await;
        if let Some(existing) = tasks.get(&backend) {
            if !existing.is_finished() {
                return;
            }
        }
        let checker = Arc::clone(self);
        let handle = tokio::spawn({
            let backend = backend.clone();
            async move { checker.run_loop(backend).await }
        });
        tasks.insert(backend, handle);
    }

    /// Aborts every running probe loop. Called on module shutdown.
    pub async fn abort_all(&self) {
        for (_, handle) in self.tasks.lock().await.drain() {
            handle.abort();
        }
    }

    async fn run_loop(&self, backend: BackendId) {
        let effective = self.config.effective_for(&backend);
        let mut ticker = tokio::time::interval(Duration::from_millis(effective.interval_ms));
        loop {
            ticker.tick().await;

            if !self.backend_urls.read().await.contains_key(&backend) {
                return;
            }

            if let Some(traffic) = self.recent_traffic.read().await.get(&backend) {
                if traffic.is_recent(Duration::from_millis(effective.recent_request_threshold_ms)) {
                    continue;
                }
            }

            let result = self.probe(&backend, &effective).await;
            self.record(&backend, result).await;
        }
    }

    async fn probe(&self, backend: &BackendId, config: &HealthCheckConfig) -> BackendHealth {
        let Some(url) = self.backend_urls.read().await.get(backend).cloned() else {
            return BackendHealth::unhealthy("backend has no configured URL");
        };

        let Ok(parsed) = reqwest::Url::parse(&url) else {
            return BackendHealth::unhealthy("backend URL does not parse");
        };
        let Some(host) = parsed.host_str() else {
            return BackendHealth::unhealthy("backend URL has no host");
        };
        let port = parsed.port_or_known_default().unwrap_or(80);

        if tokio::net::lookup_host((host, port)).await.is_err() {
            return BackendHealth::unhealthy(format!("DNS resolution failed for {host}"));
        }

        let health_path = config.health_endpoint_for(backend);
        let probe_url = format!("{}{}", url.trim_end_matches('/'), health_path);
        let started = Instant::now();

        match tokio::time::timeout(
            Duration::from_millis(config.timeout_ms),
            self.client.get(&probe_url).send(),
        )
        .await
        {
            Ok(Ok(resp)) if config.expected_status_codes.contains(&resp.status().as_u16()) => {
                BackendHealth::ok(started.elapsed())
            }
            Ok(Ok(resp)) => BackendHealth::unhealthy(format!("unexpected status {}", resp.status())),
            Ok(Err(e)) => BackendHealth::unhealthy(e.to_string()),
            Err(_) => BackendHealth::unhealthy("health probe timed out"),
        }
    }

    async fn record(&self, backend: &BackendId, new: BackendHealth) {
        let was_healthy = self.status.read().await.get(backend).map(|h| h.healthy);
        let mut status = self.status.write().await;
        if was_healthy != Some(new.healthy) {
            let event_type = if new.healthy {
                EventType::BackendHealthy
            } else {
                EventType::BackendUnhealthy
            };
            self.emit(event_type, backend);
            log::info!("backend {backend} transitioned to healthy={}", new.healthy);
        }
        status.insert(backend.clone(), new);
    }

    fn emit(&self, event_type: EventType, backend: &str) {
        if let Some(sink) = &self.sink {
            sink.emit(GatewayEvent::new(event_type).with("backend", backend.to_string()));
        }
    }
}
