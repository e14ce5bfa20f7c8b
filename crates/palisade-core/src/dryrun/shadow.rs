//! Dry-run / shadow traffic: fires a copy of a request at an
//! alternative backend without affecting the response the client sees, then
//! compares the two and emits the result. Runs fire-and-forget under a
//! bounded worker budget so shadow traffic can never back up real traffic.

use crate::events::{EventSink, SharedEventSink};
use crate::models::config::BackendConfig;
use crate::models::event::{EventType, GatewayEvent};
use crate::proxy::backend_proxy::{BackendProxy, ProxyResponse};
use reqwest::Method;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Diff between a primary response and its shadow counterpart. Bodies are
/// compared by size only, not content, to keep the comparison cheap and
/// avoid holding large buffers for things like media payloads.
#[derive(Debug, Clone)]
pub struct ShadowComparison {
    pub status_match: bool,
    pub primary_status: u16,
    pub shadow_status: u16,
    pub header_diffs: Vec<String>,
    pub body_size_delta: i64,
}

fn compare(primary: &ProxyResponse, shadow: &ProxyResponse, header_whitelist: &[String]) -> ShadowComparison {
    let mut header_diffs = Vec::new();
    for name in header_whitelist {
        let primary_value = primary.headers.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str());
        let shadow_value = shadow.headers.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str());
        if primary_value != shadow_value {
            header_diffs.push(name.clone());
        }
    }

    ShadowComparison {
        status_match: primary.status == shadow.status,
        primary_status: primary.status,
        shadow_status: shadow.status,
        header_diffs,
        body_size_delta: shadow.body.len() as i64 - primary.body.len() as i64,
    }
}

/// Launches shadow requests under a fixed concurrency budget, dropping
/// (and counting) any request that arrives while the budget is exhausted
/// rather than queuing it.
pub struct ShadowRunner {
    proxy: Arc<BackendProxy>,
    permits: Arc<Semaphore>,
    sink: Option<SharedEventSink>,
}

impl ShadowRunner {
    pub fn new(proxy: Arc<BackendProxy>, max_concurrent: usize) -> Self {
        Self {
            proxy,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: SharedEventSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Spawns a shadow call against `backend` and compares it against
    /// `primary` once it completes. Returns immediately; never affects the
    /// caller's response. If the concurrency budget is exhausted the shadow
    /// is dropped and a `dry_run_dropped` event is emitted synchronously.
    pub fn fire(
        self: &Arc<Self>,
        primary: ProxyResponse,
        backend_id: String,
        backend: BackendConfig,
        method: Method,
        path: String,
        headers: Vec<(String, String)>,
        original_host: String,
        body: Vec<u8>,
        timeout: Duration,
        header_whitelist: Vec<String>,
    ) {
        let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
            self.emit(EventType::DryRunDropped, &backend_id);
            return;
        };

        let runner = Arc::clone(self);
        tokio::spawn(async move {
            let _permit = permit;
            let result = runner
                .proxy
                .forward(&backend_id, &backend, method, &path, headers, &original_host, body, timeout)
                .await;

            match result {
                Ok(shadow) => {
                    let comparison = compare(&primary, &shadow, &header_whitelist);
                    runner.emit_comparison(&backend_id, &comparison);
                }
                Err(e) => {
                    log::warn!("shadow request to '{backend_id}' failed: {e}");
                }
            }
        });
    }

    fn emit(&self, event_type: EventType, backend_id: &str) {
        if let Some(sink) = &self.sink {
            sink.emit(GatewayEvent::new(event_type).with("backend", backend_id.to_string()));
        }
    }

    fn emit_comparison(&self, backend_id: &str, comparison: &ShadowComparison) {
        if let Some(sink) = &self.sink {
            sink.emit(
                GatewayEvent::new(EventType::DryRunComparison)
                    .with("backend", backend_id.to_string())
                    .with("status_match", comparison.status_match)
                    .with("primary_status", comparison.primary_status)
                    .with("shadow_status", comparison.shadow_status)
                    .with("body_size_delta", comparison.body_size_delta),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, headers: Vec<(&str, &str)>, body_len: usize) -> ProxyResponse {
        ProxyResponse {
            status,
            headers: headers.into_iter().map(|(n, v)| (n.to_string(), v.to_string())).collect(),
            body: vec![0u8; body_len],
        }
    }

    #[test]
    fn identical_responses_compare_as_matching() {
        let primary = response(200, vec![("X-Trace", "abc")], 10);
        let shadow = response(200, vec![("X-Trace", "abc")], 10);
        let diff = compare(&primary, &shadow, &["X-Trace".to_string()]);
        assert!(diff.status_match);
        assert!(diff.header_diffs.is_empty());
        assert_eq!(diff.body_size_delta, 0);
    }

    #[test]
    fn status_and_header_mismatch_is_reported() {
        let primary = response(200, vec![("X-Variant", "a")], 10);
        let shadow = response(500, vec![("X-Variant", "b")], 25);
        let diff = compare(&primary, &shadow, &["X-Variant".to_string()]);
        assert!(!diff.status_match);
        assert_eq!(diff.header_diffs, vec!["X-Variant".to_string()]);
        assert_eq!(diff.body_size_delta, 15);
    }

    #[tokio::test]
    async fn exhausted_budget_drops_the_shadow_request() {
        use std::sync::Mutex;

        #[derive(Default)]
        struct CollectingSink {
            events: Mutex<Vec<String>>,
        }
        impl EventSink for CollectingSink {
            fn emit(&self, event: crate::models::event::GatewayEvent) {
                self.events.lock().unwrap().push(event.event_type.as_str().to_string());
            }
        }

        let sink = Arc::new(CollectingSink::default());
        let runner = Arc::new(ShadowRunner::new(Arc::new(BackendProxy::new()), 0).with_sink(sink.clone()));

        runner.fire(
            response(200, vec![], 0),
            "b".to_string(),
            BackendConfig {
                url: "http://localhost:1".to_string(),
                path_rewriting: Default::default(),
                header_rewriting: Default::default(),
                endpoints: Default::default(),
                circuit_breaker_override: None,
            },
            Method::GET,
            "/x".to_string(),
            vec![],
            "client".to_string(),
            vec![],
            Duration::from_millis(50),
            vec![],
        );

        assert_eq!(*sink.events.lock().unwrap(), vec!["dry_run_dropped"]);
    }
}
