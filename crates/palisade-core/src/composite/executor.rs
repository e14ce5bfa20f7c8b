//! Composite (fan-out) request execution: call several backends
//! for one inbound path and combine their responses with a pluggable
//! strategy.

use crate::models::config::{BackendConfig, BackendId, CompositeStrategy};
use crate::models::error::GatewayError;
use crate::proxy::backend_proxy::{BackendProxy, ProxyResponse};
use ahash::HashMap as AHashMap;
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// A runtime-registered strategy for [`CompositeStrategy::Custom`]. Receives
/// every backend's response (in request order, failures omitted) and
/// produces the single response returned to the client.
pub type CustomTransformer = Arc<dyn Fn(&[(BackendId, ProxyResponse)]) -> ProxyResponse + Send + Sync>;

/// Fans a single inbound request out to every backend in a composite route
/// and reduces the results per the route's strategy.
pub struct CompositeExecutor {
    proxy: Arc<BackendProxy>,
    custom_transformers: RwLock<AHashMap<String, CustomTransformer>>,
}

impl CompositeExecutor {
    pub fn new(proxy: Arc<BackendProxy>) -> Self {
        Self {
            proxy,
            custom_transformers: RwLock::new(AHashMap::default()),
        }
    }

    pub async fn register_transformer(&self, name: String, transformer: CustomTransformer) {
        self.custom_transformers.write().await.insert(name, transformer);
    }

    /// Executes `backends` concurrently, each bounded by `per_backend_timeout`,
    /// the whole fan-out additionally bounded by `overall_timeout`, then
    /// reduces with `strategy`.
    pub async fn execute(
        &self,
        backends: &[(BackendId, BackendConfig)],
        method: Method,
        path: &str,
        headers: Vec<(String, String)>,
        original_host: &str,
        body: Vec<u8>,
        per_backend_timeout: Duration,
        overall_timeout: Duration,
        strategy: &CompositeStrategy,
    ) -> Result<ProxyResponse, GatewayError> {
        let calls = backends.iter().map(|(id, backend)| {
            let proxy = Arc::clone(&self.proxy);
            let id = id.clone();
            let backend = backend.clone();
            let method = method.clone();
            let path = path.to_string();
            let headers = headers.clone();
            let original_host = original_host.to_string();
            let body = body.clone();
            async move {
                let result = proxy
                    .forward(&id, &backend, method, &path, headers, &original_host, body, per_backend_timeout)
                    .await;
                (id, result)
            }
        });

        let results = tokio::time::timeout(overall_timeout, futures_util::future::join_all(calls))
            .await
            .map_err(|_| GatewayError::CompositeFailed {
                message: "composite fan-out exceeded its overall timeout".to_string(),
            })?;

        let successes: Vec<(BackendId, ProxyResponse)> = results
            .into_iter()
            .filter_map(|(id, result)| result.ok().map(|r| (id, r)))
            .collect();

        if successes.is_empty() {
            return Err(GatewayError::CompositeFailed {
                message: "every backend in the composite route failed".to_string(),
            });
        }

        match strategy {
            CompositeStrategy::First => Ok(successes.into_iter().next().unwrap().1),
            CompositeStrategy::Combine => Ok(combine(&successes)),
            CompositeStrategy::Merge => Ok(merge(&successes)),
            CompositeStrategy::Custom(name) => {
                let transformers = self.custom_transformers.read().await;
                match transformers.get(name) {
                    Some(transformer) => Ok(transformer(&successes)),
                    None => Err(GatewayError::CompositeFailed {
                        message: format!("no custom transformer registered for '{name}'"),
                    }),
                }
            }
        }
    }
}

/// Wraps every backend's body (parsed as JSON when possible, embedded as a
/// base64 string otherwise) into one JSON object keyed by backend id.
fn combine(successes: &[(BackendId, ProxyResponse)]) -> ProxyResponse {
    use base64::Engine;
    let mut out = serde_json::Map::new();
    for (id, response) in successes {
        let value = serde_json::from_slice::<Value>(&response.body)
            .unwrap_or_else(|_| Value::String(base64::engine::general_purpose::STANDARD.encode(&response.body)));
        out.insert(id.clone(), value);
    }
    let body = serde_json::to_vec(&Value::Object(out)).unwrap_or_default();
    ProxyResponse {
        status: successes[0].1.status,
        headers: vec![("Content-Type".to_string(), "application/json".to_string())],
        body,
    }
}

/// Deep-merges every backend's JSON object body into one object, later
/// backends (in the route's declared order) overriding earlier ones on key
/// collision, recursing into nested objects rather than replacing them
/// wholesale. If any backend's body isn't a JSON object, the whole composite
/// falls back to the first successful response rather than merging the rest.
fn merge(successes: &[(BackendId, ProxyResponse)]) -> ProxyResponse {
    let mut merged = serde_json::Map::new();
    for (_, response) in successes {
        match serde_json::from_slice::<Value>(&response.body) {
            Ok(Value::Object(map)) => deep_merge(&mut merged, map),
            _ => return successes[0].1.clone(),
        }
    }
    let body = serde_json::to_vec(&Value::Object(merged)).unwrap_or_default();
    ProxyResponse {
        status: successes[0].1.status,
        headers: vec![("Content-Type".to_string(), "application/json".to_string())],
        body,
    }
}

/// Merges `overlay` into `base` in place: nested objects merge key-by-key,
/// any other value (including arrays) is replaced wholesale by `overlay`'s.
fn deep_merge(base: &mut serde_json::Map<String, Value>, overlay: serde_json::Map<String, Value>) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(Value::Object(base_obj)), Value::Object(overlay_obj)) => {
                deep_merge(base_obj, overlay_obj);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
