//! Backend proxying: a pooled HTTP client that forwards a
//! rewritten request to a single backend and returns its response.

use crate::models::config::BackendConfig;
use crate::models::error::GatewayError;
use crate::proxy::rewrite::{rewrite_headers, rewrite_path};
use crate::utils::headers::strip_hop_by_hop;
use reqwest::{Client, Method};
use std::time::Duration;

/// An upstream response translated back into the framework-agnostic shape
/// this crate uses everywhere else.
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// Wraps a [`reqwest::Client`] configured for connection reuse across many
/// backends.
#[derive(Clone)]
pub struct BackendProxy {
    client: Client,
}

impl Default for BackendProxy {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendProxy {
    pub fn new() -> Self {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(32)
            .build()
            .expect("failed to build backend HTTP client");
        Self { client }
    }

    /// Builds a proxy around a caller-supplied client, e.g. one produced by
    /// a [`crate::gateway::HttpTransport`] implementation.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    /// Rewrites `path`/`headers` per `backend`'s rules and forwards the
    /// request, bounding the wait with `timeout`.
    pub async fn forward(
        &self,
        backend_id: &str,
        backend: &BackendConfig,
        method: Method,
        path: &str,
        mut headers: Vec<(String, String)>,
        original_host: &str,
        body: Vec<u8>,
        timeout: Duration,
    ) -> Result<ProxyResponse, GatewayError> {
        let endpoint = backend.matching_endpoint(path);
        let path_rule = endpoint
            .and_then(|ep| ep.path_rewriting.as_ref())
            .unwrap_or(&backend.path_rewriting);
        let header_rule = endpoint
            .and_then(|ep| ep.header_rewriting.as_ref())
            .unwrap_or(&backend.header_rewriting);

        let rewritten_path = rewrite_path(path_rule, path);
        strip_hop_by_hop(&mut headers);

        let backend_host = reqwest::Url::parse(&backend.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default();
        rewrite_headers(header_rule, &mut headers, original_host, &backend_host);

        let target_url = format!("{}{}", backend.url.trim_end_matches('/'), rewritten_path);

        let mut reqwest_headers = reqwest::header::HeaderMap::with_capacity(headers.len());
        for (name, value) in &headers {
            if let (Ok(name), Ok(value)) = (
                reqwest::header::HeaderName::from_bytes(name.as_bytes()),
                reqwest::header::HeaderValue::from_str(value),
            ) {
                reqwest_headers.insert(name, value);
            }
        }

        let request = self
            .client
            .request(method, &target_url)
            .headers(reqwest_headers)
            .body(body);

        let response = match tokio::time::timeout(timeout, request.send()).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => {
                return Err(GatewayError::UpstreamUnreachable {
                    backend: backend_id.to_string(),
                    message: e.to_string(),
                })
            }
            Err(_) => {
                return Err(GatewayError::UpstreamTimeout {
                    backend: backend_id.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        };

        let status = response.status().as_u16();
        let mut response_headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        strip_hop_by_hop(&mut response_headers);

        let body = response
            .bytes()
            .await
            .map_err(|e| GatewayError::UpstreamUnreachable {
                backend: backend_id.to_string(),
                message: e.to_string(),
            })?
            .to_vec();

        Ok(ProxyResponse {
            status,
            headers: response_headers,
            body,
        })
    }
}
