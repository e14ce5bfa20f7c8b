//! Concrete implementations of the core's external capability traits, plus
//! the `actix_web::ResponseError` boundary that turns a `GatewayError` into
//! an HTTP response.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use palisade_core::gateway::{HttpTransport, RouteRegistrar};
use palisade_core::models::error::GatewayError;
use serde::Serialize;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

/// `reqwest`-backed transport with pool settings a host may want to tune
/// independently of the core's own default client (e.g. a different
/// connect timeout for a slower upstream fleet).
pub struct ReqwestHttpTransport {
    client: reqwest::Client,
}

impl ReqwestHttpTransport {
    pub fn new(pool_idle_timeout: Duration, pool_max_idle_per_host: usize) -> Self {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(pool_idle_timeout)
            .pool_max_idle_per_host(pool_max_idle_per_host)
            .build()
            .expect("failed to build host HTTP transport");
        Self { client }
    }
}

impl HttpTransport for ReqwestHttpTransport {
    fn client(&self) -> reqwest::Client {
        self.client.clone()
    }
}

/// Tracks patterns registered at runtime for introspection (e.g. a
/// `/admin/routes` endpoint). `actix-web` binds its router once per worker
/// at `App` construction and has no API to add routes to a running server,
/// so dispatch itself always goes through a single catch-all service that
/// consults `GatewayModule`'s own path matcher — this registrar does not
/// (and cannot) wire actix's router dynamically.
#[derive(Default)]
pub struct IntrospectionRouteRegistrar {
    patterns: Mutex<Vec<String>>,
}

impl IntrospectionRouteRegistrar {
    pub fn registered_patterns(&self) -> Vec<String> {
        self.patterns.lock().unwrap().clone()
    }
}

impl RouteRegistrar for IntrospectionRouteRegistrar {
    fn register_pattern(&self, pattern: &str) {
        self.patterns.lock().unwrap().push(pattern.to_string());
    }

    fn unregister_pattern(&self, pattern: &str) {
        self.patterns.lock().unwrap().retain(|p| p != pattern);
    }
}

/// Wraps a [`GatewayError`] so it can cross the `actix_web::ResponseError`
/// boundary: status-code mapping for a framework response type is a hosting
/// concern, not something the framework-agnostic core does.
#[derive(Debug)]
pub struct ApiError(pub GatewayError);

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.0.kind(),
            message: self.0.to_string(),
        })
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        ApiError(err)
    }
}
