//! Structured event taxonomy, emitted through
//! [`crate::events::EventSink`] in a CloudEvents-like envelope.

use serde::Serialize;
use std::collections::HashMap;

/// The fixed vocabulary of event types the core emits. Kept as an enum
/// (rather than free-form strings) so every call site is checked against a
/// known taxonomy at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ProxyCreated,
    ProxyStarted,
    ProxyStopped,
    ModuleStarted,
    ModuleStopped,
    RequestReceived,
    RequestProxied,
    RequestFailed,
    BackendAdded,
    BackendRemoved,
    BackendHealthy,
    BackendUnhealthy,
    CircuitBreakerOpen,
    CircuitBreakerHalfOpen,
    CircuitBreakerClosed,
    LoadBalanceDecision,
    LoadBalanceRoundRobin,
    DryRunComparison,
    DryRunDropped,
    Error,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ProxyCreated => "proxy_created",
            EventType::ProxyStarted => "proxy_started",
            EventType::ProxyStopped => "proxy_stopped",
            EventType::ModuleStarted => "module_started",
            EventType::ModuleStopped => "module_stopped",
            EventType::RequestReceived => "request_received",
            EventType::RequestProxied => "request_proxied",
            EventType::RequestFailed => "request_failed",
            EventType::BackendAdded => "backend_added",
            EventType::BackendRemoved => "backend_removed",
            EventType::BackendHealthy => "backend_healthy",
            EventType::BackendUnhealthy => "backend_unhealthy",
            EventType::CircuitBreakerOpen => "circuit_breaker_open",
            EventType::CircuitBreakerHalfOpen => "circuit_breaker_half_open",
            EventType::CircuitBreakerClosed => "circuit_breaker_closed",
            EventType::LoadBalanceDecision => "load_balance_decision",
            EventType::LoadBalanceRoundRobin => "load_balance_round_robin",
            EventType::DryRunComparison => "dry_run_comparison",
            EventType::DryRunDropped => "dry_run_dropped",
            EventType::Error => "error",
        }
    }
}

/// A CloudEvents-shaped envelope: fixed metadata plus a free-form attribute
/// bag for the event-specific payload (backend id, threshold, status codes,
/// …).
#[derive(Debug, Clone, Serialize)]
pub struct GatewayEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub source: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub time: chrono::DateTime<chrono::Utc>,
    pub data: HashMap<String, serde_json::Value>,
}

impl GatewayEvent {
    pub fn new(event_type: EventType) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type,
            source: "palisade-core".to_string(),
            time: chrono::Utc::now(),
            data: HashMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }
}
