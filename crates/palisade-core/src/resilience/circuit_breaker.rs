//! Per-backend circuit breaker: closed/open/half-open, protecting
//! a backend from a pile-up of requests while it is failing.
//!
//! Unlike a breaker that needs several consecutive successes to recover,
//! half-open here admits exactly one probe request: success closes the
//! circuit, failure reopens it.

use crate::events::{EventSink, SharedEventSink};
use crate::models::config::CircuitBreakerConfig;
use crate::models::event::{EventType, GatewayEvent};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            _ => CircuitState::HalfOpen,
        }
    }
}

/// One breaker per backend id. Admission checks use atomics so the common
/// path never awaits a lock; only state transitions touch `last_failure`.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: AtomicU8,
    failure_count: AtomicU64,
    last_failure: RwLock<Option<Instant>>,
    half_open_admitted: AtomicU8,
    sink: Option<SharedEventSink>,
}

/// Outcome of [`CircuitBreaker::admit`]: whether a request may proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Rejected,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: AtomicU8::new(CircuitState::Closed as u8),
            failure_count: AtomicU64::new(0),
            last_failure: RwLock::new(None),
            half_open_admitted: AtomicU8::new(0),
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: SharedEventSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn get_state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Relaxed))
    }

    pub fn get_failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    /// Decides whether a request against this backend should proceed.
    /// Disabled breakers always allow; an `Open` breaker transitions itself
    /// to `HalfOpen` once `open_timeout_ms` has elapsed and admits exactly
    /// the first caller to observe that transition.
    pub async fn admit(&self) -> Admission {
        if !self.config.enabled {
            return Admission::Allowed;
        }

        match self.get_state() {
            CircuitState::Closed => Admission::Allowed,
            CircuitState::HalfOpen => {
                if self.half_open_admitted.fetch_add(1, Ordering::Relaxed) == 0 {
                    Admission::Allowed
                } else {
                    Admission::Rejected
                }
            }
            CircuitState::Open => {
                let elapsed = self
                    .last_failure
                    .read()
                    .await
                    .map(|t| t.elapsed() >= Duration::from_millis(self.config.open_timeout_ms))
                    .unwrap_or(false);

                if elapsed {
                    self.transition_to_half_open().await;
                    Admission::Allowed
                } else {
                    Admission::Rejected
                }
            }
        }
    }

    pub async fn record_success(&self) {
        match self.get_state() {
            CircuitState::Closed => {
                self.failure_count.store(0, Ordering::Relaxed);
            }
            CircuitState::HalfOpen => {
                self.transition_to_closed().await;
            }
            CircuitState::Open => {}
        }
    }

    pub async fn record_failure(&self) {
        match self.get_state() {
            CircuitState::Closed => {
                let failures = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
                if failures >= self.config.failure_threshold {
                    self.transition_to_open().await;
                }
            }
            CircuitState::HalfOpen => {
                self.transition_to_open().await;
            }
            CircuitState::Open => {
                *self.last_failure.write().await = Some(Instant::now());
            }
        }
    }

    async fn transition_to_open(&self) {
        self.state.store(CircuitState::Open as u8, Ordering::Relaxed);
        *self.last_failure.write().await = Some(Instant::now());
        log::warn!("circuit breaker {} opened", self.name);
        self.emit(EventType::CircuitBreakerOpen);
    }

    async fn transition_to_half_open(&self) {
        self.state.store(CircuitState::HalfOpen as u8, Ordering::Relaxed);
        self.half_open_admitted.store(0, Ordering::Relaxed);
        log::info!("circuit breaker {} half-open", self.name);
        self.emit(EventType::CircuitBreakerHalfOpen);
    }

    async fn transition_to_closed(&self) {
        self.state.store(CircuitState::Closed as u8, Ordering::Relaxed);
        self.failure_count.store(0, Ordering::Relaxed);
        self.half_open_admitted.store(0, Ordering::Relaxed);
        log::info!("circuit breaker {} closed", self.name);
        self.emit(EventType::CircuitBreakerClosed);
    }

    fn emit(&self, event_type: EventType) {
        if let Some(sink) = &self.sink {
            sink.emit(GatewayEvent::new(event_type).with("backend", self.name.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn config(threshold: u64, open_timeout_ms: u64) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            enabled: true,
            failure_threshold: threshold,
            open_timeout_ms,
        }
    }

    #[tokio::test]
    async fn opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new("backend-a", config(2, 30_000));
        assert_eq!(breaker.admit().await, Admission::Allowed);
        breaker.record_failure().await;
        assert_eq!(breaker.get_state(), CircuitState::Closed);
        breaker.record_failure().await;
        assert_eq!(breaker.get_state(), CircuitState::Open);
        assert_eq!(breaker.admit().await, Admission::Rejected);
    }

    #[tokio::test]
    async fn half_open_admits_exactly_one_probe() {
        let breaker = CircuitBreaker::new("backend-b", config(1, 1));
        breaker.record_failure().await;
        assert_eq!(breaker.get_state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(breaker.admit().await, Admission::Allowed);
        assert_eq!(breaker.get_state(), CircuitState::HalfOpen);
        assert_eq!(breaker.admit().await, Admission::Rejected);
    }

    #[tokio::test]
    async fn success_in_half_open_closes_circuit() {
        let breaker = CircuitBreaker::new("backend-c", config(1, 1));
        breaker.record_failure().await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        breaker.admit().await;
        breaker.record_success().await;
        assert_eq!(breaker.get_state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn failure_in_half_open_reopens_circuit() {
        let breaker = CircuitBreaker::new("backend-d", config(1, 1));
        breaker.record_failure().await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        breaker.admit().await;
        breaker.record_failure().await;
        assert_eq!(breaker.get_state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn disabled_breaker_always_admits() {
        let breaker = CircuitBreaker::new("backend-e", config(1, 30_000));
        let disabled = CircuitBreaker::new(
            "backend-e",
            CircuitBreakerConfig { enabled: false, ..config(1, 30_000) },
        );
        breaker.record_failure().await;
        assert_eq!(disabled.admit().await, Admission::Allowed);
    }

    #[tokio::test]
    async fn transitions_emit_through_a_sink_attached_before_use() {
        use std::sync::Mutex;

        #[derive(Default)]
        struct CollectingSink {
            events: Mutex<Vec<String>>,
        }
        impl EventSink for CollectingSink {
            fn emit(&self, event: GatewayEvent) {
                self.events.lock().unwrap().push(event.event_type.as_str().to_string());
            }
        }

        let sink = Arc::new(CollectingSink::default());
        let breaker = Arc::new(CircuitBreaker::new("backend-f", config(1, 1)).with_sink(sink.clone()));

        breaker.record_failure().await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        breaker.admit().await;
        breaker.record_success().await;

        let events = sink.events.lock().unwrap();
        assert_eq!(
            events.as_slice(),
            &["circuit_breaker_open", "circuit_breaker_half_open", "circuit_breaker_closed"]
        );
    }
}
