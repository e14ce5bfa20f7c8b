//! Backend health status, as maintained by [`crate::health::checker`] and
//! read by the dispatcher during backend-group selection.

use serde::Serialize;
use std::time::{Duration, SystemTime};

/// Point-in-time health of a single backend.
#[derive(Debug, Clone, Serialize)]
pub struct BackendHealth {
    pub healthy: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_check: chrono::DateTime<chrono::Utc>,
    pub last_error: Option<String>,
    pub response_time_ms: Option<u64>,
}

impl BackendHealth {
    pub fn healthy_now() -> Self {
        Self {
            healthy: true,
            last_check: chrono::Utc::now(),
            last_error: None,
            response_time_ms: None,
        }
    }

    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self {
            healthy: false,
            last_check: chrono::Utc::now(),
            last_error: Some(error.into()),
            response_time_ms: None,
        }
    }

    pub fn ok(response_time: Duration) -> Self {
        Self {
            healthy: true,
            last_check: chrono::Utc::now(),
            last_error: None,
            response_time_ms: Some(response_time.as_millis() as u64),
        }
    }
}

/// Tracks the last time a backend served *real* traffic, used by the health
/// checker to suppress a probe when the traffic itself is recent evidence of
/// liveness.
#[derive(Debug, Default)]
pub struct RecentTraffic {
    last_seen: std::sync::atomic::AtomicU64,
}

impl RecentTraffic {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_now(&self) {
        let millis = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        self.last_seen.store(millis, std::sync::atomic::Ordering::Relaxed);
    }

    /// True if a real request was seen within `threshold`.
    pub fn is_recent(&self, threshold: Duration) -> bool {
        let last = self.last_seen.load(std::sync::atomic::Ordering::Relaxed);
        if last == 0 {
            return false;
        }
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        now.saturating_sub(last) < threshold.as_millis() as u64
    }
}
