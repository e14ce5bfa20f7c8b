//! Event emission: a push-based sink trait instead of a shared bus,
//! so callers choose how (or whether) events leave the process.

use crate::models::event::GatewayEvent;
use std::sync::Arc;

/// Receives [`GatewayEvent`]s as the gateway emits them.
///
/// Implementations must not block the caller for long; a sink that forwards
/// to a slow external system should buffer internally or drop under
/// pressure rather than stall request handling.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: GatewayEvent);
}

/// Logs every event at `info` level via the `log` facade and otherwise
/// discards it. The default sink when a host doesn't wire up anything more
/// specific.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingEventSink;

impl EventSink for LoggingEventSink {
    fn emit(&self, event: GatewayEvent) {
        log::info!(
            "event type={} id={} data={:?}",
            event.event_type.as_str(),
            event.id,
            event.data
        );
    }
}

/// Drops every event. Useful in tests that don't care about observability
/// output.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: GatewayEvent) {}
}

pub type SharedEventSink = Arc<dyn EventSink>;
