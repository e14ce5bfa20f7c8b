//! Structured event emission.

mod emitter;

pub use emitter::{EventSink, LoggingEventSink, NullEventSink, SharedEventSink};
