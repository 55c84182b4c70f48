//! A trace id bound to a sink.

use crate::model::{EventType, TraceEvent};
use crate::sink::EventSink;
use std::sync::Arc;
use tracing::warn;

/// Emits events for one trace id. Cheap to clone; clones share the sink.
///
/// Sink failures are logged and swallowed: losing an audit line never
/// fails the task being traced.
#[derive(Clone)]
pub struct Tracer {
    trace_id: String,
    sink: Arc<dyn EventSink>,
}

impl Tracer {
    pub fn new(trace_id: impl Into<String>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            trace_id: trace_id.into(),
            sink,
        }
    }

    /// A tracer with a fresh UUID trace id.
    pub fn fresh(sink: Arc<dyn EventSink>) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), sink)
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Same sink, different trace id.
    pub fn with_trace_id(&self, trace_id: impl Into<String>) -> Self {
        Self::new(trace_id, Arc::clone(&self.sink))
    }

    pub fn emit(&self, event_type: EventType, data: serde_json::Value) {
        let event = TraceEvent::new(event_type, self.trace_id.clone(), data);
        if let Err(e) = self.sink.emit(&event) {
            warn!(trace_id = %self.trace_id, event = %event_type, error = %e, "Failed to write trace event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use citycode_core::error::TraceError;

    struct BrokenSink;

    impl EventSink for BrokenSink {
        fn emit(&self, _event: &TraceEvent) -> Result<(), TraceError> {
            Err(TraceError::Io(std::io::Error::other("disk full")))
        }
    }

    #[test]
    fn emit_stamps_trace_id() {
        let sink = Arc::new(MemorySink::new());
        let tracer = Tracer::new("abc", sink.clone());
        tracer.emit(EventType::TaskStarted, serde_json::json!({"user_request": "hi"}));

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].trace_id, "abc");
    }

    #[test]
    fn sink_failure_does_not_panic() {
        let tracer = Tracer::fresh(Arc::new(BrokenSink));
        tracer.emit(EventType::TaskFailed, serde_json::json!({}));
        assert!(!tracer.trace_id().is_empty());
    }

    #[test]
    fn rebinding_shares_sink() {
        let sink = Arc::new(MemorySink::new());
        let a = Tracer::new("a", sink.clone());
        let b = a.with_trace_id("b");
        a.emit(EventType::LlmRequest, serde_json::json!({}));
        b.emit(EventType::LlmRequest, serde_json::json!({}));
        let ids: Vec<String> = sink.events().into_iter().map(|e| e.trace_id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
