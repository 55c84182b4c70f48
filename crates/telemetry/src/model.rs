//! Trace event data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Event types ───────────────────────────────────────────────────────────

/// Every kind of event written to a trace log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    TaskStarted,
    ContextBuildCompleted,
    LlmRequest,
    LlmResponse,
    ToolRequest,
    ToolResponse,
    TaskCompleted,
    TaskFailed,
    SessionStarted,
    BrainSessionStarted,
    BrainSessionCompleted,
    BrainSessionFailed,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskStarted => "task_started",
            Self::ContextBuildCompleted => "context_build_completed",
            Self::LlmRequest => "llm_request",
            Self::LlmResponse => "llm_response",
            Self::ToolRequest => "tool_request",
            Self::ToolResponse => "tool_response",
            Self::TaskCompleted => "task_completed",
            Self::TaskFailed => "task_failed",
            Self::SessionStarted => "session_started",
            Self::BrainSessionStarted => "brain_session_started",
            Self::BrainSessionCompleted => "brain_session_completed",
            Self::BrainSessionFailed => "brain_session_failed",
        }
    }

    /// Whether this event closes a task or session.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::TaskCompleted | Self::TaskFailed | Self::BrainSessionCompleted | Self::BrainSessionFailed
        )
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Event ─────────────────────────────────────────────────────────────────

/// One line of a trace log. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    pub event_type: EventType,
    pub trace_id: String,
    /// ISO-8601 on the wire.
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl TraceEvent {
    pub fn new(event_type: EventType, trace_id: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event_type,
            trace_id: trace_id.into(),
            timestamp: Utc::now(),
            data,
        }
    }
}
