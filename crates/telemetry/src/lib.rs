//! Trace events and tracing proxies for citycode.
//!
//! Every LLM request and tool invocation made through an [`LlmProxy`] or
//! [`ToolProxy`] is recorded as a pair of [`TraceEvent`]s on an
//! [`EventSink`]. The proxies implement the same capability traits they wrap,
//! so the agent loop cannot tell whether it is being observed.
//!
//! Trace events are an audit log of capability calls and are separate from
//! the `tracing` diagnostics the rest of the workspace emits.

pub mod model;
pub mod proxy;
pub mod sink;
pub mod tracer;

pub use model::{EventType, TraceEvent};
pub use proxy::{LlmProxy, ToolProxy};
pub use sink::{EventSink, JsonlSink, MemorySink, NullSink};
pub use tracer::Tracer;
