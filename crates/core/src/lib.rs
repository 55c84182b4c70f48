//! # citycode core
//!
//! Domain types, capability traits and error definitions for the citycode
//! task agent. Every other crate depends inward on this one.
//!
//! The three capabilities the reason/act loop is written against live here:
//! - [`Provider`]: an LLM backend (chat completion plus structured output)
//! - [`ToolExecutor`]: something that can run named tools
//! - [`MemoryStore`]: per-thread conversation storage with a rolling summary
//!
//! Implementations live in their own crates, and the tracing proxies in
//! `citycode-telemetry` wrap the first two without changing their behavior.

pub mod error;
pub mod memory;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, MemoryError, PromptError, ProviderError, Result, ToolError, TraceError};
pub use memory::MemoryStore;
pub use message::{Message, MessageToolCall, Role, ScratchEntry};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StructuredSchema, ToolDefinition, Usage};
pub use tool::{Tool, ToolExecutor, ToolRegistry, ToolResult, render_tool_outcome};
