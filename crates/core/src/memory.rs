//! Memory trait: per-thread conversation storage.
//!
//! A thread is an append-only sequence of [`Message`]s plus one mutable
//! summary string. `thread_id` is the only partition key: nothing read from
//! one thread ever includes messages from another.

use async_trait::async_trait;
use crate::error::MemoryError;
use crate::message::Message;

/// The conversation memory capability.
///
/// Implementations: in-memory map, JSONL file per thread, SQLite.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Backend name for diagnostics (e.g., "memory", "file", "sqlite").
    fn name(&self) -> &str;

    /// Append a message to the end of a thread, creating the thread if needed.
    async fn append(&self, thread_id: &str, message: Message) -> std::result::Result<(), MemoryError>;

    /// The at most `n` most recent messages of `thread_id`, oldest first.
    async fn last_events(&self, thread_id: &str, n: usize) -> std::result::Result<Vec<Message>, MemoryError>;

    /// The stored rolling summary, empty if none was ever written.
    async fn summary(&self, thread_id: &str) -> std::result::Result<String, MemoryError>;

    /// Replace the rolling summary.
    async fn update_summary(&self, thread_id: &str, summary: &str) -> std::result::Result<(), MemoryError>;

    /// Number of messages stored in the thread.
    async fn message_count(&self, thread_id: &str) -> std::result::Result<usize, MemoryError>;

    /// Drop every message after the first `len`. Used to forget a side
    /// exchange that should not stay in the thread's history.
    async fn truncate(&self, thread_id: &str, len: usize) -> std::result::Result<(), MemoryError>;
}
