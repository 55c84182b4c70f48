//! In-memory store: the default for single-process sessions and tests.

use async_trait::async_trait;
use citycode_core::error::MemoryError;
use citycode_core::memory::MemoryStore;
use citycode_core::message::Message;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Thread {
    messages: Vec<Message>,
    summary: String,
}

/// Threads held in a map keyed by thread id. Nothing is persisted.
pub struct InMemoryStore {
    threads: Arc<RwLock<HashMap<String, Thread>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            threads: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Ids of every thread that has been written to.
    pub async fn thread_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.threads.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn append(&self, thread_id: &str, message: Message) -> Result<(), MemoryError> {
        self.threads
            .write()
            .await
            .entry(thread_id.to_string())
            .or_default()
            .messages
            .push(message);
        Ok(())
    }

    async fn last_events(&self, thread_id: &str, n: usize) -> Result<Vec<Message>, MemoryError> {
        let threads = self.threads.read().await;
        Ok(threads
            .get(thread_id)
            .map(|t| {
                let start = t.messages.len().saturating_sub(n);
                t.messages[start..].to_vec()
            })
            .unwrap_or_default())
    }

    async fn summary(&self, thread_id: &str) -> Result<String, MemoryError> {
        let threads = self.threads.read().await;
        Ok(threads.get(thread_id).map(|t| t.summary.clone()).unwrap_or_default())
    }

    async fn update_summary(&self, thread_id: &str, summary: &str) -> Result<(), MemoryError> {
        self.threads
            .write()
            .await
            .entry(thread_id.to_string())
            .or_default()
            .summary = summary.to_string();
        Ok(())
    }

    async fn message_count(&self, thread_id: &str) -> Result<usize, MemoryError> {
        Ok(self.threads.read().await.get(thread_id).map_or(0, |t| t.messages.len()))
    }

    async fn truncate(&self, thread_id: &str, len: usize) -> Result<(), MemoryError> {
        if let Some(thread) = self.threads.write().await.get_mut(thread_id) {
            thread.messages.truncate(len);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use citycode_core::message::Role;

    async fn seed_pairs(store: &InMemoryStore, thread: &str, pairs: usize) {
        for i in 0..pairs {
            store.append(thread, Message::user(format!("question {i}"))).await.unwrap();
            store.append(thread, Message::assistant(format!("answer {i}"))).await.unwrap();
        }
    }

    #[tokio::test]
    async fn last_two_events_are_last_pair() {
        let store = InMemoryStore::new();
        seed_pairs(&store, "t1", 3).await;

        let recent = store.last_events("t1", 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].role, Role::User);
        assert_eq!(recent[0].content, "question 2");
        assert_eq!(recent[1].role, Role::Assistant);
        assert_eq!(recent[1].content, "answer 2");
    }

    #[tokio::test]
    async fn last_events_never_crosses_threads() {
        let store = InMemoryStore::new();
        seed_pairs(&store, "a", 2).await;
        store.append("b", Message::user("other thread")).await.unwrap();

        let a = store.last_events("a", 100).await.unwrap();
        assert_eq!(a.len(), 4);
        assert!(a.iter().all(|m| m.content != "other thread"));

        let b = store.last_events("b", 100).await.unwrap();
        assert_eq!(b.len(), 1);
        assert!(store.last_events("missing", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn last_events_preserves_insertion_order() {
        let store = InMemoryStore::new();
        for i in 0..5 {
            store.append("t", Message::user(i.to_string())).await.unwrap();
        }
        let contents: Vec<String> = store
            .last_events("t", 3)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["2", "3", "4"]);
        assert!(store.last_events("t", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn summary_defaults_to_empty_and_updates() {
        let store = InMemoryStore::new();
        assert_eq!(store.summary("t").await.unwrap(), "");
        store.update_summary("t", "talked about ports").await.unwrap();
        assert_eq!(store.summary("t").await.unwrap(), "talked about ports");
        assert_eq!(store.message_count("t").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn truncate_drops_tail() {
        let store = InMemoryStore::new();
        seed_pairs(&store, "t", 2).await;
        store.truncate("t", 2).await.unwrap();
        assert_eq!(store.message_count("t").await.unwrap(), 2);
        let recent = store.last_events("t", 10).await.unwrap();
        assert_eq!(recent[1].content, "answer 0");
        assert_eq!(store.thread_ids().await, vec!["t".to_string()]);
    }
}
