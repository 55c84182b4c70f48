//! File-based store: one JSON-lines file per thread.
//!
//! Layout under the store directory:
//! - `<thread>.jsonl`: one JSON-encoded `Message` per line, oldest first
//! - `<thread>.summary`: the rolling summary as plain text
//!
//! Threads are loaded into memory on first access. Appends add a single line
//! to the end of the file; truncation rewrites it.

use async_trait::async_trait;
use citycode_core::error::MemoryError;
use citycode_core::memory::MemoryStore;
use citycode_core::message::Message;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// A directory of per-thread JSONL files.
pub struct FileStore {
    dir: PathBuf,
    cache: Arc<RwLock<HashMap<String, Vec<Message>>>>,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `dir`.
    pub fn open(dir: PathBuf) -> Result<Self, MemoryError> {
        std::fs::create_dir_all(&dir).map_err(|e| {
            MemoryError::Storage(format!("Failed to create memory directory: {e}"))
        })?;
        debug!(path = %dir.display(), "File memory store opened");
        Ok(Self {
            dir,
            cache: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name stem for a thread. ASCII letters, digits and `-` are kept;
    /// every other byte becomes `_xx` (lowercase hex), so distinct ids never
    /// share a file.
    fn file_stem(thread_id: &str) -> String {
        let mut stem = String::with_capacity(thread_id.len());
        for byte in thread_id.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' {
                stem.push(char::from(byte));
            } else {
                stem.push_str(&format!("_{byte:02x}"));
            }
        }
        stem
    }

    fn messages_path(&self, thread_id: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", Self::file_stem(thread_id)))
    }

    fn summary_path(&self, thread_id: &str) -> PathBuf {
        self.dir.join(format!("{}.summary", Self::file_stem(thread_id)))
    }

    fn load_from_disk(path: &Path) -> Vec<Message> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return Vec::new(),
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<Message>(line) {
                Ok(msg) => Some(msg),
                Err(e) => {
                    warn!(error = %e, path = %path.display(), "Skipping corrupted message line");
                    None
                }
            })
            .collect()
    }

    /// Make sure `thread_id` is in the cache, reading its file if necessary.
    async fn ensure_loaded(&self, thread_id: &str) {
        if self.cache.read().await.contains_key(thread_id) {
            return;
        }
        let loaded = Self::load_from_disk(&self.messages_path(thread_id));
        self.cache
            .write()
            .await
            .entry(thread_id.to_string())
            .or_insert(loaded);
    }

    fn encode(message: &Message) -> Result<String, MemoryError> {
        serde_json::to_string(message)
            .map_err(|e| MemoryError::Storage(format!("Failed to serialize message: {e}")))
    }
}

#[async_trait]
impl MemoryStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn append(&self, thread_id: &str, message: Message) -> Result<(), MemoryError> {
        self.ensure_loaded(thread_id).await;
        let line = Self::encode(&message)?;

        let mut cache = self.cache.write().await;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.messages_path(thread_id))
            .map_err(|e| MemoryError::Storage(format!("Failed to open thread file: {e}")))?;
        writeln!(file, "{line}")
            .map_err(|e| MemoryError::Storage(format!("Failed to write thread file: {e}")))?;

        cache.entry(thread_id.to_string()).or_default().push(message);
        Ok(())
    }

    async fn last_events(&self, thread_id: &str, n: usize) -> Result<Vec<Message>, MemoryError> {
        self.ensure_loaded(thread_id).await;
        let cache = self.cache.read().await;
        Ok(cache
            .get(thread_id)
            .map(|msgs| msgs[msgs.len().saturating_sub(n)..].to_vec())
            .unwrap_or_default())
    }

    async fn summary(&self, thread_id: &str) -> Result<String, MemoryError> {
        match std::fs::read_to_string(self.summary_path(thread_id)) {
            Ok(s) => Ok(s),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(MemoryError::Storage(format!("Failed to read summary: {e}"))),
        }
    }

    async fn update_summary(&self, thread_id: &str, summary: &str) -> Result<(), MemoryError> {
        std::fs::write(self.summary_path(thread_id), summary)
            .map_err(|e| MemoryError::Storage(format!("Failed to write summary: {e}")))
    }

    async fn message_count(&self, thread_id: &str) -> Result<usize, MemoryError> {
        self.ensure_loaded(thread_id).await;
        Ok(self.cache.read().await.get(thread_id).map_or(0, Vec::len))
    }

    async fn truncate(&self, thread_id: &str, len: usize) -> Result<(), MemoryError> {
        self.ensure_loaded(thread_id).await;
        let mut cache = self.cache.write().await;
        let Some(messages) = cache.get_mut(thread_id) else {
            return Ok(());
        };
        if messages.len() <= len {
            return Ok(());
        }
        messages.truncate(len);

        let mut content = String::new();
        for msg in messages.iter() {
            content.push_str(&Self::encode(msg)?);
            content.push('\n');
        }
        std::fs::write(self.messages_path(thread_id), content)
            .map_err(|e| MemoryError::Storage(format!("Failed to rewrite thread file: {e}")))
    }
}
