//! Conversation memory stores for citycode.
//!
//! All stores implement [`citycode_core::MemoryStore`]. Pick one with
//! [`open_store`] from the configured backend name.

pub mod in_memory;
pub mod file_backend;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryStore;
pub use file_backend::FileStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

use citycode_core::MemoryStore;
use citycode_core::error::MemoryError;
use std::path::PathBuf;
use std::sync::Arc;

/// Open the store named by `backend` ("memory", "file", "sqlite").
///
/// `path` is the directory for "file" and the database file for "sqlite";
/// both fall back to locations under `~/.citycode/` when absent.
pub async fn open_store(backend: &str, path: Option<PathBuf>) -> Result<Arc<dyn MemoryStore>, MemoryError> {
    match backend {
        "memory" => Ok(Arc::new(InMemoryStore::new())),
        "file" => {
            let dir = path.unwrap_or_else(|| citycode_home().join("threads"));
            Ok(Arc::new(FileStore::open(dir)?))
        }
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            let file = path.unwrap_or_else(|| citycode_home().join("memory.db"));
            if let Some(parent) = file.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| MemoryError::Storage(format!("Failed to create database directory: {e}")))?;
            }
            let url = format!("sqlite://{}", file.display());
            Ok(Arc::new(SqliteStore::new(&url).await?))
        }
        other => Err(MemoryError::Storage(format!("Unknown memory backend: {other}"))),
    }
}

fn citycode_home() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".citycode")
}
