//! SQLite store.
//!
//! Two tables:
//! - `messages`: one row per message, `iid` gives insertion order per thread
//! - `summaries`: one row per thread holding its rolling summary
//!
//! Messages are stored as their JSON encoding so tool-call descriptors and
//! metadata come back intact.

use async_trait::async_trait;
use citycode_core::error::MemoryError;
use citycode_core::memory::MemoryStore;
use citycode_core::message::Message;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open a database from a URL such as `sqlite://path/to/file.db`.
    ///
    /// Tables are created automatically. `"sqlite::memory:"` gives an
    /// ephemeral database on a single connection (useful for tests).
    pub async fn new(url: &str) -> Result<Self, MemoryError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| MemoryError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        // Every connection to :memory: is a separate database.
        let max_connections = if url.contains(":memory:") { 1 } else { 4 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite memory store initialized at {url}");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), MemoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                iid        INTEGER PRIMARY KEY AUTOINCREMENT,
                thread_id  TEXT NOT NULL,
                role       TEXT NOT NULL,
                body       TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("messages table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS summaries (
                thread_id  TEXT PRIMARY KEY,
                summary    TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("summaries table: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_thread ON messages(thread_id, iid)")
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::MigrationFailed(format!("thread index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message, MemoryError> {
        let body: String = row
            .try_get("body")
            .map_err(|e| MemoryError::QueryFailed(format!("body column: {e}")))?;
        serde_json::from_str(&body)
            .map_err(|e| MemoryError::QueryFailed(format!("corrupt message row: {e}")))
    }
}

#[async_trait]
impl MemoryStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn append(&self, thread_id: &str, message: Message) -> Result<(), MemoryError> {
        let body = serde_json::to_string(&message)
            .map_err(|e| MemoryError::Storage(format!("Failed to serialize message: {e}")))?;
        sqlx::query("INSERT INTO messages (thread_id, role, body, created_at) VALUES (?, ?, ?, ?)")
            .bind(thread_id)
            .bind(message.role.as_str())
            .bind(body)
            .bind(message.timestamp.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("insert message: {e}")))?;
        Ok(())
    }

    async fn last_events(&self, thread_id: &str, n: usize) -> Result<Vec<Message>, MemoryError> {
        let rows = sqlx::query(
            r#"
            SELECT body FROM (
                SELECT iid, body FROM messages
                WHERE thread_id = ?
                ORDER BY iid DESC
                LIMIT ?
            ) ORDER BY iid ASC
            "#,
        )
        .bind(thread_id)
        .bind(n as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("last events: {e}")))?;

        rows.iter().map(Self::row_to_message).collect()
    }

    async fn summary(&self, thread_id: &str) -> Result<String, MemoryError> {
        let row = sqlx::query("SELECT summary FROM summaries WHERE thread_id = ?")
            .bind(thread_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("summary: {e}")))?;
        match row {
            Some(row) => row
                .try_get("summary")
                .map_err(|e| MemoryError::QueryFailed(format!("summary column: {e}"))),
            None => Ok(String::new()),
        }
    }

    async fn update_summary(&self, thread_id: &str, summary: &str) -> Result<(), MemoryError> {
        sqlx::query(
            r#"
            INSERT INTO summaries (thread_id, summary, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(thread_id) DO UPDATE SET
                summary = excluded.summary,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(thread_id)
        .bind(summary)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("update summary: {e}")))?;
        Ok(())
    }

    async fn message_count(&self, thread_id: &str) -> Result<usize, MemoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM messages WHERE thread_id = ?")
            .bind(thread_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("count: {e}")))?;
        let count: i64 = row
            .try_get("cnt")
            .map_err(|e| MemoryError::QueryFailed(format!("count column: {e}")))?;
        Ok(count as usize)
    }

    async fn truncate(&self, thread_id: &str, len: usize) -> Result<(), MemoryError> {
        sqlx::query(
            r#"
            DELETE FROM messages
            WHERE thread_id = ?
              AND iid NOT IN (
                  SELECT iid FROM messages WHERE thread_id = ? ORDER BY iid ASC LIMIT ?
              )
            "#,
        )
        .bind(thread_id)
        .bind(thread_id)
        .bind(len as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::Storage(format!("truncate: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use citycode_core::message::Role;

    async fn test_store() -> SqliteStore {
        SqliteStore::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn append_and_read_back_in_order() {
        let db = test_store().await;
        for i in 0..3 {
            db.append("t1", Message::user(format!("q{i}"))).await.unwrap();
            db.append("t1", Message::assistant(format!("a{i}"))).await.unwrap();
        }

        let recent = db.last_events("t1", 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].role, Role::User);
        assert_eq!(recent[0].content, "q2");
        assert_eq!(recent[1].role, Role::Assistant);
        assert_eq!(recent[1].content, "a2");
        assert_eq!(db.message_count("t1").await.unwrap(), 6);
    }

    #[tokio::test]
    async fn threads_are_isolated() {
        let db = test_store().await;
        db.append("a", Message::user("for a")).await.unwrap();
        db.append("b", Message::user("for b")).await.unwrap();

        let a = db.last_events("a", 10).await.unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].content, "for a");
    }

    #[tokio::test]
    async fn summary_upsert() {
        let db = test_store().await;
        assert_eq!(db.summary("t").await.unwrap(), "");
        db.update_summary("t", "first").await.unwrap();
        db.update_summary("t", "second").await.unwrap();
        assert_eq!(db.summary("t").await.unwrap(), "second");
    }

    #[tokio::test]
    async fn truncate_keeps_prefix() {
        let db = test_store().await;
        for i in 0..5 {
            db.append("t", Message::user(i.to_string())).await.unwrap();
        }
        db.append("other", Message::user("keep me")).await.unwrap();

        db.truncate("t", 2).await.unwrap();
        let msgs = db.last_events("t", 10).await.unwrap();
        let contents: Vec<&str> = msgs.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["0", "1"]);
        assert_eq!(db.message_count("other").await.unwrap(), 1);
    }
}
