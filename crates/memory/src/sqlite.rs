//! SQLite session store.
//!
//! One row per thread. The session body (history, routing decisions,
//! scratch) is stored as a JSON document; timestamps are kept in their own
//! columns so sessions can be listed without decoding every body.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};
use unidesk_core::error::SessionError;
use unidesk_core::session::{Session, SessionStore};

/// A persistent session store backed by a SQLite file.
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    /// Open (or create) the database at `path`.
    ///
    /// Accepts a plain file path or any sqlx SQLite URL; `"sqlite::memory:"`
    /// gives an ephemeral database for tests.
    pub async fn new(path: &str) -> Result<Self, SessionError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| SessionError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| SessionError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite session store initialized at {path}");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), SessionError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                thread_id   TEXT PRIMARY KEY NOT NULL,
                body        TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| SessionError::MigrationFailed(format!("sessions table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sessions_updated_at ON sessions(updated_at DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| SessionError::MigrationFailed(format!("updated_at index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn get(&self, thread_id: &str) -> Result<Option<Session>, SessionError> {
        let row = sqlx::query("SELECT body FROM sessions WHERE thread_id = ?1")
            .bind(thread_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SessionError::Storage(format!("SELECT failed: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let body: String = row
            .try_get("body")
            .map_err(|e| SessionError::Storage(format!("body column: {e}")))?;

        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| SessionError::Corrupt {
                thread_id: thread_id.to_string(),
                reason: e.to_string(),
            })
    }

    async fn put(&self, session: &Session) -> Result<(), SessionError> {
        let body = serde_json::to_string(session)
            .map_err(|e| SessionError::Storage(format!("Session serialization: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO sessions (thread_id, body, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(thread_id) DO UPDATE SET
                body = excluded.body,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&session.thread_id)
        .bind(&body)
        .bind(session.created_at.to_rfc3339())
        .bind(session.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| SessionError::Storage(format!("INSERT failed: {e}")))?;

        debug!(thread_id = %session.thread_id, messages = session.history().len(), "Stored session");
        Ok(())
    }
}
