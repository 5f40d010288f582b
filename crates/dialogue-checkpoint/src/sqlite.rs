//! Embedded single-file checkpoint backend, backed by SQLite via `sqlx`.
//!
//! This is the `settings.persistence.backend = embedded` option: durable
//! across process restarts, no external server required.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::error::{CheckpointError, Result};
use crate::traits::{CheckpointMetadata, CheckpointSaver};

/// A [`CheckpointSaver`] backed by a single SQLite database file.
///
/// Table layout is deliberately minimal: one row per user key, last write
/// wins, matching the "atomic per user key" contract — `save` is a single
/// `INSERT ... ON CONFLICT DO UPDATE` statement.
pub struct SqliteCheckpointSaver {
    pool: SqlitePool,
}

impl SqliteCheckpointSaver {
    /// Open (creating if necessary) the SQLite database at `path` and
    /// ensure the checkpoint table exists.
    pub async fn connect(path: &str) -> Result<Self> {
        let url = format!("sqlite://{path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .map_err(|e| CheckpointError::Storage(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS dialogue_checkpoints (
                user_key  TEXT PRIMARY KEY,
                state     TEXT NOT NULL,
                turn_id   TEXT,
                saved_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| CheckpointError::Storage(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Construct directly from an existing pool, for callers that already
    /// manage a shared sqlite connection pool elsewhere in their service.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CheckpointSaver for SqliteCheckpointSaver {
    async fn load(&self, user_key: &str) -> Result<Option<Value>> {
        let row = sqlx::query("SELECT state FROM dialogue_checkpoints WHERE user_key = ?1")
            .bind(user_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CheckpointError::Storage(e.to_string()))?;

        match row {
            None => Ok(None),
            Some(row) => {
                let raw: String = row.try_get("state").map_err(|e| CheckpointError::Storage(e.to_string()))?;
                let value = serde_json::from_str(&raw).map_err(|e| CheckpointError::Corrupt {
                    key: user_key.to_string(),
                    source: e,
                })?;
                Ok(Some(value))
            }
        }
    }

    async fn save(&self, user_key: &str, state: Value) -> Result<()> {
        let turn_id = state.get("turn_id").and_then(|v| v.as_str()).map(|s| s.to_string());
        let raw = serde_json::to_string(&state)?;
        let now: DateTime<Utc> = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO dialogue_checkpoints (user_key, state, turn_id, saved_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(user_key) DO UPDATE SET
                state = excluded.state,
                turn_id = excluded.turn_id,
                saved_at = excluded.saved_at
            "#,
        )
        .bind(user_key)
        .bind(raw)
        .bind(turn_id)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| CheckpointError::Storage(e.to_string()))?;

        Ok(())
    }

    async fn delete(&self, user_key: &str) -> Result<()> {
        sqlx::query("DELETE FROM dialogue_checkpoints WHERE user_key = ?1")
            .bind(user_key)
            .execute(&self.pool)
            .await
            .map_err(|e| CheckpointError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn list_recent(&self, user_key: &str, limit: usize) -> Result<Vec<CheckpointMetadata>> {
        let rows = sqlx::query(
            "SELECT user_key, turn_id, saved_at FROM dialogue_checkpoints WHERE user_key = ?1 LIMIT ?2",
        )
        .bind(user_key)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CheckpointError::Storage(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                let saved_at: String = row.try_get("saved_at").map_err(|e| CheckpointError::Storage(e.to_string()))?;
                let saved_at = DateTime::parse_from_rfc3339(&saved_at)
                    .map_err(|e| CheckpointError::Storage(e.to_string()))?
                    .with_timezone(&Utc);
                Ok(CheckpointMetadata {
                    user_key: row.try_get("user_key").map_err(|e| CheckpointError::Storage(e.to_string()))?,
                    saved_at,
                    turn_id: row.try_get("turn_id").ok(),
                })
            })
            .collect()
    }
}
