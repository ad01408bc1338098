/*!
SQLite checkpoint store.

Durable [`CheckpointStore`] backend over `sqlx`. Envelopes are stored as
opaque rows — the payload stays compressed and the integrity hash is
verified by [`persistence::unseal`] on every load, so a row tampered with
at rest surfaces as `Corrupted`, never as a successful read.

## Behavior

- When the `sqlite-migrations` feature is enabled (default), embedded
  migrations (`sqlx::migrate!("./migrations")`) run on connect; disabling
  the feature assumes external migration orchestration.
- Writes from different workflow threads land in independent rows; the
  store relies on SQLite's per-statement atomicity and needs no
  cross-thread locking.

## Schema

- `checkpoints.id` ← envelope id (primary key)
- `checkpoints.thread_id` ← partition key for history queries
- `checkpoints.trigger_kind` ← encoded [`CheckpointTrigger`]
- `checkpoints.payload` ← gzip-compressed state JSON
- `checkpoints.integrity_hash` / `raw_len` / `compressed_len` ← integrity record
*/

use std::sync::Arc;

use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use tracing::instrument;

use super::persistence::{
    self, Checkpoint, CheckpointEnvelope, CheckpointSummary, CheckpointTrigger,
};
use super::store::{CheckpointError, CheckpointStore};

/// Query parameters for paginated history access.
#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    /// Maximum number of results (capped at 1000).
    pub limit: Option<u32>,
    /// Number of results to skip.
    pub offset: Option<u32>,
}

/// One page of checkpoint history, newest first.
#[derive(Debug, Clone)]
pub struct HistoryPage {
    pub summaries: Vec<CheckpointSummary>,
    pub total_count: u64,
    pub has_next_page: bool,
}

/// SQLite-backed checkpoint store.
///
/// Storage grows with `(threads × checkpoints_per_thread × state_size)`;
/// retention is the embedder's policy (time-based `DELETE` plus `VACUUM`
/// keeps the file bounded).
pub struct SqliteCheckpointStore {
    pool: Arc<SqlitePool>,
}

impl std::fmt::Debug for SqliteCheckpointStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCheckpointStore").finish()
    }
}

impl SqliteCheckpointStore {
    /// Connect (or create) a SQLite database at `database_url`.
    /// Example URL: `sqlite://loomflow.db`.
    #[must_use = "the store must be used to persist checkpoints"]
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str) -> Result<Self, CheckpointError> {
        // Ensure the underlying file exists before sqlx opens it.
        if let Some(path) = database_url.strip_prefix("sqlite://") {
            let path = path.trim();
            if !path.is_empty() && path != ":memory:" {
                let p = std::path::Path::new(path);
                if let Some(parent) = p.parent() {
                    let _ = std::fs::create_dir_all(parent);
                }
                if !p.exists() {
                    let _ = std::fs::File::create_new(p);
                }
            }
        }

        let pool = SqlitePool::connect(database_url)
            .await
            .map_err(|e| CheckpointError::Backend {
                message: format!("connect error: {e}"),
            })?;

        #[cfg(feature = "sqlite-migrations")]
        {
            if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
                return Err(CheckpointError::Backend {
                    message: format!("migration failure: {e}"),
                });
            }
        }

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Paginated history for `thread_id`, newest first.
    #[instrument(skip(self), err)]
    pub async fn history(
        &self,
        thread_id: &str,
        query: HistoryQuery,
    ) -> Result<HistoryPage, CheckpointError> {
        let limit = query.limit.unwrap_or(100).min(1000);
        let offset = query.offset.unwrap_or(0);

        let total_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM checkpoints WHERE thread_id = ?1")
                .bind(thread_id)
                .fetch_one(&*self.pool)
                .await
                .map_err(|e| CheckpointError::Backend {
                    message: format!("count query: {e}"),
                })?;

        let rows = sqlx::query(
            r#"
            SELECT id, thread_id, trigger_kind, reason, created_at, raw_len, compressed_len
            FROM checkpoints
            WHERE thread_id = ?1
            ORDER BY rowid DESC
            LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(thread_id)
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| CheckpointError::Backend {
            message: format!("history query: {e}"),
        })?;

        let summaries = rows.iter().map(row_to_summary).collect();
        Ok(HistoryPage {
            summaries,
            total_count: total_count as u64,
            has_next_page: u64::from(offset + limit) < total_count as u64,
        })
    }

    async fn fetch_envelope(
        &self,
        checkpoint_id: &str,
    ) -> Result<Option<CheckpointEnvelope>, CheckpointError> {
        let row = sqlx::query(
            r#"
            SELECT id, thread_id, trigger_kind, reason, created_at,
                   payload, integrity_hash, raw_len, compressed_len
            FROM checkpoints
            WHERE id = ?1
            "#,
        )
        .bind(checkpoint_id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| CheckpointError::Backend {
            message: format!("select checkpoint: {e}"),
        })?;
        Ok(row.as_ref().map(row_to_envelope))
    }
}

#[async_trait::async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    #[instrument(skip(self, checkpoint), err)]
    async fn save(&self, checkpoint: Checkpoint) -> Result<String, CheckpointError> {
        let envelope = persistence::seal(&checkpoint)?;

        // Idempotent re-save of the same id is allowed.
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO checkpoints (
                id, thread_id, trigger_kind, reason, created_at,
                payload, integrity_hash, raw_len, compressed_len
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&envelope.id)
        .bind(&envelope.thread_id)
        .bind(envelope.trigger.as_str())
        .bind(&envelope.reason)
        .bind(&envelope.created_at)
        .bind(&envelope.payload)
        .bind(&envelope.integrity_hash)
        .bind(envelope.raw_len as i64)
        .bind(envelope.compressed_len as i64)
        .execute(&*self.pool)
        .await
        .map_err(|e| CheckpointError::Backend {
            message: format!("insert checkpoint: {e}"),
        })?;

        Ok(envelope.id)
    }

    #[instrument(skip(self), err)]
    async fn load(&self, checkpoint_id: &str) -> Result<Checkpoint, CheckpointError> {
        let envelope =
            self.fetch_envelope(checkpoint_id)
                .await?
                .ok_or_else(|| CheckpointError::NotFound {
                    checkpoint_id: checkpoint_id.to_string(),
                })?;
        persistence::unseal(&envelope)
    }

    #[instrument(skip(self), err)]
    async fn load_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let row = sqlx::query(
            r#"
            SELECT id, thread_id, trigger_kind, reason, created_at,
                   payload, integrity_hash, raw_len, compressed_len
            FROM checkpoints
            WHERE thread_id = ?1
            ORDER BY rowid DESC
            LIMIT 1
            "#,
        )
        .bind(thread_id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| CheckpointError::Backend {
            message: format!("select latest: {e}"),
        })?;

        match row.as_ref().map(row_to_envelope) {
            Some(envelope) => persistence::unseal(&envelope).map(Some),
            None => Ok(None),
        }
    }

    #[instrument(skip(self), err)]
    async fn list_by_thread(
        &self,
        thread_id: &str,
    ) -> Result<Vec<CheckpointSummary>, CheckpointError> {
        self.history(thread_id, HistoryQuery::default())
            .await
            .map(|page| page.summaries)
    }
}

fn row_to_envelope(row: &SqliteRow) -> CheckpointEnvelope {
    let trigger: String = row.get("trigger_kind");
    CheckpointEnvelope {
        id: row.get("id"),
        thread_id: row.get("thread_id"),
        trigger: CheckpointTrigger::parse(&trigger),
        reason: row.get("reason"),
        created_at: row.get("created_at"),
        payload: row.get("payload"),
        integrity_hash: row.get("integrity_hash"),
        raw_len: row.get::<i64, _>("raw_len") as u64,
        compressed_len: row.get::<i64, _>("compressed_len") as u64,
    }
}

fn row_to_summary(row: &SqliteRow) -> CheckpointSummary {
    let trigger: String = row.get("trigger_kind");
    let created_at: String = row.get("created_at");
    CheckpointSummary {
        id: row.get("id"),
        thread_id: row.get("thread_id"),
        trigger: CheckpointTrigger::parse(&trigger),
        reason: row.get("reason"),
        created_at: chrono::DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .unwrap_or_else(|_| chrono::Utc::now()),
        raw_len: row.get::<i64, _>("raw_len") as u64,
        compressed_len: row.get::<i64, _>("compressed_len") as u64,
    }
}
