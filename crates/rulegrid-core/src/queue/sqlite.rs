//! SQLite-backed queue store.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use super::{QueueEntry, QueueId, QueueStore, SubmissionDescriptor};
use crate::config::Config;
use crate::error::{DispatchError, Result};

const IN_MEMORY_URL: &str = "sqlite::memory:";

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/sqlite");

const ENTRY_COLUMNS: &str = "id, action, condition, context, user_name, exec_address, \
     exec_time, frequency, priority, notification_addr, created_at";

/// SQLite-backed queue store.
#[derive(Clone)]
pub struct SqliteQueueStore {
    pool: SqlitePool,
}

impl SqliteQueueStore {
    /// Create a store from an existing, already migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to `url` and run migrations.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| DispatchError::queue("connect", format!("{url}: {e}")))?;
        MIGRATOR.run(&pool).await?;
        Ok(Self { pool })
    }

    /// Connect to the queue database named by `config`.
    ///
    /// `sqlite::memory:` gets the single-connection pool of [`Self::in_memory`].
    pub async fn from_config(config: &Config) -> Result<Self> {
        if config.database_url == IN_MEMORY_URL {
            return Self::in_memory().await;
        }
        Self::connect(&config.database_url).await
    }

    /// Open (creating if needed) a database file and run migrations.
    ///
    /// Parent directories are created when missing.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DispatchError::queue(
                    "create_dir",
                    format!("Failed to create directory {:?}: {}", parent, e),
                )
            })?;
        }

        Self::connect(&format!("sqlite:{}?mode=rwc", path.to_string_lossy())).await
    }

    /// Private in-memory database, migrated.
    ///
    /// Uses a single connection that is never reaped, so every query sees the
    /// same database for the life of the store.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(IN_MEMORY_URL)
            .await
            .map_err(|e| DispatchError::queue("connect", e.to_string()))?;
        MIGRATOR.run(&pool).await?;
        Ok(Self { pool })
    }

    /// The underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl QueueStore for SqliteQueueStore {
    async fn submit_entry(&self, descriptor: &SubmissionDescriptor) -> Result<QueueId> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO rule_exec_queue
                (action, condition, context, user_name, exec_address, exec_time,
                 frequency, priority, notification_addr, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&descriptor.action)
        .bind(&descriptor.condition)
        .bind(descriptor.context.as_ref())
        .bind(&descriptor.user_name)
        .bind(&descriptor.exec_address)
        .bind(descriptor.exec_time)
        .bind(&descriptor.frequency)
        .bind(descriptor.priority)
        .bind(&descriptor.notification_addr)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DispatchError::queue("submit", e.to_string()))?;

        Ok(QueueId::new(id))
    }

    async fn delete_entry(&self, id: QueueId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM rule_exec_queue WHERE id = ?")
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map_err(|e| DispatchError::queue("cancel", e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_entry(&self, id: QueueId) -> Result<Option<QueueEntry>> {
        let entry = sqlx::query_as::<_, QueueEntry>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM rule_exec_queue WHERE id = ?"
        ))
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }

    async fn due_entries(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<QueueEntry>> {
        let entries = sqlx::query_as::<_, QueueEntry>(&format!(
            r#"
            SELECT {ENTRY_COLUMNS}
            FROM rule_exec_queue
            WHERE exec_time <= ?
            ORDER BY priority DESC, exec_time ASC, id ASC
            LIMIT ?
            "#
        ))
        .bind(now)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    async fn update_schedule(
        &self,
        id: QueueId,
        exec_time: DateTime<Utc>,
        frequency: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE rule_exec_queue
            SET exec_time = ?, frequency = ?
            WHERE id = ?
            "#,
        )
        .bind(exec_time)
        .bind(frequency)
        .bind(id.get())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
