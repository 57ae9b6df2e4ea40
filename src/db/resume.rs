//! Resume record CRUD and runtime state.

use crate::error::DatabaseError;
use crate::task::ResumeRecord;
use crate::types::TaskId;
use crate::{Error, Result};

use super::{Database, ResumeRow};

const CLEAN_SHUTDOWN_KEY: &str = "clean_shutdown";
const NEXT_SEGMENTED_ID_KEY: &str = "next_segmented_id";

impl Database {
    /// Insert or replace the record of a task
    pub async fn save_resume_record(&self, record: &ResumeRecord) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let body = serde_json::to_string(record)?;

        sqlx::query(
            r#"
            INSERT INTO resume_records (task_key, backend, record, native, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(task_key) DO UPDATE SET
                record = excluded.record,
                native = excluded.native,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.id.backend().as_str())
        .bind(body)
        .bind(record.native.as_deref())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to save resume record: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Get the record of a task
    pub async fn get_resume_record(&self, id: &TaskId) -> Result<Option<ResumeRecord>> {
        let row = sqlx::query_as::<_, ResumeRow>(
            r#"
            SELECT task_key, backend, record, native, updated_at
            FROM resume_records
            WHERE task_key = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get resume record: {}",
                e
            )))
        })?;

        row.map(decode_row).transpose()
    }

    /// All stored records, oldest save first
    ///
    /// Rows whose body no longer decodes are logged and skipped.
    pub async fn load_resume_records(&self) -> Result<Vec<ResumeRecord>> {
        let rows = sqlx::query_as::<_, ResumeRow>(
            r#"
            SELECT task_key, backend, record, native, updated_at
            FROM resume_records
            ORDER BY updated_at ASC, task_key ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to load resume records: {}",
                e
            )))
        })?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let key = row.task_key.clone();
            match decode_row(row) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(task = %key, error = %e, "Skipping unreadable resume record"),
            }
        }
        Ok(records)
    }

    /// Delete the record of a task; returns whether one existed
    pub async fn delete_resume_record(&self, id: &TaskId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM resume_records WHERE task_key = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete resume record: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected() > 0)
    }

    /// Number of stored records
    pub async fn count_resume_records(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM resume_records")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to count resume records: {}",
                    e
                )))
            })
    }

    /// Mark the session as running; cleared again by [`set_clean_shutdown`](Self::set_clean_shutdown)
    pub async fn set_clean_start(&self) -> Result<()> {
        self.set_runtime_value(CLEAN_SHUTDOWN_KEY, "false").await
    }

    /// Mark the session as shut down cleanly
    pub async fn set_clean_shutdown(&self) -> Result<()> {
        self.set_runtime_value(CLEAN_SHUTDOWN_KEY, "true").await
    }

    /// Whether the previous session started but never shut down cleanly
    pub async fn was_unclean_shutdown(&self) -> Result<bool> {
        Ok(self
            .get_runtime_value(CLEAN_SHUTDOWN_KEY)
            .await?
            .is_some_and(|value| value == "false"))
    }

    /// Persisted segmented id counter
    pub async fn next_segmented_id(&self) -> Result<Option<i64>> {
        Ok(self
            .get_runtime_value(NEXT_SEGMENTED_ID_KEY)
            .await?
            .and_then(|value| value.parse().ok()))
    }

    /// Persist the segmented id counter
    pub async fn set_next_segmented_id(&self, next: i64) -> Result<()> {
        self.set_runtime_value(NEXT_SEGMENTED_ID_KEY, &next.to_string())
            .await
    }

    async fn get_runtime_value(&self, key: &str) -> Result<Option<String>> {
        sqlx::query_scalar("SELECT value FROM runtime_state WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to read runtime state: {}",
                    e
                )))
            })
    }

    async fn set_runtime_value(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO runtime_state (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to write runtime state: {}",
                e
            )))
        })?;

        Ok(())
    }
}

fn decode_row(row: ResumeRow) -> Result<ResumeRecord> {
    let mut record: ResumeRecord = serde_json::from_str(&row.record)?;
    if record.id.to_string() != row.task_key {
        return Err(Error::Database(DatabaseError::QueryFailed(format!(
            "resume record key mismatch: row {} holds {}",
            row.task_key, record.id
        ))));
    }
    record.native = row.native;
    Ok(record)
}
