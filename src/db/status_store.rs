//! Persistence of merge-permission decisions.
//!
//! One row per (project, MR). The store is deliberately dumb: it upserts
//! whatever decision the reconciler hands it. Correct ordering under
//! concurrent triggers is the reconciler's job, not the store's.

use crate::db::pool::DbPool;
use crate::error::AppError;
use crate::models::MergeStatus;
use async_trait::async_trait;

/// Write side of the merge-status table.
///
/// Abstracted so the reconciler can be exercised in tests without a
/// live database.
#[async_trait]
pub trait MergeStatusWriter: Send + Sync {
    /// Persist a decision for (project, MR), inserting the row if it does
    /// not exist yet. Writing an identical decision twice is a harmless
    /// overwrite, never an error.
    async fn upsert(
        &self,
        project_id: i64,
        mr_iid: i64,
        status: MergeStatus,
        reason: Option<&str>,
    ) -> Result<(), AppError>;
}

/// Postgres-backed status store.
#[derive(Debug, Clone)]
pub struct StatusStore {
    pool: DbPool,
}

impl StatusStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MergeStatusWriter for StatusStore {
    async fn upsert(
        &self,
        project_id: i64,
        mr_iid: i64,
        status: MergeStatus,
        reason: Option<&str>,
    ) -> Result<(), AppError> {
        // Status and reason land in one statement; a partial write
        // (status without reason or vice versa) is not observable.
        // All values are bound, never interpolated.
        sqlx::query(
            r#"
            INSERT INTO merge_request_status (project_id, mr_iid, status, reason, updated_at)
            VALUES ($1, $2, $3, $4, now())
            ON CONFLICT (project_id, mr_iid)
            DO UPDATE SET status = EXCLUDED.status,
                          reason = EXCLUDED.reason,
                          updated_at = now()
            "#,
        )
        .bind(project_id)
        .bind(mr_iid)
        .bind(status.as_str())
        .bind(reason)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
