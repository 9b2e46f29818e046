//! Database layer: pool management, migrations, and the status store.

pub mod pool;
pub mod status_store;

pub use pool::DbPool;
pub use status_store::{MergeStatusWriter, StatusStore};

use crate::error::AppError;

/// Initialize the database: connect and run migrations.
pub async fn initialize(database_url: &str) -> Result<DbPool, AppError> {
    let pool = pool::create_pool(database_url)
        .await
        .map_err(|e| AppError::storage(format!("failed to connect to database: {}", e)))?;
    run_migrations(&pool).await?;
    Ok(pool)
}

/// Apply pending migrations, tracked in a `_migrations` table.
///
/// Safe to run on every startup; applied migrations are skipped.
async fn run_migrations(pool: &DbPool) -> Result<(), AppError> {
    let mut conn = pool.acquire().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS _migrations (
            id BIGSERIAL PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(&mut *conn)
    .await?;

    let applied: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM _migrations WHERE name = $1")
            .bind(MIGRATION_0001)
            .fetch_optional(&mut *conn)
            .await?;

    if applied.is_none() {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS merge_request_status (
                project_id BIGINT NOT NULL,
                mr_iid BIGINT NOT NULL,
                status TEXT NOT NULL,
                reason TEXT,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (project_id, mr_iid)
            )
            "#,
        )
        .execute(&mut *conn)
        .await?;

        sqlx::query("INSERT INTO _migrations (name) VALUES ($1)")
            .bind(MIGRATION_0001)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

const MIGRATION_0001: &str = "0001_merge_request_status";
