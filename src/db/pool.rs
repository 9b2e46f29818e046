//! Postgres connection pool.

use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;

/// Type alias for the Postgres connection pool.
pub type DbPool = Pool<Postgres>;

/// Create a new connection pool.
///
/// Acquisition is bounded so a wedged database surfaces as a
/// `StorageError` on the affected reconciliation instead of hanging the
/// whole service.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(5)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await
}
