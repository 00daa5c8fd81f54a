//! Postgres wiring shared by the durable adapters.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | Message prefix |
//! |------------|----------------------|----------------|
//! | Database (unique violation) | `23505` | `conflict in {operation}` |
//! | Database (other) | any | `database error in {operation}` |
//! | PoolClosed | N/A | `connection pool closed in {operation}` |
//! | Other | N/A | `sqlx error in {operation}` |
//!
//! Each adapter wraps the message in its own `Storage` error variant.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

const SCHEMA: &str = include_str!("../migrations/0001_notifications.sql");

/// Connect to Postgres and apply the notification schema (idempotent).
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    migrate(&pool).await?;
    Ok(pool)
}

pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    info!("notification schema applied");
    Ok(())
}

pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> String {
    match err {
        sqlx::Error::Database(db_err) => {
            if db_err.code().as_deref() == Some("23505") {
                format!("conflict in {}: {}", operation, db_err.message())
            } else {
                format!("database error in {}: {}", operation, db_err.message())
            }
        }
        sqlx::Error::PoolClosed => format!("connection pool closed in {}", operation),
        other => format!("sqlx error in {}: {}", operation, other),
    }
}
