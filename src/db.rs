use crate::error::AppError;
use db_pool::{create_pool, migrate, DbConfig, Migration, PgPool};

pub const MIGRATIONS: &[Migration] = &[Migration {
    name: "0001_messaging",
    sql: include_str!("../migrations/0001_messaging.sql"),
}];

/// Connects, verifies and migrates the Postgres backend
pub async fn init_pool(database_url: &str) -> Result<PgPool, AppError> {
    let cfg = DbConfig::with_url("bridge-chat-service", database_url.to_string());
    cfg.log_config();

    let pool = create_pool(cfg).await?;
    let applied = migrate(&pool, MIGRATIONS).await?;
    tracing::info!(applied, "database migrations up to date");
    Ok(pool)
}
