//! Database connection pool management
//!
//! Pool creation, startup verification and embedded migrations for the chat
//! service's Postgres backend.

use deadpool::managed::TimeoutType;
use deadpool_postgres::tokio_postgres::{Config as PgConfig, NoTls};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
pub use deadpool_postgres::PoolError;
use std::time::Duration;
use tracing::{debug, error, info};

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub service_name: String,
    pub database_url: String,
    pub max_connections: u32,
    /// Bound on the startup `SELECT 1` verification
    pub connect_timeout_secs: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            service_name: String::from("unknown"),
            database_url: String::new(),
            max_connections: 16,
            connect_timeout_secs: 5,
        }
    }
}

impl DbConfig {
    /// Pool sizing from `DB_MAX_CONNECTIONS` / `DB_CONNECT_TIMEOUT_SECS` with an explicit URL
    pub fn with_url(service_name: &str, database_url: String) -> Self {
        let defaults = Self::default();
        Self {
            service_name: service_name.to_string(),
            database_url,
            max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_connections),
            connect_timeout_secs: std::env::var("DB_CONNECT_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.connect_timeout_secs),
        }
    }

    pub fn log_config(&self) {
        info!(
            "Database Pool Configuration: max_connections={}, connect_timeout={}s",
            self.max_connections, self.connect_timeout_secs
        );
    }
}

pub type PgPool = Pool;

/// Builds the pool and verifies one connection before returning it
pub async fn create_pool(config: DbConfig) -> Result<PgPool, PoolError> {
    debug!(
        "Creating database pool: service={}, max={}, verify_timeout={}s",
        config.service_name, config.max_connections, config.connect_timeout_secs
    );

    let pg_config: PgConfig = config.database_url.parse().map_err(PoolError::Backend)?;

    let mgr_config = ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    };
    let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
    let pool = Pool::builder(mgr)
        .max_size(config.max_connections as usize)
        .build()
        .map_err(|e| {
            error!(error = %e, "Failed to build database pool");
            PoolError::Timeout(TimeoutType::Create)
        })?;

    match tokio::time::timeout(Duration::from_secs(config.connect_timeout_secs), async {
        let client = pool.get().await?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(PoolError::Backend)?;
        Ok::<(), PoolError>(())
    })
    .await
    {
        Ok(Ok(())) => {
            info!(
                service = %config.service_name,
                "Database pool created and verified successfully"
            );
            Ok(pool)
        }
        Ok(Err(e)) => {
            error!(
                service = %config.service_name,
                error = %e,
                "Database connection verification failed"
            );
            Err(e)
        }
        Err(_) => {
            error!(
                service = %config.service_name,
                timeout_secs = config.connect_timeout_secs,
                "Database connection verification timeout"
            );
            Err(PoolError::Timeout(TimeoutType::Wait))
        }
    }
}

/// An embedded SQL migration, applied once and recorded by name
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub name: &'static str,
    pub sql: &'static str,
}

/// Applies every migration not yet recorded in `_schema_migrations`, in order.
/// Each migration runs in its own transaction.
pub async fn migrate(pool: &PgPool, migrations: &[Migration]) -> Result<usize, PoolError> {
    let mut client = pool.get().await?;

    client
        .batch_execute(
            "CREATE TABLE IF NOT EXISTS _schema_migrations (
                name TEXT PRIMARY KEY,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
        )
        .await
        .map_err(PoolError::Backend)?;

    let mut applied = 0;
    for migration in migrations {
        let tx = client.transaction().await.map_err(PoolError::Backend)?;
        let inserted = tx
            .execute(
                "INSERT INTO _schema_migrations (name) VALUES ($1) ON CONFLICT DO NOTHING",
                &[&migration.name],
            )
            .await
            .map_err(PoolError::Backend)?;

        if inserted == 0 {
            debug!(migration = migration.name, "Migration already applied");
            continue;
        }

        tx.batch_execute(migration.sql)
            .await
            .map_err(PoolError::Backend)?;
        tx.commit().await.map_err(PoolError::Backend)?;
        info!(migration = migration.name, "Applied migration");
        applied += 1;
    }

    Ok(applied)
}
