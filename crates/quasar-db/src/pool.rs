//! Pooled connection facade. `init` opens the pool, `close` drains it; any access
//! attempted before `init` fails loudly rather than panicking, per the source's
//! "mis-ordered access before init fails loudly" requirement.

use deadpool_postgres::{Config, Pool, Runtime};
use std::sync::OnceLock;
use tokio_postgres::NoTls;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum DbError {
    #[error("database pool accessed before init() completed")]
    NotInitialized,
    #[error(transparent)]
    Pool(#[from] deadpool_postgres::PoolError),
    #[error(transparent)]
    Build(#[from] deadpool_postgres::CreatePoolError),
    #[error(transparent)]
    Postgres(#[from] tokio_postgres::Error),
}

/// Owns the deadpool-postgres pool for one service (Registry or Scheduler). Each
/// service constructs and initializes its own; they are never shared across processes.
pub struct DbPool {
    pool: OnceLock<Pool>,
}

impl DbPool {
    pub const fn new() -> Self {
        Self {
            pool: OnceLock::new(),
        }
    }

    /// Opens the pool against `dsn`. TLS is intentionally out of scope here — wire it
    /// via `tokio-postgres-rustls` at the call site if the deployment requires it,
    /// matching how `provider-sqldb-postgres` gates rustls behind a feature.
    pub async fn init(&self, dsn: &str) -> Result<(), DbError> {
        let mut cfg = Config::new();
        cfg.url = Some(dsn.to_string());
        let pool = cfg.create_pool(Some(Runtime::Tokio1), NoTls)?;
        // Fail fast: a bad DSN should surface at startup, not on first query.
        let _ = pool.get().await?;
        self.pool
            .set(pool)
            .map_err(|_| ())
            .expect("DbPool::init called more than once");
        Ok(())
    }

    pub async fn get(&self) -> Result<deadpool_postgres::Client, DbError> {
        let pool = self.pool.get().ok_or(DbError::NotInitialized)?;
        Ok(pool.get().await?)
    }

    /// Drains the pool. Subsequent `get()` calls will fail until `init` runs again.
    pub fn close(&self) {
        if let Some(pool) = self.pool.get() {
            pool.close();
        }
    }
}

impl Default for DbPool {
    fn default() -> Self {
        Self::new()
    }
}
