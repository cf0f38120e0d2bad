use deadpool_postgres::{Config as DeadpoolConfig, PoolConfig, Runtime};
use tokio_postgres::NoTls;

use super::pool::PgPool;
use crate::config::PostgresConfig;
use crate::error::PgMiddlewareError;

impl PostgresConfig {
    /// Translate into a deadpool configuration.
    ///
    /// # Errors
    /// Returns `PgMiddlewareError::ConfigError` if a required field is missing.
    pub fn to_deadpool(&self) -> Result<DeadpoolConfig, PgMiddlewareError> {
        self.validate()?;

        let mut cfg = DeadpoolConfig::new();
        cfg.host.clone_from(&self.host);
        cfg.port = self.port;
        cfg.user.clone_from(&self.user);
        cfg.password.clone_from(&self.password);
        cfg.dbname.clone_from(&self.dbname);
        cfg.application_name.clone_from(&self.application_name);
        cfg.connect_timeout = self.pool.connect_timeout();

        let mut pool_cfg = PoolConfig::new(self.pool.max_size);
        pool_cfg.timeouts.wait = self.pool.acquire_timeout();
        pool_cfg.timeouts.create = self.pool.connect_timeout();
        cfg.pool = Some(pool_cfg);
        Ok(cfg)
    }

    /// Build the connection pool. Connections are opened lazily on first checkout.
    ///
    /// # Errors
    /// Returns `PgMiddlewareError::ConfigError` if required fields are missing or
    /// `PgMiddlewareError::ConnectionError` if pool creation fails.
    pub fn create_pool(&self) -> Result<PgPool, PgMiddlewareError> {
        let pg_pool = self
            .to_deadpool()?
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| {
                PgMiddlewareError::ConnectionError(format!("Failed to create Postgres pool: {e}"))
            })?;
        Ok(PgPool::new(pg_pool, self.pool.idle_timeout()))
    }
}
