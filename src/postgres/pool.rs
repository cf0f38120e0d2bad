use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Object, Pool, Status};
use tracing::trace;

use crate::error::PgMiddlewareError;
use crate::pool::ConnectionPool;

/// deadpool-backed PostgreSQL pool.
#[derive(Clone)]
pub struct PgPool {
    pool: Pool,
    idle_timeout: Option<Duration>,
}

impl std::fmt::Debug for PgPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgPool")
            .field("status", &self.pool.status())
            .field("idle_timeout", &self.idle_timeout)
            .finish()
    }
}

impl PgPool {
    #[must_use]
    pub fn new(pool: Pool, idle_timeout: Option<Duration>) -> Self {
        Self { pool, idle_timeout }
    }

    /// The underlying deadpool pool.
    #[must_use]
    pub fn inner(&self) -> &Pool {
        &self.pool
    }

    #[must_use]
    pub fn status(&self) -> Status {
        self.pool.status()
    }
}

#[async_trait]
impl ConnectionPool for PgPool {
    type Connection = Object;

    async fn acquire(&self) -> Result<Object, PgMiddlewareError> {
        if let Some(idle_timeout) = self.idle_timeout {
            self.pool
                .retain(|_, metrics| metrics.last_used() < idle_timeout);
        }
        let conn = self.pool.get().await?;
        trace!(target: "pg_named_query::pool", status = ?self.pool.status(), "connection checked out");
        Ok(conn)
    }

    fn close(&self) {
        self.pool.close();
    }
}
