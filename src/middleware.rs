//! The top-level handle: a pool plus template store, with the pooled, connection and
//! transaction scopes hanging off it.

use std::borrow::Cow;
use std::sync::Arc;

use futures_util::Stream;
use futures_util::future::BoxFuture;
use tokio::io::AsyncRead;
use tokio_util::bytes::Bytes;
use tracing::{debug, error};

use crate::config::{MigrationsConfig, PostgresConfig};
use crate::context::{ExecutionContext, PoolContext, Scope, ScopedContext};
use crate::error::PgMiddlewareError;
use crate::migrations::{self, MigrationDriver};
use crate::pool::{ConnectionPool, Lifecycle, PoolState, checkout};
use crate::results::ResultSet;
use crate::template::{self, ParameterBag, TemplateStore};
use crate::transaction::Transaction;
use crate::types::IsolationLevel;

#[cfg(feature = "postgres")]
use crate::config::MiddlewareConfig;
#[cfg(feature = "postgres")]
use crate::postgres::PgPool;

/// Middleware over the deadpool PostgreSQL pool.
#[cfg(feature = "postgres")]
pub type PgMiddleware = Middleware<PgPool>;

/// Explicit handle owning the pool; clones share the pool and its lifecycle.
///
/// ```rust,no_run
/// use pg_named_query::prelude::*;
///
/// # async fn demo() -> Result<(), PgMiddlewareError> {
/// let config = MiddlewareConfig::from_json_file("db.json")?;
/// let db = PgMiddleware::connect(config).await?;
///
/// db.query("CREATE TABLE IF NOT EXISTS farms (name TEXT, score INTEGER)").await?;
/// db.with_transaction(|tx| {
///     Box::pin(async move {
///         tx.query("INSERT INTO farms VALUES ('Trotters Farm', 10)").await?;
///         let params = ParameterBag::new().with("minScore", 5)?;
///         tx.named_query("good-farms", &params).await
///     })
/// })
/// .await?;
/// db.stop().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Middleware<P: ConnectionPool> {
    pool: P,
    templates: Arc<TemplateStore>,
    lifecycle: Lifecycle,
    connection_profile: PostgresConfig,
    migrations: Option<MigrationsConfig>,
}

#[cfg(feature = "postgres")]
impl Middleware<PgPool> {
    /// Create the pool described by `config`. Connections are opened lazily; call
    /// [`check_connection`](Self::check_connection) to verify the server is reachable.
    ///
    /// # Errors
    /// Returns `PgMiddlewareError::ConfigError` if required config fields are missing or
    /// `PgMiddlewareError::ConnectionError` if pool creation fails.
    #[allow(clippy::unused_async)]
    pub async fn connect(config: MiddlewareConfig) -> Result<Self, PgMiddlewareError> {
        let pool = config.postgres.create_pool()?;
        let mut middleware = Self::from_pool(pool).with_templates(config.templates.store());
        middleware.connection_profile = config.postgres;
        middleware.migrations = config.migrations;
        Ok(middleware)
    }
}

impl<P: ConnectionPool> Middleware<P> {
    /// Wrap an existing pool. Named queries stay unavailable until
    /// [`with_templates`](Self::with_templates) supplies a directory.
    #[must_use]
    pub fn from_pool(pool: P) -> Self {
        Self {
            pool,
            templates: Arc::new(TemplateStore::unconfigured()),
            lifecycle: Lifecycle::default(),
            connection_profile: PostgresConfig::default(),
            migrations: None,
        }
    }

    #[must_use]
    pub fn with_templates(mut self, templates: TemplateStore) -> Self {
        self.templates = Arc::new(templates);
        self
    }

    /// Migration settings; `connection` is the profile used when the block has no override.
    #[must_use]
    pub fn with_migrations(mut self, migrations: MigrationsConfig, connection: PostgresConfig) -> Self {
        self.migrations = Some(migrations);
        self.connection_profile = connection;
        self
    }

    #[must_use]
    pub fn state(&self) -> PoolState {
        self.lifecycle.state()
    }

    /// The underlying pool, for anything this layer does not cover.
    #[must_use]
    pub fn pool(&self) -> &P {
        &self.pool
    }

    #[must_use]
    pub fn templates(&self) -> &TemplateStore {
        &self.templates
    }

    /// A context whose statements each borrow their own pooled connection.
    #[must_use]
    pub fn pool_context(&self) -> PoolContext<P> {
        PoolContext::new(self.pool.clone(), self.templates.clone(), self.lifecycle.clone())
    }

    /// Render a template without running it.
    ///
    /// # Errors
    /// See [`template::render`].
    pub fn render<'a>(
        template: &'a str,
        params: &ParameterBag,
    ) -> Result<Cow<'a, str>, PgMiddlewareError> {
        template::render(template, params)
    }

    /// Run one statement on a pooled connection.
    ///
    /// # Errors
    /// Returns the driver's error annotated with `sql`, or a pool error.
    pub async fn query(&self, sql: &str) -> Result<ResultSet, PgMiddlewareError> {
        self.pool_context().query(sql).await
    }

    /// Run a multi-statement script on a pooled connection.
    ///
    /// # Errors
    /// Returns the driver's error annotated with `sql`, or a pool error.
    pub async fn execute_batch(&self, sql: &str) -> Result<(), PgMiddlewareError> {
        self.pool_context().execute_batch(sql).await
    }

    /// Load, render and run the named query `name` on a pooled connection.
    ///
    /// # Errors
    /// Template lookup and rendering errors, then anything [`query`](Self::query) returns.
    pub async fn named_query(
        &self,
        name: &str,
        params: &ParameterBag,
    ) -> Result<ResultSet, PgMiddlewareError> {
        self.pool_context().named_query(name, params).await
    }

    /// Reserve one connection for the duration of `f`. The connection is released exactly
    /// once when `f` finishes, whether it succeeds, fails, panics or is cancelled.
    ///
    /// # Errors
    /// Checkout errors, or whatever `f` returns.
    pub async fn with_connection<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c mut ScopedContext<P::Connection>) -> BoxFuture<'c, Result<T, E>>
            + Send,
        T: Send,
        E: From<PgMiddlewareError> + Send,
    {
        let conn = checkout(&self.pool, &self.lifecycle).await?;
        let mut ctx = ScopedContext::new(conn, self.templates.clone(), Scope::Connection);
        let outcome = f(&mut ctx).await;
        ctx.release();
        outcome
    }

    /// [`with_transaction_level`](Self::with_transaction_level) at `READ COMMITTED`.
    ///
    /// # Errors
    /// See [`with_transaction_level`](Self::with_transaction_level).
    pub async fn with_transaction<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c mut ScopedContext<P::Connection>) -> BoxFuture<'c, Result<T, E>>
            + Send,
        T: Send,
        E: From<PgMiddlewareError> + Send,
    {
        self.with_transaction_level(IsolationLevel::default(), f)
            .await
    }

    /// Run `f` inside `BEGIN ... COMMIT` on one reserved connection.
    ///
    /// `f`'s value is returned only after COMMIT succeeds. If `f` fails, the transaction is
    /// rolled back and `f`'s error returned unchanged; a failing ROLLBACK is logged and its
    /// connection discarded, but never replaces the original error.
    ///
    /// # Errors
    /// Checkout and BEGIN errors, `f`'s error, or the COMMIT error.
    pub async fn with_transaction_level<F, T, E>(&self, level: IsolationLevel, f: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c mut ScopedContext<P::Connection>) -> BoxFuture<'c, Result<T, E>>
            + Send,
        T: Send,
        E: From<PgMiddlewareError> + Send,
    {
        let mut tx = self.begin_transaction(level).await?;
        let outcome = match tx.context() {
            Ok(ctx) => f(ctx).await,
            Err(err) => Err(err.into()),
        };

        match outcome {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    error!(
                        target: "pg_named_query::transaction",
                        error = %rollback_err,
                        "rollback after failed transaction body also failed"
                    );
                }
                Err(err)
            }
        }
    }

    /// Check out a connection and issue `BEGIN`. The returned guard must be finished with
    /// `commit` or `rollback`; dropping it discards the connection.
    ///
    /// # Errors
    /// Checkout errors or the BEGIN error.
    pub async fn begin_transaction(
        &self,
        level: IsolationLevel,
    ) -> Result<Transaction<P::Connection>, PgMiddlewareError> {
        let conn = checkout(&self.pool, &self.lifecycle).await?;
        Transaction::begin(conn, self.templates.clone(), level).await
    }

    /// Bulk-load tab-separated rows from `reader` into `schema.table` on a connection
    /// borrowed for the duration. Empty fields load as NULL. Inside a scope, use
    /// [`ScopedContext::copy_to_table`] so the load shares that scope's connection.
    ///
    /// # Errors
    /// The first error from either the reader or the server-side copy channel.
    pub async fn copy_to_table<R>(
        &self,
        schema: &str,
        table: &str,
        reader: R,
    ) -> Result<u64, PgMiddlewareError>
    where
        R: AsyncRead + Send,
    {
        self.pool_context().copy_to_table(schema, table, reader).await
    }

    /// [`copy_to_table`](Self::copy_to_table) for a stream of byte chunks.
    ///
    /// # Errors
    /// The first error from either the stream or the server-side copy channel.
    pub async fn copy_stream_to_table<S>(
        &self,
        schema: &str,
        table: &str,
        source: S,
    ) -> Result<u64, PgMiddlewareError>
    where
        S: Stream<Item = Result<Bytes, std::io::Error>> + Send,
    {
        self.pool_context()
            .copy_stream_to_table(schema, table, source)
            .await
    }

    /// Apply pending migrations through `driver`.
    ///
    /// # Errors
    /// `MigrationsNotConfigured` without a migrations block, configuration errors, or the
    /// driver's failure.
    pub async fn run_migrations(&self, driver: &dyn MigrationDriver) -> Result<(), PgMiddlewareError> {
        self.lifecycle.ensure_running()?;
        migrations::run_migrations(self.migrations.as_ref(), &self.connection_profile, driver).await
    }

    /// Round-trip `SELECT 1` through the pool.
    ///
    /// # Errors
    /// Any checkout or query error.
    pub async fn check_connection(&self) -> Result<(), PgMiddlewareError> {
        self.query("SELECT 1").await?;
        Ok(())
    }

    /// Stop the pool. Idle connections close, checked-out ones close when returned, and every
    /// later operation fails with `PoolStopped`.
    #[allow(clippy::unused_async)]
    pub async fn stop(&self) {
        if self.lifecycle.stop() {
            debug!(target: "pg_named_query::pool", "stopping connection pool");
            self.pool.close();
        }
    }
}
