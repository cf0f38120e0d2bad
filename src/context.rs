//! Execution contexts: the pool-bound context and the connection-bound scoped context.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::Stream;
use tokio::io::AsyncRead;
use tokio_util::bytes::Bytes;
use tracing::debug;

use crate::bulk;
use crate::error::PgMiddlewareError;
use crate::pool::{Checkout, ConnectionPool, Lifecycle, PooledConnection, checkout};
use crate::results::ResultSet;
use crate::template::{ParameterBag, TemplateStore, render};

/// Something queries can be issued against: the pool, or one reserved connection.
///
/// `named_query` loads `<dir>/<name>.<ext>`, renders it, and sends the result through
/// `query` on the same context, so rendered SQL never leaves the scope it was issued in.
#[async_trait]
pub trait ExecutionContext: Send {
    /// Run one statement.
    async fn query(&mut self, sql: &str) -> Result<ResultSet, PgMiddlewareError>;

    /// Run a multi-statement script, discarding any rows.
    async fn execute_batch(&mut self, sql: &str) -> Result<(), PgMiddlewareError>;

    /// Where this context loads named-query templates from.
    fn templates(&self) -> &TemplateStore;

    /// Load, render and run a named query.
    async fn named_query(
        &mut self,
        name: &str,
        params: &ParameterBag,
    ) -> Result<ResultSet, PgMiddlewareError> {
        let store = self.templates().clone();
        let template = store.load(name).await?;
        let sql = render(&template, params)?;
        self.query(&sql).await
    }
}

/// Context bound to the shared pool: every statement borrows its own connection and returns
/// it as soon as the statement finishes.
#[derive(Debug, Clone)]
pub struct PoolContext<P: ConnectionPool> {
    pool: P,
    templates: Arc<TemplateStore>,
    lifecycle: Lifecycle,
}

impl<P: ConnectionPool> PoolContext<P> {
    pub(crate) fn new(pool: P, templates: Arc<TemplateStore>, lifecycle: Lifecycle) -> Self {
        Self {
            pool,
            templates,
            lifecycle,
        }
    }

    /// Bulk-load `source` into `schema.table` on a connection borrowed for the duration.
    ///
    /// # Errors
    /// Fails with the first error from either the source or the server-side copy channel.
    pub async fn copy_stream_to_table<S>(
        &self,
        schema: &str,
        table: &str,
        source: S,
    ) -> Result<u64, PgMiddlewareError>
    where
        S: Stream<Item = Result<Bytes, std::io::Error>> + Send,
    {
        let mut conn = checkout(&self.pool, &self.lifecycle).await?;
        let outcome = bulk::copy_stream(conn.connection()?, schema, table, source).await;
        conn.release();
        outcome
    }

    /// [`copy_stream_to_table`](Self::copy_stream_to_table) for an `AsyncRead` source.
    ///
    /// # Errors
    /// Fails with the first error from either the reader or the server-side copy channel.
    pub async fn copy_to_table<R>(
        &self,
        schema: &str,
        table: &str,
        reader: R,
    ) -> Result<u64, PgMiddlewareError>
    where
        R: AsyncRead + Send,
    {
        self.copy_stream_to_table(schema, table, bulk::reader_source(reader))
            .await
    }
}

#[async_trait]
impl<P: ConnectionPool> ExecutionContext for PoolContext<P> {
    async fn query(&mut self, sql: &str) -> Result<ResultSet, PgMiddlewareError> {
        let mut conn = checkout(&self.pool, &self.lifecycle).await?;
        debug!(target: "pg_named_query::query", sql, "pooled query");
        let outcome = conn.connection()?.execute_text(sql).await;
        conn.release();
        outcome.map_err(|err| err.with_query(sql))
    }

    async fn execute_batch(&mut self, sql: &str) -> Result<(), PgMiddlewareError> {
        let mut conn = checkout(&self.pool, &self.lifecycle).await?;
        debug!(target: "pg_named_query::query", sql, "pooled batch");
        let outcome = conn.connection()?.execute_batch(sql).await;
        conn.release();
        outcome.map_err(|err| err.with_query(sql))
    }

    fn templates(&self) -> &TemplateStore {
        &self.templates
    }
}

/// What a [`ScopedContext`] was opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Connection,
    Transaction,
}

/// Context bound to one reserved connection. Statements run strictly in order on that
/// connection, so each one sees the effects of the ones before it, committed or not.
#[derive(Debug)]
pub struct ScopedContext<C: PooledConnection> {
    conn: Checkout<C>,
    templates: Arc<TemplateStore>,
    scope: Scope,
}

impl<C: PooledConnection> ScopedContext<C> {
    /// A transaction scope discards its connection if dropped unfinished; a connection scope
    /// releases it.
    pub(crate) fn new(conn: Checkout<C>, templates: Arc<TemplateStore>, scope: Scope) -> Self {
        let conn = match scope {
            Scope::Connection => conn,
            Scope::Transaction => conn.discard_on_drop(),
        };
        Self {
            conn,
            templates,
            scope,
        }
    }

    #[must_use]
    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub(crate) fn connection_mut(&mut self) -> Result<&mut C, PgMiddlewareError> {
        self.conn.connection()
    }

    pub(crate) fn release(self) {
        self.conn.release();
    }

    pub(crate) fn discard(self) {
        self.conn.discard();
    }

    /// Bulk-load `source` into `schema.table` on this scope's connection, so the load takes
    /// part in any open transaction. The connection stays with the scope.
    ///
    /// # Errors
    /// Fails with the first error from either the source or the server-side copy channel.
    pub async fn copy_stream_to_table<S>(
        &mut self,
        schema: &str,
        table: &str,
        source: S,
    ) -> Result<u64, PgMiddlewareError>
    where
        S: Stream<Item = Result<Bytes, std::io::Error>> + Send,
    {
        bulk::copy_stream(self.conn.connection()?, schema, table, source).await
    }

    /// [`copy_stream_to_table`](Self::copy_stream_to_table) for an `AsyncRead` source.
    ///
    /// # Errors
    /// Fails with the first error from either the reader or the server-side copy channel.
    pub async fn copy_to_table<R>(
        &mut self,
        schema: &str,
        table: &str,
        reader: R,
    ) -> Result<u64, PgMiddlewareError>
    where
        R: AsyncRead + Send,
    {
        let conn = self.conn.connection()?;
        bulk::copy_stream(conn, schema, table, bulk::reader_source(reader)).await
    }
}

#[async_trait]
impl<C: PooledConnection> ExecutionContext for ScopedContext<C> {
    async fn query(&mut self, sql: &str) -> Result<ResultSet, PgMiddlewareError> {
        debug!(target: "pg_named_query::query", sql, scope = ?self.scope, "scoped query");
        self.conn
            .connection()?
            .execute_text(sql)
            .await
            .map_err(|err| err.with_query(sql))
    }

    async fn execute_batch(&mut self, sql: &str) -> Result<(), PgMiddlewareError> {
        debug!(target: "pg_named_query::query", sql, scope = ?self.scope, "scoped batch");
        self.conn
            .connection()?
            .execute_batch(sql)
            .await
            .map_err(|err| err.with_query(sql))
    }

    fn templates(&self) -> &TemplateStore {
        &self.templates
    }
}
