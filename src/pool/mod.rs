//! Capabilities the execution layer needs from a connection pool and its connections.
//!
//! The concrete PostgreSQL binding lives in [`crate::postgres`]; anything implementing these
//! traits (an in-memory pool in tests, for instance) drives the same contexts and
//! transaction state machine.

mod lifecycle;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use tokio_util::bytes::Bytes;
use tracing::{debug, warn};

use crate::error::PgMiddlewareError;
use crate::results::ResultSet;

pub use lifecycle::PoolState;
pub(crate) use lifecycle::Lifecycle;

/// Byte stream fed into a server-side `COPY ... FROM STDIN` channel.
pub type CopySource<'a> = BoxStream<'a, Result<Bytes, std::io::Error>>;

/// A connection checked out of a [`ConnectionPool`].
///
/// Exactly one of [`release`](Self::release) or [`discard`](Self::discard) ends its checkout.
#[async_trait]
pub trait PooledConnection: Send + Sized + 'static {
    /// Run one statement and materialize its result.
    async fn execute_text(&mut self, sql: &str) -> Result<ResultSet, PgMiddlewareError>;

    /// Run one or more statements without collecting rows.
    async fn execute_batch(&mut self, sql: &str) -> Result<(), PgMiddlewareError>;

    /// Issue a `COPY ... FROM STDIN` statement and stream `source` into it, returning the
    /// number of rows loaded. A source error aborts the copy.
    async fn copy_in_stream(
        &mut self,
        statement: &str,
        source: CopySource<'_>,
    ) -> Result<u64, PgMiddlewareError>;

    /// Hand the connection back to its pool for reuse.
    fn release(self);

    /// Drop the connection from the pool for good, used when its session state is unknown.
    fn discard(self);
}

#[async_trait]
pub trait ConnectionPool: Clone + Send + Sync + 'static {
    type Connection: PooledConnection;

    /// Borrow a connection, waiting up to the configured acquire timeout.
    async fn acquire(&self) -> Result<Self::Connection, PgMiddlewareError>;

    /// Stop handing out connections and close idle ones.
    fn close(&self);
}

/// A checked-out connection that goes back to its pool exactly once.
///
/// If the guard is dropped before [`release`](Self::release) or [`discard`](Self::discard)
/// (a panic in caller code, or a cancelled future), `Drop` finishes the checkout: the
/// connection is released, or discarded when [`discard_on_drop`](Self::discard_on_drop) was
/// set because its session state would be unknown.
#[derive(Debug)]
pub(crate) struct Checkout<C: PooledConnection> {
    conn: Option<C>,
    discard_on_drop: bool,
}

impl<C: PooledConnection> Checkout<C> {
    pub(crate) fn new(conn: C) -> Self {
        Self {
            conn: Some(conn),
            discard_on_drop: false,
        }
    }

    pub(crate) fn discard_on_drop(mut self) -> Self {
        self.discard_on_drop = true;
        self
    }

    pub(crate) fn connection(&mut self) -> Result<&mut C, PgMiddlewareError> {
        self.conn.as_mut().ok_or_else(|| {
            PgMiddlewareError::ConnectionError("connection already returned to the pool".into())
        })
    }

    pub(crate) fn release(mut self) {
        if let Some(conn) = self.conn.take() {
            conn.release();
        }
    }

    pub(crate) fn discard(mut self) {
        if let Some(conn) = self.conn.take() {
            conn.discard();
        }
    }
}

impl<C: PooledConnection> Drop for Checkout<C> {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        if self.discard_on_drop {
            warn!(
                target: "pg_named_query::pool",
                "scope ended without finishing, discarding connection"
            );
            conn.discard();
        } else {
            debug!(
                target: "pg_named_query::pool",
                "scope ended early, releasing connection"
            );
            conn.release();
        }
    }
}

/// Check a connection out of `pool`, refusing once the pool has been stopped.
pub(crate) async fn checkout<P: ConnectionPool>(
    pool: &P,
    lifecycle: &Lifecycle,
) -> Result<Checkout<P::Connection>, PgMiddlewareError> {
    lifecycle.ensure_running()?;
    let conn = pool.acquire().await?;
    lifecycle.mark_ready();
    Ok(Checkout::new(conn))
}
