//! Bulk loading through the server-side `COPY ... FROM STDIN` channel.

use futures_util::{Stream, StreamExt};
use tokio::io::AsyncRead;
use tokio_util::bytes::Bytes;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::error::PgMiddlewareError;
use crate::pool::PooledConnection;
use crate::template::quote_ident;

/// `COPY schema.table FROM STDIN` with empty fields read as NULL.
#[must_use]
pub fn copy_statement(schema: &str, table: &str) -> String {
    format!(
        "COPY {}.{} FROM STDIN WITH NULL AS ''",
        quote_ident(schema),
        quote_ident(table)
    )
}

pub(crate) fn reader_source<R>(reader: R) -> ReaderStream<R>
where
    R: AsyncRead,
{
    ReaderStream::new(reader)
}

/// Stream `source` into `schema.table` over `conn`. The connection is only borrowed; whoever
/// checked it out still owns its release.
pub(crate) async fn copy_stream<C, S>(
    conn: &mut C,
    schema: &str,
    table: &str,
    source: S,
) -> Result<u64, PgMiddlewareError>
where
    C: PooledConnection,
    S: Stream<Item = Result<Bytes, std::io::Error>> + Send,
{
    let statement = copy_statement(schema, table);
    debug!(target: "pg_named_query::copy", statement = %statement, "starting bulk load");
    let rows = conn
        .copy_in_stream(&statement, source.boxed())
        .await
        .map_err(|err| err.with_query(&statement))?;
    debug!(target: "pg_named_query::copy", rows, "bulk load finished");
    Ok(rows)
}
