use async_trait::async_trait;
use deadpool_postgres::Object;
use futures_util::{SinkExt, StreamExt};
use tokio_postgres::Client;
use tokio_util::bytes::Bytes;

use super::query::build_result_set_from_statement;
use crate::error::PgMiddlewareError;
use crate::pool::{CopySource, PooledConnection};
use crate::results::ResultSet;

#[async_trait]
impl PooledConnection for Object {
    async fn execute_text(&mut self, sql: &str) -> Result<ResultSet, PgMiddlewareError> {
        let client: &Client = &**self;
        let stmt = client.prepare(sql).await?;

        // Statements without a row description report their affected-row count instead.
        if stmt.columns().is_empty() {
            let affected = client.execute(&stmt, &[]).await?;
            let affected = usize::try_from(affected).map_err(|e| {
                PgMiddlewareError::ConnectionError(format!(
                    "postgres affected rows conversion error: {e}"
                ))
            })?;
            return Ok(ResultSet::from_rows_affected(affected));
        }

        let rows = client.query(&stmt, &[]).await?;
        build_result_set_from_statement(&stmt, &rows)
    }

    async fn execute_batch(&mut self, sql: &str) -> Result<(), PgMiddlewareError> {
        let client: &Client = &**self;
        client.batch_execute(sql).await?;
        Ok(())
    }

    async fn copy_in_stream(
        &mut self,
        statement: &str,
        mut source: CopySource<'_>,
    ) -> Result<u64, PgMiddlewareError> {
        let client: &Client = &**self;
        let sink = client.copy_in::<_, Bytes>(statement).await?;
        let mut sink = std::pin::pin!(sink);

        // Either side failing ends the loop; dropping an unfinished sink aborts the COPY
        // on the server.
        while let Some(chunk) = source.next().await {
            let chunk = chunk.map_err(PgMiddlewareError::BulkLoadSource)?;
            sink.send(chunk).await?;
        }
        let rows = sink.as_mut().finish().await?;
        Ok(rows)
    }

    fn release(self) {
        drop(self);
    }

    fn discard(self) {
        drop(Object::take(self));
    }
}
