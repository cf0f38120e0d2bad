mod common;

use std::io;

use common::{Event, MemoryPool, middleware};
use futures_util::stream;
use pg_named_query::prelude::*;
use tokio::runtime::Runtime;
use tokio_util::bytes::Bytes;

#[test]
fn test04_pooled_copy_from_reader() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let pool = MemoryPool::default();
        let db = middleware(&pool);

        let data: &[u8] = b"Babe\t1\nWilbur\t\nNapoleon\t3\n";
        let loaded = db.copy_to_table("public", "pigs", data).await?;

        assert_eq!(loaded, 3);
        assert_eq!(pool.committed(), ["Babe", "Wilbur", "Napoleon"]);
        assert_eq!(
            pool.statements()[0],
            "COPY public.pigs FROM STDIN WITH NULL AS ''"
        );
        assert_eq!(pool.events().last(), Some(&Event::Released(0)));
        Ok(())
    })
}

#[test]
fn test04_source_error_aborts_and_releases() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let pool = MemoryPool::default();
        let db = middleware(&pool);

        let chunks = stream::iter(vec![
            Ok(Bytes::from_static(b"Boxer\n")),
            Err(io::Error::new(io::ErrorKind::UnexpectedEof, "upstream hung up")),
        ]);
        let err = db
            .copy_stream_to_table("Farm", "Animals", chunks)
            .await
            .unwrap_err();

        assert!(matches!(err, PgMiddlewareError::BulkLoadSource(_)));
        assert!(pool.committed().is_empty());
        assert_eq!(
            pool.statements(),
            [r#"COPY "Farm"."Animals" FROM STDIN WITH NULL AS ''"#]
        );
        assert_eq!(pool.outstanding(), 0);
        Ok(())
    })
}

#[test]
fn test04_copy_inside_transaction_shares_its_connection() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let pool = MemoryPool::default();
        let db = middleware(&pool);

        let outcome = db
            .with_transaction(|tx| {
                Box::pin(async move {
                    let data: &[u8] = b"Clover\nMuriel\n";
                    tx.copy_to_table("public", "pigs", data).await?;
                    tx.query("broken").await?;
                    Ok::<_, PgMiddlewareError>(())
                })
            })
            .await;

        assert!(outcome.is_err());
        // The copy was rolled back along with everything else.
        assert!(pool.committed().is_empty());
        let events = pool.events();
        assert!(events.iter().all(|e| match e {
            Event::Acquired(id) | Event::Released(id) | Event::Discarded(id) => *id == 0,
            Event::Executed(id, _) => *id == 0,
        }));
        assert!(events.contains(&Event::Executed(0, "INSERT Clover".into())));
        Ok(())
    })
}

#[test]
fn test04_copy_on_stopped_pool_fails() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let pool = MemoryPool::default();
        let db = middleware(&pool);
        db.stop().await;

        let data: &[u8] = b"Jessie\n";
        let err = db.copy_to_table("public", "pigs", data).await.unwrap_err();
        assert!(matches!(err, PgMiddlewareError::PoolStopped));
        assert!(pool.events().is_empty());
        Ok(())
    })
}
