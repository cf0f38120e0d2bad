mod common;

use std::time::Duration;

use common::{Event, MemoryPool, middleware, texts};
use pg_named_query::prelude::*;
use tokio::runtime::Runtime;

/// Error type owned by the calling application.
#[derive(Debug)]
enum FarmError {
    Db(PgMiddlewareError),
    NotEnoughPigs(usize),
}

impl From<PgMiddlewareError> for FarmError {
    fn from(err: PgMiddlewareError) -> Self {
        FarmError::Db(err)
    }
}

#[test]
fn test03_commit_happens_before_release() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let pool = MemoryPool::default();
        let db = middleware(&pool);

        let seen = db
            .with_transaction(|tx| {
                Box::pin(async move {
                    assert_eq!(tx.scope(), Scope::Transaction);
                    tx.query("INSERT Babe").await?;
                    let rs = tx.query("SELECT *").await?;
                    Ok::<_, PgMiddlewareError>(texts(&rs))
                })
            })
            .await?;

        // Uncommitted writes were visible inside the transaction.
        assert_eq!(seen, ["Babe"]);
        assert_eq!(pool.committed(), ["Babe"]);
        assert_eq!(
            pool.events(),
            [
                Event::Acquired(0),
                Event::Executed(0, "BEGIN TRANSACTION ISOLATION LEVEL READ COMMITTED".into()),
                Event::Executed(0, "INSERT Babe".into()),
                Event::Executed(0, "SELECT *".into()),
                Event::Executed(0, "COMMIT".into()),
                Event::Released(0),
            ]
        );
        Ok(())
    })
}

#[test]
fn test03_writes_are_invisible_outside_until_commit() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let pool = MemoryPool::default();
        let db = middleware(&pool);
        let outside = db.clone();

        db.with_transaction(|tx| {
            Box::pin(async move {
                tx.query("INSERT Wilbur").await?;
                let rs = outside.query("SELECT *").await?;
                assert!(rs.is_empty());
                Ok::<_, PgMiddlewareError>(())
            })
        })
        .await?;

        assert_eq!(texts(&db.query("SELECT *").await?), ["Wilbur"]);
        Ok(())
    })
}

#[test]
fn test03_callback_error_rolls_back_and_is_returned_unchanged() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let pool = MemoryPool::default();
        pool.seed(&["Old Major"]);
        let db = middleware(&pool);

        let outcome = db
            .with_transaction(|tx| {
                Box::pin(async move {
                    tx.query("INSERT Boxer").await?;
                    let rs = tx.query("SELECT *").await?;
                    if rs.len() < 5 {
                        return Err(FarmError::NotEnoughPigs(rs.len()));
                    }
                    Ok(())
                })
            })
            .await;

        assert!(matches!(outcome, Err(FarmError::NotEnoughPigs(2))));
        assert_eq!(pool.committed(), ["Old Major"]);
        assert_eq!(
            pool.events()[pool.events().len() - 2..],
            [Event::Executed(0, "ROLLBACK".into()), Event::Released(0)]
        );
        assert!(!pool.statements().contains(&"COMMIT".to_string()));
        Ok(())
    })
}

#[test]
fn test03_failed_statement_rolls_back() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let pool = MemoryPool::default();
        let db = middleware(&pool);

        let outcome = db
            .with_transaction(|tx| {
                Box::pin(async move {
                    tx.query("INSERT Clover").await?;
                    tx.query("garbage").await?;
                    Ok::<_, FarmError>(())
                })
            })
            .await;

        match outcome {
            Err(FarmError::Db(PgMiddlewareError::Query { query, .. })) => {
                assert_eq!(query, "garbage");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(pool.committed().is_empty());
        assert_eq!(pool.outstanding(), 0);
        Ok(())
    })
}

#[test]
fn test03_commit_failure_triggers_rollback() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let pool = MemoryPool::default();
        pool.fail_on("COMMIT");
        let db = middleware(&pool);

        let outcome = db
            .with_transaction(|tx| {
                Box::pin(async move {
                    tx.query("INSERT Benjamin").await?;
                    Ok::<_, PgMiddlewareError>("should not be seen")
                })
            })
            .await;

        let err = outcome.unwrap_err();
        assert!(matches!(&err, PgMiddlewareError::Query { query, .. } if query == "COMMIT"));
        assert!(pool.committed().is_empty());
        assert_eq!(
            pool.events()[pool.events().len() - 3..],
            [
                Event::Executed(0, "COMMIT".into()),
                Event::Executed(0, "ROLLBACK".into()),
                Event::Released(0),
            ]
        );
        Ok(())
    })
}

#[test]
fn test03_rollback_failure_discards_connection_and_keeps_original_error()
-> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let pool = MemoryPool::default();
        pool.fail_on("ROLLBACK");
        let db = middleware(&pool);

        let outcome = db
            .with_transaction(|tx| {
                Box::pin(async move {
                    tx.query("INSERT Mollie").await?;
                    Err::<(), _>(FarmError::NotEnoughPigs(1))
                })
            })
            .await;

        assert!(matches!(outcome, Err(FarmError::NotEnoughPigs(1))));
        assert_eq!(pool.events().last(), Some(&Event::Discarded(0)));
        assert!(!pool.events().contains(&Event::Released(0)));
        assert_eq!(pool.outstanding(), 0);
        Ok(())
    })
}

#[test]
fn test03_begin_failure_releases_connection() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let pool = MemoryPool::default();
        pool.fail_on("BEGIN");
        let db = middleware(&pool);

        let mut ran = false;
        let outcome = db
            .with_transaction(|tx| {
                ran = true;
                Box::pin(async move { tx.query("INSERT Muriel").await })
            })
            .await;

        assert!(outcome.is_err());
        assert!(!ran);
        assert_eq!(pool.statements().len(), 1);
        assert_eq!(pool.outstanding(), 0);
        Ok(())
    })
}

#[test]
fn test03_cancelled_transaction_discards_connection() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let pool = MemoryPool::default();
        let db = middleware(&pool);

        let outcome = tokio::time::timeout(
            Duration::from_millis(20),
            db.with_transaction(|tx| {
                Box::pin(async move {
                    tx.query("INSERT Squealer").await?;
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok::<_, PgMiddlewareError>(())
                })
            }),
        )
        .await;

        assert!(outcome.is_err(), "the timeout should have fired");
        assert!(pool.committed().is_empty());
        assert_eq!(pool.events().last(), Some(&Event::Discarded(0)));
        assert_eq!(pool.outstanding(), 0);
        Ok(())
    })
}

#[test]
fn test03_isolation_level_is_sent_with_begin() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let pool = MemoryPool::default();
        let db = middleware(&pool);

        db.with_transaction_level(IsolationLevel::Serializable, |tx| {
            Box::pin(async move { tx.query("SELECT 1").await })
        })
        .await?;

        assert_eq!(
            pool.statements(),
            [
                "BEGIN TRANSACTION ISOLATION LEVEL SERIALIZABLE",
                "SELECT 1",
                "COMMIT"
            ]
        );
        Ok(())
    })
}

#[test]
fn test03_explicit_transaction_guard() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::new()?;
    rt.block_on(async {
        let pool = MemoryPool::default();
        let db = middleware(&pool);

        let mut tx = db.begin_transaction(IsolationLevel::RepeatableRead).await?;
        assert_eq!(tx.state(), TxState::Active);
        assert_eq!(tx.level(), IsolationLevel::RepeatableRead);
        tx.context()?.query("INSERT Jessie").await?;
        tx.commit().await?;
        assert_eq!(pool.committed(), ["Jessie"]);

        let mut tx = db.begin_transaction(IsolationLevel::default()).await?;
        tx.context()?.query("INSERT Bluebell").await?;
        tx.rollback().await?;
        assert_eq!(pool.committed(), ["Jessie"]);

        // Dropped without commit or rollback.
        {
            let mut tx = db.begin_transaction(IsolationLevel::default()).await?;
            tx.context()?.query("INSERT Pincher").await?;
        }
        assert_eq!(pool.committed(), ["Jessie"]);
        assert_eq!(pool.events().last(), Some(&Event::Discarded(2)));
        assert_eq!(pool.outstanding(), 0);
        Ok(())
    })
}

#[test]
fn test03_panicking_body_discards_connection() -> Result<(), Box<dyn std::error::Error>> {
    let pool = MemoryPool::default();
    let db = middleware(&pool);

    let handle = std::thread::spawn(move || {
        let rt = Runtime::new().unwrap();
        rt.block_on(db.with_transaction(|tx| {
            Box::pin(async move {
                tx.query("INSERT Minimus").await?;
                if tx.scope() == Scope::Transaction {
                    panic!("body blew up");
                }
                Ok::<_, PgMiddlewareError>(())
            })
        }))
    });
    assert!(handle.join().is_err());

    assert!(pool.committed().is_empty());
    assert_eq!(pool.events().last(), Some(&Event::Discarded(0)));
    Ok(())
}
