//! Transaction bracket around one pooled connection.
//!
//! `Idle -> Active -> {Committed | RolledBack} -> Released`. BEGIN moves to `Active`; the
//! bracket ends with exactly one terminal attempt (a failed COMMIT is followed by ROLLBACK),
//! and the connection is released after that attempt, never before.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::context::{Scope, ScopedContext};
use crate::error::PgMiddlewareError;
use crate::pool::{Checkout, PooledConnection};
use crate::template::TemplateStore;
use crate::types::IsolationLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Idle,
    Active,
    Committed,
    RolledBack,
    Released,
}

/// An open transaction.
///
/// Dropping a `Transaction` without calling [`commit`](Self::commit) or
/// [`rollback`](Self::rollback) (an early return, a panic, or a cancelled future) discards
/// its connection instead of returning it to the pool with the transaction still open.
#[derive(Debug)]
pub struct Transaction<C: PooledConnection> {
    ctx: Option<ScopedContext<C>>,
    state: TxState,
    level: IsolationLevel,
}

impl<C: PooledConnection> Transaction<C> {
    /// Issue `BEGIN` on `conn`. On failure the connection is released and the error returned.
    pub(crate) async fn begin(
        conn: Checkout<C>,
        templates: Arc<TemplateStore>,
        level: IsolationLevel,
    ) -> Result<Self, PgMiddlewareError> {
        let mut tx = Transaction {
            ctx: Some(ScopedContext::new(conn, templates, Scope::Transaction)),
            state: TxState::Idle,
            level,
        };

        let begin = format!("BEGIN TRANSACTION ISOLATION LEVEL {level}");
        match tx.issue(&begin).await {
            Ok(()) => {
                tx.state = TxState::Active;
                Ok(tx)
            }
            Err(err) => {
                tx.finish(true);
                Err(err)
            }
        }
    }

    #[must_use]
    pub fn state(&self) -> TxState {
        self.state
    }

    #[must_use]
    pub fn level(&self) -> IsolationLevel {
        self.level
    }

    /// The context statements inside this transaction run on.
    ///
    /// # Errors
    /// Returns `TransactionClosed` unless the transaction is active.
    pub fn context(&mut self) -> Result<&mut ScopedContext<C>, PgMiddlewareError> {
        let state = self.state;
        match (&mut self.ctx, state) {
            (Some(ctx), TxState::Active) => Ok(ctx),
            _ => Err(PgMiddlewareError::TransactionClosed {
                state: format!("{state:?}"),
            }),
        }
    }

    /// Commit. If COMMIT fails a ROLLBACK is attempted and the COMMIT error returned.
    ///
    /// # Errors
    /// Returns the COMMIT error, or `TransactionClosed` if the transaction is not active.
    pub async fn commit(mut self) -> Result<(), PgMiddlewareError> {
        self.ensure_active()?;
        match self.issue("COMMIT").await {
            Ok(()) => {
                self.state = TxState::Committed;
                self.finish(true);
                Ok(())
            }
            Err(commit_err) => {
                warn!(
                    target: "pg_named_query::transaction",
                    error = %commit_err,
                    "commit failed, rolling back"
                );
                let reusable = self.roll_back().await.is_ok();
                self.finish(reusable);
                Err(commit_err)
            }
        }
    }

    /// Roll back. A connection whose ROLLBACK failed is discarded, not recycled.
    ///
    /// # Errors
    /// Returns the ROLLBACK error, or `TransactionClosed` if the transaction is not active.
    pub async fn rollback(mut self) -> Result<(), PgMiddlewareError> {
        self.ensure_active()?;
        let outcome = self.roll_back().await;
        self.finish(outcome.is_ok());
        outcome
    }

    async fn roll_back(&mut self) -> Result<(), PgMiddlewareError> {
        let outcome = self.issue("ROLLBACK").await;
        self.state = TxState::RolledBack;
        if let Err(err) = &outcome {
            error!(target: "pg_named_query::transaction", error = %err, "rollback failed");
        }
        outcome
    }

    fn ensure_active(&self) -> Result<(), PgMiddlewareError> {
        if self.state == TxState::Active {
            Ok(())
        } else {
            Err(PgMiddlewareError::TransactionClosed {
                state: format!("{:?}", self.state),
            })
        }
    }

    async fn issue(&mut self, sql: &str) -> Result<(), PgMiddlewareError> {
        let Some(ctx) = self.ctx.as_mut() else {
            return Err(PgMiddlewareError::TransactionClosed {
                state: format!("{:?}", self.state),
            });
        };
        debug!(target: "pg_named_query::transaction", sql, "transaction control");
        ctx.connection_mut()?
            .execute_batch(sql)
            .await
            .map_err(|err| err.with_query(sql))
    }

    fn finish(&mut self, reusable: bool) {
        if let Some(ctx) = self.ctx.take() {
            if reusable {
                ctx.release();
            } else {
                warn!(
                    target: "pg_named_query::transaction",
                    "transaction state unknown, discarding connection"
                );
                ctx.discard();
            }
        }
        self.state = TxState::Released;
    }
}

impl<C: PooledConnection> Drop for Transaction<C> {
    fn drop(&mut self) {
        if let Some(ctx) = self.ctx.take() {
            warn!(
                target: "pg_named_query::transaction",
                state = ?self.state,
                "transaction dropped before commit or rollback, discarding connection"
            );
            ctx.discard();
        }
    }
}
