//! Async PostgreSQL access layer with three execution scopes and safe named-query templates.
//!
//! - [`Middleware::query`] / [`Middleware::named_query`] borrow a pooled connection per
//!   statement.
//! - [`Middleware::with_connection`] reserves one connection for a block of work.
//! - [`Middleware::with_transaction`] wraps that block in `BEGIN ... COMMIT`, rolling back
//!   when the block fails.
//!
//! Named queries are SQL files with `%I:name`, `%L:name` and `%s:name` placeholders; see
//! [`template`].

pub mod bulk;
pub mod config;
pub mod context;
pub mod error;
pub mod middleware;
pub mod migrations;
pub mod pool;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod prelude;
pub mod results;
pub mod template;
pub mod transaction;
pub mod types;

pub use context::{ExecutionContext, PoolContext, Scope, ScopedContext};
pub use error::PgMiddlewareError;
pub use middleware::Middleware;
#[cfg(feature = "postgres")]
pub use middleware::PgMiddleware;
pub use results::{ResultRow, ResultSet};
pub use template::{ParamValue, ParameterBag, QueryTemplate, render};
pub use transaction::{Transaction, TxState};
pub use types::{IsolationLevel, RowValues};
