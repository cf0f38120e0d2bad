//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::config::{MiddlewareConfig, MigrationsConfig, PoolSettings, PostgresConfig};
pub use crate::context::{ExecutionContext, PoolContext, Scope, ScopedContext};
pub use crate::error::PgMiddlewareError;
pub use crate::middleware::Middleware;
pub use crate::migrations::{MigrationDriver, MigrationPlan};
pub use crate::pool::{ConnectionPool, PoolState, PooledConnection};
pub use crate::results::{ResultRow, ResultSet};
pub use crate::template::{ParamValue, ParameterBag, QueryTemplate, TemplateStore, render};
pub use crate::transaction::{Transaction, TxState};
pub use crate::types::{IsolationLevel, RowValues};

#[cfg(feature = "postgres")]
pub use crate::middleware::PgMiddleware;
#[cfg(feature = "postgres")]
pub use crate::postgres::PgPool;
