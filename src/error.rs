use std::path::PathBuf;

use thiserror::Error;

#[cfg(feature = "postgres")]
use deadpool_postgres::{CreatePoolError, PoolError};
#[cfg(feature = "postgres")]
use tokio_postgres;

#[derive(Debug, Error)]
pub enum PgMiddlewareError {
    #[cfg(feature = "postgres")]
    #[error(transparent)]
    Postgres(#[from] tokio_postgres::Error),

    #[cfg(feature = "postgres")]
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[cfg(feature = "postgres")]
    #[error(transparent)]
    CreatePool(#[from] CreatePoolError),

    /// A driver failure annotated with the SQL text that caused it.
    #[error("query failed: {source} (query: {query})")]
    Query {
        query: String,
        #[source]
        source: Box<PgMiddlewareError>,
    },

    #[error("template references parameter `{name}` which was not supplied")]
    MissingParameter { name: String },

    #[error("SQL identifier cannot be null (parameter `{name}`)")]
    NullIdentifier { name: String },

    #[error("parameter `{name}` supplied more than once")]
    DuplicateParameter { name: String },

    #[error("Invalid parameter value: {0}")]
    InvalidParameterValue(String),

    #[error(
        "cannot run named query `{query}`: no template directory configured; \
         named queries need the template path set when the middleware is initialised"
    )]
    NoTemplateDirectoryConfigured { query: String },

    #[error("invalid named query `{query}`: names must be relative paths without `.` or `..` segments")]
    InvalidQueryName { query: String },

    #[error("template for named query `{query}` not found at {}: {source}", path.display())]
    TemplateNotFound {
        query: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("bulk load source stream failed: {0}")]
    BulkLoadSource(#[source] std::io::Error),

    #[error("transaction is no longer active (state: {state})")]
    TransactionClosed { state: String },

    #[error("connection pool has been stopped")]
    PoolStopped,

    #[error("cannot run migrations without a migrations configuration block")]
    MigrationsNotConfigured,

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),
}

impl PgMiddlewareError {
    pub(crate) fn with_query(self, query: &str) -> Self {
        match self {
            // Already annotated, or not a driver failure.
            err @ (Self::Query { .. }
            | Self::PoolStopped
            | Self::TransactionClosed { .. }
            | Self::BulkLoadSource(_)) => err,
            err => Self::Query {
                query: query.to_string(),
                source: Box::new(err),
            },
        }
    }

    /// The innermost error, skipping any query-text annotation.
    #[must_use]
    pub fn root(&self) -> &PgMiddlewareError {
        match self {
            Self::Query { source, .. } => source.root(),
            other => other,
        }
    }

    /// The server SQLSTATE code when this wraps a database error.
    #[cfg(feature = "postgres")]
    #[must_use]
    pub fn sql_state(&self) -> Option<&tokio_postgres::error::SqlState> {
        match self.root() {
            Self::Postgres(err) => err.code(),
            _ => None,
        }
    }
}
