// PostgreSQL binding
//
// - config: `PostgresConfig` -> deadpool pool
// - pool: `PgPool`, the `ConnectionPool` implementation
// - connection: `PooledConnection` for a checked-out deadpool object
// - query: result extraction from driver rows

pub mod config;
pub mod connection;
pub mod pool;
pub mod query;

pub use pool::PgPool;
pub use query::{build_result_set_from_statement, postgres_extract_value};
