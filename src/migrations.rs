//! Boundary to the schema-migration tool.
//!
//! Discovering, ordering and checksumming migration scripts belongs to the tool behind
//! [`MigrationDriver`]. This module resolves what it needs from configuration (the scripts
//! directory, the bookkeeping table and the connection profile) and hands that over.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::{MigrationsConfig, PostgresConfig};
use crate::error::PgMiddlewareError;

pub const DEFAULT_MIGRATIONS_TABLE: &str = "migrations";

/// Everything a migration tool needs for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationPlan {
    /// Absolute path of the migration scripts.
    pub directory: PathBuf,
    /// Table the tool records applied migrations in.
    pub table: String,
    /// Connection profile the tool connects with.
    pub connection: PostgresConfig,
}

/// Applies every pending migration in a plan.
///
/// Implementations must be idempotent across runs and must fail, rather than report success,
/// if any migration does not apply.
#[async_trait]
pub trait MigrationDriver: Send + Sync {
    async fn migrate(&self, plan: &MigrationPlan) -> Result<(), PgMiddlewareError>;
}

impl MigrationPlan {
    /// Resolve a plan from the migrations block, falling back to `default_connection` when
    /// the block has no connection override.
    ///
    /// # Errors
    /// `MigrationsNotConfigured` without a migrations block, `ConfigError` for an empty path,
    /// an unusable working directory, or an invalid connection profile.
    pub fn resolve(
        migrations: Option<&MigrationsConfig>,
        default_connection: &PostgresConfig,
    ) -> Result<Self, PgMiddlewareError> {
        let migrations = migrations.ok_or(PgMiddlewareError::MigrationsNotConfigured)?;
        if migrations.path.as_os_str().is_empty() {
            return Err(PgMiddlewareError::ConfigError(
                "migrations.path is required to run migrations".to_string(),
            ));
        }

        let directory = if migrations.path.is_absolute() {
            migrations.path.clone()
        } else {
            std::env::current_dir()
                .map_err(|e| {
                    PgMiddlewareError::ConfigError(format!("cannot resolve working directory: {e}"))
                })?
                .join(&migrations.path)
        };

        let connection = migrations
            .connection
            .clone()
            .unwrap_or_else(|| default_connection.clone());
        connection.validate()?;

        Ok(Self {
            directory,
            table: migrations
                .table
                .clone()
                .unwrap_or_else(|| DEFAULT_MIGRATIONS_TABLE.to_string()),
            connection,
        })
    }
}

/// Resolve the plan and run it through `driver`.
///
/// # Errors
/// Any resolution error from [`MigrationPlan::resolve`], or the driver's failure.
pub async fn run_migrations(
    migrations: Option<&MigrationsConfig>,
    default_connection: &PostgresConfig,
    driver: &dyn MigrationDriver,
) -> Result<(), PgMiddlewareError> {
    let plan = MigrationPlan::resolve(migrations, default_connection)?;
    info!(
        target: "pg_named_query::migrations",
        directory = %plan.directory.display(),
        table = %plan.table,
        "running database migrations"
    );
    driver.migrate(&plan).await?;
    debug!(target: "pg_named_query::migrations", "migrations completed");
    Ok(())
}
