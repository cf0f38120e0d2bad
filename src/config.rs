//! Configuration for the pool, named-query templates and migrations.
//!
//! ```rust
//! use pg_named_query::config::MiddlewareConfig;
//!
//! let config = MiddlewareConfig::from_json_str(r#"{
//!     "postgres": {
//!         "host": "localhost", "port": 5432, "user": "app",
//!         "password": "secret", "dbname": "app_db",
//!         "pool": { "max_size": 10, "acquire_timeout_ms": 5000, "idle_timeout_ms": 10000 }
//!     },
//!     "templates": { "dir": "sql" },
//!     "migrations": { "path": "migrations", "table": "schema_migrations" }
//! }"#).unwrap();
//! assert_eq!(config.postgres.pool.max_size, 10);
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::PgMiddlewareError;
use crate::template::{DEFAULT_TEMPLATE_EXTENSION, TemplateStore};

const DEFAULT_MAX_POOL_SIZE: usize = 10;

/// Connection parameters for one PostgreSQL server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostgresConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub dbname: Option<String>,
    pub application_name: Option<String>,
    #[serde(default)]
    pub pool: PoolSettings,
}

/// Pool sizing and timeouts, passed through to the pool and driver.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolSettings {
    pub max_size: usize,
    /// How long a caller waits for a free connection.
    pub acquire_timeout_ms: Option<u64>,
    /// How long establishing a new connection may take.
    pub connect_timeout_ms: Option<u64>,
    /// Idle connections older than this are evicted before checkout.
    pub idle_timeout_ms: Option<u64>,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_POOL_SIZE,
            acquire_timeout_ms: None,
            connect_timeout_ms: None,
            idle_timeout_ms: None,
        }
    }
}

impl PoolSettings {
    #[must_use]
    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout_ms.map(Duration::from_millis)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    #[must_use]
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_ms.map(Duration::from_millis)
    }
}

impl PostgresConfig {
    /// Check that every field needed to open a connection is present.
    ///
    /// # Errors
    /// Returns `PgMiddlewareError::ConfigError` naming the first missing field, or for a zero
    /// pool size.
    pub fn validate(&self) -> Result<(), PgMiddlewareError> {
        if self.dbname.is_none() {
            return Err(PgMiddlewareError::ConfigError(
                "dbname is required".to_string(),
            ));
        }
        if self.host.is_none() {
            return Err(PgMiddlewareError::ConfigError(
                "host is required".to_string(),
            ));
        }
        if self.port.is_none() {
            return Err(PgMiddlewareError::ConfigError(
                "port is required".to_string(),
            ));
        }
        if self.user.is_none() {
            return Err(PgMiddlewareError::ConfigError(
                "user is required".to_string(),
            ));
        }
        if self.password.is_none() {
            return Err(PgMiddlewareError::ConfigError(
                "password is required".to_string(),
            ));
        }
        if self.pool.max_size == 0 {
            return Err(PgMiddlewareError::ConfigError(
                "pool.max_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TemplateSettings {
    /// Directory holding `<name>.<extension>` files; named queries fail without it.
    pub dir: Option<PathBuf>,
    pub extension: String,
}

impl Default for TemplateSettings {
    fn default() -> Self {
        Self {
            dir: None,
            extension: DEFAULT_TEMPLATE_EXTENSION.to_string(),
        }
    }
}

impl TemplateSettings {
    #[must_use]
    pub fn store(&self) -> TemplateStore {
        match &self.dir {
            Some(dir) => TemplateStore::new(dir).with_extension(self.extension.clone()),
            None => TemplateStore::unconfigured().with_extension(self.extension.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MigrationsConfig {
    /// Directory of migration scripts, relative to the working directory unless absolute.
    pub path: PathBuf,
    /// Bookkeeping table; defaults to `migrations`.
    pub table: Option<String>,
    /// Connection profile for migrations; defaults to the main `postgres` block.
    pub connection: Option<PostgresConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MiddlewareConfig {
    pub postgres: PostgresConfig,
    #[serde(default)]
    pub templates: TemplateSettings,
    #[serde(default)]
    pub migrations: Option<MigrationsConfig>,
}

impl MiddlewareConfig {
    #[must_use]
    pub fn new(postgres: PostgresConfig) -> Self {
        Self {
            postgres,
            templates: TemplateSettings::default(),
            migrations: None,
        }
    }

    #[must_use]
    pub fn with_template_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.templates.dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_migrations(mut self, migrations: MigrationsConfig) -> Self {
        self.migrations = Some(migrations);
        self
    }

    /// Parse a JSON configuration document.
    ///
    /// # Errors
    /// Returns `PgMiddlewareError::ConfigError` if the document does not parse.
    pub fn from_json_str(json: &str) -> Result<Self, PgMiddlewareError> {
        serde_json::from_str(json)
            .map_err(|e| PgMiddlewareError::ConfigError(format!("invalid configuration: {e}")))
    }

    /// Read and parse a JSON configuration file.
    ///
    /// # Errors
    /// Returns `PgMiddlewareError::ConfigError` if the file cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, PgMiddlewareError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PgMiddlewareError::ConfigError(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&raw)
    }
}
