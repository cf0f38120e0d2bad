use std::path::{Component, Path, PathBuf};

use crate::error::PgMiddlewareError;

pub const DEFAULT_TEMPLATE_EXTENSION: &str = "sql";

/// Locates named-query templates on disk: `<dir>/<name>.<extension>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateStore {
    dir: Option<PathBuf>,
    extension: String,
}

impl Default for TemplateStore {
    fn default() -> Self {
        Self::unconfigured()
    }
}

impl TemplateStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            extension: DEFAULT_TEMPLATE_EXTENSION.to_string(),
        }
    }

    /// A store with no directory; every named query fails with
    /// `NoTemplateDirectoryConfigured`.
    #[must_use]
    pub fn unconfigured() -> Self {
        Self {
            dir: None,
            extension: DEFAULT_TEMPLATE_EXTENSION.to_string(),
        }
    }

    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    #[must_use]
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Map a query name to its template path.
    ///
    /// # Errors
    /// `NoTemplateDirectoryConfigured` without a directory; `InvalidQueryName` for names that
    /// are empty, absolute, or contain `.`/`..` segments.
    pub fn resolve(&self, query_name: &str) -> Result<PathBuf, PgMiddlewareError> {
        let Some(dir) = &self.dir else {
            return Err(PgMiddlewareError::NoTemplateDirectoryConfigured {
                query: query_name.to_string(),
            });
        };

        let relative = Path::new(query_name);
        let well_formed = !query_name.is_empty()
            && !query_name.contains('\\')
            && !query_name.ends_with('/')
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !well_formed {
            return Err(PgMiddlewareError::InvalidQueryName {
                query: query_name.to_string(),
            });
        }

        Ok(dir.join(format!("{query_name}.{}", self.extension)))
    }

    /// Read the template text for `query_name`.
    ///
    /// # Errors
    /// Any error from [`resolve`](Self::resolve), or `TemplateNotFound` when the file is
    /// missing or unreadable.
    pub async fn load(&self, query_name: &str) -> Result<String, PgMiddlewareError> {
        let path = self.resolve(query_name)?;
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| PgMiddlewareError::TemplateNotFound {
                query: query_name.to_string(),
                path,
                source,
            })
    }
}
