//! Named-query templates.
//!
//! A template is SQL text with `%<sigil>:<name>` placeholders:
//! - `%I:name` renders the value as a quoted identifier,
//! - `%L:name` renders a quoted literal (or `NULL`),
//! - `%s:name` splices the value in verbatim and must never carry untrusted input.
//!
//! When a template has at least one placeholder, `%%` renders as a single `%` (so
//! `LIKE 'ab%%'` becomes `LIKE 'ab%'`). A template without placeholders is returned untouched,
//! `%%` included.
//!
//! Each occurrence is classified on its own, so a name may repeat and may even be used under
//! different sigils in one template. Every referenced name must be present in the
//! [`ParameterBag`]; unreferenced names are ignored.

use std::borrow::Cow;
use std::collections::BTreeSet;

use tracing::trace;

use crate::error::PgMiddlewareError;

mod params;
mod quote;
mod scanner;
mod store;

pub use params::{ParamValue, ParameterBag};
pub use quote::{quote_ident, quote_literal};
pub use scanner::{Placeholder, Sigil};
pub use store::{DEFAULT_TEMPLATE_EXTENSION, TemplateStore};

use scanner::Segment;

/// A parsed query template.
#[derive(Debug, Clone)]
pub struct QueryTemplate<'a> {
    source: &'a str,
    segments: Vec<Segment<'a>>,
}

impl<'a> QueryTemplate<'a> {
    #[must_use]
    pub fn parse(source: &'a str) -> Self {
        Self {
            source,
            segments: scanner::scan(source),
        }
    }

    #[must_use]
    pub fn source(&self) -> &'a str {
        self.source
    }

    /// Placeholders in occurrence order, repeats included.
    pub fn placeholders(&self) -> impl Iterator<Item = Placeholder<'a>> + '_ {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Placeholder(placeholder) => Some(*placeholder),
            Segment::Text(_) => None,
        })
    }

    /// The set of parameter names a bag must provide to render this template.
    #[must_use]
    pub fn parameter_names(&self) -> BTreeSet<&'a str> {
        self.placeholders().map(|p| p.name).collect()
    }

    /// Substitute `params` into the template.
    ///
    /// # Errors
    /// `MissingParameter` if any referenced name is absent from `params` (checked before any
    /// output is produced), `NullIdentifier` if an `%I` placeholder is bound to null.
    pub fn render(&self, params: &ParameterBag) -> Result<Cow<'a, str>, PgMiddlewareError> {
        if !self
            .segments
            .iter()
            .any(|s| matches!(s, Segment::Placeholder(_)))
        {
            return Ok(Cow::Borrowed(self.source));
        }

        // Resolve every occurrence first so a missing key fails before anything is built.
        let values = self
            .placeholders()
            .map(|p| {
                params
                    .get(p.name)
                    .map(|value| (p, value))
                    .ok_or_else(|| PgMiddlewareError::MissingParameter {
                        name: p.name.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = String::with_capacity(self.source.len() + values.len() * 8);
        let mut values = values.into_iter();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Placeholder(_) => {
                    if let Some((placeholder, value)) = values.next() {
                        quote::write_value(&mut out, placeholder.sigil, placeholder.name, value)?;
                    }
                }
            }
        }
        Ok(Cow::Owned(out))
    }
}

/// Render `template` with `params`.
///
/// Returns the input unchanged (borrowed) when it contains no placeholders.
///
/// ```rust
/// use pg_named_query::prelude::*;
///
/// # fn main() -> Result<(), PgMiddlewareError> {
/// let params = ParameterBag::new()
///     .with("col", "things")?
///     .with("tbl", "all.the_things")?
///     .with("val", 10)?
///     .with("lit", "1=1")?;
/// let sql = render("SELECT %I:col FROM %I:tbl WHERE v = %L:val AND %s:lit", &params)?;
/// assert_eq!(sql, r#"SELECT things FROM "all.the_things" WHERE v = '10' AND 1=1"#);
/// # Ok(())
/// # }
/// ```
///
/// # Errors
/// See [`QueryTemplate::render`].
pub fn render<'a>(
    template: &'a str,
    params: &ParameterBag,
) -> Result<Cow<'a, str>, PgMiddlewareError> {
    if !scanner::has_placeholders(template) {
        return Ok(Cow::Borrowed(template));
    }
    trace!(
        target: "pg_named_query::render",
        template,
        params = ?params.names().collect::<Vec<_>>(),
        "rendering query template"
    );
    QueryTemplate::parse(template).render(params)
}
