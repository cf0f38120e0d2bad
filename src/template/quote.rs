//! Escaping rules for the three placeholder sigils.

use std::borrow::Cow;

use super::params::ParamValue;
use super::scanner::Sigil;
use crate::error::PgMiddlewareError;

// PostgreSQL keywords that are reserved (or reserved-but-usable-as-function-or-type) and so
// must be quoted when used as identifiers. Sorted for binary search.
const RESERVED_WORDS: &[&str] = &[
    "ALL", "ANALYSE", "ANALYZE", "AND", "ANY", "ARRAY", "AS", "ASC", "ASYMMETRIC",
    "AUTHORIZATION", "BINARY", "BOTH", "CASE", "CAST", "CHECK", "COLLATE", "COLLATION",
    "COLUMN", "CONCURRENTLY", "CONSTRAINT", "CREATE", "CROSS", "CURRENT_CATALOG",
    "CURRENT_DATE", "CURRENT_ROLE", "CURRENT_SCHEMA", "CURRENT_TIME", "CURRENT_TIMESTAMP",
    "CURRENT_USER", "DEFAULT", "DEFERRABLE", "DESC", "DISTINCT", "DO", "ELSE", "END",
    "EXCEPT", "FALSE", "FETCH", "FOR", "FOREIGN", "FREEZE", "FROM", "FULL", "GRANT", "GROUP",
    "HAVING", "ILIKE", "IN", "INITIALLY", "INNER", "INTERSECT", "INTO", "IS", "ISNULL", "JOIN",
    "LATERAL", "LEADING", "LEFT", "LIKE", "LIMIT", "LOCALTIME", "LOCALTIMESTAMP", "NATURAL",
    "NOT", "NOTNULL", "NULL", "OFFSET", "ON", "ONLY", "OR", "ORDER", "OUTER", "OVERLAPS",
    "PLACING", "PRIMARY", "REFERENCES", "RETURNING", "RIGHT", "SELECT", "SESSION_USER",
    "SIMILAR", "SOME", "SYMMETRIC", "SYSTEM_USER", "TABLE", "TABLESAMPLE", "THEN", "TO",
    "TRAILING", "TRUE", "UNION", "UNIQUE", "USER", "USING", "VARIADIC", "VERBOSE", "WHEN",
    "WHERE", "WINDOW", "WITH",
];

fn is_reserved(word: &str) -> bool {
    RESERVED_WORDS
        .binary_search(&word.to_ascii_uppercase().as_str())
        .is_ok()
}

fn is_plain_identifier(value: &str) -> bool {
    let bytes = value.as_bytes();
    match bytes.first() {
        Some(b) if b.is_ascii_lowercase() || *b == b'_' => {}
        _ => return false,
    }
    bytes[1..]
        .iter()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'_' || *b == b'$')
}

/// Quote an SQL identifier. Lower-case, non-reserved names are returned as-is; anything else
/// is wrapped in double quotes with embedded quotes doubled.
///
/// ```rust
/// use pg_named_query::template::quote_ident;
///
/// assert_eq!(quote_ident("things"), "things");
/// assert_eq!(quote_ident("all"), "\"all\"");
/// assert_eq!(quote_ident("My\"Table"), "\"My\"\"Table\"");
/// ```
#[must_use]
pub fn quote_ident(value: &str) -> Cow<'_, str> {
    if is_plain_identifier(value) && !is_reserved(value) {
        return Cow::Borrowed(value);
    }
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for ch in value.chars() {
        if ch == '"' {
            quoted.push('"');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    Cow::Owned(quoted)
}

/// Quote an SQL string literal. Single quotes are doubled; a value containing backslashes
/// is emitted as an `E'...'` escape string with the backslashes doubled.
#[must_use]
pub fn quote_literal(value: &str) -> String {
    let mut body = String::with_capacity(value.len() + 3);
    let mut has_backslash = false;
    for ch in value.chars() {
        match ch {
            '\'' => body.push_str("''"),
            '\\' => {
                has_backslash = true;
                body.push_str("\\\\");
            }
            _ => body.push(ch),
        }
    }

    let mut quoted = String::with_capacity(body.len() + 3);
    if has_backslash {
        quoted.push('E');
    }
    quoted.push('\'');
    quoted.push_str(&body);
    quoted.push('\'');
    quoted
}

/// Append `value` to `out`, escaped the way `sigil` demands.
pub(super) fn write_value(
    out: &mut String,
    sigil: Sigil,
    name: &str,
    value: &ParamValue,
) -> Result<(), PgMiddlewareError> {
    match (sigil, value) {
        (Sigil::Identifier, ParamValue::Null) => {
            return Err(PgMiddlewareError::NullIdentifier {
                name: name.to_string(),
            });
        }
        (Sigil::Identifier, value) => out.push_str(&quote_ident(&value.to_text())),
        (Sigil::Literal, ParamValue::Null) => out.push_str("NULL"),
        (Sigil::Literal, value) => out.push_str(&quote_literal(&value.to_text())),
        (Sigil::Raw, ParamValue::Null) => {}
        (Sigil::Raw, value) => out.push_str(&value.to_text()),
    }
    Ok(())
}
