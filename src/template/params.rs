use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;

use serde_json::Value as JsonValue;

use crate::error::PgMiddlewareError;

/// A value bound to a template placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Text(String),
    Int(i64),
    Float(f64),
    Null,
}

impl ParamValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, ParamValue::Null)
    }

    /// Unescaped textual form used before sigil-specific quoting.
    pub(super) fn to_text(&self) -> String {
        match self {
            ParamValue::Text(s) => s.clone(),
            ParamValue::Int(i) => i.to_string(),
            ParamValue::Float(f) => f.to_string(),
            ParamValue::Null => String::new(),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Null => f.write_str("null"),
            other => f.write_str(&other.to_text()),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(i64::from(value))
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(ParamValue::Null, Into::into)
    }
}

/// Named parameters for a query template.
///
/// Keys are unique: inserting a name twice is an error rather than an overwrite.
///
/// ```rust
/// use pg_named_query::prelude::*;
///
/// # fn main() -> Result<(), PgMiddlewareError> {
/// let params = ParameterBag::try_from_pairs([
///     ("colName", ParamValue::from("bar")),
///     ("fooVal", ParamValue::from("oink")),
/// ])?;
/// assert_eq!(params.len(), 2);
/// assert!(ParameterBag::try_from_pairs([("a", 1), ("a", 2)]).is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterBag {
    values: BTreeMap<String, ParamValue>,
}

impl ParameterBag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a bag from name/value pairs.
    ///
    /// # Errors
    /// Returns `PgMiddlewareError::DuplicateParameter` if a name appears more than once.
    pub fn try_from_pairs<I, K, V>(pairs: I) -> Result<Self, PgMiddlewareError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ParamValue>,
    {
        let mut bag = Self::new();
        for (name, value) in pairs {
            bag.insert(name, value)?;
        }
        Ok(bag)
    }

    /// Build a bag from a JSON object whose values are strings, numbers or null.
    ///
    /// # Errors
    /// Returns `PgMiddlewareError::InvalidParameterValue` if `value` is not an object, or a
    /// member holds a boolean, array, object, or a number outside the `i64`/`f64` range.
    pub fn from_json(value: &JsonValue) -> Result<Self, PgMiddlewareError> {
        let JsonValue::Object(members) = value else {
            return Err(PgMiddlewareError::InvalidParameterValue(
                "parameters must be a JSON object".to_string(),
            ));
        };

        let mut bag = Self::new();
        for (name, member) in members {
            let param = match member {
                JsonValue::Null => ParamValue::Null,
                JsonValue::String(s) => ParamValue::Text(s.clone()),
                JsonValue::Number(n) => match (n.as_i64(), n.as_f64()) {
                    (Some(i), _) => ParamValue::Int(i),
                    (None, Some(f)) => ParamValue::Float(f),
                    (None, None) => {
                        return Err(PgMiddlewareError::InvalidParameterValue(format!(
                            "`{name}` is out of range: {n}"
                        )));
                    }
                },
                other => {
                    return Err(PgMiddlewareError::InvalidParameterValue(format!(
                        "`{name}` must be a string, number or null, got {other}"
                    )));
                }
            };
            bag.insert(name.as_str(), param)?;
        }
        Ok(bag)
    }

    /// Add one parameter.
    ///
    /// # Errors
    /// Returns `PgMiddlewareError::DuplicateParameter` if `name` is already present.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<ParamValue>,
    ) -> Result<&mut Self, PgMiddlewareError> {
        match self.values.entry(name.into()) {
            Entry::Occupied(entry) => Err(PgMiddlewareError::DuplicateParameter {
                name: entry.key().clone(),
            }),
            Entry::Vacant(entry) => {
                entry.insert(value.into());
                Ok(self)
            }
        }
    }

    /// Builder form of [`insert`](Self::insert).
    ///
    /// # Errors
    /// Returns `PgMiddlewareError::DuplicateParameter` if `name` is already present.
    pub fn with(
        mut self,
        name: impl Into<String>,
        value: impl Into<ParamValue>,
    ) -> Result<Self, PgMiddlewareError> {
        self.insert(name, value)?;
        Ok(self)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
