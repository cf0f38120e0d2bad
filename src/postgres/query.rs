use std::error::Error as StdError;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde_json::Value;
use tokio_postgres::types::{FromSql, Kind, Type};
use tokio_postgres::{Row, Statement};
use tracing::debug;
use uuid::Uuid;

use crate::error::PgMiddlewareError;
use crate::results::ResultSet;
use crate::types::RowValues;

type DecodeError = Box<dyn StdError + Sync + Send>;

/// The undecoded wire value of any column type.
struct RawValue(Vec<u8>);

impl<'a> FromSql<'a> for RawValue {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, DecodeError> {
        Ok(RawValue(raw.to_vec()))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

/// `interval` as sent by the server: microseconds, days and months kept apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PgInterval {
    months: i32,
    days: i32,
    micros: i64,
}

impl<'a> FromSql<'a> for PgInterval {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, DecodeError> {
        let (Some(micros), Some(days), Some(months)) = (
            raw.get(0..8).and_then(|b| b.try_into().ok()),
            raw.get(8..12).and_then(|b| b.try_into().ok()),
            raw.get(12..16).and_then(|b| b.try_into().ok()),
        ) else {
            return Err(format!("invalid interval length {}", raw.len()).into());
        };
        Ok(PgInterval {
            micros: i64::from_be_bytes(micros),
            days: i32::from_be_bytes(days),
            months: i32::from_be_bytes(months),
        })
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::INTERVAL
    }
}

fn plural(n: i32, unit: &str) -> String {
    if n == 1 || n == -1 {
        format!("{n} {unit}")
    } else {
        format!("{n} {unit}s")
    }
}

impl std::fmt::Display for PgInterval {
    /// Same layout as the server's default `IntervalStyle`, e.g. `1 year 2 mons -3 days +04:05:06`.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        let years = self.months / 12;
        let months = self.months % 12;
        if years != 0 {
            parts.push(plural(years, "year"));
        }
        if months != 0 {
            parts.push(plural(months, "mon"));
        }
        if self.days != 0 {
            parts.push(plural(self.days, "day"));
        }

        if self.micros != 0 || parts.is_empty() {
            let negative_before = self.months < 0 || self.days < 0;
            let sign = if self.micros < 0 {
                "-"
            } else if negative_before {
                "+"
            } else {
                ""
            };
            let total = self.micros.unsigned_abs();
            let hours = total / 3_600_000_000;
            let minutes = total / 60_000_000 % 60;
            let seconds = total / 1_000_000 % 60;
            let fraction = total % 1_000_000;
            let mut time = format!("{sign}{hours:02}:{minutes:02}:{seconds:02}");
            if fraction > 0 {
                let digits = format!("{fraction:06}");
                time.push('.');
                time.push_str(digits.trim_end_matches('0'));
            }
            parts.push(time);
        }
        f.write_str(&parts.join(" "))
    }
}

/// Text form of the `numeric` special values, which have no `Decimal` representation.
fn numeric_special(raw: &[u8]) -> Option<&'static str> {
    let sign = u16::from_be_bytes(raw.get(4..6)?.try_into().ok()?);
    match sign {
        0xC000 => Some("NaN"),
        0xD000 => Some("Infinity"),
        0xF000 => Some("-Infinity"),
        _ => None,
    }
}

fn array<'a, T, F>(row: &'a Row, idx: usize, to_json: F) -> Result<RowValues, tokio_postgres::Error>
where
    T: FromSql<'a>,
    F: Fn(T) -> Value,
{
    let val: Option<Vec<Option<T>>> = row.try_get(idx)?;
    Ok(val.map_or(RowValues::Null, |items| {
        RowValues::JSON(Value::Array(
            items
                .into_iter()
                .map(|item| item.map_or(Value::Null, &to_json))
                .collect(),
        ))
    }))
}

fn extract_typed(row: &Row, idx: usize) -> Result<RowValues, tokio_postgres::Error> {
    let ty = row.columns()[idx].type_();

    let value = match ty.name() {
        "int2" => {
            let val: Option<i16> = row.try_get(idx)?;
            val.map_or(RowValues::Null, |v| RowValues::Int(i64::from(v)))
        }
        "int4" => {
            let val: Option<i32> = row.try_get(idx)?;
            val.map_or(RowValues::Null, |v| RowValues::Int(i64::from(v)))
        }
        "int8" => {
            let val: Option<i64> = row.try_get(idx)?;
            val.map_or(RowValues::Null, RowValues::Int)
        }
        "oid" => {
            let val: Option<u32> = row.try_get(idx)?;
            val.map_or(RowValues::Null, |v| RowValues::Int(i64::from(v)))
        }
        "float4" => {
            let val: Option<f32> = row.try_get(idx)?;
            val.map_or(RowValues::Null, |v| RowValues::Float(f64::from(v)))
        }
        "float8" => {
            let val: Option<f64> = row.try_get(idx)?;
            val.map_or(RowValues::Null, RowValues::Float)
        }
        // Exact decimals stay text so no precision is lost.
        "numeric" => {
            let val: Option<Decimal> = row.try_get(idx)?;
            val.map_or(RowValues::Null, |v| RowValues::Text(v.to_string()))
        }
        "bool" => {
            let val: Option<bool> = row.try_get(idx)?;
            val.map_or(RowValues::Null, RowValues::Bool)
        }
        "char" => {
            let val: Option<i8> = row.try_get(idx)?;
            val.map_or(RowValues::Null, |v| {
                RowValues::Text(char::from(v as u8).to_string())
            })
        }
        "uuid" => {
            let val: Option<Uuid> = row.try_get(idx)?;
            val.map_or(RowValues::Null, |v| RowValues::Text(v.to_string()))
        }
        "timestamp" => {
            let val: Option<NaiveDateTime> = row.try_get(idx)?;
            val.map_or(RowValues::Null, RowValues::Timestamp)
        }
        "timestamptz" => {
            let val: Option<chrono::DateTime<chrono::Utc>> = row.try_get(idx)?;
            val.map_or(RowValues::Null, |v| RowValues::Timestamp(v.naive_utc()))
        }
        "date" => {
            let val: Option<NaiveDate> = row.try_get(idx)?;
            val.and_then(|d| d.and_hms_opt(0, 0, 0))
                .map_or(RowValues::Null, RowValues::Timestamp)
        }
        "time" => {
            let val: Option<NaiveTime> = row.try_get(idx)?;
            val.map_or(RowValues::Null, |v| RowValues::Text(v.to_string()))
        }
        "interval" => {
            let val: Option<PgInterval> = row.try_get(idx)?;
            val.map_or(RowValues::Null, |v| RowValues::Text(v.to_string()))
        }
        "json" | "jsonb" => {
            let val: Option<Value> = row.try_get(idx)?;
            val.map_or(RowValues::Null, RowValues::JSON)
        }
        "bytea" => {
            let val: Option<Vec<u8>> = row.try_get(idx)?;
            val.map_or(RowValues::Null, RowValues::Blob)
        }
        "_int2" => array(row, idx, |v: i16| Value::from(v))?,
        "_int4" => array(row, idx, |v: i32| Value::from(v))?,
        "_int8" => array(row, idx, |v: i64| Value::from(v))?,
        "_float4" => array(row, idx, |v: f32| Value::from(v))?,
        "_float8" => array(row, idx, |v: f64| Value::from(v))?,
        "_bool" => array(row, idx, |v: bool| Value::from(v))?,
        "_numeric" => array(row, idx, |v: Decimal| Value::from(v.to_string()))?,
        "_uuid" => array(row, idx, |v: Uuid| Value::from(v.to_string()))?,
        "_text" | "_varchar" | "_bpchar" | "_name" => array(row, idx, |v: String| Value::from(v))?,
        "_json" | "_jsonb" => array(row, idx, |v: Value| v)?,
        // text, varchar, bpchar, name, citext and the like
        _ if <String as FromSql>::accepts(ty) => {
            let val: Option<String> = row.try_get(idx)?;
            val.map_or(RowValues::Null, RowValues::Text)
        }
        _ => raw_value(row, idx)?,
    };
    Ok(value)
}

/// Values with no mapping above, or that their mapped type cannot hold (`numeric` NaN,
/// multi-dimensional arrays, `infinity` timestamps). Enum labels come back as text; anything
/// else keeps its wire bytes.
fn raw_value(row: &Row, idx: usize) -> Result<RowValues, tokio_postgres::Error> {
    let ty = row.columns()[idx].type_();
    let val: Option<RawValue> = row.try_get(idx)?;
    let Some(RawValue(raw)) = val else {
        return Ok(RowValues::Null);
    };

    if *ty == Type::NUMERIC {
        if let Some(special) = numeric_special(&raw) {
            return Ok(RowValues::Text(special.to_string()));
        }
    }
    if matches!(ty.kind(), Kind::Enum(_)) {
        if let Ok(label) = String::from_utf8(raw.clone()) {
            return Ok(RowValues::Text(label));
        }
    }
    Ok(RowValues::Blob(raw))
}

/// Extracts a `RowValues` from a `tokio_postgres` Row at the given index.
///
/// Every column type yields a value: types without a dedicated mapping, and values their
/// mapped Rust type cannot represent, fall back to their raw bytes.
///
/// # Errors
/// Returns `PgMiddlewareError` only if the driver cannot hand over the column at all.
pub fn postgres_extract_value(row: &Row, idx: usize) -> Result<RowValues, PgMiddlewareError> {
    match extract_typed(row, idx) {
        Ok(value) => Ok(value),
        Err(err) => {
            let column = &row.columns()[idx];
            debug!(
                target: "pg_named_query::query",
                column = column.name(),
                pg_type = %column.type_(),
                error = %err,
                "value does not fit its mapped type, keeping raw bytes"
            );
            Ok(raw_value(row, idx)?)
        }
    }
}

/// Build a result set using statement metadata for column names.
///
/// # Errors
/// Returns errors from row value extraction.
pub fn build_result_set_from_statement(
    stmt: &Statement,
    rows: &[Row],
) -> Result<ResultSet, PgMiddlewareError> {
    let column_names: Vec<String> = stmt
        .columns()
        .iter()
        .map(|col| col.name().to_string())
        .collect();
    let column_count = column_names.len();

    let mut result_set = ResultSet::with_capacity(rows.len());
    result_set.set_column_names(Arc::new(column_names));

    for row in rows {
        let mut row_values = Vec::with_capacity(column_count);
        for idx in 0..column_count {
            row_values.push(postgres_extract_value(row, idx)?);
        }
        result_set.add_row_values(row_values);
    }

    Ok(result_set)
}
