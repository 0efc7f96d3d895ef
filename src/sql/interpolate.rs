//! Typed arguments to SQL literal text
//!
//! Two renderings share the same per-type rules:
//! - [`interpolate`] rewrites a query in place, replacing every `?` with a
//!   quoted/escaped literal.
//! - [`build_execution_params`] produces the parallel list of fragments for
//!   native parameter binding, where text and bytes go unquoted.

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use serde_json::Value as JsonValue;

use super::statement::placeholder_count;
use crate::error::{DriverError, Result};

/// Interpolated output may grow to this many times the configured query limit
pub const MAX_GROWTH_FACTOR: usize = 10;

/// Unix seconds of 0001-01-01T00:00:00Z, the zero timestamp
const ZERO_TIMESTAMP_SECS: i64 = -62_135_596_800;

/// Literal used for the zero timestamp
const ZERO_TIMESTAMP_LITERAL: &str = "'0000-00-00'";

/// A query argument
#[derive(Debug, Clone, PartialEq)]
pub enum SqlArg {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Timestamp(DateTime<FixedOffset>),
    Bytes(Vec<u8>),
    Text(String),
    /// A value of a type the driver cannot render; holds the type name
    Unsupported(String),
}

impl SqlArg {
    /// The zero timestamp, rendered as `'0000-00-00'`
    pub fn zero_timestamp() -> Self {
        match Utc.timestamp_opt(ZERO_TIMESTAMP_SECS, 0).single() {
            Some(ts) => SqlArg::Timestamp(ts.fixed_offset()),
            None => SqlArg::Null,
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            SqlArg::Null => "null",
            SqlArg::Int(_) => "int64",
            SqlArg::UInt(_) => "uint64",
            SqlArg::Float(_) => "float64",
            SqlArg::Bool(_) => "bool",
            SqlArg::Timestamp(_) => "timestamp",
            SqlArg::Bytes(_) => "bytes",
            SqlArg::Text(_) => "string",
            SqlArg::Unsupported(name) => name,
        }
    }
}

impl From<i64> for SqlArg {
    fn from(v: i64) -> Self {
        SqlArg::Int(v)
    }
}

impl From<i32> for SqlArg {
    fn from(v: i32) -> Self {
        SqlArg::Int(v as i64)
    }
}

impl From<u64> for SqlArg {
    fn from(v: u64) -> Self {
        SqlArg::UInt(v)
    }
}

impl From<u32> for SqlArg {
    fn from(v: u32) -> Self {
        SqlArg::UInt(v as u64)
    }
}

impl From<f64> for SqlArg {
    fn from(v: f64) -> Self {
        SqlArg::Float(v)
    }
}

impl From<bool> for SqlArg {
    fn from(v: bool) -> Self {
        SqlArg::Bool(v)
    }
}

impl From<&str> for SqlArg {
    fn from(v: &str) -> Self {
        SqlArg::Text(v.to_string())
    }
}

impl From<String> for SqlArg {
    fn from(v: String) -> Self {
        SqlArg::Text(v)
    }
}

impl From<Vec<u8>> for SqlArg {
    fn from(v: Vec<u8>) -> Self {
        SqlArg::Bytes(v)
    }
}

impl From<&[u8]> for SqlArg {
    fn from(v: &[u8]) -> Self {
        SqlArg::Bytes(v.to_vec())
    }
}

impl From<DateTime<Utc>> for SqlArg {
    fn from(v: DateTime<Utc>) -> Self {
        SqlArg::Timestamp(v.fixed_offset())
    }
}

impl From<DateTime<FixedOffset>> for SqlArg {
    fn from(v: DateTime<FixedOffset>) -> Self {
        SqlArg::Timestamp(v)
    }
}

impl<T: Into<SqlArg>> From<Option<T>> for SqlArg {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlArg::Null)
    }
}

impl From<&JsonValue> for SqlArg {
    fn from(json: &JsonValue) -> Self {
        match json {
            JsonValue::Null => SqlArg::Null,
            JsonValue::Bool(b) => SqlArg::Bool(*b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    SqlArg::Int(i)
                } else if let Some(u) = n.as_u64() {
                    SqlArg::UInt(u)
                } else if let Some(f) = n.as_f64() {
                    SqlArg::Float(f)
                } else {
                    SqlArg::Unsupported("number".to_string())
                }
            }
            JsonValue::String(s) => SqlArg::Text(s.clone()),
            JsonValue::Array(_) => SqlArg::Unsupported("array".to_string()),
            JsonValue::Object(_) => SqlArg::Unsupported("object".to_string()),
        }
    }
}

/// Replace every `?` in `query` with the literal for the matching argument.
///
/// Fails if the placeholder count differs from `args.len()`, on an unsupported
/// argument, or when the output outgrows `MAX_GROWTH_FACTOR * max_query_length`.
pub fn interpolate(query: &str, args: &[SqlArg], max_query_length: usize) -> Result<String> {
    let placeholders = placeholder_count(query);
    if placeholders != args.len() {
        return Err(DriverError::InvalidQuery(format!(
            "query has {} placeholders but {} arguments were supplied",
            placeholders,
            args.len()
        )));
    }

    let limit = MAX_GROWTH_FACTOR.saturating_mul(max_query_length);
    let mut buf: Vec<u8> = Vec::with_capacity(query.len().min(limit));
    let mut rest = query;
    let mut args = args.iter();

    while let Some(pos) = rest.find('?') {
        buf.extend_from_slice(rest[..pos].as_bytes());
        rest = &rest[pos + 1..];
        let Some(arg) = args.next() else {
            break;
        };

        match arg {
            SqlArg::Null => buf.extend_from_slice(b"NULL"),
            SqlArg::Int(v) => buf.extend_from_slice(v.to_string().as_bytes()),
            SqlArg::UInt(v) => buf.extend_from_slice(v.to_string().as_bytes()),
            SqlArg::Float(v) => buf.extend_from_slice(format_float(*v).as_bytes()),
            SqlArg::Bool(v) => buf.push(if *v { b'1' } else { b'0' }),
            SqlArg::Timestamp(v) => buf.extend_from_slice(format_timestamp(v).as_bytes()),
            SqlArg::Bytes(v) => {
                buf.extend_from_slice(b"_binary'");
                escape_bytes_backslash(&mut buf, v);
                buf.push(b'\'');
            }
            SqlArg::Text(v) => {
                buf.push(b'\'');
                escape_bytes_backslash(&mut buf, v.as_bytes());
                buf.push(b'\'');
            }
            SqlArg::Unsupported(name) => {
                return Err(DriverError::UnsupportedArgumentType(name.clone()));
            }
        }

        if buf.len() + 4 > limit {
            return Err(DriverError::QueryBufferOverflow { limit });
        }
    }
    buf.extend_from_slice(rest.as_bytes());

    String::from_utf8(buf).map_err(|_| {
        DriverError::InvalidQuery("binary argument is not valid UTF-8 text".to_string())
    })
}

/// Literal fragments for native parameter binding, one per argument.
///
/// Text and bytes are passed through unquoted so callers can supply casts or
/// function calls (`TIMESTAMP '2024-07-01 00:00:00.000'`) as arguments.
pub fn build_execution_params(args: &[SqlArg], max_query_length: usize) -> Result<Vec<String>> {
    let limit = MAX_GROWTH_FACTOR.saturating_mul(max_query_length);
    let mut params = Vec::with_capacity(args.len());
    let mut total = 0usize;

    for arg in args {
        let val = match arg {
            SqlArg::Null => "NULL".to_string(),
            SqlArg::Int(v) => v.to_string(),
            SqlArg::UInt(v) => v.to_string(),
            SqlArg::Float(v) => format_float(*v),
            SqlArg::Bool(v) => if *v { "1" } else { "0" }.to_string(),
            SqlArg::Timestamp(v) => format_timestamp(v),
            SqlArg::Bytes(v) => String::from_utf8(v.clone()).map_err(|_| {
                DriverError::InvalidQuery("binary argument is not valid UTF-8 text".to_string())
            })?,
            SqlArg::Text(v) => v.clone(),
            SqlArg::Unsupported(name) => {
                return Err(DriverError::UnsupportedArgumentType(name.clone()));
            }
        };

        total += val.len();
        if total + 4 > limit {
            return Err(DriverError::QueryBufferOverflow { limit });
        }
        params.push(val);
    }
    Ok(params)
}

/// Backslash-escape the bytes that would break out of a quoted SQL literal
pub fn escape_bytes_backslash(buf: &mut Vec<u8>, v: &[u8]) {
    buf.reserve(v.len() * 2);
    for &c in v {
        match c {
            b'\0' => buf.extend_from_slice(b"\\0"),
            b'\n' => buf.extend_from_slice(b"\\n"),
            b'\r' => buf.extend_from_slice(b"\\r"),
            0x1a => buf.extend_from_slice(b"\\Z"),
            b'\'' => buf.extend_from_slice(b"\\'"),
            b'"' => buf.extend_from_slice(b"\\\""),
            b'\\' => buf.extend_from_slice(b"\\\\"),
            _ => buf.push(c),
        }
    }
}

/// `escape_bytes_backslash` for text
pub fn escape_string_backslash(v: &str) -> String {
    let mut buf = Vec::with_capacity(v.len());
    escape_bytes_backslash(&mut buf, v.as_bytes());
    // Only ASCII bytes are rewritten, so UTF-8 sequences stay intact
    String::from_utf8(buf).unwrap_or_default()
}

fn is_zero_timestamp(ts: &DateTime<FixedOffset>) -> bool {
    ts.timestamp() == ZERO_TIMESTAMP_SECS && ts.timestamp_subsec_nanos() == 0
}

/// Quoted `'YYYY-MM-DD HH:MM:SS[.ffffff]'` in UTC, rounded to the microsecond
pub fn format_timestamp(ts: &DateTime<FixedOffset>) -> String {
    if is_zero_timestamp(ts) {
        return ZERO_TIMESTAMP_LITERAL.to_string();
    }
    let utc = ts.with_timezone(&Utc);
    let rounded = utc
        .checked_add_signed(chrono::Duration::nanoseconds(500))
        .unwrap_or(utc);
    let micros = rounded.timestamp_subsec_nanos() / 1000;
    let base = rounded.format("%Y-%m-%d %H:%M:%S");
    if micros == 0 {
        format!("'{}'", base)
    } else {
        format!("'{}.{:06}'", base, micros)
    }
}

/// Shortest round-tripping rendering in `%g` style: plain decimal for
/// exponents in [-4, 6), otherwise `d.ddde±XX`.
pub fn format_float(v: f64) -> String {
    if v.is_nan() {
        return "NaN".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }

    // `{:e}` yields the shortest digits that round-trip, e.g. "-1.2345e-7"
    let sci = format!("{:e}", v);
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let negative = mantissa.starts_with('-');
    let digits: Vec<u8> = mantissa.bytes().filter(u8::is_ascii_digit).collect();

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    if digits.iter().all(|d| *d == b'0') {
        out.push('0');
        return out;
    }

    let nd = digits.len() as i32;
    if exp < -4 || exp >= 6 {
        out.push(digits[0] as char);
        if nd > 1 {
            out.push('.');
            out.extend(digits[1..].iter().map(|d| *d as char));
        }
        out.push('e');
        out.push(if exp < 0 { '-' } else { '+' });
        let abs = exp.unsigned_abs();
        if abs < 10 {
            out.push('0');
        }
        out.push_str(&abs.to_string());
        return out;
    }

    // Decimal point sits after `dp` digits
    let dp = exp + 1;
    let digit_at = |i: i32| -> char {
        if i >= 0 && i < nd {
            digits[i as usize] as char
        } else {
            '0'
        }
    };
    if dp > 0 {
        for i in 0..dp {
            out.push(digit_at(i));
        }
    } else {
        out.push('0');
    }
    let frac = (nd - dp).max(0);
    if frac > 0 {
        out.push('.');
        for i in 0..frac {
            out.push(digit_at(dp + i));
        }
    }
    out
}
