//! Dialect-specific SQL literal encoding.
//!
//! Maps a decoded runtime value to the literal token the target engine
//! expects. The two families share quote-doubling for strings but diverge
//! everywhere else; both keep the documented weaknesses of the format
//! (no per-item escaping inside array literals, a placeholder instead of
//! real bytes for Postgres binary columns) so that produced scripts stay
//! byte-compatible with existing dumps.

use chrono::{NaiveDate, NaiveDateTime};

/// A scalar or collection value read from a live row, reduced to the
/// shapes the encoders distinguish.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Bytes(Vec<u8>),
    /// Array items are kept as plain strings; see [`postgres_literal`].
    Array(Vec<String>),
    /// Anything the decoders do not model explicitly, already stringified.
    Other(String),
}

/// Single-quote a string, doubling every embedded quote (SQL standard).
fn quoted(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn hex_lower(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

/// Encode a value as a MySQL-family literal.
pub fn mysql_literal(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Bool(true) => "TRUE".to_string(),
        SqlValue::Bool(false) => "FALSE".to_string(),
        SqlValue::Int(i) => i.to_string(),
        SqlValue::UInt(u) => u.to_string(),
        SqlValue::Float(f) => f.to_string(),
        SqlValue::Text(s) => quoted(s),
        SqlValue::Date(d) => quoted(&d.format("%Y-%m-%d").to_string()),
        SqlValue::DateTime(dt) => quoted(&dt.format("%Y-%m-%d %H:%M:%S").to_string()),
        SqlValue::Bytes(b) => format!("0x{}", hex_lower(b)),
        SqlValue::Array(items) => quoted(&items.join(",")),
        SqlValue::Other(s) => quoted(s),
    }
}

/// Encode a value as a Postgres-family literal.
///
/// Array items are joined without per-item quoting or escaping, so items
/// containing `,` or `}` are not survivable — a known limitation of the
/// format. Binary values are replaced with an opaque placeholder; large
/// objects are not faithfully serialized.
pub fn postgres_literal(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Bool(b) => b.to_string(),
        SqlValue::Int(i) => i.to_string(),
        SqlValue::UInt(u) => u.to_string(),
        SqlValue::Float(f) => f.to_string(),
        SqlValue::Text(s) => quoted(s),
        SqlValue::Date(d) => quoted(&d.format("%Y-%m-%d").to_string()),
        SqlValue::DateTime(dt) => quoted(&dt.format("%Y-%m-%d %H:%M:%S").to_string()),
        SqlValue::Bytes(_) => "'<binary>'".to_string(),
        SqlValue::Array(items) => format!("'{{{}}}'", items.join(",")),
        SqlValue::Other(s) => s.clone(),
    }
}
