//! Result-set data model.
//!
//! A [`Response`] is built entirely by the query layer and handed to a
//! writer for serialization. Writers only ever borrow it.
//!
//! The serde shape matches what the JSON writer emits:
//!
//! ```json
//! {"results":[{"statement_id":0,"series":[{"name":"cpu","tags":{"host":"a"},
//!   "columns":["time","value"],"values":[["1970-01-01T00:00:00Z",1.5]]}]}]}
//! ```

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::de::{self, Deserializer, Visitor};
use serde::ser::{Error as _, Serializer};
use serde::{Deserialize, Serialize};

use crate::error::RespfmtError;
use crate::Result;

/// A complete response: the results of every statement in a query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Results in statement order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<StatementResult>,
    /// Top-level error (query could not run at all)
    #[serde(default, rename = "error", skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

impl Response {
    pub fn new(results: Vec<StatementResult>) -> Self {
        Self { results, err: None }
    }

    /// A response that carries only an error message.
    pub fn from_error(message: impl Into<String>) -> Self {
        Self {
            results: Vec::new(),
            err: Some(message.into()),
        }
    }
}

/// The output of one statement, or one chunk of it.
///
/// Results from the same statement share a `statement_id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatementResult {
    pub statement_id: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub series: Vec<Series>,
    #[serde(default, rename = "error", skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

impl StatementResult {
    pub fn new(statement_id: i64) -> Self {
        Self {
            statement_id,
            ..Self::default()
        }
    }

    /// Builder: append a series
    pub fn with_series(mut self, series: Series) -> Self {
        self.series.push(series);
        self
    }

    /// Builder: set the statement error
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.err = Some(message.into());
        self
    }
}

/// A named, tagged table of rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub name: String,
    #[serde(default, skip_serializing_if = "Tags::is_empty")]
    pub tags: Tags,
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<Vec<Value>>,
}

impl Series {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Builder: add a tag
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key, value);
        self
    }

    /// Builder: set the column names
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Builder: append a row
    pub fn row(mut self, values: Vec<Value>) -> Self {
        self.values.push(values);
        self
    }

    /// Convert RFC 3339 strings in `column` into timestamps.
    ///
    /// JSON has no timestamp type, so a result set read back from JSON carries
    /// its time column as strings. Missing columns are not an error.
    pub fn parse_time_column(&mut self, column: &str) -> Result<()> {
        let Some(idx) = self.columns.iter().position(|c| c == column) else {
            return Ok(());
        };
        for row in &mut self.values {
            if let Some(cell) = row.get_mut(idx) {
                if let Value::String(text) = cell {
                    *cell = Value::Timestamp(Timestamp::parse_rfc3339(text)?);
                }
            }
        }
        Ok(())
    }
}

/// Tag set of a series.
///
/// Backed by a sorted map so every rendering is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tags(BTreeMap<String, String>);

impl Tags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Canonical series-key form of the tag set: `,k1=v1,k2=v2`.
    ///
    /// Keys are sorted, `,` `=` and space are backslash-escaped, and tags with
    /// an empty value are left out. Empty when no tag survives.
    pub fn hash_key(&self) -> String {
        let mut key = String::new();
        for (k, v) in self.iter().filter(|(_, v)| !v.is_empty()) {
            key.push(',');
            escape_tag_into(&mut key, k);
            key.push('=');
            escape_tag_into(&mut key, v);
        }
        key
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Tags {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Tags(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

fn escape_tag_into(out: &mut String, s: &str) {
    for c in s.chars() {
        if matches!(c, ',' | '=' | ' ') {
            out.push('\\');
        }
        out.push(c);
    }
}

/// An instant with nanosecond resolution, stored as nanoseconds since the
/// Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn from_unix_nanos(nanos: i64) -> Self {
        Timestamp(nanos)
    }

    pub fn unix_nanos(self) -> i64 {
        self.0
    }

    pub fn to_datetime(self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.0)
    }

    /// Parse an RFC 3339 timestamp.
    ///
    /// Instants outside the range of i64 nanoseconds (roughly 1677–2262) are
    /// rejected.
    pub fn parse_rfc3339(text: &str) -> Result<Self> {
        let invalid = |message: String| RespfmtError::InvalidTimestamp {
            value: text.to_string(),
            message,
        };
        let parsed = DateTime::parse_from_rfc3339(text).map_err(|e| invalid(e.to_string()))?;
        parsed
            .with_timezone(&Utc)
            .timestamp_nanos_opt()
            .map(Timestamp)
            .ok_or_else(|| invalid("out of range for nanosecond precision".to_string()))
    }

    /// RFC 3339 with up to nine fractional digits, trailing zeros trimmed.
    pub fn to_rfc3339(self) -> String {
        let dt = self.to_datetime();
        let mut out = format!(
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
            dt.year(),
            dt.month(),
            dt.day(),
            dt.hour(),
            dt.minute(),
            dt.second()
        );
        let nanos = dt.nanosecond();
        if nanos > 0 {
            let frac = format!("{:09}", nanos);
            out.push('.');
            out.push_str(frac.trim_end_matches('0'));
        }
        out.push('Z');
        out
    }
}

impl From<DateTime<Utc>> for Timestamp {
    /// Saturates at the i64 nanosecond range.
    fn from(dt: DateTime<Utc>) -> Self {
        match dt.timestamp_nanos_opt() {
            Some(nanos) => Timestamp(nanos),
            None if dt.timestamp() < 0 => Timestamp(i64::MIN),
            None => Timestamp(i64::MAX),
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

/// A single cell of a result row.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Float(f64),
    Integer(i64),
    String(String),
    Boolean(bool),
    Timestamp(Timestamp),
}

impl Value {
    /// Name of the variant, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Float(_) => "float",
            Value::Integer(_) => "integer",
            Value::String(_) => "string",
            Value::Boolean(_) => "boolean",
            Value::Timestamp(_) => "timestamp",
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<Timestamp> for Value {
    fn from(v: Timestamp) -> Self {
        Value::Timestamp(v)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Float(v) if !v.is_finite() => Err(S::Error::custom(format!(
                "unsupported value: {}",
                float_text(*v)
            ))),
            Value::Float(v) => serializer.serialize_f64(*v),
            Value::Integer(v) => serializer.serialize_i64(*v),
            Value::String(v) => serializer.serialize_str(v),
            Value::Boolean(v) => serializer.serialize_bool(*v),
            Value::Timestamp(v) => serializer.serialize_str(&v.to_rfc3339()),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct ValueVisitor;

        impl Visitor<'_> for ValueVisitor {
            type Value = Value;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a number, string or boolean")
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<Value, E> {
                Ok(Value::Boolean(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Value, E> {
                Ok(Value::Integer(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Value, E> {
                i64::try_from(v)
                    .map(Value::Integer)
                    .or(Ok(Value::Float(v as f64)))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<Value, E> {
                Ok(Value::Float(v))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Value, E> {
                Ok(Value::String(v.to_string()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<Value, E> {
                Ok(Value::String(v))
            }
        }

        deserializer.deserialize_any(ValueVisitor)
    }
}

/// Shortest round-trip decimal text of a float, never in exponent form.
pub(crate) fn float_text(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v == f64::INFINITY {
        "+Inf".to_string()
    } else if v == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        v.to_string()
    }
}
