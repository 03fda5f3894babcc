//! Typed property values.
//! Every property holds a list; single-valued properties hold at most one element.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType { String, Decimal, Integer, Boolean, DateTime, Id, Uri, Html }

impl PropertyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::String => "string",
            PropertyType::Decimal => "decimal",
            PropertyType::Integer => "integer",
            PropertyType::Boolean => "boolean",
            PropertyType::DateTime => "datetime",
            PropertyType::Id => "id",
            PropertyType::Uri => "uri",
            PropertyType::Html => "html",
        }
    }

    /// String, id, uri and html values all carry text and compare as text.
    pub fn is_textual(&self) -> bool {
        matches!(self, PropertyType::String | PropertyType::Id | PropertyType::Uri | PropertyType::Html)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "snake_case")]
pub enum Value {
    String(Vec<String>),
    Decimal(Vec<f64>),
    Integer(Vec<i64>),
    Boolean(Vec<bool>),
    DateTime(Vec<DateTime<Utc>>),
    Id(Vec<String>),
    Uri(Vec<String>),
    Html(Vec<String>),
}

impl Value {
    pub fn string<S: Into<String>>(s: S) -> Self { Value::String(vec![s.into()]) }
    pub fn id<S: Into<String>>(s: S) -> Self { Value::Id(vec![s.into()]) }
    pub fn decimal(v: f64) -> Self { Value::Decimal(vec![v]) }
    pub fn integer(v: i64) -> Self { Value::Integer(vec![v]) }
    pub fn boolean(v: bool) -> Self { Value::Boolean(vec![v]) }
    pub fn datetime(v: DateTime<Utc>) -> Self { Value::DateTime(vec![v]) }

    pub fn property_type(&self) -> PropertyType {
        match self {
            Value::String(_) => PropertyType::String,
            Value::Decimal(_) => PropertyType::Decimal,
            Value::Integer(_) => PropertyType::Integer,
            Value::Boolean(_) => PropertyType::Boolean,
            Value::DateTime(_) => PropertyType::DateTime,
            Value::Id(_) => PropertyType::Id,
            Value::Uri(_) => PropertyType::Uri,
            Value::Html(_) => PropertyType::Html,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Value::String(v) | Value::Id(v) | Value::Uri(v) | Value::Html(v) => v.len(),
            Value::Decimal(v) => v.len(),
            Value::Integer(v) => v.len(),
            Value::Boolean(v) => v.len(),
            Value::DateTime(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// First element of a textual value.
    pub fn first_str(&self) -> Option<&str> {
        match self {
            Value::String(v) | Value::Id(v) | Value::Uri(v) | Value::Html(v) => v.first().map(|s| s.as_str()),
            _ => None,
        }
    }

    pub fn first_bool(&self) -> Option<bool> {
        match self { Value::Boolean(v) => v.first().copied(), _ => None }
    }

    pub fn first_integer(&self) -> Option<i64> {
        match self { Value::Integer(v) => v.first().copied(), _ => None }
    }

    /// Comparable scalars, one per element.
    pub fn scalars(&self) -> Vec<Scalar> {
        match self {
            Value::String(v) | Value::Id(v) | Value::Uri(v) | Value::Html(v) => v.iter().map(|s| Scalar::Text(s.clone())).collect(),
            Value::Decimal(v) => v.iter().map(|d| Scalar::Number(*d)).collect(),
            Value::Integer(v) => v.iter().map(|i| Scalar::Integer(*i)).collect(),
            Value::Boolean(v) => v.iter().map(|b| Scalar::Bool(*b)).collect(),
            Value::DateTime(v) => v.iter().map(|d| Scalar::Time(d.timestamp_millis())).collect(),
        }
    }

    pub fn first_scalar(&self) -> Option<Scalar> { self.scalars().into_iter().next() }

    /// Human readable rendering used by the shell; multi-values are comma separated.
    pub fn display(&self) -> String {
        let parts: Vec<String> = match self {
            Value::String(v) | Value::Id(v) | Value::Uri(v) | Value::Html(v) => v.clone(),
            Value::Decimal(v) => v.iter().map(|d| d.to_string()).collect(),
            Value::Integer(v) => v.iter().map(|i| i.to_string()).collect(),
            Value::Boolean(v) => v.iter().map(|b| b.to_string()).collect(),
            Value::DateTime(v) => v.iter().map(|d| d.to_rfc3339()).collect(),
        };
        parts.join(", ")
    }
}

/// A single comparable element, shared by the index and the result sorter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Text(String),
    Number(f64),
    Integer(i64),
    Bool(bool),
    /// Milliseconds since the epoch
    Time(i64),
}

impl Scalar {
    /// Ordering between scalars of the same kind; `None` across kinds.
    pub fn compare(&self, other: &Scalar) -> Option<Ordering> {
        match (self, other) {
            (Scalar::Text(a), Scalar::Text(b)) => Some(a.cmp(b)),
            (Scalar::Number(a), Scalar::Number(b)) => a.partial_cmp(b),
            (Scalar::Integer(a), Scalar::Integer(b)) => Some(a.cmp(b)),
            (Scalar::Integer(a), Scalar::Number(b)) => cmp_int_float(*a, *b),
            (Scalar::Number(a), Scalar::Integer(b)) => cmp_int_float(*b, *a).map(Ordering::reverse),
            (Scalar::Bool(a), Scalar::Bool(b)) => Some(a.cmp(b)),
            (Scalar::Time(a), Scalar::Time(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Total order used when sorting rows: kinds rank text < number < bool < time.
    pub fn total_cmp(&self, other: &Scalar) -> Ordering {
        fn rank(s: &Scalar) -> u8 {
            match s { Scalar::Text(_) => 0, Scalar::Number(_) | Scalar::Integer(_) => 1, Scalar::Bool(_) => 2, Scalar::Time(_) => 3 }
        }
        match (self, other) {
            (Scalar::Number(a), Scalar::Number(b)) => a.total_cmp(b),
            _ => self.compare(other).unwrap_or_else(|| rank(self).cmp(&rank(other))),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self { Scalar::Text(s) => Some(s.as_str()), _ => None }
    }
}

/// Exact comparison of an integer against a float; no rounding of `i` through f64.
fn cmp_int_float(i: i64, f: f64) -> Option<Ordering> {
    const TWO_63: f64 = 9_223_372_036_854_775_808.0;
    if f.is_nan() { return None; }
    if f >= TWO_63 { return Some(Ordering::Less); }
    if f < -TWO_63 { return Some(Ordering::Greater); }
    let whole = f.trunc();
    match i.cmp(&(whole as i64)) {
        Ordering::Equal => 0.0f64.partial_cmp(&(f - whole)),
        o => Some(o),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn numbers_compare_across_integer_and_decimal() {
        let a = Value::integer(3).first_scalar().unwrap();
        let b = Value::decimal(3038.5).first_scalar().unwrap();
        assert_eq!(a.compare(&b), Some(Ordering::Less));
        assert_eq!(Scalar::Text("x".into()).compare(&Scalar::Number(1.0)), None);
    }

    #[test]
    fn large_integers_compare_exactly() {
        let stored = Value::integer(9_007_199_254_740_993).first_scalar().unwrap();
        let probe = Scalar::Integer(9_007_199_254_740_992);
        assert_eq!(stored.compare(&probe), Some(Ordering::Greater));
        assert_eq!(stored.compare(&Scalar::Number(9_007_199_254_740_992.0)), Some(Ordering::Greater));
        assert_eq!(Scalar::Number(2.5).compare(&Scalar::Integer(2)), Some(Ordering::Greater));
        assert_eq!(Scalar::Integer(-3).compare(&Scalar::Number(-2.5)), Some(Ordering::Less));
        assert_eq!(Scalar::Integer(i64::MAX).compare(&Scalar::Number(1e19)), Some(Ordering::Less));
        assert_eq!(Scalar::Integer(4).total_cmp(&Scalar::Number(4.0)), Ordering::Equal);
    }

    #[test]
    fn datetime_scalars_are_millis() {
        let t = Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 1).unwrap();
        assert_eq!(Value::datetime(t).scalars(), vec![Scalar::Time(1000)]);
    }

    #[test]
    fn display_joins_multi_values() {
        assert_eq!(Value::String(vec!["a".into(), "b".into()]).display(), "a, b");
        assert_eq!(Value::Boolean(vec![]).display(), "");
        assert!(Value::Boolean(vec![]).is_empty());
        assert_eq!(Value::id("x").first_str(), Some("x"));
    }
}
