//! Universal property value.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{ObjectRef, Observable};
use crate::{Error, Result};

/// A value read from, or written to, a property.
///
/// - Scalars: Bool, Int, Float, String
/// - Enumerations: Enum (variant name + ordinal)
/// - Temporal: Date, DateTime
/// - Live objects: Object (identity semantics, never serialized)
///
/// `Null` doubles as the "absent" sentinel produced when a path walks
/// through an absent intermediate link.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Enum { name: String, ordinal: i64 },
    Date(NaiveDate),
    DateTime(DateTime<Utc>),

    #[serde(skip)]
    Object(ObjectRef),
}

// ============================================================================
// Type checking
// ============================================================================

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "BOOLEAN",
            Value::Int(_) => "INTEGER",
            Value::Float(_) => "FLOAT",
            Value::String(_) => "STRING",
            Value::Enum { .. } => "ENUM",
            Value::Date(_) => "DATE",
            Value::DateTime(_) => "DATETIME",
            Value::Object(_) => "OBJECT",
        }
    }

    pub fn is_null(&self) -> bool { matches!(self, Value::Null) }
    pub fn is_numeric(&self) -> bool { matches!(self, Value::Int(_) | Value::Float(_)) }
    pub fn is_object(&self) -> bool { matches!(self, Value::Object(_)) }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Attempt to extract as i64
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Value::Enum { ordinal, .. } => Some(*ordinal),
            _ => None,
        }
    }

    /// Attempt to extract as f64
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Attempt to extract as &str
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Canonical string form used for case-insensitive ordering.
    /// Absent values and live objects have none.
    pub fn canonical_string(&self) -> Option<String> {
        match self {
            Value::Null | Value::Object(_) => None,
            Value::String(s) => Some(s.clone()),
            Value::Enum { name, .. } => Some(name.clone()),
            other => Some(other.to_string()),
        }
    }
}

// ============================================================================
// Extraction (used by typed setters)
// ============================================================================

/// Typed extraction from a `Value`, failing with `InvalidArgument`.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self>;
}

fn mismatch(expected: &str, got: &Value) -> Error {
    Error::InvalidArgument(format!("expected {expected}, got {}", got.type_name()))
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self> { Ok(value) }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self> {
        value.as_bool().ok_or_else(|| mismatch("BOOLEAN", &value))
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Int(i) => Ok(i),
            other => Err(mismatch("INTEGER", &other)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: Value) -> Result<Self> {
        let wide = i64::from_value(value)?;
        i32::try_from(wide).map_err(|_| Error::InvalidArgument(format!("{wide} out of range for i32")))
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self> {
        value.as_float().ok_or_else(|| mismatch("FLOAT", &value))
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(mismatch("STRING", &other)),
        }
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Date(d) => Ok(d),
            other => Err(mismatch("DATE", &other)),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::DateTime(dt) => Ok(dt),
            other => Err(mismatch("DATETIME", &other)),
        }
    }
}

impl<T: Observable> FromValue for Arc<T> {
    fn from_value(value: Value) -> Result<Self> {
        match &value {
            Value::Object(o) => o
                .downcast::<T>()
                .ok_or_else(|| Error::InvalidArgument(format!(
                    "object is not a {}", std::any::type_name::<T>()
                ))),
            _ => Err(mismatch("OBJECT", &value)),
        }
    }
}

/// `Null` maps to `None`; anything else must convert to `T`.
impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

// ============================================================================
// Conversions (From impls)
// ============================================================================

impl From<bool> for Value { fn from(v: bool) -> Self { Value::Bool(v) } }
impl From<i32> for Value { fn from(v: i32) -> Self { Value::Int(v as i64) } }
impl From<i64> for Value { fn from(v: i64) -> Self { Value::Int(v) } }
impl From<f64> for Value { fn from(v: f64) -> Self { Value::Float(v) } }
impl From<String> for Value { fn from(v: String) -> Self { Value::String(v) } }
impl From<&str> for Value { fn from(v: &str) -> Self { Value::String(v.to_owned()) } }
impl From<NaiveDate> for Value { fn from(v: NaiveDate) -> Self { Value::Date(v) } }
impl From<DateTime<Utc>> for Value { fn from(v: DateTime<Utc>) -> Self { Value::DateTime(v) } }
impl From<ObjectRef> for Value { fn from(v: ObjectRef) -> Self { Value::Object(v) } }
impl<T: Observable> From<Arc<T>> for Value {
    fn from(v: Arc<T>) -> Self { Value::Object(ObjectRef::new(v)) }
}
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self { v.map(Into::into).unwrap_or(Value::Null) }
}

// ============================================================================
// Display
// ============================================================================

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Enum { name, .. } => write!(f, "{name}"),
            Value::Date(d) => write!(f, "{d}"),
            Value::DateTime(dt) => write!(f, "{dt}"),
            Value::Object(o) => write!(f, "<object@{:#x}>", o.addr()),
        }
    }
}

// ============================================================================
// Comparison (natural ordering)
// ============================================================================

impl Value {
    /// Total natural ordering.
    ///
    /// `Null` sorts before everything. Numbers compare exactly across
    /// Int/Float, with NaN placed by sign at either end. Strings compare
    /// case-insensitively first, then exactly. Enums compare by ordinal.
    /// Values of unrelated kinds fall back to a fixed kind rank so the
    /// order stays total.
    pub fn natural_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => cmp_float(*a, *b),
            (Value::Int(a), Value::Float(b)) => cmp_int_float(*a, *b),
            (Value::Float(a), Value::Int(b)) => cmp_int_float(*b, *a).reverse(),
            (Value::String(a), Value::String(b)) => cmp_ignore_case(a, b),
            (Value::Enum { ordinal: a, .. }, Value::Enum { ordinal: b, .. }) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
            (Value::Object(a), Value::Object(b)) => a.addr().cmp(&b.addr()),
            (a, b) => a.kind_rank().cmp(&b.kind_rank()),
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::String(_) => 3,
            Value::Enum { .. } => 4,
            Value::Date(_) => 5,
            Value::DateTime(_) => 6,
            Value::Object(_) => 7,
        }
    }
}

/// Case-insensitive first, exact second, so distinct strings never tie.
pub(crate) fn cmp_ignore_case(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b))
}

/// Numeric order with `-0.0 == 0.0`; NaN goes first or last by its sign bit.
fn cmp_float(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or_else(|| a.total_cmp(&b))
}

/// Exact `i64` against `f64`, without rounding the integer.
fn cmp_int_float(i: i64, f: f64) -> Ordering {
    // 2^63, the first float above every i64.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;

    if f.is_nan() {
        return if f.is_sign_negative() { Ordering::Greater } else { Ordering::Less };
    }
    if f >= LIMIT {
        return Ordering::Less;
    }
    if f < -LIMIT {
        return Ordering::Greater;
    }

    let whole = f.trunc();
    i.cmp(&(whole as i64)).then_with(|| {
        let frac = f - whole;
        if frac > 0.0 {
            Ordering::Less
        } else if frac < 0.0 {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_from() {
        assert_eq!(Value::from("hello"), Value::String("hello".into()));
        assert_eq!(Value::from(42), Value::Int(42));
        assert_eq!(Value::from(3.5), Value::Float(3.5));
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from(None::<String>), Value::Null);
    }

    #[test]
    fn test_null_sorts_first() {
        assert_eq!(Value::Null.natural_cmp(&Value::Null), Ordering::Equal);
        assert_eq!(Value::Null.natural_cmp(&Value::Int(-5)), Ordering::Less);
        assert_eq!(Value::from("a").natural_cmp(&Value::Null), Ordering::Greater);
    }

    #[test]
    fn test_numeric_comparison() {
        assert_eq!(Value::Int(1).natural_cmp(&Value::Float(1.5)), Ordering::Less);
        assert_eq!(Value::Float(2.0).natural_cmp(&Value::Int(2)), Ordering::Equal);
    }

    #[test]
    fn test_int_float_comparison_is_exact() {
        let two_53 = 1i64 << 53;
        assert_eq!(Value::Int(two_53 + 1).natural_cmp(&Value::Float(two_53 as f64)), Ordering::Greater);
        assert_eq!(Value::Float(two_53 as f64).natural_cmp(&Value::Int(two_53 + 1)), Ordering::Less);
        assert_eq!(Value::Int(i64::MAX).natural_cmp(&Value::Float(9_223_372_036_854_775_808.0)), Ordering::Less);
        assert_eq!(Value::Int(i64::MIN).natural_cmp(&Value::Float(-9_223_372_036_854_775_808.0)), Ordering::Equal);
        assert_eq!(Value::Int(-2).natural_cmp(&Value::Float(-2.5)), Ordering::Greater);
        assert_eq!(Value::Int(0).natural_cmp(&Value::Float(-0.0)), Ordering::Equal);
        assert_eq!(Value::Float(0.0).natural_cmp(&Value::Float(-0.0)), Ordering::Equal);
        assert_eq!(Value::Int(i64::MAX).natural_cmp(&Value::Float(f64::NAN)), Ordering::Less);
        assert_eq!(Value::Float(f64::INFINITY).natural_cmp(&Value::Float(f64::NAN)), Ordering::Less);
        assert_eq!(Value::Int(i64::MIN).natural_cmp(&Value::Float(-f64::NAN)), Ordering::Greater);
        assert!(Value::Int(1).is_numeric() && Value::Float(1.0).is_numeric());
        assert!(!Value::from("1").is_numeric());
    }

    #[test]
    fn test_strings_ignore_case_then_compare_exactly() {
        assert_eq!(Value::from("abigale").natural_cmp(&Value::from("Fred")), Ordering::Less);
        assert_eq!(Value::from("Bill").natural_cmp(&Value::from("bill")), Ordering::Less);
        assert_eq!(Value::from("bill").natural_cmp(&Value::from("bill")), Ordering::Equal);
    }

    #[test]
    fn test_mixed_large_numbers_sort_without_panicking() {
        let big = 1i64 << 53;
        let mut values = vec![
            Value::Int(big + 1),
            Value::Float(big as f64),
            Value::Int(big),
            Value::Float(f64::INFINITY),
            Value::Int(big - 1),
            Value::Float((big + 2) as f64),
        ];
        values.sort_by(Value::natural_cmp);
        assert_eq!(values, vec![
            Value::Int(big - 1),
            Value::Float(big as f64),
            Value::Int(big),
            Value::Int(big + 1),
            Value::Float((big + 2) as f64),
            Value::Float(f64::INFINITY),
        ]);
    }

    #[test]
    fn test_enum_orders_by_ordinal() {
        let act = Value::Enum { name: "ACT".into(), ordinal: 0 };
        let vic = Value::Enum { name: "VIC".into(), ordinal: 2 };
        assert_eq!(act.natural_cmp(&vic), Ordering::Less);
        assert_eq!(vic.canonical_string().as_deref(), Some("VIC"));
    }

    #[test]
    fn test_from_value() {
        assert_eq!(Option::<String>::from_value(Value::Null).unwrap(), None);
        assert_eq!(String::from_value(Value::from("x")).unwrap(), "x");
        assert!(i64::from_value(Value::from("x")).is_err());
        assert_eq!(i32::from_value(Value::Int(7)).unwrap(), 7);
        assert!(i32::from_value(Value::Int(i64::MAX)).is_err());
    }

    #[test]
    fn test_serialize_scalar() {
        let json = serde_json::to_string(&Value::Int(3)).unwrap();
        assert_eq!(json, r#"{"type":"Int","value":3}"#);
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Value::Int(3));
    }
}
