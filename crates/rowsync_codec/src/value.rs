//! Typed column values.

use crate::decimal::Decimal;
use crate::error::{CodecError, CodecResult};
use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

/// The kind of a [`TypedValue`].
///
/// Every kind has a stable one-byte code used by the binary encoding and a
/// stable name used by the text encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// SQL NULL.
    Null,
    /// UTF-8 text.
    String,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
    /// UTC timestamp with nanosecond precision.
    DateTime,
    /// Boolean.
    Boolean,
    /// Raw bytes.
    ByteArray,
    /// 128-bit UUID.
    Guid,
    /// Exact fixed-point decimal.
    Decimal,
}

impl ValueKind {
    /// All kinds, in code order.
    pub const ALL: [ValueKind; 11] = [
        ValueKind::Null,
        ValueKind::String,
        ValueKind::Int32,
        ValueKind::Int64,
        ValueKind::Float,
        ValueKind::Double,
        ValueKind::DateTime,
        ValueKind::Boolean,
        ValueKind::ByteArray,
        ValueKind::Guid,
        ValueKind::Decimal,
    ];

    /// Returns the binary type code.
    pub fn to_code(self) -> u8 {
        match self {
            ValueKind::Null => 0,
            ValueKind::String => 1,
            ValueKind::Int32 => 2,
            ValueKind::Int64 => 3,
            ValueKind::Float => 4,
            ValueKind::Double => 5,
            ValueKind::DateTime => 6,
            ValueKind::Boolean => 7,
            ValueKind::ByteArray => 8,
            ValueKind::Guid => 9,
            ValueKind::Decimal => 10,
        }
    }

    /// Parses a binary type code.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(usize::from(code)).copied()
    }

    /// Returns the text tag.
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Null => "Null",
            ValueKind::String => "String",
            ValueKind::Int32 => "Int32",
            ValueKind::Int64 => "Int64",
            ValueKind::Float => "Float",
            ValueKind::Double => "Double",
            ValueKind::DateTime => "DateTime",
            ValueKind::Boolean => "Boolean",
            ValueKind::ByteArray => "ByteArray",
            ValueKind::Guid => "Guid",
            ValueKind::Decimal => "Decimal",
        }
    }

    /// Parses a text tag.
    pub fn from_name(name: &str) -> CodecResult<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| CodecError::unknown_tag(name))
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A column value carrying an explicit type tag.
///
/// Floating point variants compare by bit pattern, so `NaN` equals itself and
/// `0.0` differs from `-0.0`. That is the equality both encodings preserve.
#[derive(Debug, Clone)]
pub enum TypedValue {
    /// SQL NULL.
    Null,
    /// UTF-8 text.
    String(String),
    /// 32-bit signed integer.
    Int32(i32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// UTC timestamp.
    DateTime(DateTime<Utc>),
    /// Boolean.
    Boolean(bool),
    /// Raw bytes.
    ByteArray(Vec<u8>),
    /// UUID.
    Guid(Uuid),
    /// Exact decimal.
    Decimal(Decimal),
}

impl TypedValue {
    /// Returns the kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            TypedValue::Null => ValueKind::Null,
            TypedValue::String(_) => ValueKind::String,
            TypedValue::Int32(_) => ValueKind::Int32,
            TypedValue::Int64(_) => ValueKind::Int64,
            TypedValue::Float(_) => ValueKind::Float,
            TypedValue::Double(_) => ValueKind::Double,
            TypedValue::DateTime(_) => ValueKind::DateTime,
            TypedValue::Boolean(_) => ValueKind::Boolean,
            TypedValue::ByteArray(_) => ValueKind::ByteArray,
            TypedValue::Guid(_) => ValueKind::Guid,
            TypedValue::Decimal(_) => ValueKind::Decimal,
        }
    }

    /// Returns true for [`TypedValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, TypedValue::Null)
    }

    /// Returns the string payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TypedValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as an i64 when it is an integer kind.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            TypedValue::Int32(n) => Some(i64::from(*n)),
            TypedValue::Int64(n) => Some(*n),
            _ => None,
        }
    }
}

impl PartialEq for TypedValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TypedValue::Null, TypedValue::Null) => true,
            (TypedValue::String(a), TypedValue::String(b)) => a == b,
            (TypedValue::Int32(a), TypedValue::Int32(b)) => a == b,
            (TypedValue::Int64(a), TypedValue::Int64(b)) => a == b,
            (TypedValue::Float(a), TypedValue::Float(b)) => a.to_bits() == b.to_bits(),
            (TypedValue::Double(a), TypedValue::Double(b)) => a.to_bits() == b.to_bits(),
            (TypedValue::DateTime(a), TypedValue::DateTime(b)) => a == b,
            (TypedValue::Boolean(a), TypedValue::Boolean(b)) => a == b,
            (TypedValue::ByteArray(a), TypedValue::ByteArray(b)) => a == b,
            (TypedValue::Guid(a), TypedValue::Guid(b)) => a == b,
            (TypedValue::Decimal(a), TypedValue::Decimal(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for TypedValue {}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::Null => f.write_str("NULL"),
            TypedValue::String(s) => write!(f, "{:?}", s),
            TypedValue::Int32(n) => write!(f, "{}", n),
            TypedValue::Int64(n) => write!(f, "{}", n),
            TypedValue::Float(n) => write!(f, "{}", n),
            TypedValue::Double(n) => write!(f, "{}", n),
            TypedValue::DateTime(t) => write!(f, "{}", t.to_rfc3339()),
            TypedValue::Boolean(b) => write!(f, "{}", b),
            TypedValue::ByteArray(b) => write!(f, "<{} bytes>", b.len()),
            TypedValue::Guid(g) => write!(f, "{}", g),
            TypedValue::Decimal(d) => write!(f, "{}", d),
        }
    }
}

impl From<&str> for TypedValue {
    fn from(s: &str) -> Self {
        TypedValue::String(s.to_string())
    }
}

impl From<String> for TypedValue {
    fn from(s: String) -> Self {
        TypedValue::String(s)
    }
}

impl From<i32> for TypedValue {
    fn from(n: i32) -> Self {
        TypedValue::Int32(n)
    }
}

impl From<i64> for TypedValue {
    fn from(n: i64) -> Self {
        TypedValue::Int64(n)
    }
}

impl From<f64> for TypedValue {
    fn from(n: f64) -> Self {
        TypedValue::Double(n)
    }
}

impl From<bool> for TypedValue {
    fn from(b: bool) -> Self {
        TypedValue::Boolean(b)
    }
}

impl From<Vec<u8>> for TypedValue {
    fn from(b: Vec<u8>) -> Self {
        TypedValue::ByteArray(b)
    }
}

impl From<Uuid> for TypedValue {
    fn from(g: Uuid) -> Self {
        TypedValue::Guid(g)
    }
}

impl From<DateTime<Utc>> for TypedValue {
    fn from(t: DateTime<Utc>) -> Self {
        TypedValue::DateTime(t)
    }
}

impl From<Decimal> for TypedValue {
    fn from(d: Decimal) -> Self {
        TypedValue::Decimal(d)
    }
}

impl<T: Into<TypedValue>> From<Option<T>> for TypedValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(TypedValue::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_codes_are_dense() {
        for (i, kind) in ValueKind::ALL.iter().enumerate() {
            assert_eq!(usize::from(kind.to_code()), i);
            assert_eq!(ValueKind::from_code(kind.to_code()), Some(*kind));
            assert_eq!(ValueKind::from_name(kind.name()).unwrap(), *kind);
        }
        assert_eq!(ValueKind::from_code(11), None);
        assert!(ValueKind::from_name("int32").is_err());
    }

    #[test]
    fn float_equality_is_bitwise() {
        assert_eq!(TypedValue::Double(f64::NAN), TypedValue::Double(f64::NAN));
        assert_ne!(TypedValue::Double(0.0), TypedValue::Double(-0.0));
        assert_ne!(TypedValue::Int32(1), TypedValue::Int64(1));
    }

    #[test]
    fn conversions() {
        assert_eq!(TypedValue::from("a"), TypedValue::String("a".into()));
        assert_eq!(TypedValue::from(None::<i32>), TypedValue::Null);
        assert_eq!(TypedValue::from(Some(7i64)).as_i64(), Some(7));
        assert!(TypedValue::Null.is_null());
        assert_eq!(TypedValue::Int32(3).kind(), ValueKind::Int32);
    }
}
