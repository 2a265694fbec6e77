//! Conversion between typed values and SQLite storage classes.
//!
//! Decimals are stored as a BLOB holding their canonical text. A column
//! declared `DECIMAL` or `NUMERIC` has NUMERIC affinity, which would turn
//! decimal TEXT into a REAL or an INTEGER and lose digits and scale. SQLite
//! never converts a BLOB.

use chrono::{DateTime, SecondsFormat, Utc};
use rowsync_codec::{CodecError, CodecResult, Decimal, TypedValue, ValueKind};
use rusqlite::types::{Value, ValueRef};
use uuid::Uuid;

/// Converts a typed value into the SQLite value it is stored as.
pub fn to_sql(value: &TypedValue) -> Value {
    match value {
        TypedValue::Null => Value::Null,
        TypedValue::String(s) => Value::Text(s.clone()),
        TypedValue::Int32(v) => Value::Integer(i64::from(*v)),
        TypedValue::Int64(v) => Value::Integer(*v),
        TypedValue::Float(v) => Value::Real(f64::from(*v)),
        TypedValue::Double(v) => Value::Real(*v),
        TypedValue::DateTime(v) => Value::Text(v.to_rfc3339_opts(SecondsFormat::Nanos, true)),
        TypedValue::Boolean(v) => Value::Integer(i64::from(*v)),
        TypedValue::ByteArray(v) => Value::Blob(v.clone()),
        TypedValue::Guid(v) => Value::Text(v.hyphenated().to_string()),
        TypedValue::Decimal(v) => Value::Blob(v.to_string().into_bytes()),
    }
}

/// Reads a stored value as `kind`, or by storage class when `kind` is `None`.
pub fn from_sql(value: ValueRef<'_>, kind: Option<ValueKind>) -> CodecResult<TypedValue> {
    if let ValueRef::Null = value {
        return Ok(TypedValue::Null);
    }
    let Some(kind) = kind else {
        return Ok(match value {
            ValueRef::Integer(v) => TypedValue::Int64(v),
            ValueRef::Real(v) => TypedValue::Double(v),
            ValueRef::Text(t) => TypedValue::String(text(t)?),
            ValueRef::Blob(b) => TypedValue::ByteArray(b.to_vec()),
            ValueRef::Null => TypedValue::Null,
        });
    };

    match (kind, value) {
        (ValueKind::Null, _) => Ok(TypedValue::Null),

        (ValueKind::String, ValueRef::Text(t)) => Ok(TypedValue::String(text(t)?)),
        (ValueKind::String, ValueRef::Integer(v)) => Ok(TypedValue::String(v.to_string())),
        (ValueKind::String, ValueRef::Real(v)) => Ok(TypedValue::String(v.to_string())),

        (ValueKind::Int32, ValueRef::Integer(v)) => i32::try_from(v)
            .map(TypedValue::Int32)
            .map_err(|_| CodecError::decoding_failed(format!("{} does not fit in Int32", v))),
        (ValueKind::Int64, ValueRef::Integer(v)) => Ok(TypedValue::Int64(v)),

        (ValueKind::Float, ValueRef::Real(v)) => Ok(TypedValue::Float(narrow(v))),
        (ValueKind::Float, ValueRef::Integer(v)) => Ok(TypedValue::Float(narrow(v as f64))),
        (ValueKind::Double, ValueRef::Real(v)) => Ok(TypedValue::Double(v)),
        (ValueKind::Double, ValueRef::Integer(v)) => Ok(TypedValue::Double(v as f64)),

        (ValueKind::DateTime, ValueRef::Text(t)) => DateTime::parse_from_rfc3339(&text(t)?)
            .map(|dt| TypedValue::DateTime(dt.with_timezone(&Utc)))
            .map_err(|e| CodecError::decoding_failed(format!("invalid timestamp: {}", e))),
        (ValueKind::DateTime, ValueRef::Integer(secs)) => DateTime::from_timestamp(secs, 0)
            .map(TypedValue::DateTime)
            .ok_or_else(|| CodecError::decoding_failed(format!("timestamp {} out of range", secs))),

        (ValueKind::Boolean, ValueRef::Integer(v)) => Ok(TypedValue::Boolean(v != 0)),

        (ValueKind::ByteArray, ValueRef::Blob(b)) => Ok(TypedValue::ByteArray(b.to_vec())),
        (ValueKind::ByteArray, ValueRef::Text(t)) => Ok(TypedValue::ByteArray(t.to_vec())),

        (ValueKind::Guid, ValueRef::Text(t)) => Uuid::parse_str(&text(t)?)
            .map(TypedValue::Guid)
            .map_err(|e| CodecError::decoding_failed(format!("invalid uuid: {}", e))),
        (ValueKind::Guid, ValueRef::Blob(b)) => Uuid::from_slice(b)
            .map(TypedValue::Guid)
            .map_err(|e| CodecError::decoding_failed(format!("invalid uuid: {}", e))),

        (ValueKind::Decimal, ValueRef::Blob(b) | ValueRef::Text(b)) => {
            text(b)?.parse().map(TypedValue::Decimal)
        }
        // Application writes of numeric literals; nothing written here lands
        // as INTEGER or REAL.
        (ValueKind::Decimal, ValueRef::Integer(v)) => Ok(TypedValue::Decimal(Decimal::from_i64(v))),
        (ValueKind::Decimal, ValueRef::Real(v)) => v.to_string().parse().map(TypedValue::Decimal),

        (kind, value) => Err(CodecError::decoding_failed(format!(
            "cannot read {:?} storage as {}",
            value.data_type(),
            kind
        ))),
    }
}

fn text(bytes: &[u8]) -> CodecResult<String> {
    String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)
}

#[allow(clippy::cast_possible_truncation)]
fn narrow(v: f64) -> f32 {
    v as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn through_storage(value: TypedValue) -> TypedValue {
        let kind = Some(value.kind());
        let stored = to_sql(&value);
        from_sql(ValueRef::from(&stored), kind).unwrap()
    }

    #[test]
    fn every_kind_survives_storage() {
        let ts = Utc.with_ymd_and_hms(2024, 2, 29, 12, 30, 0).unwrap()
            + chrono::Duration::nanoseconds(123_456_789);
        let values = [
            TypedValue::String("héllo".into()),
            TypedValue::Int32(-7),
            TypedValue::Int64(i64::MAX),
            TypedValue::Float(1.5),
            TypedValue::Double(-0.25),
            TypedValue::DateTime(ts),
            TypedValue::Boolean(true),
            TypedValue::ByteArray(vec![0, 1, 255]),
            TypedValue::Guid(Uuid::new_v4()),
            TypedValue::Decimal("-12.034".parse().unwrap()),
        ];
        for value in values {
            assert_eq!(through_storage(value.clone()), value);
        }
    }

    #[test]
    fn null_reads_as_null_for_any_kind() {
        for kind in ValueKind::ALL {
            assert_eq!(from_sql(ValueRef::Null, Some(kind)).unwrap(), TypedValue::Null);
        }
        assert_eq!(from_sql(ValueRef::Null, None).unwrap(), TypedValue::Null);
    }

    #[test]
    fn untyped_columns_follow_the_storage_class() {
        assert_eq!(from_sql(ValueRef::Integer(3), None).unwrap(), TypedValue::Int64(3));
        assert_eq!(from_sql(ValueRef::Real(0.5), None).unwrap(), TypedValue::Double(0.5));
        assert_eq!(from_sql(ValueRef::Text(b"x"), None).unwrap(), TypedValue::String("x".into()));
        assert_eq!(
            from_sql(ValueRef::Blob(&[1, 2]), None).unwrap(),
            TypedValue::ByteArray(vec![1, 2])
        );
    }

    fn through_column(declared: &str, value: &Decimal) -> TypedValue {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(&format!("CREATE TABLE prices (amount {})", declared))
            .unwrap();
        conn.execute(
            "INSERT INTO prices (amount) VALUES (?1)",
            [to_sql(&TypedValue::Decimal(*value))],
        )
        .unwrap();
        conn.query_row("SELECT amount FROM prices", [], |row| {
            Ok(from_sql(row.get_ref(0)?, Some(ValueKind::Decimal)).unwrap())
        })
        .unwrap()
    }

    #[test]
    fn decimals_keep_digits_and_scale_in_numeric_columns() {
        let values = [
            "1234567890123456789.1234",
            "12.30",
            "-0.000",
            "170141183460469231731687303715884105727",
            "-1701411834604692317316873037158841.05728",
        ];
        for declared in ["DECIMAL(30,4)", "NUMERIC", "MONEY", "TEXT", ""] {
            for literal in values {
                let value: Decimal = literal.parse().unwrap();
                assert_eq!(
                    through_column(declared, &value),
                    TypedValue::Decimal(value),
                    "{} in {:?}",
                    literal,
                    declared
                );
            }
        }
    }

    #[test]
    fn numeric_affinity_is_tolerated() {
        // Rows written by the application as plain numbers.
        assert_eq!(
            from_sql(ValueRef::Integer(12), Some(ValueKind::Decimal)).unwrap(),
            TypedValue::Decimal(Decimal::from_i64(12))
        );
        assert_eq!(
            from_sql(ValueRef::Real(12.5), Some(ValueKind::Decimal)).unwrap(),
            TypedValue::Decimal("12.5".parse().unwrap())
        );
    }

    #[test]
    fn out_of_range_int32_is_an_error() {
        assert!(from_sql(ValueRef::Integer(i64::from(i32::MAX) + 1), Some(ValueKind::Int32)).is_err());
        assert!(from_sql(ValueRef::Blob(&[1]), Some(ValueKind::Boolean)).is_err());
    }
}
