//! Self-describing JSON form of typed values.
//!
//! Every value is an object with a `type` tag and, except for `Null`, a
//! `value` field:
//!
//! ```text
//! {"type":"Int32","value":5}
//! {"type":"DateTime","value":"2024-01-02T03:04:05.000000006Z"}
//! {"type":"ByteArray","value":"AQID"}
//! {"type":"Null"}
//! ```
//!
//! Non-finite floats travel as the strings `"NaN"`, `"Infinity"` and
//! `"-Infinity"` since JSON has no literal for them.

use crate::decimal::Decimal;
use crate::error::{CodecError, CodecResult};
use crate::value::{TypedValue, ValueKind};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value as Json};
use uuid::Uuid;

/// Convert a value to its JSON form.
pub fn to_json(value: &TypedValue) -> Json {
    let tag = value.kind().name();
    let payload = match value {
        TypedValue::Null => return json!({ "type": tag }),
        TypedValue::String(s) => Json::String(s.clone()),
        TypedValue::Int32(n) => json!(n),
        TypedValue::Int64(n) => json!(n),
        TypedValue::Float(n) => float_to_json(f64::from(*n)),
        TypedValue::Double(n) => float_to_json(*n),
        TypedValue::DateTime(t) => Json::String(t.to_rfc3339_opts(SecondsFormat::Nanos, true)),
        TypedValue::Boolean(b) => Json::Bool(*b),
        TypedValue::ByteArray(b) => Json::String(STANDARD.encode(b)),
        TypedValue::Guid(g) => Json::String(g.hyphenated().to_string()),
        TypedValue::Decimal(d) => Json::String(d.to_string()),
    };
    json!({ "type": tag, "value": payload })
}

/// Parse a value from its JSON form.
pub fn from_json(json: &Json) -> CodecResult<TypedValue> {
    let obj = json
        .as_object()
        .ok_or_else(|| CodecError::invalid_structure("typed value must be an object"))?;
    let tag = obj
        .get("type")
        .and_then(Json::as_str)
        .ok_or_else(|| CodecError::invalid_structure("typed value is missing its type tag"))?;
    let kind = ValueKind::from_name(tag)?;

    if kind == ValueKind::Null {
        return Ok(TypedValue::Null);
    }

    let payload = obj
        .get("value")
        .ok_or_else(|| CodecError::invalid_structure(format!("{} value is missing", tag)))?;
    let mismatch = || CodecError::decoding_failed(format!("invalid {} payload: {}", tag, payload));

    let value = match kind {
        ValueKind::Null => TypedValue::Null,
        ValueKind::String => TypedValue::String(payload.as_str().ok_or_else(mismatch)?.to_string()),
        ValueKind::Int32 => {
            let n = payload.as_i64().ok_or_else(mismatch)?;
            TypedValue::Int32(i32::try_from(n).map_err(|_| mismatch())?)
        }
        ValueKind::Int64 => TypedValue::Int64(payload.as_i64().ok_or_else(mismatch)?),
        ValueKind::Float => TypedValue::Float(narrow(float_from_json(payload).ok_or_else(mismatch)?)),
        ValueKind::Double => TypedValue::Double(float_from_json(payload).ok_or_else(mismatch)?),
        ValueKind::DateTime => {
            let s = payload.as_str().ok_or_else(mismatch)?;
            let t = DateTime::parse_from_rfc3339(s).map_err(|_| mismatch())?;
            TypedValue::DateTime(t.with_timezone(&Utc))
        }
        ValueKind::Boolean => TypedValue::Boolean(payload.as_bool().ok_or_else(mismatch)?),
        ValueKind::ByteArray => {
            let s = payload.as_str().ok_or_else(mismatch)?;
            TypedValue::ByteArray(STANDARD.decode(s).map_err(|_| mismatch())?)
        }
        ValueKind::Guid => {
            let s = payload.as_str().ok_or_else(mismatch)?;
            TypedValue::Guid(Uuid::parse_str(s).map_err(|_| mismatch())?)
        }
        ValueKind::Decimal => {
            let s = payload.as_str().ok_or_else(mismatch)?;
            TypedValue::Decimal(s.parse::<Decimal>()?)
        }
    };
    Ok(value)
}

/// Convert an ordered column map to a JSON array of `[name, value]` pairs.
///
/// An array keeps column order stable regardless of how the JSON library
/// orders object keys.
pub fn columns_to_json(columns: &[(String, TypedValue)]) -> Json {
    Json::Array(
        columns
            .iter()
            .map(|(name, value)| json!([name, to_json(value)]))
            .collect(),
    )
}

/// Parse the output of [`columns_to_json`].
pub fn columns_from_json(json: &Json) -> CodecResult<Vec<(String, TypedValue)>> {
    let entries = json
        .as_array()
        .ok_or_else(|| CodecError::invalid_structure("columns must be an array"))?;
    entries
        .iter()
        .map(|entry| match entry.as_array().map(Vec::as_slice) {
            Some([Json::String(name), value]) => Ok((name.clone(), from_json(value)?)),
            _ => Err(CodecError::invalid_structure(
                "column entry must be a [name, value] pair",
            )),
        })
        .collect()
}

fn float_to_json(n: f64) -> Json {
    if n.is_nan() {
        Json::String("NaN".into())
    } else if n == f64::INFINITY {
        Json::String("Infinity".into())
    } else if n == f64::NEG_INFINITY {
        Json::String("-Infinity".into())
    } else {
        json!(n)
    }
}

#[allow(clippy::cast_possible_truncation)]
fn narrow(n: f64) -> f32 {
    n as f32
}

fn float_from_json(json: &Json) -> Option<f64> {
    match json {
        Json::Number(n) => n.as_f64(),
        Json::String(s) => match s.as_str() {
            "NaN" => Some(f64::NAN),
            "Infinity" => Some(f64::INFINITY),
            "-Infinity" => Some(f64::NEG_INFINITY),
            _ => None,
        },
        _ => None,
    }
}

impl Serialize for TypedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        to_json(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TypedValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = Json::deserialize(deserializer)?;
        from_json(&json).map_err(D::Error::custom)
    }
}

/// Serde adapter for ordered column lists, for use with `#[serde(with)]`.
pub mod columns {
    use super::*;

    /// Serialize columns as `[name, value]` pairs.
    pub fn serialize<S: Serializer>(
        columns: &[(String, TypedValue)],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        columns_to_json(columns).serialize(serializer)
    }

    /// Deserialize columns from `[name, value]` pairs.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<(String, TypedValue)>, D::Error> {
        let json = Json::deserialize(deserializer)?;
        columns_from_json(&json).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn null_has_no_payload() {
        assert_eq!(to_json(&TypedValue::Null), json!({ "type": "Null" }));
        assert_eq!(from_json(&json!({ "type": "Null" })).unwrap(), TypedValue::Null);
    }

    #[test]
    fn datetime_keeps_nanoseconds() {
        let t = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let json = to_json(&TypedValue::DateTime(t));
        assert_eq!(json["value"], "2023-11-14T22:13:20.123456789Z");
        assert_eq!(from_json(&json).unwrap(), TypedValue::DateTime(t));
    }

    #[test]
    fn non_finite_doubles() {
        for n in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let json = to_json(&TypedValue::Double(n));
            assert!(json["value"].is_string());
            assert_eq!(from_json(&json).unwrap(), TypedValue::Double(n));
        }
    }

    #[test]
    fn int32_range_is_checked() {
        let json = json!({ "type": "Int32", "value": 4_000_000_000i64 });
        assert!(from_json(&json).is_err());
    }

    #[test]
    fn wrong_payload_type() {
        assert!(from_json(&json!({ "type": "Boolean", "value": "yes" })).is_err());
        assert!(from_json(&json!({ "type": "Guid", "value": "not-a-uuid" })).is_err());
        assert!(from_json(&json!({ "type": "Int64" })).is_err());
        assert!(from_json(&json!(5)).is_err());
    }

    #[test]
    fn serde_goes_through_json_form() {
        let value = TypedValue::ByteArray(vec![1, 2, 3]);
        let text = serde_json::to_string(&value).unwrap();
        assert_eq!(text, r#"{"type":"ByteArray","value":"AQID"}"#);
        let back: TypedValue = serde_json::from_str(&text).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn columns_keep_order() {
        let columns = vec![
            ("z".to_string(), TypedValue::Int32(1)),
            ("a".to_string(), TypedValue::Null),
        ];
        let json = columns_to_json(&columns);
        assert_eq!(json[0][0], "z");
        assert_eq!(columns_from_json(&json).unwrap(), columns);
    }
}
