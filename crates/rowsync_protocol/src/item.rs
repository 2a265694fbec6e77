//! Row-level change items.

use rowsync_codec::{BinaryDecoder, BinaryEncoder, CodecError, CodecResult, TypedValue};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of change recorded for a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeType {
    /// Row was created.
    Insert,
    /// Row was modified.
    Update,
    /// Row was removed.
    Delete,
}

impl ChangeType {
    /// Converts to a numeric code for binary encoding.
    pub fn to_code(&self) -> u8 {
        match self {
            ChangeType::Insert => 1,
            ChangeType::Update => 2,
            ChangeType::Delete => 3,
        }
    }

    /// Converts from a numeric code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(ChangeType::Insert),
            2 => Some(ChangeType::Update),
            3 => Some(ChangeType::Delete),
            _ => None,
        }
    }

    /// The single-letter op stored in change logs.
    pub fn log_op(&self) -> &'static str {
        match self {
            ChangeType::Insert => "I",
            ChangeType::Update => "U",
            ChangeType::Delete => "D",
        }
    }

    /// Parses a change-log op letter.
    pub fn from_log_op(op: &str) -> Option<Self> {
        match op {
            "I" => Some(ChangeType::Insert),
            "U" => Some(ChangeType::Update),
            "D" => Some(ChangeType::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeType::Insert => "insert",
            ChangeType::Update => "update",
            ChangeType::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// One changed row.
///
/// `values` is ordered as the producing store returned the columns. A delete
/// carries only the primary-key column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncItem {
    /// Table the row belongs to.
    pub table_name: String,
    /// What happened to the row.
    pub change_type: ChangeType,
    /// Column values, in column order.
    #[serde(with = "rowsync_codec::text::columns")]
    pub values: Vec<(String, TypedValue)>,
}

impl SyncItem {
    /// Creates an item with no values.
    pub fn new(table_name: impl Into<String>, change_type: ChangeType) -> Self {
        Self {
            table_name: table_name.into(),
            change_type,
            values: Vec::new(),
        }
    }

    /// Appends a column value.
    #[must_use]
    pub fn with_value(mut self, column: impl Into<String>, value: impl Into<TypedValue>) -> Self {
        self.values.push((column.into(), value.into()));
        self
    }

    /// Looks up a column value by name (case-insensitive, like SQL identifiers).
    pub fn get(&self, column: &str) -> Option<&TypedValue> {
        self.values
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, v)| v)
    }

    /// Returns a copy of this item with another change type.
    pub fn with_change_type(&self, change_type: ChangeType) -> Self {
        Self {
            change_type,
            ..self.clone()
        }
    }

    pub(crate) fn write(&self, enc: &mut BinaryEncoder) -> CodecResult<()> {
        enc.write_str(&self.table_name)?;
        enc.write_u8(self.change_type.to_code());
        enc.write_len(self.values.len())?;
        for (name, value) in &self.values {
            enc.write_str(name)?;
            enc.write_value(value)?;
        }
        Ok(())
    }

    pub(crate) fn read(dec: &mut BinaryDecoder<'_>) -> CodecResult<Self> {
        let table_name = dec.read_str()?;
        let code = dec.read_u8()?;
        let change_type = ChangeType::from_code(code).ok_or_else(|| {
            CodecError::invalid_structure(format!("unknown change type code {}", code))
        })?;
        let count = dec.read_count()?;
        let mut values = Vec::with_capacity(count.min(256));
        for _ in 0..count {
            let name = dec.read_str()?;
            let value = dec.read_value()?;
            values.push((name, value));
        }
        Ok(Self {
            table_name,
            change_type,
            values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_type_codes() {
        for ct in [ChangeType::Insert, ChangeType::Update, ChangeType::Delete] {
            assert_eq!(ChangeType::from_code(ct.to_code()), Some(ct));
            assert_eq!(ChangeType::from_log_op(ct.log_op()), Some(ct));
        }
        assert_eq!(ChangeType::from_code(0), None);
        assert_eq!(ChangeType::from_log_op("X"), None);
    }

    #[test]
    fn json_shape() {
        let item = SyncItem::new("users", ChangeType::Insert)
            .with_value("id", 1i64)
            .with_value("name", "Alice");
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["tableName"], "users");
        assert_eq!(json["changeType"], "Insert");
        assert_eq!(json["values"][1][0], "name");
        assert_eq!(json["values"][1][1]["type"], "String");

        let back: SyncItem = serde_json::from_value(json).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn lookup_ignores_case() {
        let item = SyncItem::new("t", ChangeType::Delete).with_value("Id", 5i32);
        assert_eq!(item.get("id"), Some(&TypedValue::Int32(5)));
        assert_eq!(item.get("name"), None);
    }
}
