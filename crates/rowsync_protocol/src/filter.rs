//! Named parameters for custom change queries.

use rowsync_codec::TypedValue;
use serde::{Deserialize, Serialize};

/// A value bound to `@name` in a table's custom snapshot or incremental query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFilterParameter {
    /// Parameter name without the `@` prefix.
    pub name: String,
    /// Bound value.
    pub value: TypedValue,
}

impl SyncFilterParameter {
    /// Creates a parameter.
    pub fn new(name: impl Into<String>, value: impl Into<TypedValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// The placeholder as it appears in SQL.
    pub fn placeholder(&self) -> String {
        format!("@{}", self.name)
    }

    /// Renders the value for a URL query string.
    ///
    /// The receiving side only sees strings, so typed values are flattened to
    /// their display form.
    pub fn query_value(&self) -> String {
        match &self.value {
            TypedValue::Null => String::new(),
            TypedValue::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_and_query_value() {
        let p = SyncFilterParameter::new("owner", "bob");
        assert_eq!(p.placeholder(), "@owner");
        assert_eq!(p.query_value(), "bob");
        assert_eq!(SyncFilterParameter::new("n", 5i32).query_value(), "5");
    }
}
