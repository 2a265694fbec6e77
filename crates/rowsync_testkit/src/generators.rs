//! Property-based test generators using proptest.

use chrono::{DateTime, Utc};
use proptest::prelude::*;
use rowsync_codec::{Decimal, TypedValue};
use rowsync_protocol::{Anchor, ChangeSet, ChangeType, SyncItem};
use uuid::Uuid;

/// Generates a non-nil UUID.
pub fn uuid_strategy() -> impl Strategy<Value = Uuid> {
    any::<u128>()
        .prop_filter("nil uuid", |v| *v != 0)
        .prop_map(Uuid::from_u128)
}

/// Generates timestamps between years 1 and 9999 with nanosecond precision.
pub fn datetime_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    (-62_135_596_800i64..253_402_300_799i64, 0u32..1_000_000_000u32)
        .prop_filter_map("out of range", |(secs, nanos)| DateTime::from_timestamp(secs, nanos))
}

/// Generates decimals over the full 128-bit mantissa range and any
/// supported scale, with the extremes weighted in.
pub fn decimal_strategy() -> impl Strategy<Value = Decimal> {
    let mantissa = prop_oneof![
        6 => any::<i128>(),
        2 => any::<i64>().prop_map(i128::from),
        1 => Just(i128::MIN),
        1 => Just(i128::MAX),
    ];
    (mantissa, 0..=Decimal::MAX_SCALE)
        .prop_filter_map("invalid decimal", |(m, s)| Decimal::new(m, s).ok())
}

/// Generates doubles including the special values both encodings must keep.
pub fn double_strategy() -> impl Strategy<Value = f64> {
    prop_oneof![
        8 => prop::num::f64::NORMAL | prop::num::f64::SUBNORMAL | prop::num::f64::ZERO,
        1 => Just(f64::NAN),
        1 => Just(f64::INFINITY),
        1 => Just(f64::NEG_INFINITY),
    ]
}

/// Generates floats including the special values both encodings must keep.
pub fn float_strategy() -> impl Strategy<Value = f32> {
    prop_oneof![
        8 => prop::num::f32::NORMAL | prop::num::f32::SUBNORMAL | prop::num::f32::ZERO,
        1 => Just(f32::NAN),
        1 => Just(f32::INFINITY),
        1 => Just(f32::NEG_INFINITY),
    ]
}

/// Generates a value of any kind.
pub fn typed_value_strategy() -> impl Strategy<Value = TypedValue> {
    prop_oneof![
        Just(TypedValue::Null),
        any::<String>().prop_map(TypedValue::String),
        any::<i32>().prop_map(TypedValue::Int32),
        any::<i64>().prop_map(TypedValue::Int64),
        float_strategy().prop_map(TypedValue::Float),
        double_strategy().prop_map(TypedValue::Double),
        datetime_strategy().prop_map(TypedValue::DateTime),
        any::<bool>().prop_map(TypedValue::Boolean),
        prop::collection::vec(any::<u8>(), 0..64).prop_map(TypedValue::ByteArray),
        any::<u128>().prop_map(|v| TypedValue::Guid(Uuid::from_u128(v))),
        decimal_strategy().prop_map(TypedValue::Decimal),
    ]
}

/// Generates a valid SQL-ish identifier.
pub fn identifier_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,15}"
}

/// Generates a change type.
pub fn change_type_strategy() -> impl Strategy<Value = ChangeType> {
    prop_oneof![
        Just(ChangeType::Insert),
        Just(ChangeType::Update),
        Just(ChangeType::Delete),
    ]
}

/// Generates an item with up to eight columns.
pub fn sync_item_strategy() -> impl Strategy<Value = SyncItem> {
    (
        identifier_strategy(),
        change_type_strategy(),
        prop::collection::vec((identifier_strategy(), typed_value_strategy()), 0..8),
    )
        .prop_map(|(table, change_type, values)| {
            let mut item = SyncItem::new(table, change_type);
            item.values = values;
            item
        })
}

/// Generates an anchor.
pub fn anchor_strategy() -> impl Strategy<Value = Anchor> {
    (uuid_strategy(), any::<u64>())
        .prop_filter_map("invalid anchor", |(id, version)| Anchor::new(id, version).ok())
}

/// Generates a change set with up to `max_items` items.
pub fn change_set_strategy(max_items: usize) -> impl Strategy<Value = ChangeSet> {
    (
        anchor_strategy(),
        anchor_strategy(),
        prop::collection::vec(sync_item_strategy(), 0..=max_items),
    )
        .prop_map(|(source, target, items)| ChangeSet::new(source, target, items))
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowsync_codec::{from_json, to_json, value_from_bytes, value_to_bytes};
    use rowsync_protocol::{decode, encode, Encoding};

    proptest! {
        #![proptest_config(PropTestConfig::default().to_proptest_config())]

        #[test]
        fn value_survives_text_encoding(value in typed_value_strategy()) {
            let json = to_json(&value);
            prop_assert_eq!(from_json(&json).unwrap(), value);
        }

        #[test]
        fn value_survives_binary_encoding(value in typed_value_strategy()) {
            let bytes = value_to_bytes(&value).unwrap();
            prop_assert_eq!(value_from_bytes(&bytes).unwrap(), value);
        }
    }

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn change_set_survives_both_encodings(changes in change_set_strategy(12)) {
            for encoding in [Encoding::Text, Encoding::Binary] {
                let bytes = encode(&changes, encoding).unwrap();
                let back: ChangeSet = decode(&bytes, encoding).unwrap();
                prop_assert_eq!(&back, &changes);
            }
        }

        #[test]
        fn slices_reassemble_in_order(changes in change_set_strategy(40), chunk in 1usize..50) {
            let mut reassembled = Vec::new();
            let mut skip = 0;
            while skip < changes.len() {
                reassembled.extend_from_slice(changes.slice(skip, chunk));
                skip += chunk;
            }
            prop_assert_eq!(reassembled, changes.items.clone());
        }

        #[test]
        fn generated_anchors_are_never_nil(anchor in anchor_strategy()) {
            prop_assert!(!anchor.store_id().is_nil());
        }
    }
}
