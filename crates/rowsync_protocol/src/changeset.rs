//! Change sets exchanged between stores.

use crate::anchor::Anchor;
use crate::item::SyncItem;
use serde::{Deserialize, Serialize};

/// Changes collected from one store for another.
///
/// `source_anchor` is the producer's version at collection time.
/// `target_anchor` is the version of the consumer the producer believes the
/// consumer already incorporated; appliers use it as the optimistic
/// concurrency baseline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSet {
    /// Producer's version at collection time.
    pub source_anchor: Anchor,
    /// Consumer version the changes were computed against.
    pub target_anchor: Anchor,
    /// Changed rows, in change-log order per table.
    pub items: Vec<SyncItem>,
}

/// Number of items contributed by one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCount {
    /// Table name.
    pub name: String,
    /// Item count.
    pub count: u64,
}

impl ChangeSet {
    /// Creates a change set.
    pub fn new(source_anchor: Anchor, target_anchor: Anchor, items: Vec<SyncItem>) -> Self {
        Self {
            source_anchor,
            target_anchor,
            items,
        }
    }

    /// Creates an empty change set.
    pub fn empty(source_anchor: Anchor, target_anchor: Anchor) -> Self {
        Self::new(source_anchor, target_anchor, Vec::new())
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if there are no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items `[skip, skip + take)`, clamped to the available range.
    pub fn slice(&self, skip: usize, take: usize) -> &[SyncItem] {
        let start = skip.min(self.items.len());
        let end = start.saturating_add(take).min(self.items.len());
        &self.items[start..end]
    }

    /// Per-table item counts in order of first appearance.
    pub fn table_counts(&self) -> Vec<TableCount> {
        let mut counts: Vec<TableCount> = Vec::new();
        for item in &self.items {
            match counts.iter_mut().find(|c| c.name == item.table_name) {
                Some(entry) => entry.count += 1,
                None => counts.push(TableCount {
                    name: item.table_name.clone(),
                    count: 1,
                }),
            }
        }
        counts
    }
}
