//! Per-item conflict resolution.
//!
//! Applying an incoming item is a small state machine. Each write is guarded
//! by the optimistic check "the row's latest local log version is not newer
//! than the change set's target version" unless force-write is set:
//!
//! - a guarded write that touches a row succeeds;
//! - an insert that touches nothing becomes an update when the row exists;
//! - an insert of an absent row whose log has an entry newer than the target
//!   (it was deleted locally since) is a conflict, otherwise the store
//!   rejected it (integrity failure);
//! - an update or delete that touches nothing is a conflict, settled by the
//!   caller's [`ConflictHandler`];
//! - a forced delete that touches nothing found the row already gone;
//! - a forced update that touches nothing re-creates the row as an insert.
//!
//! The last rule changes the requested operation. It is reported as
//! [`ItemOutcome::Recreated`] so callers can tell it apart.

use crate::cancel::CancelToken;
use crate::error::{SyncError, SyncResult};
use rowsync_protocol::{ChangeSet, ChangeType, ConflictResolution, SyncItem};
use tracing::{debug, warn};

/// Decides how to settle a conflicting item.
pub type ConflictHandler = dyn Fn(&SyncItem) -> ConflictResolution + Send + Sync;

/// A handler that keeps every local row.
pub fn always_skip() -> Box<ConflictHandler> {
    Box::new(|_| ConflictResolution::Skip)
}

/// A handler that lets every incoming change win.
pub fn always_force_write() -> Box<ConflictHandler> {
    Box::new(|_| ConflictResolution::ForceWrite)
}

/// A handler that always returns `resolution`.
pub fn resolve_with(resolution: ConflictResolution) -> Box<ConflictHandler> {
    Box::new(move |_| resolution)
}

/// Upper bound on write attempts for one item.
///
/// The longest legal path is insert, update, forced update (or update,
/// forced update, forced insert).
pub const MAX_WRITE_ATTEMPTS: usize = 3;

/// What happened to one incoming item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Written as requested (possibly as an update of an existing row).
    Applied,
    /// A forced update found no row and inserted it.
    Recreated,
    /// A forced delete found no row.
    AlreadyAbsent,
    /// The store refused the write (constraint failure).
    Rejected,
    /// Conflict settled in favour of the local row.
    Skipped,
    /// The table is not configured on this store.
    UnknownTable,
}

/// Writes for one apply transaction.
pub trait ItemWriter {
    /// Returns true if `table` is configured for sync.
    fn knows_table(&self, table: &str) -> bool;

    /// Performs a guarded write and returns the number of affected rows.
    ///
    /// Unless `force` is set, the write only touches a row whose latest log
    /// version is at most `target_version`. Constraint failures are reported
    /// as zero rows, not as errors.
    fn write(
        &self,
        item: &SyncItem,
        change_type: ChangeType,
        target_version: u64,
        force: bool,
    ) -> SyncResult<usize>;

    /// Returns true if a row with the item's primary key exists.
    fn exists(&self, item: &SyncItem) -> SyncResult<bool>;

    /// Returns the newest log version recorded for the item's primary key,
    /// or 0 when the log holds none.
    fn local_version(&self, item: &SyncItem) -> SyncResult<u64>;

    /// Marks log entries produced by the last write as originating from
    /// the peer that sent the change set.
    fn stamp_source(&self) -> SyncResult<()>;
}

/// Applies one item through the conflict state machine.
pub fn apply_item<W: ItemWriter + ?Sized>(
    writer: &W,
    item: &SyncItem,
    target_version: u64,
    on_conflict: Option<&ConflictHandler>,
) -> SyncResult<ItemOutcome> {
    let mut change_type = item.change_type;
    let mut force = false;
    let mut recreating = false;

    for _ in 0..MAX_WRITE_ATTEMPTS {
        let affected = writer.write(item, change_type, target_version, force)?;
        if affected > 0 {
            writer.stamp_source()?;
            return Ok(if recreating {
                debug!(table = %item.table_name, "forced update re-created a missing row");
                ItemOutcome::Recreated
            } else {
                ItemOutcome::Applied
            });
        }

        match (change_type, force) {
            (ChangeType::Insert, false) => {
                if writer.exists(item)? {
                    change_type = ChangeType::Update;
                    continue;
                }
                if writer.local_version(item)? <= target_version {
                    warn!(table = %item.table_name, "insert rejected by the store");
                    return Ok(ItemOutcome::Rejected);
                }
            }
            (ChangeType::Insert, true) => {
                warn!(table = %item.table_name, "forced insert rejected by the store");
                return Ok(ItemOutcome::Rejected);
            }
            (ChangeType::Delete, true) => return Ok(ItemOutcome::AlreadyAbsent),
            (ChangeType::Update, true) => {
                change_type = ChangeType::Insert;
                recreating = true;
                continue;
            }
            (ChangeType::Update | ChangeType::Delete, false) => {}
        }

        let resolution = on_conflict.map_or(ConflictResolution::Skip, |handler| handler(item));
        match resolution {
            ConflictResolution::ForceWrite => force = true,
            ConflictResolution::Skip => {
                debug!(
                    table = %item.table_name,
                    change = %change_type,
                    "conflict resolved by keeping the local row"
                );
                return Ok(ItemOutcome::Skipped);
            }
        }
    }

    Err(SyncError::InvariantViolation(format!(
        "{} on table {} did not settle after {} write attempts",
        item.change_type, item.table_name, MAX_WRITE_ATTEMPTS
    )))
}

/// Tally of item outcomes for one apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Items written as requested.
    pub applied: u64,
    /// Forced updates that re-created a row.
    pub recreated: u64,
    /// Forced deletes of rows that were already gone.
    pub already_absent: u64,
    /// Items the store refused.
    pub rejected: u64,
    /// Conflicts resolved in favour of the local row.
    pub skipped: u64,
    /// Items for tables this store does not sync.
    pub unknown_table: u64,
}

impl ApplyReport {
    /// Counts one outcome.
    pub fn record(&mut self, outcome: ItemOutcome) {
        let counter = match outcome {
            ItemOutcome::Applied => &mut self.applied,
            ItemOutcome::Recreated => &mut self.recreated,
            ItemOutcome::AlreadyAbsent => &mut self.already_absent,
            ItemOutcome::Rejected => &mut self.rejected,
            ItemOutcome::Skipped => &mut self.skipped,
            ItemOutcome::UnknownTable => &mut self.unknown_table,
        };
        *counter += 1;
    }

    /// Total items seen.
    pub fn total(&self) -> u64 {
        self.applied
            + self.recreated
            + self.already_absent
            + self.rejected
            + self.skipped
            + self.unknown_table
    }

    /// Items that changed the store.
    pub fn written(&self) -> u64 {
        self.applied + self.recreated
    }
}

/// Applies every item of a change set, checking for cancellation between
/// items.
pub fn apply_change_set<W: ItemWriter + ?Sized>(
    writer: &W,
    changes: &ChangeSet,
    on_conflict: Option<&ConflictHandler>,
    cancel: &CancelToken,
) -> SyncResult<ApplyReport> {
    let target_version = changes.target_anchor.version();
    let mut report = ApplyReport::default();

    for item in &changes.items {
        cancel.check()?;
        let outcome = if writer.knows_table(&item.table_name) {
            apply_item(writer, item, target_version, on_conflict)?
        } else {
            debug!(table = %item.table_name, "skipping item for unknown table");
            ItemOutcome::UnknownTable
        };
        report.record(outcome);
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use rowsync_protocol::Anchor;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use uuid::Uuid;

    /// One-table store keyed by `id`, with a per-row version and a log
    /// counter, enough to drive the state machine.
    #[derive(Default)]
    struct FakeTable {
        rows: Mutex<HashMap<i64, (String, u64)>>,
        deleted_versions: Mutex<HashMap<i64, u64>>,
        next_version: Mutex<u64>,
        reject_inserts: bool,
        writes: Mutex<Vec<(ChangeType, bool)>>,
        stamps: Mutex<usize>,
    }

    impl FakeTable {
        fn with_row(id: i64, name: &str, version: u64) -> Self {
            let table = Self::default();
            table.rows.lock().insert(id, (name.to_string(), version));
            *table.next_version.lock() = version + 1;
            table
        }

        fn bump(&self) -> u64 {
            let mut next = self.next_version.lock();
            *next += 1;
            *next
        }

        fn row_version(&self, id: i64) -> u64 {
            self.rows
                .lock()
                .get(&id)
                .map(|(_, v)| *v)
                .or_else(|| self.deleted_versions.lock().get(&id).copied())
                .unwrap_or(0)
        }

        fn name(&self, id: i64) -> Option<String> {
            self.rows.lock().get(&id).map(|(n, _)| n.clone())
        }
    }

    fn id_of(item: &SyncItem) -> i64 {
        item.get("id").and_then(|v| v.as_i64()).unwrap()
    }

    fn name_of(item: &SyncItem) -> String {
        item.get("name").and_then(|v| v.as_str()).unwrap_or("").to_string()
    }

    impl ItemWriter for FakeTable {
        fn knows_table(&self, table: &str) -> bool {
            table == "users"
        }

        fn write(&self, item: &SyncItem, ct: ChangeType, target: u64, force: bool) -> SyncResult<usize> {
            self.writes.lock().push((ct, force));
            let id = id_of(item);
            let exists = self.rows.lock().contains_key(&id);
            let guard_ok = force || self.row_version(id) <= target;
            match ct {
                ChangeType::Insert => {
                    if exists || !guard_ok || self.reject_inserts {
                        return Ok(0);
                    }
                    let v = self.bump();
                    self.rows.lock().insert(id, (name_of(item), v));
                    Ok(1)
                }
                ChangeType::Update => {
                    if !exists || !guard_ok {
                        return Ok(0);
                    }
                    let v = self.bump();
                    self.rows.lock().insert(id, (name_of(item), v));
                    Ok(1)
                }
                ChangeType::Delete => {
                    if !exists || !guard_ok {
                        return Ok(0);
                    }
                    let v = self.bump();
                    self.rows.lock().remove(&id);
                    self.deleted_versions.lock().insert(id, v);
                    Ok(1)
                }
            }
        }

        fn exists(&self, item: &SyncItem) -> SyncResult<bool> {
            Ok(self.rows.lock().contains_key(&id_of(item)))
        }

        fn local_version(&self, item: &SyncItem) -> SyncResult<u64> {
            Ok(self.row_version(id_of(item)))
        }

        fn stamp_source(&self) -> SyncResult<()> {
            *self.stamps.lock() += 1;
            Ok(())
        }
    }

    fn item(ct: ChangeType, id: i64, name: &str) -> SyncItem {
        SyncItem::new("users", ct).with_value("id", id).with_value("name", name)
    }

    #[test]
    fn insert_of_new_row() {
        let table = FakeTable::default();
        let outcome = apply_item(&table, &item(ChangeType::Insert, 1, "Alice"), 0, None).unwrap();
        assert_eq!(outcome, ItemOutcome::Applied);
        assert_eq!(table.name(1).as_deref(), Some("Alice"));
        assert_eq!(*table.stamps.lock(), 1);
    }

    #[test]
    fn insert_of_existing_row_becomes_update() {
        let table = FakeTable::with_row(1, "old", 3);
        let outcome = apply_item(&table, &item(ChangeType::Insert, 1, "new"), 5, None).unwrap();
        assert_eq!(outcome, ItemOutcome::Applied);
        assert_eq!(table.name(1).as_deref(), Some("new"));
        assert_eq!(
            *table.writes.lock(),
            vec![(ChangeType::Insert, false), (ChangeType::Update, false)]
        );
    }

    #[test]
    fn rejected_insert_is_not_an_error() {
        let table = FakeTable {
            reject_inserts: true,
            ..Default::default()
        };
        let outcome = apply_item(&table, &item(ChangeType::Insert, 1, "x"), 0, None).unwrap();
        assert_eq!(outcome, ItemOutcome::Rejected);
        assert_eq!(*table.stamps.lock(), 0);
    }

    fn deleted_at(id: i64, version: u64) -> FakeTable {
        let table = FakeTable::default();
        table.deleted_versions.lock().insert(id, version);
        *table.next_version.lock() = version;
        table
    }

    fn counting(resolution: ConflictResolution) -> (Box<ConflictHandler>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let handler: Box<ConflictHandler> = Box::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            resolution
        });
        (handler, calls)
    }

    #[test]
    fn insert_over_a_newer_local_delete_is_a_conflict() {
        let table = deleted_at(1, 8);
        let (skip, calls) = counting(ConflictResolution::Skip);
        let outcome =
            apply_item(&table, &item(ChangeType::Insert, 1, "again"), 5, Some(&*skip)).unwrap();
        assert_eq!(outcome, ItemOutcome::Skipped);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(table.name(1), None);

        let (force, calls) = counting(ConflictResolution::ForceWrite);
        let outcome =
            apply_item(&table, &item(ChangeType::Insert, 1, "again"), 5, Some(&*force)).unwrap();
        assert_eq!(outcome, ItemOutcome::Applied);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(table.name(1).as_deref(), Some("again"));
        assert_eq!(
            *table.writes.lock(),
            vec![
                (ChangeType::Insert, false),
                (ChangeType::Insert, false),
                (ChangeType::Insert, true)
            ]
        );
    }

    #[test]
    fn insert_over_an_older_delete_applies_without_asking() {
        let table = deleted_at(1, 4);
        let (skip, calls) = counting(ConflictResolution::Skip);
        let outcome =
            apply_item(&table, &item(ChangeType::Insert, 1, "again"), 5, Some(&*skip)).unwrap();
        assert_eq!(outcome, ItemOutcome::Applied);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn conflicting_update_is_skipped_by_default() {
        let table = FakeTable::with_row(1, "local", 10);
        let outcome = apply_item(&table, &item(ChangeType::Update, 1, "remote"), 4, None).unwrap();
        assert_eq!(outcome, ItemOutcome::Skipped);
        assert_eq!(table.name(1).as_deref(), Some("local"));

        let skip = always_skip();
        let outcome =
            apply_item(&table, &item(ChangeType::Update, 1, "remote"), 4, Some(&*skip)).unwrap();
        assert_eq!(outcome, ItemOutcome::Skipped);
    }

    #[test]
    fn conflicting_update_with_force_write_overwrites() {
        let table = FakeTable::with_row(1, "local", 10);
        let force = always_force_write();
        let outcome =
            apply_item(&table, &item(ChangeType::Update, 1, "remote"), 4, Some(&*force)).unwrap();
        assert_eq!(outcome, ItemOutcome::Applied);
        assert_eq!(table.name(1).as_deref(), Some("remote"));
    }

    #[test]
    fn forced_update_of_missing_row_recreates_it() {
        let table = FakeTable::default();
        let force = always_force_write();
        let outcome =
            apply_item(&table, &item(ChangeType::Update, 7, "back"), 0, Some(&*force)).unwrap();
        assert_eq!(outcome, ItemOutcome::Recreated);
        assert_eq!(table.name(7).as_deref(), Some("back"));
        assert_eq!(table.writes.lock().len(), MAX_WRITE_ATTEMPTS);
    }

    #[test]
    fn forced_delete_of_missing_row_is_a_no_op() {
        let table = FakeTable::default();
        let force = always_force_write();
        let outcome =
            apply_item(&table, &item(ChangeType::Delete, 7, ""), 0, Some(&*force)).unwrap();
        assert_eq!(outcome, ItemOutcome::AlreadyAbsent);
    }

    #[test]
    fn handler_sees_the_conflicting_item() {
        let table = FakeTable::with_row(1, "local", 10);
        let handler: Box<ConflictHandler> = Box::new(|item: &SyncItem| {
            if item.get("name").and_then(|v| v.as_str()) == Some("important") {
                ConflictResolution::ForceWrite
            } else {
                ConflictResolution::Skip
            }
        });

        let skipped =
            apply_item(&table, &item(ChangeType::Update, 1, "meh"), 0, Some(&*handler)).unwrap();
        assert_eq!(skipped, ItemOutcome::Skipped);
        let forced =
            apply_item(&table, &item(ChangeType::Update, 1, "important"), 0, Some(&*handler))
                .unwrap();
        assert_eq!(forced, ItemOutcome::Applied);
    }

    struct NeverWrites;

    impl ItemWriter for NeverWrites {
        fn knows_table(&self, _: &str) -> bool {
            true
        }
        fn write(&self, _: &SyncItem, _: ChangeType, _: u64, _: bool) -> SyncResult<usize> {
            Ok(0)
        }
        fn exists(&self, _: &SyncItem) -> SyncResult<bool> {
            Ok(true)
        }
        fn local_version(&self, _: &SyncItem) -> SyncResult<u64> {
            Ok(0)
        }
        fn stamp_source(&self) -> SyncResult<()> {
            Ok(())
        }
    }

    #[test]
    fn inconsistent_writer_hits_the_attempt_bound() {
        let force = always_force_write();
        let err = apply_item(&NeverWrites, &item(ChangeType::Insert, 1, "x"), 0, Some(&*force))
            .unwrap_err();
        assert!(matches!(err, SyncError::InvariantViolation(_)));
    }

    #[test]
    fn change_set_apply_counts_outcomes_and_skips_unknown_tables() {
        let table = FakeTable::with_row(1, "local", 10);
        let a = Anchor::new(Uuid::new_v4(), 3).unwrap();
        let b = Anchor::new(Uuid::new_v4(), 2).unwrap();
        let changes = ChangeSet::new(
            a,
            b,
            vec![
                item(ChangeType::Insert, 2, "new"),
                item(ChangeType::Update, 1, "remote"),
                SyncItem::new("audit", ChangeType::Insert).with_value("id", 1i64),
            ],
        );

        let report = apply_change_set(&table, &changes, None, &CancelToken::new()).unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.unknown_table, 1);
        assert_eq!(report.total(), 3);
        assert_eq!(report.written(), 1);
    }

    #[test]
    fn change_set_apply_stops_when_cancelled() {
        let table = FakeTable::default();
        let a = Anchor::new(Uuid::new_v4(), 1).unwrap();
        let changes = ChangeSet::new(a, a, vec![item(ChangeType::Insert, 1, "x")]);
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = apply_change_set(&table, &changes, None, &cancel).unwrap_err();
        assert!(matches!(err, SyncError::Cancelled));
        assert!(table.rows.lock().is_empty());
    }
}
