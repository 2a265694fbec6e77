//! The storage adapter contract.

use crate::cancel::CancelToken;
use crate::conflict::ConflictHandler;
use crate::error::SyncResult;
use rowsync_protocol::{Anchor, ChangeSet, SyncDirection, SyncFilterParameter};
use std::sync::Arc;
use uuid::Uuid;

/// The valid version window of a change log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncVersion {
    /// Highest version in the log (0 when empty).
    pub current: u64,
    /// Lowest version still in the log (0 when empty).
    pub minimum: u64,
}

impl SyncVersion {
    /// Fails if a peer resuming from `from` would miss trimmed entries.
    ///
    /// Resuming from `minimum - 1` is still complete: every entry after it is
    /// retained. An empty log never rejects.
    pub fn check_resumable(&self, from: u64) -> SyncResult<()> {
        if self.minimum > 0 && from < self.minimum - 1 {
            return Err(crate::SyncError::StaleVersion {
                requested: from,
                minimum: self.minimum,
            });
        }
        Ok(())
    }
}

/// A store that can exchange changes with peers.
///
/// Every call runs in its own transaction on the backing store and honours
/// the cancellation token.
pub trait SyncProvider: Send + Sync {
    /// Returns this store's identity, creating it on first use.
    fn store_id(&self, cancel: &CancelToken) -> SyncResult<Uuid>;

    /// Collects the changes `other` has not seen yet.
    ///
    /// Starts from the version last recorded with
    /// [`save_version_for_store`](Self::save_version_for_store) for `other`,
    /// or from a full snapshot when none was recorded. Changes that
    /// originated from `other` are never returned to it.
    fn get_changes(
        &self,
        other: Uuid,
        filters: &[SyncFilterParameter],
        direction: SyncDirection,
        cancel: &CancelToken,
    ) -> SyncResult<ChangeSet>;

    /// Applies a change set from a peer in one transaction and returns this
    /// store's version before the apply.
    ///
    /// Rows that fail for integrity reasons or lose a conflict are skipped;
    /// any other failure rolls the whole apply back.
    fn apply_changes(
        &self,
        changes: &ChangeSet,
        on_conflict: Option<&ConflictHandler>,
        cancel: &CancelToken,
    ) -> SyncResult<Anchor>;

    /// Records that `other` has incorporated this store's changes up to
    /// `version`.
    fn save_version_for_store(&self, other: Uuid, version: u64, cancel: &CancelToken) -> SyncResult<()>;

    /// Forgets the version recorded for `other`, so the next
    /// [`get_changes`](Self::get_changes) for it is a full snapshot.
    ///
    /// This is the way back for a peer whose anchor fell behind the
    /// retained log.
    fn forget_store(&self, other: Uuid, cancel: &CancelToken) -> SyncResult<()>;
}

/// A store whose change tracking can be installed and trimmed.
pub trait ProvisioningProvider: SyncProvider {
    /// Idempotently creates the change log, anchor and identity tables and
    /// the per-table triggers.
    fn apply_provision(&self, cancel: &CancelToken) -> SyncResult<()>;

    /// Removes everything [`apply_provision`](Self::apply_provision) created.
    fn remove_provision(&self, cancel: &CancelToken) -> SyncResult<()>;

    /// Returns the change log's version window.
    fn sync_version(&self, cancel: &CancelToken) -> SyncResult<SyncVersion>;

    /// Deletes log entries older than `min_version` and returns the new
    /// window. Peers recorded behind the new window must resnapshot.
    fn apply_retention_policy(&self, min_version: u64, cancel: &CancelToken) -> SyncResult<SyncVersion>;
}

impl<P: SyncProvider + ?Sized> SyncProvider for Arc<P> {
    fn store_id(&self, cancel: &CancelToken) -> SyncResult<Uuid> {
        (**self).store_id(cancel)
    }

    fn get_changes(
        &self,
        other: Uuid,
        filters: &[SyncFilterParameter],
        direction: SyncDirection,
        cancel: &CancelToken,
    ) -> SyncResult<ChangeSet> {
        (**self).get_changes(other, filters, direction, cancel)
    }

    fn apply_changes(
        &self,
        changes: &ChangeSet,
        on_conflict: Option<&ConflictHandler>,
        cancel: &CancelToken,
    ) -> SyncResult<Anchor> {
        (**self).apply_changes(changes, on_conflict, cancel)
    }

    fn save_version_for_store(&self, other: Uuid, version: u64, cancel: &CancelToken) -> SyncResult<()> {
        (**self).save_version_for_store(other, version, cancel)
    }

    fn forget_store(&self, other: Uuid, cancel: &CancelToken) -> SyncResult<()> {
        (**self).forget_store(other, cancel)
    }
}

impl<P: ProvisioningProvider + ?Sized> ProvisioningProvider for Arc<P> {
    fn apply_provision(&self, cancel: &CancelToken) -> SyncResult<()> {
        (**self).apply_provision(cancel)
    }

    fn remove_provision(&self, cancel: &CancelToken) -> SyncResult<()> {
        (**self).remove_provision(cancel)
    }

    fn sync_version(&self, cancel: &CancelToken) -> SyncResult<SyncVersion> {
        (**self).sync_version(cancel)
    }

    fn apply_retention_policy(&self, min_version: u64, cancel: &CancelToken) -> SyncResult<SyncVersion> {
        (**self).apply_retention_policy(min_version, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SyncError;

    #[test]
    fn retention_boundary() {
        let window = SyncVersion {
            current: 20,
            minimum: 10,
        };
        assert!(window.check_resumable(9).is_ok());
        assert!(window.check_resumable(15).is_ok());
        assert!(matches!(
            window.check_resumable(8),
            Err(SyncError::StaleVersion {
                requested: 8,
                minimum: 10
            })
        ));
    }

    #[test]
    fn empty_log_accepts_anything() {
        assert!(SyncVersion::default().check_resumable(0).is_ok());
        assert!(SyncVersion::default().check_resumable(42).is_ok());
    }
}
