//! Orchestration of one synchronization round between two stores.

use crate::cancel::CancelToken;
use crate::conflict::{always_force_write, always_skip, ConflictHandler};
use crate::error::{SyncError, SyncResult, SyncStep};
use crate::provider::SyncProvider;
use parking_lot::RwLock;
use rowsync_protocol::{Anchor, ChangeSet, SyncDirection, SyncFilterParameter};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// The current state of a sync agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No round has run yet.
    Idle,
    /// Pushing local changes.
    Uploading,
    /// Pulling remote changes.
    Downloading,
    /// The last round completed.
    Synced,
    /// The last round failed.
    Error,
}

impl SyncState {
    /// Returns true while a round is running.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Uploading | SyncState::Downloading)
    }

    /// Returns true if a new round may start.
    pub fn can_start_sync(&self) -> bool {
        matches!(self, SyncState::Idle | SyncState::Synced | SyncState::Error)
    }
}

/// Statistics accumulated over the agent's lifetime.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Rounds that completed.
    pub rounds_completed: u64,
    /// Rounds that failed.
    pub rounds_failed: u64,
    /// Items pushed to the remote.
    pub items_uploaded: u64,
    /// Items pulled from the remote.
    pub items_downloaded: u64,
    /// Collections restarted as snapshots after a stale anchor.
    pub resnapshots: u64,
    /// Time of the last completed round.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Result of one round.
#[derive(Debug, Clone)]
pub struct SyncRoundResult {
    /// Items sent to the remote.
    pub uploaded: usize,
    /// Items received from the remote.
    pub downloaded: usize,
    /// Local version before the downloaded changes were applied.
    pub local_anchor: Option<Anchor>,
    /// Remote version before the uploaded changes were applied.
    pub remote_anchor: Option<Anchor>,
    /// Wall time of the round.
    pub duration: Duration,
}

/// Synchronizes a local store with a remote one.
///
/// A round pushes first and pulls second:
///
/// 1. resolve both store ids
/// 2. collect local changes for the remote
/// 3. apply them on the remote (remote conflict handler)
/// 4. record on the local store that the remote has them
/// 5. collect remote changes for the local store
/// 6. apply them locally (local conflict handler)
/// 7. record on the remote store that the local store has them
///
/// Each step is its own transaction. A failing step aborts the round with
/// [`SyncError::SynchronizationFailed`]; earlier steps stay committed, which
/// is safe because re-running them with the same anchors is idempotent.
///
/// When a collection fails with [`SyncError::StaleVersion`] the collecting
/// store forgets the peer's anchor and the collection is retried once as a
/// full snapshot. [`with_resnapshot_on_stale`](Self::with_resnapshot_on_stale)
/// turns this off.
pub struct SyncAgent<L: SyncProvider, R: SyncProvider> {
    local: L,
    remote: R,
    local_handler: Box<ConflictHandler>,
    remote_handler: Box<ConflictHandler>,
    filters: Vec<SyncFilterParameter>,
    resnapshot_on_stale: bool,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
    cancel: CancelToken,
}

impl<L: SyncProvider, R: SyncProvider> SyncAgent<L, R> {
    /// Creates an agent. Local conflicts default to force-write, remote
    /// conflicts to skip.
    pub fn new(local: L, remote: R) -> Self {
        Self {
            local,
            remote,
            local_handler: always_force_write(),
            remote_handler: always_skip(),
            filters: Vec::new(),
            resnapshot_on_stale: true,
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
            cancel: CancelToken::new(),
        }
    }

    /// Sets the handler for conflicts when applying remote changes locally.
    pub fn with_local_conflict_handler(mut self, handler: Box<ConflictHandler>) -> Self {
        self.local_handler = handler;
        self
    }

    /// Sets the handler for conflicts when applying local changes remotely.
    pub fn with_remote_conflict_handler(mut self, handler: Box<ConflictHandler>) -> Self {
        self.remote_handler = handler;
        self
    }

    /// Sets the filter parameters passed to both stores.
    pub fn with_filters(mut self, filters: Vec<SyncFilterParameter>) -> Self {
        self.filters = filters;
        self
    }

    /// Sets whether a stale anchor falls back to a snapshot (the default)
    /// or fails the round.
    pub fn with_resnapshot_on_stale(mut self, enabled: bool) -> Self {
        self.resnapshot_on_stale = enabled;
        self
    }

    /// Returns the local store.
    pub fn local(&self) -> &L {
        &self.local
    }

    /// Returns the remote store.
    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns the token that cancels the running round.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Cancels any ongoing round.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    /// Runs a full push-then-pull round.
    pub fn synchronize(&self) -> SyncResult<SyncRoundResult> {
        self.synchronize_with(SyncDirection::UploadAndDownload)
    }

    /// Runs a round restricted to `direction`.
    pub fn synchronize_with(&self, direction: SyncDirection) -> SyncResult<SyncRoundResult> {
        if !self.state().can_start_sync() {
            return Err(SyncError::InvariantViolation(format!(
                "cannot start a round while {:?}",
                self.state()
            )));
        }
        self.cancel.reset();

        let start = Instant::now();
        match self.run_round(direction, start) {
            Ok(result) => {
                self.set_state(SyncState::Synced);
                let mut stats = self.stats.write();
                stats.rounds_completed += 1;
                stats.items_uploaded += result.uploaded as u64;
                stats.items_downloaded += result.downloaded as u64;
                stats.last_sync_time = Some(Instant::now());
                stats.last_error = None;
                info!(
                    uploaded = result.uploaded,
                    downloaded = result.downloaded,
                    elapsed_ms = result.duration.as_millis() as u64,
                    "sync round completed"
                );
                Ok(result)
            }
            Err(e) => {
                warn!(error = %e, "sync round failed");
                self.set_state(SyncState::Error);
                let mut stats = self.stats.write();
                stats.rounds_failed += 1;
                stats.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn run_round(&self, direction: SyncDirection, start: Instant) -> SyncResult<SyncRoundResult> {
        let cancel = &self.cancel;
        let step = |step: SyncStep| move |e: SyncError| SyncError::failed_at(step, e);

        let local_id = self.local.store_id(cancel).map_err(step(SyncStep::ResolveStoreIds))?;
        let remote_id = self.remote.store_id(cancel).map_err(step(SyncStep::ResolveStoreIds))?;
        debug!(%local_id, %remote_id, %direction, "starting sync round");

        let mut result = SyncRoundResult {
            uploaded: 0,
            downloaded: 0,
            local_anchor: None,
            remote_anchor: None,
            duration: Duration::ZERO,
        };

        if direction.uploads() {
            self.set_state(SyncState::Uploading);
            let (count, anchor) = self.upload(local_id, remote_id)?;
            result.uploaded = count;
            result.remote_anchor = Some(anchor);
        }

        if direction.downloads() {
            self.set_state(SyncState::Downloading);
            let (count, anchor) = self.download(local_id, remote_id)?;
            result.downloaded = count;
            result.local_anchor = Some(anchor);
        }

        result.duration = start.elapsed();
        Ok(result)
    }

    fn collect<P: SyncProvider>(&self, store: &P, peer: Uuid, direction: SyncDirection) -> SyncResult<ChangeSet> {
        let cancel = &self.cancel;
        match store.get_changes(peer, &self.filters, direction, cancel) {
            Err(e) if self.resnapshot_on_stale && e.is_stale_version() => {
                warn!(%peer, %direction, error = %e, "anchor is behind the retained log, resnapshotting");
                store.forget_store(peer, cancel)?;
                self.stats.write().resnapshots += 1;
                store.get_changes(peer, &self.filters, direction, cancel)
            }
            other => other,
        }
    }

    fn upload(&self, local_id: Uuid, remote_id: Uuid) -> SyncResult<(usize, Anchor)> {
        let cancel = &self.cancel;
        let step = |step: SyncStep| move |e: SyncError| SyncError::failed_at(step, e);

        let changes = self
            .collect(&self.local, remote_id, SyncDirection::UploadOnly)
            .map_err(step(SyncStep::CollectLocalChanges))?;
        debug!(items = changes.len(), "collected local changes");

        cancel.check().map_err(step(SyncStep::ApplyOnRemote))?;
        let anchor = self
            .remote
            .apply_changes(&changes, Some(&*self.remote_handler), cancel)
            .map_err(step(SyncStep::ApplyOnRemote))?;

        cancel.check().map_err(step(SyncStep::SaveLocalVersion))?;
        self.local
            .save_version_for_store(remote_id, changes.source_anchor.version(), cancel)
            .map_err(step(SyncStep::SaveLocalVersion))?;

        debug!(%local_id, version = changes.source_anchor.version(), "remote acknowledged local changes");
        Ok((changes.len(), anchor))
    }

    fn download(&self, local_id: Uuid, remote_id: Uuid) -> SyncResult<(usize, Anchor)> {
        let cancel = &self.cancel;
        let step = |step: SyncStep| move |e: SyncError| SyncError::failed_at(step, e);

        cancel.check().map_err(step(SyncStep::CollectRemoteChanges))?;
        let changes = self
            .collect(&self.remote, local_id, SyncDirection::DownloadOnly)
            .map_err(step(SyncStep::CollectRemoteChanges))?;
        debug!(items = changes.len(), "collected remote changes");

        cancel.check().map_err(step(SyncStep::ApplyOnLocal))?;
        let anchor = self
            .local
            .apply_changes(&changes, Some(&*self.local_handler), cancel)
            .map_err(step(SyncStep::ApplyOnLocal))?;

        cancel.check().map_err(step(SyncStep::SaveRemoteVersion))?;
        self.remote
            .save_version_for_store(local_id, changes.source_anchor.version(), cancel)
            .map_err(step(SyncStep::SaveRemoteVersion))?;

        debug!(%remote_id, version = changes.source_anchor.version(), "local store acknowledged remote changes");
        Ok((changes.len(), anchor))
    }
}
