//! Request handlers for the bulk-transfer protocol.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::session::{BulkSession, SessionKey, SessionKind, SessionStore};
use rowsync_engine::{resolve_with, CancelToken, SyncProvider};
use rowsync_protocol::{
    Anchor, BulkChangeSetInfo, BulkDownloadChunk, BulkUploadBegin, BulkUploadChunk, ChangeSet,
    StoreIdResponse, SyncDirection, SyncFilterParameter,
};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Shared state for request handlers.
pub struct HandlerContext<P> {
    /// The store served to peers.
    pub provider: P,
    /// Open bulk sessions.
    pub sessions: Arc<dyn SessionStore>,
    /// Server configuration.
    pub config: ServerConfig,
}

impl<P: SyncProvider> HandlerContext<P> {
    /// Creates a new handler context.
    pub fn new(provider: P, sessions: Arc<dyn SessionStore>, config: ServerConfig) -> Self {
        Self {
            provider,
            sessions,
            config,
        }
    }
}

/// Handles bulk-transfer requests against one store.
pub struct RequestHandler<P> {
    context: Arc<HandlerContext<P>>,
}

impl<P: SyncProvider> RequestHandler<P> {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext<P>>) -> Self {
        Self { context }
    }

    /// Returns the served store's identity.
    pub fn store_id(&self) -> ServerResult<StoreIdResponse> {
        let store_id = self.context.provider.store_id(&CancelToken::new())?;
        Ok(StoreIdResponse { store_id })
    }

    /// Computes the changes `other` has not seen and opens a download
    /// session holding them.
    ///
    /// An empty result opens no session.
    pub fn begin_download(
        &self,
        other: Uuid,
        direction: SyncDirection,
        filters: &[SyncFilterParameter],
    ) -> ServerResult<BulkChangeSetInfo> {
        let changes = self
            .context
            .provider
            .get_changes(other, filters, direction, &CancelToken::new())?;

        let session_id = Uuid::new_v4();
        let info = BulkChangeSetInfo {
            session_id,
            total_changes: changes.len() as u64,
            tables: changes.table_counts(),
            source_anchor: changes.source_anchor,
            target_anchor: changes.target_anchor,
        };

        if !changes.is_empty() {
            self.context.sessions.insert(
                session_id,
                SessionKey::new(other, SessionKind::Download(direction)),
                BulkSession::download(changes),
            );
        }
        info!(
            peer = %other,
            session = %session_id,
            total = info.total_changes,
            %direction,
            "download session opened"
        );
        Ok(info)
    }

    /// Serves up to `take` items starting at `skip`.
    ///
    /// `take` is capped at the configured maximum chunk size. The session is
    /// closed once its last item has been served.
    pub fn download_chunk(&self, session_id: Uuid, skip: u64, take: u64) -> ServerResult<BulkDownloadChunk> {
        if take == 0 {
            return Err(ServerError::InvalidRequest("take must be positive".into()));
        }
        let skip_index = usize::try_from(skip)
            .map_err(|_| ServerError::InvalidRequest(format!("skip {} out of range", skip)))?;
        let take = usize::try_from(take)
            .unwrap_or(usize::MAX)
            .min(self.context.config.max_chunk_size);

        let shared = self
            .context
            .sessions
            .get(session_id)
            .ok_or(ServerError::SessionNotFound(session_id))?;
        let (items, finished) = match &*shared.lock() {
            BulkSession::Download { change_set } => {
                let items = change_set.slice(skip_index, take).to_vec();
                let finished = skip_index.saturating_add(items.len()) >= change_set.len();
                (items, finished)
            }
            BulkSession::Upload { .. } => {
                return Err(ServerError::InvalidRequest(format!(
                    "session {} is an upload",
                    session_id
                )))
            }
        };

        if finished {
            self.context.sessions.remove(session_id);
            debug!(session = %session_id, "download session drained");
        }
        Ok(BulkDownloadChunk {
            session_id,
            skip,
            items,
        })
    }

    /// Opens an upload session.
    pub fn begin_upload(&self, begin: BulkUploadBegin) -> ServerResult<()> {
        let peer = begin.source_anchor.store_id();
        let session_id = begin.session_id;
        if session_id.is_nil() {
            return Err(ServerError::InvalidRequest("session id must not be nil".into()));
        }
        debug!(peer = %peer, session = %session_id, total = begin.total_changes, "upload session opened");
        self.context.sessions.insert(
            session_id,
            SessionKey::new(peer, SessionKind::Upload),
            BulkSession::upload(begin),
        );
        Ok(())
    }

    /// Buffers an upload chunk. A chunk re-sent with the same index replaces
    /// the earlier one.
    pub fn upload_chunk(&self, chunk: BulkUploadChunk) -> ServerResult<()> {
        let shared = self
            .context
            .sessions
            .get(chunk.session_id)
            .ok_or(ServerError::SessionNotFound(chunk.session_id))?;
        let mut session = shared.lock();
        match &mut *session {
            BulkSession::Upload { chunks, .. } => {
                chunks.insert(chunk.chunk_index, chunk.items);
                Ok(())
            }
            BulkSession::Download { .. } => Err(ServerError::InvalidRequest(format!(
                "session {} is a download",
                chunk.session_id
            ))),
        }
    }

    /// Applies everything uploaded to a session and closes it.
    ///
    /// Fails with a count mismatch, leaving the session open, when the
    /// received items do not add up to what was announced.
    pub fn complete_upload(&self, session_id: Uuid) -> ServerResult<Anchor> {
        let shared = self
            .context
            .sessions
            .get(session_id)
            .ok_or(ServerError::SessionNotFound(session_id))?;

        let changes = {
            let mut session = shared.lock();
            let BulkSession::Upload { begin, chunks } = &mut *session else {
                return Err(ServerError::InvalidRequest(format!(
                    "session {} is a download",
                    session_id
                )));
            };
            let received: u64 = chunks.values().map(|c| c.len() as u64).sum();
            if received != begin.total_changes {
                return Err(ServerError::CountMismatch {
                    expected: begin.total_changes,
                    actual: received,
                });
            }
            let items = std::mem::take(chunks).into_values().flatten().collect();
            ChangeSet::new(begin.source_anchor, begin.target_anchor, items)
        };
        self.context.sessions.remove(session_id);

        let handler = resolve_with(self.context.config.conflict_resolution);
        let anchor = self
            .context
            .provider
            .apply_changes(&changes, Some(&*handler), &CancelToken::new())?;
        info!(
            peer = %changes.source_anchor.store_id(),
            session = %session_id,
            items = changes.len(),
            "upload applied"
        );
        Ok(anchor)
    }

    /// Records that `other` has seen this store's changes up to `version`.
    pub fn save_version(&self, other: Uuid, version: u64) -> ServerResult<()> {
        self.context
            .provider
            .save_version_for_store(other, version, &CancelToken::new())?;
        Ok(())
    }

    /// Forgets what `other` has seen; its next download is a snapshot.
    pub fn forget_store(&self, other: Uuid) -> ServerResult<()> {
        self.context.provider.forget_store(other, &CancelToken::new())?;
        Ok(())
    }

    /// Drops expired sessions.
    pub fn purge_expired_sessions(&self) -> usize {
        self.context.sessions.purge_expired()
    }
}

/// Parses the query string of a download begin.
///
/// `direction` selects the sync direction (both ways when absent); every other
/// pair becomes a filter parameter with a string value.
pub fn parse_changes_query(query: Option<&str>) -> ServerResult<(SyncDirection, Vec<SyncFilterParameter>)> {
    let mut direction = SyncDirection::UploadAndDownload;
    let mut filters = Vec::new();

    for pair in query.unwrap_or_default().split('&').filter(|p| !p.is_empty()) {
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        let name = decode_component(name)?;
        let value = decode_component(value)?;
        if name == "direction" {
            direction = value.parse().map_err(ServerError::InvalidRequest)?;
        } else {
            filters.push(SyncFilterParameter::new(name, value));
        }
    }
    Ok((direction, filters))
}

fn decode_component(raw: &str) -> ServerResult<String> {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .map_err(|e| ServerError::InvalidRequest(format!("bad query component {:?}: {}", raw, e)))
}
