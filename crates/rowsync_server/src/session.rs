//! Bulk-transfer session storage.
//!
//! A download session caches the change set computed at begin so chunks can
//! be served by offset. An upload session buffers chunks by index until the
//! client completes it. At most one session exists per
//! (peer, kind): opening a second one evicts the first.

use dashmap::DashMap;
use parking_lot::Mutex;
use rowsync_protocol::{BulkUploadBegin, ChangeSet, SyncDirection, SyncItem};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

/// Kind of a bulk session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKind {
    /// Client uploading to this server.
    Upload,
    /// Client downloading from this server in the given direction.
    Download(SyncDirection),
}

/// Identifies the one live session a peer may hold per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    /// Peer store id.
    pub peer: Uuid,
    /// Session kind.
    pub kind: SessionKind,
}

impl SessionKey {
    /// Creates a key.
    pub fn new(peer: Uuid, kind: SessionKind) -> Self {
        Self { peer, kind }
    }
}

/// State held for an open session.
#[derive(Debug)]
pub enum BulkSession {
    /// Changes computed for a downloading peer.
    Download {
        /// The full change set.
        change_set: ChangeSet,
    },
    /// Chunks received from an uploading peer.
    Upload {
        /// What the client announced.
        begin: BulkUploadBegin,
        /// Chunks by index. A repeated index replaces the earlier chunk.
        chunks: BTreeMap<u32, Vec<SyncItem>>,
    },
}

impl BulkSession {
    /// Creates an upload session.
    pub fn upload(begin: BulkUploadBegin) -> Self {
        BulkSession::Upload {
            begin,
            chunks: BTreeMap::new(),
        }
    }

    /// Creates a download session.
    pub fn download(change_set: ChangeSet) -> Self {
        BulkSession::Download { change_set }
    }
}

/// A session shared between the store and in-flight requests.
pub type SharedSession = Arc<Mutex<BulkSession>>;

/// Storage for open sessions.
pub trait SessionStore: Send + Sync {
    /// Returns the session and refreshes its expiry.
    fn get(&self, id: Uuid) -> Option<SharedSession>;

    /// Stores a session, evicting any other session held under `key`.
    fn insert(&self, id: Uuid, key: SessionKey, session: BulkSession) -> SharedSession;

    /// Removes a session.
    fn remove(&self, id: Uuid) -> Option<SharedSession>;

    /// Drops sessions idle for longer than the store's time-to-live and
    /// returns how many were dropped.
    fn purge_expired(&self) -> usize;

    /// Number of open sessions.
    fn len(&self) -> usize;

    /// Returns true if no session is open.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct Entry {
    session: SharedSession,
    key: SessionKey,
    touched: Mutex<Instant>,
}

/// In-process session store with sliding expiry.
pub struct MemorySessionStore {
    sessions: DashMap<Uuid, Entry>,
    by_key: DashMap<SessionKey, Uuid>,
    ttl: Duration,
}

impl MemorySessionStore {
    /// Creates a store whose sessions expire after `ttl` without access.
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            by_key: DashMap::new(),
            ttl,
        }
    }

    /// Returns the time-to-live.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn remove_entry(&self, id: Uuid) -> Option<SharedSession> {
        let (_, entry) = self.sessions.remove(&id)?;
        self.by_key.remove_if(&entry.key, |_, owner| *owner == id);
        Some(entry.session)
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, id: Uuid) -> Option<SharedSession> {
        let entry = self.sessions.get(&id)?;
        let mut touched = entry.touched.lock();
        if touched.elapsed() > self.ttl {
            drop(touched);
            drop(entry);
            self.remove_entry(id);
            return None;
        }
        *touched = Instant::now();
        Some(Arc::clone(&entry.session))
    }

    fn insert(&self, id: Uuid, key: SessionKey, session: BulkSession) -> SharedSession {
        let shared = Arc::new(Mutex::new(session));
        if let Some(previous) = self.by_key.insert(key, id) {
            if previous != id && self.sessions.remove(&previous).is_some() {
                debug!(session = %previous, peer = %key.peer, "evicted superseded session");
            }
        }
        self.sessions.insert(
            id,
            Entry {
                session: Arc::clone(&shared),
                key,
                touched: Mutex::new(Instant::now()),
            },
        );
        shared
    }

    fn remove(&self, id: Uuid) -> Option<SharedSession> {
        self.remove_entry(id)
    }

    fn purge_expired(&self) -> usize {
        let expired: Vec<Uuid> = self
            .sessions
            .iter()
            .filter(|e| e.touched.lock().elapsed() > self.ttl)
            .map(|e| *e.key())
            .collect();
        let mut purged = 0;
        for id in expired {
            if self.remove_entry(id).is_some() {
                purged += 1;
            }
        }
        if purged > 0 {
            debug!(purged, "purged expired sessions");
        }
        purged
    }

    fn len(&self) -> usize {
        self.sessions.len()
    }
}
