//! Bulk-transfer client over an HTTP-like transport.
//!
//! The HTTP client is abstracted via a trait so the protocol can run over
//! any request/response transport, including the in-process
//! [`LoopbackClient`] used by tests.

use crate::cancel::CancelToken;
use crate::config::SyncConfig;
use crate::conflict::ConflictHandler;
use crate::error::{SyncError, SyncResult};
use crate::provider::SyncProvider;
use rowsync_protocol::{
    decode, encode, Anchor, BulkChangeSetInfo, BulkDownloadChunk, BulkUploadBegin, BulkUploadChunk,
    ChangeSet, ErrorBody, StoreIdResponse, SyncDirection, SyncFilterParameter,
};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET.
    Get,
    /// POST.
    Post,
}

/// A failed request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpError {
    /// Response status, or `None` when no response arrived.
    pub status: Option<u16>,
    /// Decoded error body, when the server sent one.
    pub body: Option<ErrorBody>,
    /// Description.
    pub message: String,
}

impl HttpError {
    /// A failure before any response (connection refused, reset, ...).
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            status: None,
            body: None,
            message: message.into(),
        }
    }

    /// A non-success response. The body is decoded as [`ErrorBody`] when
    /// possible.
    pub fn from_response(status: u16, body: &[u8]) -> Self {
        let parsed: Option<ErrorBody> = serde_json::from_slice(body).ok();
        let message = parsed
            .as_ref()
            .map(|b| b.message.clone())
            .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned());
        Self {
            status: Some(status),
            body: parsed,
            message,
        }
    }

    /// The server's error code, if any.
    pub fn code(&self) -> Option<&str> {
        self.body.as_ref().map(|b| b.error.as_str())
    }

    /// True for network failures and 5xx responses.
    pub fn is_transient(&self) -> bool {
        self.status.map_or(true, |s| s >= 500)
    }

    /// Converts to a sync error. `session` names the bulk session involved,
    /// if any.
    pub fn into_sync_error(self, session: Option<Uuid>) -> SyncError {
        match (self.code(), session) {
            (Some("session_not_found"), Some(id)) => return SyncError::SessionNotFound(id),
            (Some("stale_version"), _) => {
                if let Some(body) = &self.body {
                    if let (Some(requested), Some(minimum)) =
                        (body.detail_u64("requested"), body.detail_u64("minimum"))
                    {
                        return SyncError::StaleVersion { requested, minimum };
                    }
                }
            }
            _ => {}
        }
        let message = self.to_string();
        if self.is_transient() {
            SyncError::transport_retryable(message)
        } else {
            SyncError::transport_fatal(message)
        }
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.status, self.code()) {
            (Some(status), Some(code)) => write!(f, "HTTP {} ({}): {}", status, code, self.message),
            (Some(status), None) => write!(f, "HTTP {}: {}", status, self.message),
            (None, _) => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for HttpError {}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual transport.
pub trait HttpClient: Send + Sync {
    /// Sends a GET request and returns the response body.
    fn get(&self, url: &str) -> Result<Vec<u8>, HttpError>;

    /// Sends a POST request and returns the response body.
    fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, HttpError>;
}

impl<C: HttpClient + ?Sized> HttpClient for Arc<C> {
    fn get(&self, url: &str) -> Result<Vec<u8>, HttpError> {
        (**self).get(url)
    }

    fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, HttpError> {
        (**self).post(url, body)
    }
}

/// Trait for servers that can handle loopback requests.
pub trait LoopbackServer: Send + Sync {
    /// Handles a request for `path` (including any query string).
    fn handle_request(&self, method: HttpMethod, path: &str, body: &[u8]) -> Result<Vec<u8>, HttpError>;
}

impl<S: LoopbackServer + ?Sized> LoopbackServer for Arc<S> {
    fn handle_request(&self, method: HttpMethod, path: &str, body: &[u8]) -> Result<Vec<u8>, HttpError> {
        (**self).handle_request(method, path, body)
    }
}

/// A client that routes requests directly to a server in the same process.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer> LoopbackClient<S> {
    /// Creates a loopback client connected to `server`.
    pub fn new(server: S) -> Self {
        Self { server }
    }

    /// Returns the server.
    pub fn server(&self) -> &S {
        &self.server
    }
}

/// Strips scheme and authority from a URL, keeping path and query.
fn path_of(url: &str) -> &str {
    match url.split_once("://") {
        Some((_, rest)) => rest.find('/').map_or("/", |i| &rest[i..]),
        None => url,
    }
}

impl<S: LoopbackServer> HttpClient for LoopbackClient<S> {
    fn get(&self, url: &str) -> Result<Vec<u8>, HttpError> {
        self.server.handle_request(HttpMethod::Get, path_of(url), &[])
    }

    fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, HttpError> {
        self.server.handle_request(HttpMethod::Post, path_of(url), &body)
    }
}

/// A remote store reached through the bulk-transfer protocol.
///
/// Downloads fetch the change set in chunks of `chunk_size`, retrying each
/// chunk on transient failures. Uploads open a session, post chunks with
/// their index and complete the session; the server applies the whole set
/// with its own configured conflict resolution.
pub struct RemoteSyncProvider<C: HttpClient> {
    base_url: String,
    client: C,
    config: SyncConfig,
}

impl<C: HttpClient> RemoteSyncProvider<C> {
    /// Creates a remote provider for the server at `base_url`.
    pub fn new(base_url: impl Into<String>, client: C, config: SyncConfig) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            config,
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the client configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> SyncResult<T> {
        let body = self
            .client
            .get(&self.url(path))
            .map_err(|e| e.into_sync_error(None))?;
        serde_json::from_slice(&body).map_err(|e| SyncError::Protocol(format!("bad response from {}: {}", path, e)))
    }

    fn fetch_chunk(
        &self,
        session: Uuid,
        skip: usize,
        take: usize,
        cancel: &CancelToken,
    ) -> SyncResult<BulkDownloadChunk> {
        let encoding = self.config.encoding;
        let path = format!(
            "/changes-bulk-item{}/{}/{}/{}",
            encoding.route_suffix(),
            session,
            skip,
            take
        );
        let retry = &self.config.retry;
        let mut attempt = 0;

        loop {
            let delay = retry.delay_for_attempt(attempt);
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
            cancel.check()?;

            match self.client.get(&self.url(&path)) {
                Ok(body) => return Ok(decode(&body, encoding)?),
                Err(e) if e.is_transient() && attempt + 1 < retry.max_attempts => {
                    attempt += 1;
                    warn!(%session, skip, attempt, error = %e, "chunk download failed, retrying");
                }
                Err(e) => return Err(e.into_sync_error(Some(session))),
            }
        }
    }

    fn changes_query(direction: SyncDirection, filters: &[SyncFilterParameter]) -> String {
        let mut query = format!("?direction={}", direction.as_str());
        for filter in filters {
            query.push('&');
            query.push_str(&urlencoding::encode(&filter.name));
            query.push('=');
            query.push_str(&urlencoding::encode(&filter.query_value()));
        }
        query
    }
}

impl<C: HttpClient> SyncProvider for RemoteSyncProvider<C> {
    fn store_id(&self, cancel: &CancelToken) -> SyncResult<Uuid> {
        cancel.check()?;
        let response: StoreIdResponse = self.get_json("/store-id")?;
        Ok(response.store_id)
    }

    fn get_changes(
        &self,
        other: Uuid,
        filters: &[SyncFilterParameter],
        direction: SyncDirection,
        cancel: &CancelToken,
    ) -> SyncResult<ChangeSet> {
        cancel.check()?;
        let path = format!("/changes-bulk/{}{}", other, Self::changes_query(direction, filters));
        let info: BulkChangeSetInfo = self.get_json(&path)?;
        let total = usize::try_from(info.total_changes)
            .map_err(|_| SyncError::Protocol(format!("total {} overflows", info.total_changes)))?;
        debug!(session = %info.session_id, total, "download session opened");

        let mut items = Vec::with_capacity(total);
        let chunk_size = self.config.chunk_size.max(1);
        while items.len() < total {
            let skip = items.len();
            let take = chunk_size.min(total - skip);
            let chunk = self.fetch_chunk(info.session_id, skip, take, cancel)?;

            if chunk.session_id != info.session_id || chunk.skip != skip as u64 {
                return Err(SyncError::Protocol(format!(
                    "expected chunk at {} of session {}, got {} of {}",
                    skip, info.session_id, chunk.skip, chunk.session_id
                )));
            }
            if chunk.items.is_empty() {
                return Err(SyncError::Protocol(format!(
                    "session {} ended after {} of {} items",
                    info.session_id, skip, total
                )));
            }
            items.extend(chunk.items);
        }

        if items.len() != total {
            return Err(SyncError::Protocol(format!(
                "received {} items, server declared {}",
                items.len(),
                total
            )));
        }

        Ok(ChangeSet::new(info.source_anchor, info.target_anchor, items))
    }

    fn apply_changes(
        &self,
        changes: &ChangeSet,
        on_conflict: Option<&ConflictHandler>,
        cancel: &CancelToken,
    ) -> SyncResult<Anchor> {
        if on_conflict.is_some() {
            debug!("remote peers resolve conflicts with their own configuration");
        }
        cancel.check()?;

        let encoding = self.config.encoding;
        let session = Uuid::new_v4();
        let begin = BulkUploadBegin {
            session_id: session,
            total_changes: changes.len() as u64,
            source_anchor: changes.source_anchor,
            target_anchor: changes.target_anchor,
        };
        let body = serde_json::to_vec(&begin).map_err(|e| SyncError::Protocol(e.to_string()))?;
        self.client
            .post(&self.url("/changes-bulk-begin"), body)
            .map_err(|e| e.into_sync_error(Some(session)))?;
        debug!(%session, total = changes.len(), "upload session opened");

        let item_path = self.url(&format!("/changes-bulk-item{}", encoding.route_suffix()));
        for (index, items) in changes.items.chunks(self.config.chunk_size.max(1)).enumerate() {
            cancel.check()?;
            let chunk = BulkUploadChunk {
                session_id: session,
                chunk_index: u32::try_from(index)
                    .map_err(|_| SyncError::Protocol("too many chunks".into()))?,
                items: items.to_vec(),
            };
            self.client
                .post(&item_path, encode(&chunk, encoding)?)
                .map_err(|e| e.into_sync_error(Some(session)))?;
        }

        cancel.check()?;
        let complete = self.url(&format!(
            "/changes-bulk-complete{}/{}",
            encoding.route_suffix(),
            session
        ));
        let body = self
            .client
            .post(&complete, Vec::new())
            .map_err(|e| e.into_sync_error(Some(session)))?;
        Ok(decode(&body, encoding)?)
    }

    fn save_version_for_store(&self, other: Uuid, version: u64, cancel: &CancelToken) -> SyncResult<()> {
        cancel.check()?;
        self.client
            .post(&self.url(&format!("/save-version/{}/{}", other, version)), Vec::new())
            .map_err(|e| e.into_sync_error(None))?;
        Ok(())
    }

    fn forget_store(&self, other: Uuid, cancel: &CancelToken) -> SyncResult<()> {
        cancel.check()?;
        self.client
            .post(&self.url(&format!("/forget-store/{}", other)), Vec::new())
            .map_err(|e| e.into_sync_error(None))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn path_extraction() {
        assert_eq!(path_of("http://localhost:8080/store-id"), "/store-id");
        assert_eq!(path_of("https://h/a/b?x=1"), "/a/b?x=1");
        assert_eq!(path_of("http://host"), "/");
        assert_eq!(path_of("/already/a/path"), "/already/a/path");
    }

    #[test]
    fn error_classification() {
        assert!(HttpError::network("reset").is_transient());
        assert!(HttpError::from_response(503, b"busy").is_transient());
        assert!(!HttpError::from_response(400, b"nope").is_transient());

        let body = serde_json::to_vec(&ErrorBody::new("session_not_found", "gone")).unwrap();
        let id = Uuid::new_v4();
        let err = HttpError::from_response(404, &body).into_sync_error(Some(id));
        assert!(matches!(err, SyncError::SessionNotFound(s) if s == id));

        let body = serde_json::to_vec(
            &ErrorBody::new("stale_version", "old")
                .with_detail(serde_json::json!({ "requested": 1, "minimum": 9 })),
        )
        .unwrap();
        let err = HttpError::from_response(409, &body).into_sync_error(None);
        assert!(matches!(err, SyncError::StaleVersion { requested: 1, minimum: 9 }));
    }

    #[test]
    fn filters_travel_in_the_query_string() {
        let query = RemoteSyncProvider::<LoopbackClient<Arc<Recorder>>>::changes_query(
            SyncDirection::DownloadOnly,
            &[SyncFilterParameter::new("owner", "a b&c")],
        );
        assert_eq!(query, "?direction=DownloadOnly&owner=a%20b%26c");
    }

    /// Answers every request with a fixed error and records paths.
    struct Recorder {
        paths: Mutex<Vec<(HttpMethod, String)>>,
        status: u16,
    }

    impl LoopbackServer for Recorder {
        fn handle_request(&self, method: HttpMethod, path: &str, _: &[u8]) -> Result<Vec<u8>, HttpError> {
            self.paths.lock().push((method, path.to_string()));
            Err(HttpError::from_response(self.status, b"unavailable"))
        }
    }

    #[test]
    fn transient_chunk_failures_are_retried_up_to_the_bound() {
        let server = Arc::new(Recorder {
            paths: Mutex::new(Vec::new()),
            status: 503,
        });
        let config = SyncConfig::new().with_retry(
            crate::RetryConfig::new(3).with_initial_delay(std::time::Duration::from_millis(1)),
        );
        let remote = RemoteSyncProvider::new("http://peer/", LoopbackClient::new(Arc::clone(&server)), config);

        let err = remote
            .fetch_chunk(Uuid::new_v4(), 0, 10, &CancelToken::new())
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(server.paths.lock().len(), 3);
        assert!(server.paths.lock()[0].1.starts_with("/changes-bulk-item/"));
    }

    #[test]
    fn client_errors_are_not_retried() {
        let server = Arc::new(Recorder {
            paths: Mutex::new(Vec::new()),
            status: 400,
        });
        let remote = RemoteSyncProvider::new(
            "http://peer",
            LoopbackClient::new(Arc::clone(&server)),
            SyncConfig::default(),
        );
        let err = remote
            .fetch_chunk(Uuid::new_v4(), 0, 10, &CancelToken::new())
            .unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(server.paths.lock().len(), 1);
    }
}
