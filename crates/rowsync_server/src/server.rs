//! Main sync server.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{parse_changes_query, HandlerContext, RequestHandler};
use crate::session::{MemorySessionStore, SessionStore};
use rowsync_engine::{HttpError, HttpMethod, LoopbackServer, SyncError, SyncProvider};
use rowsync_protocol::{
    decode, encode, BulkUploadBegin, BulkUploadChunk, CodecError, Encoding, SyncDirection,
    SyncFilterParameter,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

impl From<CodecError> for ServerError {
    fn from(err: CodecError) -> Self {
        ServerError::Sync(SyncError::Codec(err))
    }
}

/// A parsed request route.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// `GET /store-id`
    StoreId,
    /// `GET /changes-bulk/{other}?direction=..&name=value..`
    BeginDownload {
        /// Downloading peer.
        other: Uuid,
        /// Requested direction.
        direction: SyncDirection,
        /// Custom query parameters.
        filters: Vec<SyncFilterParameter>,
    },
    /// `GET /changes-bulk-item[-binary]/{session}/{skip}/{take}`
    DownloadChunk {
        /// Response encoding.
        encoding: Encoding,
        /// Download session.
        session: Uuid,
        /// Offset.
        skip: u64,
        /// Requested item count.
        take: u64,
    },
    /// `POST /changes-bulk-begin`
    BeginUpload,
    /// `POST /changes-bulk-item[-binary]`
    UploadChunk {
        /// Body encoding.
        encoding: Encoding,
    },
    /// `POST /changes-bulk-complete[-binary]/{session}`
    CompleteUpload {
        /// Response encoding.
        encoding: Encoding,
        /// Upload session.
        session: Uuid,
    },
    /// `POST /save-version/{other}/{version}`
    SaveVersion {
        /// Peer whose progress is recorded.
        other: Uuid,
        /// Version the peer has seen.
        version: u64,
    },
    /// `POST /forget-store/{other}`
    ForgetStore {
        /// Peer to resnapshot.
        other: Uuid,
    },
}

impl Route {
    /// Parses a method and a path with optional query string.
    pub fn parse(method: HttpMethod, path: &str) -> ServerResult<Self> {
        let (path, query) = match path.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (path, None),
        };
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        let not_found = || ServerError::NotFound(path.to_string());

        let route = match (method, segments.as_slice()) {
            (HttpMethod::Get, ["store-id"]) => Route::StoreId,
            (HttpMethod::Get, ["changes-bulk", other]) => {
                let (direction, filters) = parse_changes_query(query)?;
                Route::BeginDownload {
                    other: parse_uuid(other)?,
                    direction,
                    filters,
                }
            }
            (HttpMethod::Get, [route, session, skip, take]) => Route::DownloadChunk {
                encoding: suffixed(route, "changes-bulk-item").ok_or_else(not_found)?,
                session: parse_uuid(session)?,
                skip: parse_number(skip)?,
                take: parse_number(take)?,
            },
            (HttpMethod::Post, ["changes-bulk-begin"]) => Route::BeginUpload,
            (HttpMethod::Post, [route]) => Route::UploadChunk {
                encoding: suffixed(route, "changes-bulk-item").ok_or_else(not_found)?,
            },
            (HttpMethod::Post, ["forget-store", other]) => Route::ForgetStore {
                other: parse_uuid(other)?,
            },
            (HttpMethod::Post, [route, session]) => Route::CompleteUpload {
                encoding: suffixed(route, "changes-bulk-complete").ok_or_else(not_found)?,
                session: parse_uuid(session)?,
            },
            (HttpMethod::Post, ["save-version", other, version]) => Route::SaveVersion {
                other: parse_uuid(other)?,
                version: parse_number(version)?,
            },
            _ => return Err(not_found()),
        };
        Ok(route)
    }
}

/// Maps `changes-bulk-item` to text and `changes-bulk-item-binary` to binary.
fn suffixed(segment: &str, route: &str) -> Option<Encoding> {
    match segment.strip_prefix(route)? {
        "" => Some(Encoding::Text),
        "-binary" => Some(Encoding::Binary),
        _ => None,
    }
}

fn parse_uuid(segment: &str) -> ServerResult<Uuid> {
    Uuid::parse_str(segment).map_err(|e| ServerError::InvalidRequest(format!("bad id {:?}: {}", segment, e)))
}

fn parse_number(segment: &str) -> ServerResult<u64> {
    segment
        .parse()
        .map_err(|e| ServerError::InvalidRequest(format!("bad number {:?}: {}", segment, e)))
}

fn to_json<T: Serialize>(value: &T) -> ServerResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| ServerError::Internal(e.to_string()))
}

/// The sync server.
///
/// Serves one store to any number of peers over the chunked bulk-transfer
/// protocol. Transports hand it raw request bodies and get encoded
/// response bodies back; [`crate::router`] exposes it over HTTP and the
/// [`LoopbackServer`] impl serves in-process clients.
///
/// # Example
///
/// ```
/// use rowsync_engine::{HttpMethod, LoopbackServer};
/// use rowsync_server::{ServerConfig, SyncServer};
/// use rowsync_sqlite::{SqliteSyncConfiguration, SqliteSyncProvider};
///
/// let store = SqliteSyncProvider::open(SqliteSyncConfiguration::new())?;
/// let server = SyncServer::new(store, ServerConfig::default());
///
/// let body = server.handle_request(HttpMethod::Get, "/store-id", &[]).unwrap();
/// assert!(String::from_utf8(body)?.contains("storeId"));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct SyncServer<P> {
    handler: RequestHandler<P>,
    context: Arc<HandlerContext<P>>,
}

impl<P: SyncProvider> SyncServer<P> {
    /// Creates a new sync server with in-memory sessions.
    pub fn new(provider: P, config: ServerConfig) -> Self {
        let sessions = Arc::new(MemorySessionStore::new(config.session_ttl));
        Self::with_session_store(provider, config, sessions)
    }

    /// Creates a sync server with an existing session store.
    pub fn with_session_store(provider: P, config: ServerConfig, sessions: Arc<dyn SessionStore>) -> Self {
        let context = Arc::new(HandlerContext::new(provider, sessions, config));
        let handler = RequestHandler::new(Arc::clone(&context));
        Self { handler, context }
    }

    /// Returns the typed request handler.
    pub fn handler(&self) -> &RequestHandler<P> {
        &self.handler
    }

    /// Returns the served store.
    pub fn provider(&self) -> &P {
        &self.context.provider
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.context.config
    }

    /// Number of open bulk sessions.
    pub fn session_count(&self) -> usize {
        self.context.sessions.len()
    }

    /// Drops expired sessions and returns how many were dropped.
    pub fn purge_expired_sessions(&self) -> usize {
        self.handler.purge_expired_sessions()
    }

    /// Serves a download chunk in `encoding`.
    pub fn download_chunk(&self, encoding: Encoding, session: Uuid, skip: u64, take: u64) -> ServerResult<Vec<u8>> {
        let chunk = self.handler.download_chunk(session, skip, take)?;
        Ok(encode(&chunk, encoding)?)
    }

    /// Opens an upload session from a JSON [`BulkUploadBegin`] body.
    pub fn begin_upload(&self, body: &[u8]) -> ServerResult<()> {
        let begin: BulkUploadBegin = serde_json::from_slice(body)
            .map_err(|e| ServerError::InvalidRequest(format!("bad upload begin: {}", e)))?;
        self.handler.begin_upload(begin)
    }

    /// Buffers an upload chunk encoded in `encoding`.
    pub fn upload_chunk(&self, encoding: Encoding, body: &[u8]) -> ServerResult<()> {
        let chunk: BulkUploadChunk = decode(body, encoding)?;
        self.handler.upload_chunk(chunk)
    }

    /// Completes an upload session and returns the encoded anchor.
    pub fn complete_upload(&self, encoding: Encoding, session: Uuid) -> ServerResult<Vec<u8>> {
        let anchor = self.handler.complete_upload(session)?;
        Ok(encode(&anchor, encoding)?)
    }

    /// Dispatches a parsed route and returns the response body.
    pub fn dispatch(&self, route: Route, body: &[u8]) -> ServerResult<Vec<u8>> {
        match route {
            Route::StoreId => to_json(&self.handler.store_id()?),
            Route::BeginDownload {
                other,
                direction,
                filters,
            } => to_json(&self.handler.begin_download(other, direction, &filters)?),
            Route::DownloadChunk {
                encoding,
                session,
                skip,
                take,
            } => self.download_chunk(encoding, session, skip, take),
            Route::BeginUpload => self.begin_upload(body).map(|()| Vec::new()),
            Route::UploadChunk { encoding } => self.upload_chunk(encoding, body).map(|()| Vec::new()),
            Route::CompleteUpload { encoding, session } => self.complete_upload(encoding, session),
            Route::SaveVersion { other, version } => {
                self.handler.save_version(other, version).map(|()| Vec::new())
            }
            Route::ForgetStore { other } => self.handler.forget_store(other).map(|()| Vec::new()),
        }
    }
}

impl<P: SyncProvider> LoopbackServer for SyncServer<P> {
    fn handle_request(&self, method: HttpMethod, path: &str, body: &[u8]) -> Result<Vec<u8>, HttpError> {
        Route::parse(method, path)
            .and_then(|route| self.dispatch(route, body))
            .map_err(|e| {
                if e.is_server_error() {
                    warn!(path, error = %e, "request failed");
                }
                e.into_http_error()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_parse() {
        let id = Uuid::new_v4();
        assert_eq!(Route::parse(HttpMethod::Get, "/store-id").unwrap(), Route::StoreId);
        assert_eq!(
            Route::parse(HttpMethod::Get, &format!("/changes-bulk-item-binary/{}/10/5", id)).unwrap(),
            Route::DownloadChunk {
                encoding: Encoding::Binary,
                session: id,
                skip: 10,
                take: 5
            }
        );
        assert_eq!(
            Route::parse(HttpMethod::Post, "/changes-bulk-item").unwrap(),
            Route::UploadChunk {
                encoding: Encoding::Text
            }
        );
        assert_eq!(
            Route::parse(HttpMethod::Post, &format!("/changes-bulk-complete-binary/{}", id)).unwrap(),
            Route::CompleteUpload {
                encoding: Encoding::Binary,
                session: id
            }
        );
        assert_eq!(
            Route::parse(HttpMethod::Post, &format!("/save-version/{}/42", id)).unwrap(),
            Route::SaveVersion { other: id, version: 42 }
        );
        assert_eq!(
            Route::parse(HttpMethod::Post, &format!("/forget-store/{}", id)).unwrap(),
            Route::ForgetStore { other: id }
        );
    }

    #[test]
    fn begin_download_route_carries_the_query() {
        let id = Uuid::new_v4();
        let route = Route::parse(
            HttpMethod::Get,
            &format!("/changes-bulk/{}?direction=UploadOnly&owner=7", id),
        )
        .unwrap();
        assert_eq!(
            route,
            Route::BeginDownload {
                other: id,
                direction: SyncDirection::UploadOnly,
                filters: vec![SyncFilterParameter::new("owner", "7")],
            }
        );
    }

    #[test]
    fn unknown_routes_and_bad_segments() {
        assert!(matches!(
            Route::parse(HttpMethod::Get, "/nothing-here"),
            Err(ServerError::NotFound(_))
        ));
        assert!(matches!(
            Route::parse(HttpMethod::Post, "/changes-bulk-item-xml"),
            Err(ServerError::NotFound(_))
        ));
        assert!(matches!(
            Route::parse(HttpMethod::Post, "/store-id"),
            Err(ServerError::NotFound(_))
        ));
        assert!(matches!(
            Route::parse(HttpMethod::Get, "/changes-bulk/not-a-uuid"),
            Err(ServerError::InvalidRequest(_))
        ));
    }
}
