//! HTTP transport for [`SyncServer`].
//!
//! Handlers run the blocking store calls on tokio's blocking pool and map
//! [`ServerError`] to a status code plus an [`ErrorBody`](rowsync_protocol::ErrorBody).

use crate::error::{ServerError, ServerResult};
use crate::server::SyncServer;
use crate::handler::parse_changes_query;
use axum::{
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rowsync_engine::SyncProvider;
use rowsync_protocol::{BulkChangeSetInfo, Encoding, StoreIdResponse};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        (status, Json(self.to_body())).into_response()
    }
}

/// A body in one of the chunk encodings.
struct Encoded(Encoding, Vec<u8>);

impl IntoResponse for Encoded {
    fn into_response(self) -> Response {
        ([(header::CONTENT_TYPE, self.0.content_type())], self.1).into_response()
    }
}

type Shared<P> = Arc<SyncServer<P>>;

/// Builds the router serving every bulk-transfer route.
pub fn router<P: SyncProvider + 'static>(server: Shared<P>) -> Router {
    Router::new()
        .route("/store-id", get(store_id::<P>))
        .route("/changes-bulk/{other}", get(begin_download::<P>))
        .route("/changes-bulk-item/{session}/{skip}/{take}", get(download_chunk_text::<P>))
        .route("/changes-bulk-item-binary/{session}/{skip}/{take}", get(download_chunk_binary::<P>))
        .route("/changes-bulk-begin", post(begin_upload::<P>))
        .route("/changes-bulk-item", post(upload_chunk_text::<P>))
        .route("/changes-bulk-item-binary", post(upload_chunk_binary::<P>))
        .route("/changes-bulk-complete/{session}", post(complete_upload_text::<P>))
        .route("/changes-bulk-complete-binary/{session}", post(complete_upload_binary::<P>))
        .route("/save-version/{other}/{version}", post(save_version::<P>))
        .route("/forget-store/{other}", post(forget_store::<P>))
        .fallback(not_found)
        .with_state(server)
}

/// Binds the configured address and serves until the listener fails.
///
/// Expired sessions are purged in the background at the configured interval.
pub async fn serve<P: SyncProvider + 'static>(server: Shared<P>) -> std::io::Result<()> {
    let addr = server.config().bind_addr;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("rowsync server listening on {}", listener.local_addr()?);

    let purge = spawn_purge_task(Arc::clone(&server));
    let result = axum::serve(listener, router(server)).await;
    purge.abort();
    result
}

/// Spawns a task purging expired sessions every `purge_interval`.
pub fn spawn_purge_task<P: SyncProvider + 'static>(server: Shared<P>) -> JoinHandle<()> {
    let period = server.config().purge_interval.max(Duration::from_millis(10));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            server.purge_expired_sessions();
        }
    })
}

/// Runs `f` on the blocking pool.
async fn blocking<P, T, F>(server: Shared<P>, f: F) -> ServerResult<T>
where
    P: SyncProvider + 'static,
    T: Send + 'static,
    F: FnOnce(&SyncServer<P>) -> ServerResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&server))
        .await
        .map_err(|e| ServerError::Internal(format!("handler task failed: {}", e)))?
}

async fn store_id<P: SyncProvider + 'static>(
    State(server): State<Shared<P>>,
) -> ServerResult<Json<StoreIdResponse>> {
    blocking(server, |s| s.handler().store_id()).await.map(Json)
}

async fn begin_download<P: SyncProvider + 'static>(
    State(server): State<Shared<P>>,
    Path(other): Path<Uuid>,
    RawQuery(query): RawQuery,
) -> ServerResult<Json<BulkChangeSetInfo>> {
    let (direction, filters) = parse_changes_query(query.as_deref())?;
    blocking(server, move |s| s.handler().begin_download(other, direction, &filters))
        .await
        .map(Json)
}

async fn download_chunk<P: SyncProvider + 'static>(
    server: Shared<P>,
    encoding: Encoding,
    (session, skip, take): (Uuid, u64, u64),
) -> ServerResult<Encoded> {
    blocking(server, move |s| s.download_chunk(encoding, session, skip, take))
        .await
        .map(|body| Encoded(encoding, body))
}

async fn download_chunk_text<P: SyncProvider + 'static>(
    State(server): State<Shared<P>>,
    Path(params): Path<(Uuid, u64, u64)>,
) -> ServerResult<Encoded> {
    download_chunk(server, Encoding::Text, params).await
}

async fn download_chunk_binary<P: SyncProvider + 'static>(
    State(server): State<Shared<P>>,
    Path(params): Path<(Uuid, u64, u64)>,
) -> ServerResult<Encoded> {
    download_chunk(server, Encoding::Binary, params).await
}

async fn begin_upload<P: SyncProvider + 'static>(
    State(server): State<Shared<P>>,
    body: Bytes,
) -> ServerResult<StatusCode> {
    blocking(server, move |s| s.begin_upload(&body)).await?;
    Ok(StatusCode::OK)
}

async fn upload_chunk_text<P: SyncProvider + 'static>(
    State(server): State<Shared<P>>,
    body: Bytes,
) -> ServerResult<StatusCode> {
    blocking(server, move |s| s.upload_chunk(Encoding::Text, &body)).await?;
    Ok(StatusCode::OK)
}

async fn upload_chunk_binary<P: SyncProvider + 'static>(
    State(server): State<Shared<P>>,
    body: Bytes,
) -> ServerResult<StatusCode> {
    blocking(server, move |s| s.upload_chunk(Encoding::Binary, &body)).await?;
    Ok(StatusCode::OK)
}

async fn complete_upload<P: SyncProvider + 'static>(
    server: Shared<P>,
    encoding: Encoding,
    session: Uuid,
) -> ServerResult<Encoded> {
    blocking(server, move |s| s.complete_upload(encoding, session))
        .await
        .map(|body| Encoded(encoding, body))
}

async fn complete_upload_text<P: SyncProvider + 'static>(
    State(server): State<Shared<P>>,
    Path(session): Path<Uuid>,
) -> ServerResult<Encoded> {
    complete_upload(server, Encoding::Text, session).await
}

async fn complete_upload_binary<P: SyncProvider + 'static>(
    State(server): State<Shared<P>>,
    Path(session): Path<Uuid>,
) -> ServerResult<Encoded> {
    complete_upload(server, Encoding::Binary, session).await
}

async fn save_version<P: SyncProvider + 'static>(
    State(server): State<Shared<P>>,
    Path((other, version)): Path<(Uuid, u64)>,
) -> ServerResult<StatusCode> {
    blocking(server, move |s| s.handler().save_version(other, version)).await?;
    Ok(StatusCode::OK)
}

async fn forget_store<P: SyncProvider + 'static>(
    State(server): State<Shared<P>>,
    Path(other): Path<Uuid>,
) -> ServerResult<StatusCode> {
    blocking(server, move |s| s.handler().forget_store(other)).await?;
    Ok(StatusCode::OK)
}

async fn not_found(uri: axum::http::Uri) -> ServerError {
    ServerError::NotFound(uri.path().to_string())
}
