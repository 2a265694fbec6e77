//! Error types for the sync server.

use rowsync_engine::{HttpError, SyncError};
use rowsync_protocol::ErrorBody;
use thiserror::Error;
use uuid::Uuid;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No route matches the request.
    #[error("no route for {0}")]
    NotFound(String),

    /// Bulk session is unknown or expired.
    #[error("bulk session {0} not found")]
    SessionNotFound(Uuid),

    /// An upload completed with a different number of items than announced.
    #[error("upload announced {expected} items, received {actual}")]
    CountMismatch {
        /// Items announced at begin.
        expected: u64,
        /// Items received.
        actual: u64,
    },

    /// Error raised by the backing store.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Machine-readable code sent in the error body.
    pub fn code(&self) -> &'static str {
        match self {
            ServerError::InvalidRequest(_) => "invalid_request",
            ServerError::NotFound(_) => "not_found",
            ServerError::SessionNotFound(_) => "session_not_found",
            ServerError::CountMismatch { .. } => "count_mismatch",
            ServerError::Sync(e) => match e.root() {
                SyncError::StaleVersion { .. } => "stale_version",
                SyncError::SessionNotFound(_) => "session_not_found",
                SyncError::Protocol(_) | SyncError::Codec(_) => "invalid_request",
                SyncError::Cancelled => "cancelled",
                _ => "internal",
            },
            ServerError::Internal(_) => "internal",
        }
    }

    /// HTTP status for this error.
    pub fn status_code(&self) -> u16 {
        match self.code() {
            "invalid_request" | "count_mismatch" => 400,
            "not_found" | "session_not_found" => 404,
            "stale_version" => 409,
            "cancelled" => 503,
            _ => 500,
        }
    }

    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    /// Builds the response body.
    pub fn to_body(&self) -> ErrorBody {
        let body = ErrorBody::new(self.code(), self.to_string());
        match self {
            ServerError::Sync(e) => match e.root() {
                SyncError::StaleVersion { requested, minimum } => body.with_detail(
                    serde_json::json!({ "requested": requested, "minimum": minimum }),
                ),
                _ => body,
            },
            ServerError::CountMismatch { expected, actual } => {
                body.with_detail(serde_json::json!({ "expected": expected, "actual": actual }))
            }
            _ => body,
        }
    }

    /// Converts to the error a loopback client sees.
    pub fn into_http_error(self) -> HttpError {
        let body = self.to_body();
        HttpError {
            status: Some(self.status_code()),
            message: body.message.clone(),
            body: Some(body),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(ServerError::InvalidRequest("bad".into()).is_client_error());
        assert!(ServerError::SessionNotFound(Uuid::nil()).is_client_error());
        assert!(ServerError::Internal("oops".into()).is_server_error());
        assert!(ServerError::Sync(SyncError::Configuration("x".into())).is_server_error());
    }

    #[test]
    fn stale_version_carries_its_window() {
        let err = ServerError::Sync(SyncError::StaleVersion {
            requested: 4,
            minimum: 6,
        });
        assert_eq!(err.status_code(), 409);
        let body = err.to_body();
        assert_eq!(body.error, "stale_version");
        assert_eq!(body.detail_u64("requested"), Some(4));
        assert_eq!(body.detail_u64("minimum"), Some(6));
    }

    #[test]
    fn wrapped_errors_are_classified_by_root() {
        let err = ServerError::Sync(SyncError::failed_at(
            rowsync_engine::SyncStep::CollectLocalChanges,
            SyncError::Protocol("bad".into()),
        ));
        assert_eq!(err.code(), "invalid_request");
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn loopback_clients_see_the_same_mapping() {
        let id = Uuid::new_v4();
        let http = ServerError::SessionNotFound(id).into_http_error();
        assert_eq!(http.status, Some(404));
        assert!(matches!(http.into_sync_error(Some(id)), SyncError::SessionNotFound(s) if s == id));
    }
}
