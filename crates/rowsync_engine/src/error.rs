//! Error types for the sync engine.

use rowsync_protocol::CodecError;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// A step of a synchronization round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStep {
    /// Resolving both store ids.
    ResolveStoreIds,
    /// Collecting local changes for the remote.
    CollectLocalChanges,
    /// Applying local changes on the remote.
    ApplyOnRemote,
    /// Recording on the local store what the remote received.
    SaveLocalVersion,
    /// Collecting remote changes for the local store.
    CollectRemoteChanges,
    /// Applying remote changes locally.
    ApplyOnLocal,
    /// Recording on the remote store what the local store received.
    SaveRemoteVersion,
}

impl fmt::Display for SyncStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncStep::ResolveStoreIds => "resolve store ids",
            SyncStep::CollectLocalChanges => "collect local changes",
            SyncStep::ApplyOnRemote => "apply changes on remote",
            SyncStep::SaveLocalVersion => "save local version",
            SyncStep::CollectRemoteChanges => "collect remote changes",
            SyncStep::ApplyOnLocal => "apply changes locally",
            SyncStep::SaveRemoteVersion => "save remote version",
        };
        f.write_str(name)
    }
}

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The requested base version was trimmed from the change log.
    /// The caller must resnapshot.
    #[error("version {requested} is older than the retained change log (minimum {minimum})")]
    StaleVersion {
        /// Version the caller asked to resume from.
        requested: u64,
        /// Oldest version still in the log.
        minimum: u64,
    },

    /// Bulk session is unknown or expired.
    #[error("bulk session {0} not found")]
    SessionNotFound(Uuid),

    /// A synchronization round failed.
    #[error("synchronization failed during {step}: {source}")]
    SynchronizationFailed {
        /// Step that failed.
        step: SyncStep,
        /// Underlying cause.
        #[source]
        source: Box<SyncError>,
    },

    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Protocol error (unexpected message content).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An internal invariant was broken.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Wraps a storage backend error.
    pub fn storage(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Storage(Box::new(err))
    }

    /// Wraps an error as the failure of a round step.
    pub fn failed_at(step: SyncStep, source: SyncError) -> Self {
        Self::SynchronizationFailed {
            step,
            source: Box::new(source),
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::SynchronizationFailed { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Returns the innermost error, looking through round failures.
    pub fn root(&self) -> &SyncError {
        match self {
            SyncError::SynchronizationFailed { source, .. } => source.root(),
            other => other,
        }
    }

    /// Returns true if the caller should drop its anchor and resnapshot.
    pub fn is_stale_version(&self) -> bool {
        matches!(self.root(), SyncError::StaleVersion { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection reset").is_retryable());
        assert!(!SyncError::transport_fatal("bad request").is_retryable());
        assert!(!SyncError::Cancelled.is_retryable());
        assert!(SyncError::failed_at(
            SyncStep::CollectRemoteChanges,
            SyncError::transport_retryable("timeout")
        )
        .is_retryable());
    }

    #[test]
    fn root_looks_through_round_failures() {
        let err = SyncError::failed_at(
            SyncStep::CollectLocalChanges,
            SyncError::StaleVersion {
                requested: 1,
                minimum: 5,
            },
        );
        assert!(err.is_stale_version());
        assert!(err.to_string().contains("collect local changes"));
        assert!(matches!(err.root(), SyncError::StaleVersion { minimum: 5, .. }));
    }

    #[test]
    fn error_display() {
        let id = Uuid::new_v4();
        assert!(SyncError::SessionNotFound(id)
            .to_string()
            .contains(&id.to_string()));
        assert_eq!(SyncError::Cancelled.to_string(), "operation cancelled");
    }
}
