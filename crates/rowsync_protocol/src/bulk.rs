//! Messages of the chunked bulk-transfer protocol.

use crate::anchor::Anchor;
use crate::changeset::TableCount;
use crate::item::SyncItem;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Response to a download begin: what the session holds, without items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkChangeSetInfo {
    /// Session to fetch chunks from. Not cached by the server when
    /// `total_changes` is zero.
    pub session_id: Uuid,
    /// Number of items in the session.
    pub total_changes: u64,
    /// Items per table.
    pub tables: Vec<TableCount>,
    /// Producer's anchor.
    pub source_anchor: Anchor,
    /// Consumer anchor the changes were computed against.
    pub target_anchor: Anchor,
}

/// Opens an upload session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkUploadBegin {
    /// Client-generated session id.
    pub session_id: Uuid,
    /// Number of items the client will send.
    pub total_changes: u64,
    /// Uploader's anchor.
    pub source_anchor: Anchor,
    /// Server anchor the changes were computed against.
    pub target_anchor: Anchor,
}

/// One chunk of an upload session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkUploadChunk {
    /// Session the chunk belongs to.
    pub session_id: Uuid,
    /// Position of this chunk; re-sending an index replaces the earlier chunk.
    pub chunk_index: u32,
    /// Items in the chunk.
    pub items: Vec<SyncItem>,
}

/// One chunk served from a download session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkDownloadChunk {
    /// Session the chunk came from.
    pub session_id: Uuid,
    /// Offset of the first item.
    pub skip: u64,
    /// Items in the chunk.
    pub items: Vec<SyncItem>,
}

/// Body of `GET /store-id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreIdResponse {
    /// The store's identity.
    pub store_id: Uuid,
}

/// Body of every error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable code, e.g. `session_not_found`.
    pub error: String,
    /// Human-readable detail.
    pub message: String,
    /// Structured detail for codes that carry data, e.g. the version window
    /// of `stale_version`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

impl ErrorBody {
    /// Creates an error body.
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            detail: None,
        }
    }

    /// Attaches structured detail.
    #[must_use]
    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }

    /// Reads an unsigned integer field from the detail object.
    pub fn detail_u64(&self, field: &str) -> Option<u64> {
        self.detail.as_ref()?.get(field)?.as_u64()
    }
}
