//! # rowsync protocol
//!
//! Data model and wire messages for row-level synchronization.
//!
//! This crate provides:
//! - [`Anchor`], the (store id, version) position in a change history
//! - [`SyncItem`] and [`ChangeSet`], the unit of exchange between stores
//! - Bulk-transfer session messages ([`BulkChangeSetInfo`], [`BulkUploadChunk`], ...)
//! - Text (JSON) and binary framing via [`encode`] / [`decode`]
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod anchor;
mod bulk;
mod changeset;
mod conflict;
mod direction;
mod filter;
mod item;
mod wire;

pub use anchor::Anchor;
pub use bulk::{
    BulkChangeSetInfo, BulkDownloadChunk, BulkUploadBegin, BulkUploadChunk, ErrorBody,
    StoreIdResponse,
};
pub use changeset::{ChangeSet, TableCount};
pub use conflict::ConflictResolution;
pub use direction::SyncDirection;
pub use filter::SyncFilterParameter;
pub use item::{ChangeType, SyncItem};
pub use wire::{decode, encode, BinaryMessage, Encoding, BINARY_FORMAT_VERSION};

pub use rowsync_codec::{CodecError, CodecResult, TypedValue};
