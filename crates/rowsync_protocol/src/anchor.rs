//! Anchors: positions in a store's change history.

use rowsync_codec::{BinaryDecoder, BinaryEncoder, CodecError, CodecResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// "Changes known up to `version` as seen by `store_id`."
///
/// The store id is never nil. "No prior sync" is expressed as
/// `Option<Anchor>::None`, not as a special anchor value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawAnchor")]
pub struct Anchor {
    store_id: Uuid,
    version: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAnchor {
    store_id: Uuid,
    version: u64,
}

impl TryFrom<RawAnchor> for Anchor {
    type Error = CodecError;

    fn try_from(raw: RawAnchor) -> Result<Self, Self::Error> {
        Anchor::new(raw.store_id, raw.version)
    }
}

impl Anchor {
    /// Creates an anchor. Fails if `store_id` is nil.
    pub fn new(store_id: Uuid, version: u64) -> CodecResult<Self> {
        if store_id.is_nil() {
            return Err(CodecError::invalid_structure("anchor store id is nil"));
        }
        Ok(Self { store_id, version })
    }

    /// The store this anchor belongs to.
    pub fn store_id(&self) -> Uuid {
        self.store_id
    }

    /// The version counter.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Returns a copy of this anchor at another version of the same store.
    pub fn at_version(&self, version: u64) -> Self {
        Self {
            store_id: self.store_id,
            version,
        }
    }

    pub(crate) fn write(&self, enc: &mut BinaryEncoder) {
        enc.write_uuid(&self.store_id);
        enc.write_u64(self.version);
    }

    pub(crate) fn read(dec: &mut BinaryDecoder<'_>) -> CodecResult<Self> {
        let store_id = dec.read_uuid()?;
        let version = dec.read_u64()?;
        Self::new(store_id, version)
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.store_id, self.version)
    }
}
