//! Text and binary framing of protocol messages.

use crate::anchor::Anchor;
use crate::bulk::{BulkDownloadChunk, BulkUploadChunk};
use crate::changeset::ChangeSet;
use crate::item::SyncItem;
use rowsync_codec::{BinaryDecoder, BinaryEncoder, CodecError, CodecResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Binary format version written at the start of every binary message.
pub const BINARY_FORMAT_VERSION: u8 = 1;

/// Body encoding for chunk transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Encoding {
    /// Self-describing JSON.
    #[default]
    Text,
    /// Length-prefixed binary.
    Binary,
}

impl Encoding {
    /// HTTP content type of bodies in this encoding.
    pub fn content_type(&self) -> &'static str {
        match self {
            Encoding::Text => "application/json",
            Encoding::Binary => "application/octet-stream",
        }
    }

    /// Route suffix selecting this encoding, e.g. `changes-bulk-item-binary`.
    pub fn route_suffix(&self) -> &'static str {
        match self {
            Encoding::Text => "",
            Encoding::Binary => "-binary",
        }
    }
}

/// A message with a binary form.
///
/// Binary messages are framed as `[format version][type code][body]`.
pub trait BinaryMessage: Sized {
    /// Message type code.
    const TYPE_CODE: u8;

    /// Writes the message body.
    fn write_body(&self, enc: &mut BinaryEncoder) -> CodecResult<()>;

    /// Reads the message body.
    fn read_body(dec: &mut BinaryDecoder<'_>) -> CodecResult<Self>;

    /// Encodes to framed bytes.
    fn to_binary(&self) -> CodecResult<Vec<u8>> {
        let mut enc = BinaryEncoder::with_capacity(256);
        enc.write_u8(BINARY_FORMAT_VERSION);
        enc.write_u8(Self::TYPE_CODE);
        self.write_body(&mut enc)?;
        Ok(enc.into_bytes())
    }

    /// Decodes from framed bytes, rejecting trailing input.
    fn from_binary(bytes: &[u8]) -> CodecResult<Self> {
        let mut dec = BinaryDecoder::new(bytes);
        let version = dec.read_u8()?;
        if version != BINARY_FORMAT_VERSION {
            return Err(CodecError::invalid_structure(format!(
                "unsupported binary format version {}",
                version
            )));
        }
        let code = dec.read_u8()?;
        if code != Self::TYPE_CODE {
            return Err(CodecError::invalid_structure(format!(
                "expected message type {}, got {}",
                Self::TYPE_CODE,
                code
            )));
        }
        let message = Self::read_body(&mut dec)?;
        dec.finish()?;
        Ok(message)
    }
}

/// Encodes a message in the requested encoding.
pub fn encode<M: BinaryMessage + Serialize>(message: &M, encoding: Encoding) -> CodecResult<Vec<u8>> {
    match encoding {
        Encoding::Text => {
            serde_json::to_vec(message).map_err(|e| CodecError::encoding_failed(e.to_string()))
        }
        Encoding::Binary => message.to_binary(),
    }
}

/// Decodes a message from the requested encoding.
pub fn decode<M: BinaryMessage + DeserializeOwned>(bytes: &[u8], encoding: Encoding) -> CodecResult<M> {
    match encoding {
        Encoding::Text => Ok(serde_json::from_slice(bytes)?),
        Encoding::Binary => M::from_binary(bytes),
    }
}

fn write_items(enc: &mut BinaryEncoder, items: &[SyncItem]) -> CodecResult<()> {
    enc.write_len(items.len())?;
    for item in items {
        item.write(enc)?;
    }
    Ok(())
}

fn read_items(dec: &mut BinaryDecoder<'_>) -> CodecResult<Vec<SyncItem>> {
    let count = dec.read_count()?;
    let mut items = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        items.push(SyncItem::read(dec)?);
    }
    Ok(items)
}

fn read_session_id(dec: &mut BinaryDecoder<'_>) -> CodecResult<Uuid> {
    let id = dec.read_uuid()?;
    if id.is_nil() {
        return Err(CodecError::invalid_structure("session id is nil"));
    }
    Ok(id)
}

impl BinaryMessage for Anchor {
    const TYPE_CODE: u8 = 1;

    fn write_body(&self, enc: &mut BinaryEncoder) -> CodecResult<()> {
        self.write(enc);
        Ok(())
    }

    fn read_body(dec: &mut BinaryDecoder<'_>) -> CodecResult<Self> {
        Anchor::read(dec)
    }
}

impl BinaryMessage for ChangeSet {
    const TYPE_CODE: u8 = 2;

    fn write_body(&self, enc: &mut BinaryEncoder) -> CodecResult<()> {
        self.source_anchor.write(enc);
        self.target_anchor.write(enc);
        write_items(enc, &self.items)
    }

    fn read_body(dec: &mut BinaryDecoder<'_>) -> CodecResult<Self> {
        let source_anchor = Anchor::read(dec)?;
        let target_anchor = Anchor::read(dec)?;
        let items = read_items(dec)?;
        Ok(ChangeSet::new(source_anchor, target_anchor, items))
    }
}

impl BinaryMessage for BulkUploadChunk {
    const TYPE_CODE: u8 = 3;

    fn write_body(&self, enc: &mut BinaryEncoder) -> CodecResult<()> {
        enc.write_uuid(&self.session_id);
        enc.write_u32(self.chunk_index);
        write_items(enc, &self.items)
    }

    fn read_body(dec: &mut BinaryDecoder<'_>) -> CodecResult<Self> {
        Ok(Self {
            session_id: read_session_id(dec)?,
            chunk_index: dec.read_u32()?,
            items: read_items(dec)?,
        })
    }
}

impl BinaryMessage for BulkDownloadChunk {
    const TYPE_CODE: u8 = 4;

    fn write_body(&self, enc: &mut BinaryEncoder) -> CodecResult<()> {
        enc.write_uuid(&self.session_id);
        enc.write_u64(self.skip);
        write_items(enc, &self.items)
    }

    fn read_body(dec: &mut BinaryDecoder<'_>) -> CodecResult<Self> {
        Ok(Self {
            session_id: read_session_id(dec)?,
            skip: dec.read_u64()?,
            items: read_items(dec)?,
        })
    }
}
