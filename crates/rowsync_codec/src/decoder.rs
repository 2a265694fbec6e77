//! Length-prefixed binary decoder.

use crate::decimal::Decimal;
use crate::error::{CodecError, CodecResult};
use crate::value::{TypedValue, ValueKind};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Decode a single value from bytes, rejecting trailing input.
pub fn value_from_bytes(bytes: &[u8]) -> CodecResult<TypedValue> {
    let mut decoder = BinaryDecoder::new(bytes);
    let value = decoder.read_value()?;
    decoder.finish()?;
    Ok(value)
}

/// Decoder for the format written by [`BinaryEncoder`](crate::BinaryEncoder).
pub struct BinaryDecoder<'a> {
    data: &'a [u8],
    pos: usize,
}

/// Maximum allowed element count for collections.
/// Input comes from the network, so declared counts are not trusted.
pub const MAX_CONTAINER_ELEMENTS: u64 = 16 * 1024 * 1024;

/// Maximum allowed byte/string length.
pub const MAX_BYTES_LENGTH: u64 = 256 * 1024 * 1024;

impl<'a> BinaryDecoder<'a> {
    /// Create a new decoder for the given bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Check if all bytes have been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Get remaining bytes.
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.pos..]
    }

    /// Fails if any input is left unread.
    pub fn finish(&self) -> CodecResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(CodecError::TrailingBytes {
                remaining: self.data.len() - self.pos,
            })
        }
    }

    /// Read a single byte.
    #[inline]
    pub fn read_u8(&mut self) -> CodecResult<u8> {
        let byte = *self.data.get(self.pos).ok_or(CodecError::UnexpectedEof)?;
        self.pos += 1;
        Ok(byte)
    }

    #[inline]
    fn read_bytes(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(CodecError::UnexpectedEof)?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    /// Read a one-byte boolean. Any byte other than 0 or 1 is rejected.
    pub fn read_bool(&mut self) -> CodecResult<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::invalid_structure(format!(
                "invalid boolean byte {}",
                other
            ))),
        }
    }

    /// Read a `u32`.
    pub fn read_u32(&mut self) -> CodecResult<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    /// Read a `u64`.
    pub fn read_u64(&mut self) -> CodecResult<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    /// Read an `i32`.
    pub fn read_i32(&mut self) -> CodecResult<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    /// Read an `i64`.
    pub fn read_i64(&mut self) -> CodecResult<i64> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    /// Read a collection length prefix.
    pub fn read_count(&mut self) -> CodecResult<usize> {
        let count = u64::from(self.read_u32()?);
        if count > MAX_CONTAINER_ELEMENTS {
            return Err(CodecError::LengthLimitExceeded {
                length: count,
                limit: MAX_CONTAINER_ELEMENTS,
            });
        }
        usize::try_from(count).map_err(|_| CodecError::invalid_structure("count overflows usize"))
    }

    /// Read a length-prefixed byte run.
    pub fn read_byte_run(&mut self) -> CodecResult<&'a [u8]> {
        let len = u64::from(self.read_u32()?);
        if len > MAX_BYTES_LENGTH {
            return Err(CodecError::LengthLimitExceeded {
                length: len,
                limit: MAX_BYTES_LENGTH,
            });
        }
        let len =
            usize::try_from(len).map_err(|_| CodecError::invalid_structure("length overflows usize"))?;
        self.read_bytes(len)
    }

    /// Read a length-prefixed UTF-8 string.
    pub fn read_str(&mut self) -> CodecResult<String> {
        let bytes = self.read_byte_run()?;
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|_| CodecError::InvalidUtf8)
    }

    /// Read a UUID from 16 raw bytes.
    pub fn read_uuid(&mut self) -> CodecResult<Uuid> {
        Ok(Uuid::from_bytes(self.read_array()?))
    }

    /// Read a tagged value.
    pub fn read_value(&mut self) -> CodecResult<TypedValue> {
        let code = self.read_u8()?;
        let kind =
            ValueKind::from_code(code).ok_or_else(|| CodecError::unknown_tag(code.to_string()))?;

        let value = match kind {
            ValueKind::Null => TypedValue::Null,
            ValueKind::String => TypedValue::String(self.read_str()?),
            ValueKind::Int32 => TypedValue::Int32(self.read_i32()?),
            ValueKind::Int64 => TypedValue::Int64(self.read_i64()?),
            ValueKind::Float => TypedValue::Float(f32::from_bits(self.read_u32()?)),
            ValueKind::Double => TypedValue::Double(f64::from_bits(self.read_u64()?)),
            ValueKind::DateTime => {
                let secs = self.read_i64()?;
                let nanos = self.read_u32()?;
                let t: DateTime<Utc> = DateTime::from_timestamp(secs, nanos).ok_or_else(|| {
                    CodecError::invalid_structure(format!("timestamp out of range: {}.{}", secs, nanos))
                })?;
                TypedValue::DateTime(t)
            }
            ValueKind::Boolean => TypedValue::Boolean(self.read_bool()?),
            ValueKind::ByteArray => TypedValue::ByteArray(self.read_byte_run()?.to_vec()),
            ValueKind::Guid => TypedValue::Guid(self.read_uuid()?),
            ValueKind::Decimal => {
                let mantissa = i128::from_le_bytes(self.read_array()?);
                let scale = self.read_u8()?;
                TypedValue::Decimal(Decimal::new(mantissa, scale)?)
            }
        };
        Ok(value)
    }
}
