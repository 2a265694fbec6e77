//! Length-prefixed binary encoder.

use crate::error::{CodecError, CodecResult};
use crate::value::TypedValue;
use uuid::Uuid;

/// Encode a single value to bytes.
pub fn value_to_bytes(value: &TypedValue) -> CodecResult<Vec<u8>> {
    let mut encoder = BinaryEncoder::new();
    encoder.write_value(value)?;
    Ok(encoder.into_bytes())
}

/// A little-endian, length-prefixed binary encoder.
///
/// Integers are fixed width. Strings, byte arrays and collections are
/// preceded by a `u32` length. Values are preceded by their
/// [`ValueKind`](crate::ValueKind) code.
#[derive(Debug, Default)]
pub struct BinaryEncoder {
    buffer: Vec<u8>,
}

impl BinaryEncoder {
    /// Create a new encoder.
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Create a new encoder with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Consume this encoder and return the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Get a reference to the encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Write a single byte.
    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Write a boolean as one byte.
    pub fn write_bool(&mut self, value: bool) {
        self.buffer.push(u8::from(value));
    }

    /// Write a `u32`.
    pub fn write_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a `u64`.
    pub fn write_u64(&mut self, value: u64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Write an `i32`.
    pub fn write_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Write an `i64`.
    pub fn write_i64(&mut self, value: i64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a length prefix for a collection or byte run.
    pub fn write_len(&mut self, len: usize) -> CodecResult<()> {
        let len = u32::try_from(len)
            .map_err(|_| CodecError::encoding_failed(format!("length {} overflows u32", len)))?;
        self.write_u32(len);
        Ok(())
    }

    /// Write a length-prefixed byte run.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> CodecResult<()> {
        self.write_len(bytes.len())?;
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    /// Write a length-prefixed UTF-8 string.
    pub fn write_str(&mut self, s: &str) -> CodecResult<()> {
        self.write_bytes(s.as_bytes())
    }

    /// Write a UUID as 16 raw bytes.
    pub fn write_uuid(&mut self, id: &Uuid) {
        self.buffer.extend_from_slice(id.as_bytes());
    }

    /// Write a tagged value.
    pub fn write_value(&mut self, value: &TypedValue) -> CodecResult<()> {
        self.write_u8(value.kind().to_code());
        match value {
            TypedValue::Null => {}
            TypedValue::String(s) => self.write_str(s)?,
            TypedValue::Int32(n) => self.write_i32(*n),
            TypedValue::Int64(n) => self.write_i64(*n),
            TypedValue::Float(n) => self.buffer.extend_from_slice(&n.to_bits().to_le_bytes()),
            TypedValue::Double(n) => self.buffer.extend_from_slice(&n.to_bits().to_le_bytes()),
            TypedValue::DateTime(t) => {
                self.write_i64(t.timestamp());
                self.write_u32(t.timestamp_subsec_nanos());
            }
            TypedValue::Boolean(b) => self.write_bool(*b),
            TypedValue::ByteArray(b) => self.write_bytes(b)?,
            TypedValue::Guid(g) => self.write_uuid(g),
            TypedValue::Decimal(d) => {
                self.buffer.extend_from_slice(&d.mantissa().to_le_bytes());
                self.write_u8(d.scale());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_of_scalars() {
        assert_eq!(value_to_bytes(&TypedValue::Null).unwrap(), vec![0]);
        assert_eq!(
            value_to_bytes(&TypedValue::Int32(1)).unwrap(),
            vec![2, 1, 0, 0, 0]
        );
        assert_eq!(
            value_to_bytes(&TypedValue::Boolean(true)).unwrap(),
            vec![7, 1]
        );
    }

    #[test]
    fn strings_are_length_prefixed() {
        let bytes = value_to_bytes(&TypedValue::String("hi".into())).unwrap();
        assert_eq!(bytes, vec![1, 2, 0, 0, 0, b'h', b'i']);
    }

    #[test]
    fn guid_is_sixteen_raw_bytes() {
        let id = Uuid::new_v4();
        let bytes = value_to_bytes(&TypedValue::Guid(id)).unwrap();
        assert_eq!(bytes.len(), 17);
        assert_eq!(&bytes[1..], id.as_bytes());
    }
}
