//! # rowsync codec
//!
//! Typed column values and the two encodings used on the wire.
//!
//! A [`TypedValue`] carries an explicit type tag so that a value read from
//! one store is written to the other with the same kind, whatever the
//! receiving database's own type affinity would have guessed.
//!
//! - **Binary**: [`BinaryEncoder`] / [`BinaryDecoder`], little-endian with
//!   `u32` length prefixes and a one-byte kind code before every value.
//! - **Text**: [`to_json`] / [`from_json`], objects of the form
//!   `{"type": "...", "value": ...}`. `TypedValue` implements serde through
//!   this form.
//!
//! ## Usage
//!
//! ```
//! use rowsync_codec::{from_json, to_json, value_from_bytes, value_to_bytes, TypedValue};
//!
//! let value = TypedValue::Int64(42);
//!
//! let bytes = value_to_bytes(&value).unwrap();
//! assert_eq!(value_from_bytes(&bytes).unwrap(), value);
//!
//! let json = to_json(&value);
//! assert_eq!(from_json(&json).unwrap(), value);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decimal;
mod decoder;
mod encoder;
mod error;
pub mod text;
mod value;

pub use decimal::Decimal;
pub use decoder::{value_from_bytes, BinaryDecoder, MAX_BYTES_LENGTH, MAX_CONTAINER_ELEMENTS};
pub use encoder::{value_to_bytes, BinaryEncoder};
pub use error::{CodecError, CodecResult};
pub use text::{columns_from_json, columns_to_json, from_json, to_json};
pub use value::{TypedValue, ValueKind};
