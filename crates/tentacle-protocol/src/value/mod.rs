//! Binary value codec.
//!
//! Converts between device wire bytes and typed values under one of four
//! byte orders, then lets callers layer arithmetic post-processing on top.
//!
//! ```
//! use tentacle_protocol::value::{ByteOrder, ValueType};
//!
//! let bytes = ByteOrder::LittleEndian.convert_str::<u16>("513").unwrap();
//! assert_eq!(bytes, vec![0x01, 0x02]);
//!
//! let decoded = ValueType::Uint16.decode(ByteOrder::LittleEndian, &bytes).unwrap();
//! assert_eq!(decoded.text, "513");
//! ```

mod arithmetic;
mod endian;
mod kind;

pub use arithmetic::{ArithmeticKind, ArithmeticOperation, DEFAULT_PRECISION, apply_operations};
pub use endian::{ByteOrder, Scalar};
pub use kind::{DecodedValue, ValueType, decode_binary_string, encode_binary_string};
