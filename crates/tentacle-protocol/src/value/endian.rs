use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValueError;

/// Byte order of a multi-byte value on the wire.
///
/// The two swap variants cover devices that transmit values as a sequence
/// of 16-bit registers. For `0x11223344`:
///
/// | Order | Bytes |
/// |---|---|
/// | `BigEndian` | `11 22 33 44` |
/// | `LittleEndian` | `44 33 22 11` |
/// | `BigEndianSwap` | `22 11 44 33` |
/// | `LittleEndianSwap` | `33 44 11 22` |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ByteOrder {
    BigEndian,
    BigEndianSwap,
    #[default]
    LittleEndian,
    LittleEndianSwap,
}

impl ByteOrder {
    pub const ALL: [ByteOrder; 4] = [
        ByteOrder::BigEndian,
        ByteOrder::BigEndianSwap,
        ByteOrder::LittleEndian,
        ByteOrder::LittleEndianSwap,
    ];

    /// Rearranges big-endian bytes into this order.
    ///
    /// Every permutation here is its own inverse, so the same call also turns
    /// bytes in this order back into big-endian.
    fn reorder(self, buf: &mut [u8]) {
        match self {
            ByteOrder::BigEndian => {}
            ByteOrder::LittleEndian => buf.reverse(),
            ByteOrder::BigEndianSwap => swap_pairs(buf),
            ByteOrder::LittleEndianSwap => {
                buf.reverse();
                swap_pairs(buf);
            }
        }
    }

    /// Encode a scalar.
    pub fn convert<T: Scalar>(self, value: T) -> Vec<u8> {
        let mut buf = vec![0u8; T::WIDTH];
        value.write_be(&mut buf);
        self.reorder(&mut buf);
        buf
    }

    /// Decode a scalar from the first `T::WIDTH` bytes.
    ///
    /// # Errors
    /// Returns `ValueError::Length` if fewer bytes are available.
    pub fn parse<T: Scalar>(self, bytes: &[u8]) -> Result<T, ValueError> {
        if bytes.len() < T::WIDTH {
            return Err(ValueError::Length {
                type_name: T::NAME,
                expected: T::WIDTH,
                actual: bytes.len(),
            });
        }
        let mut buf = bytes[..T::WIDTH].to_vec();
        self.reorder(&mut buf);
        Ok(T::read_be(&buf))
    }

    /// Parse a decimal string and encode it.
    ///
    /// # Errors
    /// Returns `ValueError::Parse` for malformed or out-of-range input.
    pub fn convert_str<T: Scalar>(self, input: &str) -> Result<Vec<u8>, ValueError> {
        Ok(self.convert(T::parse_str(input)?))
    }

    /// Encode text as one 32-bit code point per character.
    pub fn convert_text(self, text: &str) -> Vec<u8> {
        text.chars()
            .flat_map(|c| self.convert(c as u32))
            .collect()
    }

    /// Decode text written by [`ByteOrder::convert_text`].
    ///
    /// Trailing bytes that do not form a whole code point are ignored.
    pub fn parse_text(self, bytes: &[u8]) -> Result<String, ValueError> {
        bytes
            .chunks_exact(4)
            .map(|chunk| {
                let code = self.parse::<u32>(chunk)?;
                char::from_u32(code).ok_or(ValueError::InvalidCodePoint(code))
            })
            .collect()
    }
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ByteOrder::BigEndian => write!(f, "BigEndian"),
            ByteOrder::BigEndianSwap => write!(f, "BigEndianSwap"),
            ByteOrder::LittleEndian => write!(f, "LittleEndian"),
            ByteOrder::LittleEndianSwap => write!(f, "LittleEndianSwap"),
        }
    }
}

fn swap_pairs(buf: &mut [u8]) {
    for pair in buf.chunks_exact_mut(2) {
        pair.swap(0, 1);
    }
}

/// Fixed-width value the codec can move through a [`ByteOrder`].
pub trait Scalar: Copy + PartialEq + fmt::Debug + fmt::Display {
    /// Width in bytes.
    const WIDTH: usize;
    /// Type name used in error messages.
    const NAME: &'static str;

    /// Write the big-endian representation into `out` (exactly `WIDTH` bytes).
    fn write_be(self, out: &mut [u8]);
    /// Read from big-endian bytes (exactly `WIDTH` bytes).
    fn read_be(bytes: &[u8]) -> Self;
    /// Parse from a decimal string with range checking.
    fn parse_str(input: &str) -> Result<Self, ValueError>;
    /// Numeric view used by arithmetic post-processing.
    fn to_f64(self) -> f64;
}

macro_rules! impl_int_scalar {
    ($($ty:ty => $name:literal),* $(,)?) => {$(
        impl Scalar for $ty {
            const WIDTH: usize = std::mem::size_of::<$ty>();
            const NAME: &'static str = $name;

            fn write_be(self, out: &mut [u8]) {
                out.copy_from_slice(&self.to_be_bytes());
            }

            fn read_be(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(bytes);
                <$ty>::from_be_bytes(raw)
            }

            fn parse_str(input: &str) -> Result<Self, ValueError> {
                input
                    .parse::<$ty>()
                    .map_err(|e| ValueError::parse($name, input, e))
            }

            fn to_f64(self) -> f64 {
                self as f64
            }
        }
    )*};
}

impl_int_scalar! {
    i8 => "int8",
    i16 => "int16",
    i32 => "int32",
    i64 => "int64",
    u8 => "uint8",
    u16 => "uint16",
    u32 => "uint32",
    u64 => "uint64",
}

macro_rules! impl_float_scalar {
    ($($ty:ty => $name:literal),* $(,)?) => {$(
        impl Scalar for $ty {
            const WIDTH: usize = std::mem::size_of::<$ty>();
            const NAME: &'static str = $name;

            fn write_be(self, out: &mut [u8]) {
                out.copy_from_slice(&self.to_be_bytes());
            }

            fn read_be(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(bytes);
                <$ty>::from_be_bytes(raw)
            }

            fn parse_str(input: &str) -> Result<Self, ValueError> {
                let value = input
                    .parse::<$ty>()
                    .map_err(|e| ValueError::parse($name, input, e))?;
                // Rust saturates to infinity where a range check is wanted.
                if value.is_infinite() && !input.to_ascii_lowercase().contains("inf") {
                    return Err(ValueError::parse($name, input, "value out of range"));
                }
                Ok(value)
            }

            fn to_f64(self) -> f64 {
                self as f64
            }
        }
    )*};
}

impl_float_scalar! {
    f32 => "float32",
    f64 => "float64",
}

impl Scalar for bool {
    const WIDTH: usize = 1;
    const NAME: &'static str = "boolean";

    fn write_be(self, out: &mut [u8]) {
        out[0] = u8::from(self);
    }

    fn read_be(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }

    fn parse_str(input: &str) -> Result<Self, ValueError> {
        match input {
            "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
            "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
            _ => Err(ValueError::parse("boolean", input, "invalid syntax")),
        }
    }

    fn to_f64(self) -> f64 {
        if self { 1.0 } else { 0.0 }
    }
}
