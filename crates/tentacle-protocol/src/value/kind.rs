use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::endian::{ByteOrder, Scalar};
use crate::error::ValueError;

/// Declared type of a device property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    #[serde(rename = "int8")]
    Int8,
    #[serde(rename = "int16")]
    Int16,
    #[serde(rename = "int32", alias = "int")]
    Int32,
    #[serde(rename = "int64")]
    Int64,
    #[serde(rename = "uint8")]
    Uint8,
    #[serde(rename = "uint16")]
    Uint16,
    #[serde(rename = "uint32", alias = "uint")]
    Uint32,
    #[serde(rename = "uint64")]
    Uint64,
    #[serde(rename = "float32", alias = "float")]
    Float32,
    #[serde(rename = "float64", alias = "double")]
    Float64,
    #[serde(rename = "boolean")]
    Boolean,
    #[serde(rename = "string")]
    String,
    #[serde(rename = "hexString")]
    HexString,
    #[serde(rename = "binaryString")]
    BinaryString,
    #[serde(rename = "base64String")]
    Base64String,
}

/// A decoded value: its display text and, for numbers, the numeric view.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedValue {
    pub text: String,
    pub number: Option<f64>,
}

impl DecodedValue {
    fn scalar<T: Scalar>(value: T) -> Self {
        Self {
            text: value.to_string(),
            number: Some(value.to_f64()),
        }
    }

    fn text(text: String) -> Self {
        Self { text, number: None }
    }
}

impl ValueType {
    /// Returns `true` for integer and floating point types.
    #[must_use]
    pub fn is_arithmetic(self) -> bool {
        !matches!(
            self,
            ValueType::Boolean
                | ValueType::String
                | ValueType::HexString
                | ValueType::BinaryString
                | ValueType::Base64String
        )
    }

    /// Encode a configured value string into wire bytes.
    pub fn encode(self, order: ByteOrder, value: &str) -> Result<Vec<u8>, ValueError> {
        match self {
            ValueType::Int8 => order.convert_str::<i8>(value),
            ValueType::Int16 => order.convert_str::<i16>(value),
            ValueType::Int32 => order.convert_str::<i32>(value),
            ValueType::Int64 => order.convert_str::<i64>(value),
            ValueType::Uint8 => order.convert_str::<u8>(value),
            ValueType::Uint16 => order.convert_str::<u16>(value),
            ValueType::Uint32 => order.convert_str::<u32>(value),
            ValueType::Uint64 => order.convert_str::<u64>(value),
            ValueType::Float32 => order.convert_str::<f32>(value),
            ValueType::Float64 => order.convert_str::<f64>(value),
            ValueType::Boolean => order.convert_str::<bool>(value),
            ValueType::String => Ok(order.convert_text(value)),
            ValueType::HexString => hex::decode(value).map_err(|e| ValueError::encoding("hex", e)),
            ValueType::BinaryString => decode_binary_string(value),
            ValueType::Base64String => STANDARD
                .decode(value)
                .map_err(|e| ValueError::encoding("base64", e)),
        }
    }

    /// Decode wire bytes into a value.
    pub fn decode(self, order: ByteOrder, bytes: &[u8]) -> Result<DecodedValue, ValueError> {
        let decoded = match self {
            ValueType::Int8 => DecodedValue::scalar(order.parse::<i8>(bytes)?),
            ValueType::Int16 => DecodedValue::scalar(order.parse::<i16>(bytes)?),
            ValueType::Int32 => DecodedValue::scalar(order.parse::<i32>(bytes)?),
            ValueType::Int64 => DecodedValue::scalar(order.parse::<i64>(bytes)?),
            ValueType::Uint8 => DecodedValue::scalar(order.parse::<u8>(bytes)?),
            ValueType::Uint16 => DecodedValue::scalar(order.parse::<u16>(bytes)?),
            ValueType::Uint32 => DecodedValue::scalar(order.parse::<u32>(bytes)?),
            ValueType::Uint64 => DecodedValue::scalar(order.parse::<u64>(bytes)?),
            ValueType::Float32 => DecodedValue::scalar(order.parse::<f32>(bytes)?),
            ValueType::Float64 => DecodedValue::scalar(order.parse::<f64>(bytes)?),
            ValueType::Boolean => DecodedValue::text(order.parse::<bool>(bytes)?.to_string()),
            ValueType::String => DecodedValue::text(order.parse_text(bytes)?),
            ValueType::HexString => DecodedValue::text(hex::encode(bytes)),
            ValueType::BinaryString => DecodedValue::text(encode_binary_string(bytes)),
            ValueType::Base64String => DecodedValue::text(STANDARD.encode(bytes)),
        };
        Ok(decoded)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ValueType::Int8 => "int8",
            ValueType::Int16 => "int16",
            ValueType::Int32 => "int32",
            ValueType::Int64 => "int64",
            ValueType::Uint8 => "uint8",
            ValueType::Uint16 => "uint16",
            ValueType::Uint32 => "uint32",
            ValueType::Uint64 => "uint64",
            ValueType::Float32 => "float32",
            ValueType::Float64 => "float64",
            ValueType::Boolean => "boolean",
            ValueType::String => "string",
            ValueType::HexString => "hexString",
            ValueType::BinaryString => "binaryString",
            ValueType::Base64String => "base64String",
        };
        f.write_str(name)
    }
}

/// Decode a string of `0`/`1` characters, eight per byte, most significant bit first.
pub fn decode_binary_string(value: &str) -> Result<Vec<u8>, ValueError> {
    if value.len() % 8 != 0 {
        return Err(ValueError::encoding(
            "binary",
            "length must be a multiple of eight",
        ));
    }
    value
        .as_bytes()
        .chunks_exact(8)
        .map(|group| {
            group.iter().try_fold(0u8, |acc, bit| match bit {
                b'0' => Ok(acc << 1),
                b'1' => Ok((acc << 1) | 1),
                other => Err(ValueError::encoding(
                    "binary",
                    format!("unexpected character {:?}", *other as char),
                )),
            })
        })
        .collect()
}

/// Inverse of [`decode_binary_string`].
pub fn encode_binary_string(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:08b}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("\"int\"", ValueType::Int32)]
    #[case("\"uint\"", ValueType::Uint32)]
    #[case("\"float\"", ValueType::Float32)]
    #[case("\"double\"", ValueType::Float64)]
    #[case("\"hexString\"", ValueType::HexString)]
    fn test_type_aliases(#[case] json: &str, #[case] expected: ValueType) {
        let parsed: ValueType = serde_json::from_str(json).unwrap();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_decode_integer_keeps_number() {
        let decoded = ValueType::Int16
            .decode(ByteOrder::BigEndian, &[0xFF, 0x38])
            .unwrap();
        assert_eq!(decoded.text, "-200");
        assert_eq!(decoded.number, Some(-200.0));
    }

    #[test]
    fn test_decode_float_text() {
        let bytes = ByteOrder::LittleEndian.convert(21.5f32);
        let decoded = ValueType::Float32
            .decode(ByteOrder::LittleEndian, &bytes)
            .unwrap();
        assert_eq!(decoded.text, "21.5");
    }

    #[test]
    fn test_boolean_has_no_number() {
        let decoded = ValueType::Boolean
            .decode(ByteOrder::LittleEndian, &[1])
            .unwrap();
        assert_eq!(decoded.text, "true");
        assert_eq!(decoded.number, None);
    }

    #[test]
    fn test_hex_roundtrip() {
        let bytes = ValueType::HexString
            .encode(ByteOrder::default(), "cafe01")
            .unwrap();
        assert_eq!(bytes, vec![0xCA, 0xFE, 0x01]);
        let decoded = ValueType::HexString
            .decode(ByteOrder::default(), &bytes)
            .unwrap();
        assert_eq!(decoded.text, "cafe01");
    }

    #[test]
    fn test_hex_rejects_odd_length() {
        assert!(matches!(
            ValueType::HexString.encode(ByteOrder::default(), "abc"),
            Err(ValueError::Encoding { encoding: "hex", .. })
        ));
    }

    #[test]
    fn test_base64() {
        let bytes = ValueType::Base64String
            .encode(ByteOrder::default(), "aGk=")
            .unwrap();
        assert_eq!(bytes, b"hi");
    }

    #[test]
    fn test_binary_string() {
        assert_eq!(
            decode_binary_string("1100110100000001").unwrap(),
            vec![205, 1]
        );
        assert_eq!(encode_binary_string(&[205, 1]), "1100110100000001");
        assert!(decode_binary_string("1010").is_err());
        assert!(decode_binary_string("1010102a").is_err());
    }

    #[test]
    fn test_arithmetic_classification() {
        assert!(ValueType::Uint64.is_arithmetic());
        assert!(ValueType::Float64.is_arithmetic());
        assert!(!ValueType::Boolean.is_arithmetic());
        assert!(!ValueType::HexString.is_arithmetic());
    }
}
