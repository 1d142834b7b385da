//! Error types for wire frames and value conversion.

use thiserror::Error;

/// Result type alias for frame and envelope operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while encoding or decoding frames and device objects.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame length header exceeds the configured limit.
    #[error("Frame too large: {size} bytes (max {max_size})")]
    FrameTooLarge { size: usize, max_size: usize },

    /// Frame header announced zero bytes, so there is no kind byte.
    #[error("Empty frame")]
    EmptyFrame,

    /// Kind byte does not name a known frame.
    #[error("Unknown frame kind: 0x{0:02X}")]
    UnknownKind(u8),

    /// Service byte of an open preface is unknown.
    #[error("Unknown service: 0x{0:02X}")]
    UnknownService(u8),

    /// Status frame carries an unknown code.
    #[error("Unknown status code: {0}")]
    UnknownStatusCode(u8),

    /// Body ended before a field could be read completely.
    #[error("Truncated frame while reading {field}")]
    Truncated { field: &'static str },

    /// A string field is not valid UTF-8.
    #[error("Invalid UTF-8 in {field}")]
    InvalidUtf8 { field: &'static str },

    /// String field is longer than its length prefix can express.
    #[error("Field {field} too long: {len} bytes")]
    FieldTooLong { field: &'static str, len: usize },

    /// Device object is not valid JSON or does not fit the expected shape.
    #[error("Invalid device object: {0}")]
    InvalidObject(#[from] serde_json::Error),

    /// Low-level I/O error surfaced through the codec.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    pub(crate) fn truncated(field: &'static str) -> Self {
        Self::Truncated { field }
    }
}

/// Errors raised by the binary value codec.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    /// Input shorter than the byte width of the requested type.
    #[error("insufficient bytes for {type_name}: need {expected}, got {actual}")]
    Length {
        type_name: &'static str,
        expected: usize,
        actual: usize,
    },

    /// String could not be parsed into the requested type, or is out of range.
    #[error("cannot parse {input:?} as {type_name}: {reason}")]
    Parse {
        type_name: &'static str,
        input: String,
        reason: String,
    },

    /// Decoded text contains a value that is not a Unicode scalar.
    #[error("invalid code point 0x{0:08X}")]
    InvalidCodePoint(u32),

    /// Hex, binary or base64 text is malformed.
    #[error("invalid {encoding} string: {reason}")]
    Encoding {
        encoding: &'static str,
        reason: String,
    },

    /// Arithmetic operand is not a number.
    #[error("cannot apply {operation}: operand {value:?} is not a number")]
    Operand { operation: String, value: String },
}

impl ValueError {
    pub(crate) fn parse(type_name: &'static str, input: &str, reason: impl ToString) -> Self {
        Self::Parse {
            type_name,
            input: input.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn encoding(encoding: &'static str, reason: impl ToString) -> Self {
        Self::Encoding {
            encoding,
            reason: reason.to_string(),
        }
    }
}
