//! Wire frames exchanged between the hub and adaptors.
//!
//! Every socket connection carries exactly one logical RPC stream. The
//! dialing side opens it with an [`Frame::Open`] preface naming the service,
//! then both sides exchange frames of that service until one of them
//! half-closes its write side.
//!
//! # Wire Format
//!
//! ```text
//! +----------------+--------+----------------------+
//! | length: u32 BE | kind   | body (length - 1)    |
//! +----------------+--------+----------------------+
//! ```
//!
//! Body fields are encoded back to back:
//! - strings: `u16` BE length followed by UTF-8 bytes
//! - blobs: `u32` BE length followed by raw bytes
//!
//! # Services
//!
//! | Service | Dialer sends | Listener replies |
//! |---|---|---|
//! | Registration | `Register` | `Void` or `Status` |
//! | KeepAlive | `Void` (repeated) | nothing |
//! | Connect | `ConnectRequest` (repeated) | `ConnectResponse` (repeated) |

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;
use tentacle_core::AdaptorIdentity;

use crate::error::{ProtocolError, Result};

const KIND_OPEN: u8 = 0x01;
const KIND_REGISTER: u8 = 0x02;
const KIND_VOID: u8 = 0x03;
const KIND_STATUS: u8 = 0x04;
const KIND_CONNECT_REQUEST: u8 = 0x05;
const KIND_CONNECT_RESPONSE: u8 = 0x06;

/// RPC service selected by the open preface of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Service {
    Registration = 0x01,
    KeepAlive = 0x02,
    Connect = 0x03,
}

impl Service {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(Service::Registration),
            0x02 => Ok(Service::KeepAlive),
            0x03 => Ok(Service::Connect),
            other => Err(ProtocolError::UnknownService(other)),
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Service::Registration => write!(f, "Registration"),
            Service::KeepAlive => write!(f, "KeepAlive"),
            Service::Connect => write!(f, "Connect"),
        }
    }
}

/// Outcome code carried by a [`Status`] frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StatusCode {
    InvalidArgument = 3,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
}

impl StatusCode {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            3 => Ok(StatusCode::InvalidArgument),
            12 => Ok(StatusCode::Unimplemented),
            13 => Ok(StatusCode::Internal),
            14 => Ok(StatusCode::Unavailable),
            other => Err(ProtocolError::UnknownStatusCode(other)),
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StatusCode::InvalidArgument => write!(f, "InvalidArgument"),
            StatusCode::Unimplemented => write!(f, "Unimplemented"),
            StatusCode::Internal => write!(f, "Internal"),
            StatusCode::Unavailable => write!(f, "Unavailable"),
        }
    }
}

/// Error reply of a request/response exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub code: StatusCode,
    pub message: String,
}

impl Status {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Desired state pushed from the hub down a Connect stream.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectRequest {
    /// Adaptor parameters of the link, raw JSON.
    pub parameters: Bytes,
    /// Device object carrying the desired spec, raw JSON.
    pub device: Bytes,
}

/// Observed state pushed from an adaptor up a Connect stream.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectResponse {
    /// Device object carrying the observed status, raw JSON. Empty on error.
    pub device: Bytes,
    /// Failure reported by the adaptor.
    pub error: Option<String>,
}

impl ConnectResponse {
    pub fn device(device: impl Into<Bytes>) -> Self {
        Self {
            device: device.into(),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            device: Bytes::new(),
            error: Some(message.into()),
        }
    }
}

/// One frame on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Stream preface selecting the service.
    Open(Service),
    /// Registration request from an adaptor.
    Register(AdaptorIdentity),
    /// Empty message: registration ack and keepalive heartbeat.
    Void,
    /// Error reply.
    Status(Status),
    ConnectRequest(ConnectRequest),
    ConnectResponse(ConnectResponse),
}

impl Frame {
    /// Kind byte written after the length header.
    #[must_use]
    pub fn kind(&self) -> u8 {
        match self {
            Frame::Open(_) => KIND_OPEN,
            Frame::Register(_) => KIND_REGISTER,
            Frame::Void => KIND_VOID,
            Frame::Status(_) => KIND_STATUS,
            Frame::ConnectRequest(_) => KIND_CONNECT_REQUEST,
            Frame::ConnectResponse(_) => KIND_CONNECT_RESPONSE,
        }
    }

    /// Short name for log fields.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Frame::Open(_) => "Open",
            Frame::Register(_) => "Register",
            Frame::Void => "Void",
            Frame::Status(_) => "Status",
            Frame::ConnectRequest(_) => "ConnectRequest",
            Frame::ConnectResponse(_) => "ConnectResponse",
        }
    }

    /// Append the body of this frame, without header or kind byte.
    pub fn encode_body(&self, dst: &mut BytesMut) -> Result<()> {
        match self {
            Frame::Open(service) => dst.put_u8(*service as u8),
            Frame::Register(identity) => {
                put_str(dst, "name", identity.name())?;
                put_str(dst, "version", identity.version())?;
                put_str(dst, "endpoint", identity.endpoint())?;
            }
            Frame::Void => {}
            Frame::Status(status) => {
                dst.put_u8(status.code as u8);
                put_str(dst, "message", &status.message)?;
            }
            Frame::ConnectRequest(request) => {
                put_blob(dst, "parameters", &request.parameters)?;
                put_blob(dst, "device", &request.device)?;
            }
            Frame::ConnectResponse(response) => {
                put_blob(dst, "device", &response.device)?;
                match &response.error {
                    Some(message) => {
                        dst.put_u8(1);
                        put_str(dst, "error", message)?;
                    }
                    None => dst.put_u8(0),
                }
            }
        }
        Ok(())
    }

    /// Decode a frame from its kind byte and body.
    pub fn decode(kind: u8, mut body: Bytes) -> Result<Frame> {
        let frame = match kind {
            KIND_OPEN => Frame::Open(Service::from_u8(get_u8(&mut body, "service")?)?),
            KIND_REGISTER => {
                let name = get_str(&mut body, "name")?;
                let version = get_str(&mut body, "version")?;
                let endpoint = get_str(&mut body, "endpoint")?;
                Frame::Register(AdaptorIdentity::unchecked(name, version, endpoint))
            }
            KIND_VOID => Frame::Void,
            KIND_STATUS => {
                let code = StatusCode::from_u8(get_u8(&mut body, "code")?)?;
                let message = get_str(&mut body, "message")?;
                Frame::Status(Status { code, message })
            }
            KIND_CONNECT_REQUEST => Frame::ConnectRequest(ConnectRequest {
                parameters: get_blob(&mut body, "parameters")?,
                device: get_blob(&mut body, "device")?,
            }),
            KIND_CONNECT_RESPONSE => {
                let device = get_blob(&mut body, "device")?;
                let error = match get_u8(&mut body, "error flag")? {
                    0 => None,
                    _ => Some(get_str(&mut body, "error")?),
                };
                Frame::ConnectResponse(ConnectResponse { device, error })
            }
            other => return Err(ProtocolError::UnknownKind(other)),
        };
        Ok(frame)
    }
}

fn put_str(dst: &mut BytesMut, field: &'static str, value: &str) -> Result<()> {
    let len = u16::try_from(value.len()).map_err(|_| ProtocolError::FieldTooLong {
        field,
        len: value.len(),
    })?;
    dst.put_u16(len);
    dst.put_slice(value.as_bytes());
    Ok(())
}

fn put_blob(dst: &mut BytesMut, field: &'static str, value: &[u8]) -> Result<()> {
    let len = u32::try_from(value.len()).map_err(|_| ProtocolError::FieldTooLong {
        field,
        len: value.len(),
    })?;
    dst.put_u32(len);
    dst.put_slice(value);
    Ok(())
}

fn get_u8(src: &mut Bytes, field: &'static str) -> Result<u8> {
    if src.remaining() < 1 {
        return Err(ProtocolError::truncated(field));
    }
    Ok(src.get_u8())
}

fn get_str(src: &mut Bytes, field: &'static str) -> Result<String> {
    if src.remaining() < 2 {
        return Err(ProtocolError::truncated(field));
    }
    let len = src.get_u16() as usize;
    if src.remaining() < len {
        return Err(ProtocolError::truncated(field));
    }
    let raw = src.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|_| ProtocolError::InvalidUtf8 { field })
}

fn get_blob(src: &mut Bytes, field: &'static str) -> Result<Bytes> {
    if src.remaining() < 4 {
        return Err(ProtocolError::truncated(field));
    }
    let len = src.get_u32() as usize;
    if src.remaining() < len {
        return Err(ProtocolError::truncated(field));
    }
    Ok(src.split_to(len))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(frame: Frame) -> Frame {
        let mut body = BytesMut::new();
        frame.encode_body(&mut body).unwrap();
        Frame::decode(frame.kind(), body.freeze()).unwrap()
    }

    #[test]
    fn test_register_roundtrip() {
        let identity = AdaptorIdentity::new("dummy", "v1alpha1", "dummy.socket").unwrap();
        let decoded = roundtrip(Frame::Register(identity.clone()));
        assert_eq!(decoded, Frame::Register(identity));
    }

    #[test]
    fn test_connect_response_with_error() {
        let decoded = roundtrip(Frame::ConnectResponse(ConnectResponse::error(
            "failed to configure device",
        )));
        match decoded {
            Frame::ConnectResponse(response) => {
                assert!(response.device.is_empty());
                assert_eq!(response.error.as_deref(), Some("failed to configure device"));
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn test_register_keeps_unvalidated_identity() {
        // the decoder must not judge the request, that is the hub's job
        let identity = AdaptorIdentity::unchecked("-bad-", "v9", "nope");
        let decoded = roundtrip(Frame::Register(identity.clone()));
        assert_eq!(decoded, Frame::Register(identity));
    }

    #[test]
    fn test_void_has_empty_body() {
        let mut body = BytesMut::new();
        Frame::Void.encode_body(&mut body).unwrap();
        assert!(body.is_empty());
    }

    #[test]
    fn test_truncated_blob() {
        let mut body = BytesMut::new();
        body.put_u32(10);
        body.put_slice(b"abc");
        let error = Frame::decode(KIND_CONNECT_REQUEST, body.freeze()).unwrap_err();
        assert!(matches!(
            error,
            ProtocolError::Truncated {
                field: "parameters"
            }
        ));
    }

    #[test]
    fn test_unknown_kind() {
        let error = Frame::decode(0x7F, Bytes::new()).unwrap_err();
        assert!(matches!(error, ProtocolError::UnknownKind(0x7F)));
    }

    #[test]
    fn test_unknown_service() {
        let error = Frame::decode(KIND_OPEN, Bytes::from_static(&[0x09])).unwrap_err();
        assert!(matches!(error, ProtocolError::UnknownService(0x09)));
    }

    #[test]
    fn test_status_display() {
        let status = Status::new(StatusCode::InvalidArgument, "bad name");
        assert_eq!(status.to_string(), "InvalidArgument: bad name");
    }
}
