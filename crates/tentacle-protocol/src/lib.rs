//! Wire protocol between the hub and its adaptors.
//!
//! - [`frame`]: frames and their binary bodies
//! - [`codec`]: `tokio_util` codec for length-prefixed frames
//! - [`object`]: the JSON device object carried by Connect streams
//! - [`value`]: binary value codec used by adaptors to talk to hardware

pub mod codec;
pub mod error;
pub mod frame;
pub mod object;
pub mod value;

pub use codec::{DEFAULT_MAX_FRAME_SIZE, FrameCodec};
pub use error::{ProtocolError, Result, ValueError};
pub use frame::{ConnectRequest, ConnectResponse, Frame, Service, Status, StatusCode};
pub use object::{DeviceObject, ObjectMeta};
