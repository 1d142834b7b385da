//! Shared vocabulary for the tentacle workspace.
//!
//! Holds the identity types exchanged between the hub and its adaptors,
//! the validation rules applied during registration, and the well-known
//! paths and intervals both sides agree on.

pub mod constants;
pub mod error;
pub mod types;
pub mod validation;

pub use error::{Error, Result};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
