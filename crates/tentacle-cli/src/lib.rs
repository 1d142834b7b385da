//! Shared plumbing of the tentacle binaries.
//!
//! - [`logging`]: subscriber setup honouring `RUST_LOG`
//! - [`env`]: overrides read from the environment and the shutdown signal

pub mod env;
pub mod logging;

pub use env::{SOCKET_DIR_ENV, shutdown_signal, socket_dir};
pub use logging::init_tracing;
