//! Mock peripheral implementations for testing and development.
//!
//! This module provides a simulated peripheral that can be controlled
//! programmatically without requiring physical hardware.

pub mod peripheral;

pub use peripheral::{
    MockConnector, MockPeripheral, MockPeripheralHandle, SubscribeRecord, WriteRecord,
};
