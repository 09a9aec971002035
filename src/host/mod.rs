//! Host drivers standing in for the appliance hardware
//!
//! Thin std/tokio wrappers implementing the peripheral traits so the reader
//! runs as a desktop process.

pub mod actuators;
pub mod console;
pub mod network;
pub mod reader;
pub mod storage;
