//! Common utilities for wisa-bridge
//!
//! This crate provides the plumbing shared across the bridge: error types,
//! logging setup, and the async channel bridge between Tokio connection
//! handlers and the dedicated USB worker thread.

pub mod channel;
pub mod error;
pub mod logging;

pub use channel::{ReadOutcome, UsbBridge, UsbCommand, UsbWorker, create_usb_bridge};
pub use error::{Error, Result, TransferError};
pub use logging::setup_logging;
