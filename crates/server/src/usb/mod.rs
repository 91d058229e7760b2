//! USB subsystem
//!
//! Owns the one bridged device for the lifetime of the process and executes
//! control transfers against it. Transfers are synchronous rusb calls, so
//! they run on a dedicated worker thread and connection handlers reach them
//! through the `common::channel` bridge; the single-threaded worker is what
//! keeps one command's transfers from interleaving with another's.

pub mod device;
pub mod transfers;
pub mod worker;

// Re-export public types
pub use device::UsbDevice;
pub use worker::{UsbWorkerThread, spawn_usb_worker};
