//! USB control transfer execution
//!
//! The firmware accepts commands and produces responses through class
//! control transfers addressed to an endpoint recipient, request code 0x03
//! (`MEM_RQ`), wValue and wIndex zero. These helpers issue the two transfer
//! directions and map rusb errors to the bridge's `TransferError`.

use common::TransferError;
use protocol::MAX_PAYLOAD_LENGTH;
use rusb::{Context, DeviceHandle};
use std::time::Duration;
use tracing::debug;

/// bmRequestType for host-to-device command transfers: class request to an
/// endpoint recipient, direction OUT
pub const CTRL_OUT: u8 = 0x22;

/// bmRequestType for device-to-host response transfers: class request to an
/// endpoint recipient, direction IN
pub const CTRL_IN: u8 = 0xA2;

/// bRequest code understood by the firmware message parser
pub const MEM_RQ: u8 = 0x03;

/// Send command bytes to the device with one OUT control transfer
///
/// Returns the number of bytes the device accepted.
pub fn write_command(
    handle: &DeviceHandle<Context>,
    data: &[u8],
    timeout: Duration,
) -> Result<usize, TransferError> {
    debug!("OUT control transfer, {} bytes", data.len());
    handle
        .write_control(CTRL_OUT, MEM_RQ, 0, 0, data, timeout)
        .map_err(map_rusb_error)
}

/// Read a response from the device with one IN control transfer
///
/// Reads up to the payload buffer capacity and returns only the bytes the
/// device actually produced.
pub fn read_response(
    handle: &DeviceHandle<Context>,
    timeout: Duration,
) -> Result<Vec<u8>, TransferError> {
    let mut buffer = vec![0u8; MAX_PAYLOAD_LENGTH];
    let len = handle
        .read_control(CTRL_IN, MEM_RQ, 0, 0, &mut buffer, timeout)
        .map_err(map_rusb_error)?;
    debug!("IN control transfer returned {} bytes", len);
    buffer.truncate(len);
    Ok(buffer)
}

/// Map rusb::Error to the bridge's TransferError
pub fn map_rusb_error(err: rusb::Error) -> TransferError {
    match err {
        rusb::Error::Timeout => TransferError::Timeout,
        rusb::Error::Pipe => TransferError::Pipe,
        rusb::Error::NoDevice => TransferError::NoDevice,
        rusb::Error::Busy => TransferError::Busy,
        rusb::Error::Overflow => TransferError::Overflow,
        rusb::Error::Io => TransferError::Io,
        rusb::Error::InvalidParam => TransferError::InvalidParam,
        rusb::Error::Access => TransferError::Access,
        _ => TransferError::Other(err.to_string()),
    }
}
