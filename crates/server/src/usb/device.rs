//! USB device abstraction
//!
//! Wraps the rusb handle for the one transmitter module the bridge relays
//! to. The device is opened once at startup and the handle lives for the
//! process lifetime; it is shared across all connections through the worker
//! thread and never closed per connection.

use rusb::{Context, DeviceHandle, UsbContext};
use tracing::debug;

/// The bridged USB device, opened by vendor/product ID
pub struct UsbDevice {
    handle: DeviceHandle<Context>,
    vendor_id: u16,
    product_id: u16,
}

impl UsbDevice {
    /// Open the device with the given vendor and product ID
    ///
    /// Fails with `rusb::Error::NoDevice` when no matching device is
    /// attached. A failure here is fatal to the whole service: the bridge
    /// has nothing to relay to.
    pub fn open(vendor_id: u16, product_id: u16) -> Result<Self, rusb::Error> {
        let context = Context::new()?;
        let handle = context
            .open_device_with_vid_pid(vendor_id, product_id)
            .ok_or(rusb::Error::NoDevice)?;

        debug!("Opened USB device {:04x}:{:04x}", vendor_id, product_id);

        Ok(Self {
            handle,
            vendor_id,
            product_id,
        })
    }

    /// The underlying rusb handle
    pub fn handle(&self) -> &DeviceHandle<Context> {
        &self.handle
    }

    /// Vendor ID the device was opened with
    pub fn vendor_id(&self) -> u16 {
        self.vendor_id
    }

    /// Product ID the device was opened with
    pub fn product_id(&self) -> u16 {
        self.product_id
    }
}
