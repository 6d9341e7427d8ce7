//! USB collaborator abstractions
//!
//! The terminal core talks to the operating system through three seams:
//!
//! - [`UsbBackend`]: device enumeration, opening and event pumping
//! - [`UsbConnection`]: an open device (interface claims and transfers)
//! - [`PermissionBroker`]: asynchronous access grants
//!
//! The terminal crate provides libusb-backed implementations; the
//! `test_utils` module (behind the `test-utils` feature) provides
//! scripted mocks.

use protocol::{ControlSetup, DeviceId, DeviceInfo, EndpointRef, UsbError};
use std::sync::Arc;
use std::time::Duration;

/// Result of a single transfer: bytes moved, or why nothing moved
pub type TransferResult = Result<usize, UsbError>;

/// Collapse a transfer result to a signed status code
///
/// Positive is a byte count; zero means nothing moved; `-1` means the
/// transfer failed for any reason (timeout and device errors look alike).
pub fn transfer_status(result: &TransferResult) -> isize {
    match result {
        Ok(len) => *len as isize,
        Err(_) => -1,
    }
}

/// An open connection to a USB device
///
/// Shared between the controller thread (writes, claims) and the reader
/// thread (reads), so every method takes `&self`.
pub trait UsbConnection: Send + Sync {
    /// Claim an interface, detaching any kernel driver first when `force`
    fn claim_interface(&self, interface: u8, force: bool) -> bool;

    /// Release a previously claimed interface
    fn release_interface(&self, interface: u8);

    /// Read from an IN endpoint into `buf`
    fn bulk_read(&self, endpoint: &EndpointRef, buf: &mut [u8], timeout: Duration)
    -> TransferResult;

    /// Write `data` to an OUT endpoint
    fn bulk_write(&self, endpoint: &EndpointRef, data: &[u8], timeout: Duration)
    -> TransferResult;

    /// Device-to-host control transfer on endpoint 0
    fn control_read(&self, setup: ControlSetup, buf: &mut [u8], timeout: Duration)
    -> TransferResult;

    /// Host-to-device control transfer on endpoint 0
    fn control_write(&self, setup: ControlSetup, data: &[u8], timeout: Duration)
    -> TransferResult;
}

/// Operating-system USB subsystem
pub trait UsbBackend: Send {
    /// Enumerate currently attached devices
    fn list_devices(&self) -> Result<Vec<DeviceInfo>, UsbError>;

    /// Open a device for transfers
    fn open_device(&self, device: &DeviceInfo) -> Result<Arc<dyn UsbConnection>, UsbError>;

    /// Process pending OS events (hot-plug) for at most `timeout`
    fn handle_events(&self, timeout: Duration) -> Result<(), UsbError> {
        std::thread::sleep(timeout);
        Ok(())
    }

    /// Stop delivering hot-plug notifications
    fn unregister_hotplug(&mut self) {}
}

/// Grants access to devices
///
/// `request_permission` returns immediately; the outcome is delivered later
/// as a [`crate::TerminalCommand::PermissionResult`] on the command queue.
pub trait PermissionBroker: Send {
    /// Ask for access to `device`
    fn request_permission(&self, device: &DeviceInfo);

    /// Whether access to `device` is currently held
    fn has_permission(&self, device: DeviceId) -> bool;
}
