//! USB transfer execution
//!
//! Synchronous libusb transfers on an open handle. Data endpoints use the
//! interrupt primitive when the descriptor says so and the bulk primitive
//! otherwise; control transfers always go to endpoint 0.

use common::TransferResult;
use protocol::{ControlSetup, EndpointKind, EndpointRef, UsbError};
use rusb::{Context, DeviceHandle};
use std::time::Duration;

/// Read from an IN endpoint
pub fn read_endpoint(
    handle: &DeviceHandle<Context>,
    endpoint: &EndpointRef,
    buf: &mut [u8],
    timeout: Duration,
) -> TransferResult {
    let result = match endpoint.kind {
        EndpointKind::Interrupt => handle.read_interrupt(endpoint.address, buf, timeout),
        _ => handle.read_bulk(endpoint.address, buf, timeout),
    };
    result.map_err(map_rusb_error)
}

/// Write to an OUT endpoint
pub fn write_endpoint(
    handle: &DeviceHandle<Context>,
    endpoint: &EndpointRef,
    data: &[u8],
    timeout: Duration,
) -> TransferResult {
    let result = match endpoint.kind {
        EndpointKind::Interrupt => handle.write_interrupt(endpoint.address, data, timeout),
        _ => handle.write_bulk(endpoint.address, data, timeout),
    };
    result.map_err(map_rusb_error)
}

/// Device-to-host control transfer
pub fn control_read(
    handle: &DeviceHandle<Context>,
    setup: ControlSetup,
    buf: &mut [u8],
    timeout: Duration,
) -> TransferResult {
    handle
        .read_control(
            setup.request_type,
            setup.request,
            setup.value,
            setup.index,
            buf,
            timeout,
        )
        .map_err(map_rusb_error)
}

/// Host-to-device control transfer
pub fn control_write(
    handle: &DeviceHandle<Context>,
    setup: ControlSetup,
    data: &[u8],
    timeout: Duration,
) -> TransferResult {
    handle
        .write_control(
            setup.request_type,
            setup.request,
            setup.value,
            setup.index,
            data,
            timeout,
        )
        .map_err(map_rusb_error)
}

/// Map rusb::Error to protocol::UsbError
pub fn map_rusb_error(err: rusb::Error) -> UsbError {
    match err {
        rusb::Error::Timeout => UsbError::Timeout,
        rusb::Error::Pipe => UsbError::Pipe,
        rusb::Error::NoDevice => UsbError::NoDevice,
        rusb::Error::NotFound => UsbError::NotFound,
        rusb::Error::Busy => UsbError::Busy,
        rusb::Error::Overflow => UsbError::Overflow,
        rusb::Error::Io => UsbError::Io,
        rusb::Error::InvalidParam => UsbError::InvalidParam,
        rusb::Error::Access => UsbError::Access,
        _ => UsbError::Other {
            message: err.to_string(),
        },
    }
}
