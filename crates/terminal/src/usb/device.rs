//! libusb device handling
//!
//! Converts rusb devices into [`DeviceInfo`] snapshots and wraps an open
//! handle as a [`UsbConnection`].

use super::transfers;
use common::{TransferResult, UsbConnection};
use protocol::{
    ControlSetup, DeviceId, DeviceInfo, Direction, EndpointInfo, EndpointKind, EndpointRef,
    InterfaceInfo,
};
use rusb::{Context, Device, DeviceDescriptor, DeviceHandle};
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

/// Build a device snapshot
///
/// String descriptors need the device opened briefly; pass
/// `read_strings = false` where transfers are not allowed (hot-plug
/// callbacks). Alternate setting 0 of each interface in the active
/// configuration is described, falling back to configuration 0.
pub fn describe_device(
    device: &Device<Context>,
    read_strings: bool,
) -> Result<DeviceInfo, rusb::Error> {
    let descriptor = device.device_descriptor()?;
    let bus_number = device.bus_number();
    let device_address = device.address();

    let (manufacturer, product, serial_number) = if read_strings {
        device
            .open()
            .map(|handle| read_string_descriptors(&handle, &descriptor))
            .unwrap_or((None, None, None))
    } else {
        (None, None, None)
    };

    let config = device
        .active_config_descriptor()
        .or_else(|_| device.config_descriptor(0));

    let interfaces = match config {
        Ok(config) => config
            .interfaces()
            .filter_map(|interface| {
                let number = interface.number();
                interface.descriptors().next().map(|desc| InterfaceInfo {
                    number,
                    class: desc.class_code(),
                    endpoints: desc
                        .endpoint_descriptors()
                        .map(|ep| EndpointInfo {
                            address: ep.address(),
                            direction: map_direction(ep.direction()),
                            kind: map_transfer_type(ep.transfer_type()),
                            max_packet_size: ep.max_packet_size(),
                        })
                        .collect(),
                })
            })
            .collect(),
        Err(e) => {
            debug!(
                "No configuration descriptor for bus={} addr={}: {}",
                bus_number, device_address, e
            );
            Vec::new()
        }
    };

    Ok(DeviceInfo {
        id: DeviceId::from_location(bus_number, device_address),
        vendor_id: descriptor.vendor_id(),
        product_id: descriptor.product_id(),
        bus_number,
        device_address,
        manufacturer,
        product,
        serial_number,
        class: descriptor.class_code(),
        interfaces,
    })
}

fn read_string_descriptors(
    handle: &DeviceHandle<Context>,
    descriptor: &DeviceDescriptor,
) -> (Option<String>, Option<String>, Option<String>) {
    let manufacturer = descriptor
        .manufacturer_string_index()
        .and_then(|idx| handle.read_string_descriptor_ascii(idx).ok());

    let product = descriptor
        .product_string_index()
        .and_then(|idx| handle.read_string_descriptor_ascii(idx).ok());

    let serial_number = descriptor
        .serial_number_string_index()
        .and_then(|idx| handle.read_string_descriptor_ascii(idx).ok());

    (manufacturer, product, serial_number)
}

fn map_direction(direction: rusb::Direction) -> Direction {
    match direction {
        rusb::Direction::In => Direction::In,
        rusb::Direction::Out => Direction::Out,
    }
}

fn map_transfer_type(kind: rusb::TransferType) -> EndpointKind {
    match kind {
        rusb::TransferType::Control => EndpointKind::Control,
        rusb::TransferType::Isochronous => EndpointKind::Isochronous,
        rusb::TransferType::Bulk => EndpointKind::Bulk,
        rusb::TransferType::Interrupt => EndpointKind::Interrupt,
    }
}

/// Open libusb handle
///
/// Remembers which interfaces had their kernel driver detached so release
/// can hand them back to the kernel.
pub struct RusbConnection {
    id: DeviceId,
    handle: DeviceHandle<Context>,
    detached: Mutex<HashSet<u8>>,
}

impl RusbConnection {
    pub fn new(id: DeviceId, handle: DeviceHandle<Context>) -> Self {
        Self {
            id,
            handle,
            detached: Mutex::new(HashSet::new()),
        }
    }

    fn detach_kernel_driver(&self, interface: u8) {
        match self.handle.kernel_driver_active(interface) {
            Ok(true) => {
                debug!(
                    "Detaching kernel driver from interface {} on device {}",
                    interface, self.id
                );
                match self.handle.detach_kernel_driver(interface) {
                    Ok(()) => {
                        if let Ok(mut detached) = self.detached.lock() {
                            detached.insert(interface);
                        }
                    }
                    Err(e) => warn!(
                        "Failed to detach kernel driver from interface {}: {}",
                        interface, e
                    ),
                }
            }
            Ok(false) => {
                debug!("No kernel driver active on interface {}", interface);
            }
            Err(e) => {
                debug!(
                    "Could not check kernel driver status for interface {}: {}",
                    interface, e
                );
            }
        }
    }

    fn reattach_kernel_driver(&self, interface: u8) {
        match self.handle.attach_kernel_driver(interface) {
            Ok(()) => debug!(
                "Reattached kernel driver to interface {} on device {}",
                interface, self.id
            ),
            Err(e) => debug!(
                "Could not reattach kernel driver to interface {}: {}",
                interface, e
            ),
        }
    }
}

/// Interfaces still detached from their kernel driver, in ascending order
fn take_detached(detached: &Mutex<HashSet<u8>>) -> Vec<u8> {
    let mut interfaces: Vec<u8> = match detached.lock() {
        Ok(mut set) => set.drain().collect(),
        Err(poisoned) => poisoned.into_inner().drain().collect(),
    };
    interfaces.sort_unstable();
    interfaces
}

impl Drop for RusbConnection {
    /// Hand interfaces that were never released back to the kernel
    ///
    /// A bind that fails partway drops the connection with claims still
    /// held; closing the handle alone does not reattach drivers.
    fn drop(&mut self) {
        for interface in take_detached(&self.detached) {
            if let Err(e) = self.handle.release_interface(interface) {
                debug!("Release of interface {} on close: {}", interface, e);
            }
            self.reattach_kernel_driver(interface);
        }
    }
}

impl UsbConnection for RusbConnection {
    fn claim_interface(&self, interface: u8, force: bool) -> bool {
        if force {
            self.detach_kernel_driver(interface);
        }

        match self.handle.claim_interface(interface) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "Failed to claim interface {} on device {}: {}",
                    interface, self.id, e
                );
                false
            }
        }
    }

    fn release_interface(&self, interface: u8) {
        if let Err(e) = self.handle.release_interface(interface) {
            warn!("Failed to release interface {}: {}", interface, e);
        }

        let reattach = self
            .detached
            .lock()
            .map(|mut detached| detached.remove(&interface))
            .unwrap_or(false);
        if reattach {
            self.reattach_kernel_driver(interface);
        }
    }

    fn bulk_read(
        &self,
        endpoint: &EndpointRef,
        buf: &mut [u8],
        timeout: Duration,
    ) -> TransferResult {
        transfers::read_endpoint(&self.handle, endpoint, buf, timeout)
    }

    fn bulk_write(&self, endpoint: &EndpointRef, data: &[u8], timeout: Duration) -> TransferResult {
        transfers::write_endpoint(&self.handle, endpoint, data, timeout)
    }

    fn control_read(
        &self,
        setup: ControlSetup,
        buf: &mut [u8],
        timeout: Duration,
    ) -> TransferResult {
        transfers::control_read(&self.handle, setup, buf, timeout)
    }

    fn control_write(&self, setup: ControlSetup, data: &[u8], timeout: Duration) -> TransferResult {
        transfers::control_write(&self.handle, setup, data, timeout)
    }
}
