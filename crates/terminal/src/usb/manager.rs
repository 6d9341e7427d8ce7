//! libusb backend
//!
//! Device enumeration, opening and hot-plug notification on top of a rusb
//! [`Context`]. Hot-plug callbacks run inside `handle_events` on the
//! controller thread and post `DeviceArrived`/`DeviceLeft` commands into
//! the controller's own queue.

use super::device::{RusbConnection, describe_device};
use super::filter::check_filter;
use super::transfers::map_rusb_error;
use common::{CommandSender, TerminalCommand, UsbBackend, UsbConnection};
use protocol::{DeviceId, DeviceInfo, UsbError};
use rusb::{Context, Device, Hotplug, HotplugBuilder, Registration, UsbContext};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Linux Foundation vendor ID used by root hubs
const ROOT_HUB_VENDOR_ID: u16 = 0x1d6b;
/// USB hub device class
const HUB_CLASS: u8 = 9;

/// USB backend over libusb
pub struct RusbBackend {
    context: Context,
    filters: Vec<String>,
    skip_root_hubs: bool,
    registration: Option<Registration<Context>>,
}

impl RusbBackend {
    /// Create a libusb context
    pub fn new(filters: Vec<String>, skip_root_hubs: bool) -> Result<Self, rusb::Error> {
        let context = Context::new()?;

        Ok(Self {
            context,
            filters,
            skip_root_hubs,
            registration: None,
        })
    }

    /// Deliver arrivals and removals of visible devices to `commands`
    ///
    /// A no-op where libusb has no hot-plug support.
    pub fn register_hotplug(&mut self, commands: CommandSender) -> Result<(), rusb::Error> {
        if !rusb::has_hotplug() {
            warn!("Hot-plug is not supported on this platform");
            return Ok(());
        }

        let callback: Box<dyn Hotplug<Context>> = Box::new(HotplugCallback {
            commands,
            filters: self.filters.clone(),
            skip_root_hubs: self.skip_root_hubs,
        });

        // Devices present now are listed on demand, not replayed here
        let registration: Registration<Context> = HotplugBuilder::new()
            .enumerate(false)
            .register(&self.context, callback)?;

        self.registration = Some(registration);
        debug!("Hot-plug callbacks registered");
        Ok(())
    }

    fn find_device(&self, id: DeviceId) -> Result<Device<Context>, UsbError> {
        let devices = self.context.devices().map_err(map_rusb_error)?;
        devices
            .iter()
            .find(|d| {
                d.bus_number() == id.bus_number() && d.address() == id.device_address()
            })
            .ok_or(UsbError::NoDevice)
    }
}

impl UsbBackend for RusbBackend {
    fn list_devices(&self) -> Result<Vec<DeviceInfo>, UsbError> {
        let devices = self.context.devices().map_err(map_rusb_error)?;

        let mut listed = Vec::new();
        for device in devices.iter() {
            if !is_visible(&device, &self.filters, self.skip_root_hubs) {
                continue;
            }
            match describe_device(&device, true) {
                Ok(info) => listed.push(info),
                Err(e) => warn!(
                    "Failed to describe device bus={} addr={}: {}",
                    device.bus_number(),
                    device.address(),
                    e
                ),
            }
        }

        debug!("Enumerated {} devices", listed.len());
        Ok(listed)
    }

    fn open_device(&self, device: &DeviceInfo) -> Result<Arc<dyn UsbConnection>, UsbError> {
        let usb_device = self.find_device(device.id)?;
        let handle = usb_device.open().map_err(|e| {
            warn!("Failed to open device {}: {}", device.id, e);
            map_rusb_error(e)
        })?;

        debug!("Opened device {}", device.id);
        let connection: Arc<dyn UsbConnection> = Arc::new(RusbConnection::new(device.id, handle));
        Ok(connection)
    }

    fn handle_events(&self, timeout: Duration) -> Result<(), UsbError> {
        match self.context.handle_events(Some(timeout)) {
            Ok(()) => Ok(()),
            Err(rusb::Error::Interrupted) => {
                debug!("USB event handling interrupted");
                Ok(())
            }
            Err(e) => Err(map_rusb_error(e)),
        }
    }

    fn unregister_hotplug(&mut self) {
        if self.registration.take().is_some() {
            info!("Hot-plug callbacks unregistered");
        }
    }
}

/// Whether a device passes the filters and is not a root hub
fn is_visible<T: UsbContext>(device: &Device<T>, filters: &[String], skip_root_hubs: bool) -> bool {
    let desc = match device.device_descriptor() {
        Ok(d) => d,
        Err(_) => return false,
    };

    if skip_root_hubs && desc.vendor_id() == ROOT_HUB_VENDOR_ID && desc.class_code() == HUB_CLASS {
        debug!(
            "Skipping root hub: bus={}, addr={}",
            device.bus_number(),
            device.address()
        );
        return false;
    }

    if !check_filter(desc.vendor_id(), desc.product_id(), filters) {
        debug!(
            "Device ignored by filter: bus={}, addr={}, vid={:#x}, pid={:#x}",
            device.bus_number(),
            device.address(),
            desc.vendor_id(),
            desc.product_id()
        );
        return false;
    }

    true
}

/// Hot-plug callback handler
struct HotplugCallback {
    commands: CommandSender,
    filters: Vec<String>,
    skip_root_hubs: bool,
}

impl Hotplug<Context> for HotplugCallback {
    fn device_arrived(&mut self, device: Device<Context>) {
        debug!(
            "Hot-plug callback: device arrived (bus={}, addr={})",
            device.bus_number(),
            device.address()
        );

        if !is_visible(&device, &self.filters, self.skip_root_hubs) {
            return;
        }

        // No transfers are allowed inside the callback, so no string descriptors
        match describe_device(&device, false) {
            Ok(info) => {
                let arrived = TerminalCommand::DeviceArrived { device: info };
                if let Err(e) = self.commands.post(arrived) {
                    error!("Failed to post DeviceArrived: {}", e);
                }
            }
            Err(e) => warn!("Failed to describe arrived device: {}", e),
        }
    }

    fn device_left(&mut self, device: Device<Context>) {
        debug!(
            "Hot-plug callback: device left (bus={}, addr={})",
            device.bus_number(),
            device.address()
        );

        let id = DeviceId::from_location(device.bus_number(), device.address());
        if let Err(e) = self.commands.post(TerminalCommand::DeviceLeft { device: id }) {
            error!("Failed to post DeviceLeft: {}", e);
        }
    }
}
