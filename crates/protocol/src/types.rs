//! USB device and session type definitions
//!
//! This module defines the device snapshot types surfaced by enumeration,
//! the endpoint references derived from them, and the payload encoding
//! selected for outgoing data.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a physical USB device
///
/// Derived from the bus number and device address, so it stays stable for
/// as long as the device remains plugged in. Hot-plug removal and permission
/// results reference devices by this identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub u32);

impl DeviceId {
    /// Build the identity from a bus number and device address
    pub fn from_location(bus_number: u8, device_address: u8) -> Self {
        DeviceId(((bus_number as u32) << 8) | device_address as u32)
    }

    /// Bus number encoded in this identity
    pub fn bus_number(&self) -> u8 {
        (self.0 >> 8) as u8
    }

    /// Device address encoded in this identity
    pub fn device_address(&self) -> u8 {
        self.0 as u8
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}:{:03}", self.bus_number(), self.device_address())
    }
}

/// Endpoint direction, relative to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Device to host
    In,
    /// Host to device
    Out,
}

impl Direction {
    /// Direction encoded in bit 7 of an endpoint address
    pub fn from_address(address: u8) -> Self {
        if address & 0x80 != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }
}

/// Transfer type an endpoint was declared with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndpointKind {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

/// Endpoint descriptor as read from the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointInfo {
    /// Endpoint address (includes direction bit)
    pub address: u8,
    /// Endpoint direction
    pub direction: Direction,
    /// Declared transfer type
    pub kind: EndpointKind,
    /// Maximum packet size in bytes
    pub max_packet_size: u16,
}

/// Interface descriptor with its endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceInfo {
    /// bInterfaceNumber
    pub number: u8,
    /// bInterfaceClass (3 = HID)
    pub class: u8,
    /// Endpoints in descriptor order
    pub endpoints: Vec<EndpointInfo>,
}

/// Device snapshot returned by enumeration
///
/// Contains the descriptor information needed to label the device in a
/// list and to bind to its interfaces once permission is granted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Device identity
    pub id: DeviceId,
    /// USB Vendor ID
    pub vendor_id: u16,
    /// USB Product ID
    pub product_id: u16,
    /// Bus number
    pub bus_number: u8,
    /// Device address on the bus
    pub device_address: u8,
    /// Manufacturer string (if available)
    pub manufacturer: Option<String>,
    /// Product string (if available)
    pub product: Option<String>,
    /// Serial number string (if available)
    pub serial_number: Option<String>,
    /// USB device class
    pub class: u8,
    /// Interfaces of the active configuration
    pub interfaces: Vec<InterfaceInfo>,
}

impl DeviceInfo {
    /// Number of interfaces in the active configuration
    pub fn interface_count(&self) -> usize {
        self.interfaces.len()
    }
}

/// Device-list label: `vid:pid manufacturer product (bus N addr M)`
impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)?;
        if let Some(manufacturer) = &self.manufacturer {
            write!(f, " {}", manufacturer)?;
        }
        if let Some(product) = &self.product {
            write!(f, " {}", product)?;
        }
        write!(
            f,
            " (bus {} addr {})",
            self.bus_number, self.device_address
        )
    }
}

/// Ordered device snapshot taken at enumeration time
///
/// Selections are resolved by position against the snapshot the user was
/// shown, never against a fresh enumeration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceList {
    devices: Vec<DeviceInfo>,
}

impl DeviceList {
    pub fn new(devices: Vec<DeviceInfo>) -> Self {
        Self { devices }
    }

    pub fn get(&self, index: usize) -> Option<&DeviceInfo> {
        self.devices.get(index)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Labels in list order, one per device
    pub fn labels(&self) -> Vec<String> {
        self.devices.iter().map(|d| d.to_string()).collect()
    }
}

/// Reference to one endpoint of a bound device
///
/// Derived from the device's interface descriptors; immutable once computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointRef {
    /// Position of the interface in the device's interface list
    pub interface_index: usize,
    /// Position of the endpoint within its interface
    pub endpoint_index: usize,
    /// bInterfaceNumber of the owning interface
    pub interface_number: u8,
    /// Endpoint address (includes direction bit)
    pub address: u8,
    pub direction: Direction,
    pub kind: EndpointKind,
    pub max_packet_size: u16,
}

impl EndpointRef {
    pub fn is_in(&self) -> bool {
        self.direction == Direction::In
    }

    pub fn is_out(&self) -> bool {
        self.direction == Direction::Out
    }
}

/// How outgoing text is turned into bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendEncoding {
    /// UTF-8 bytes of the text, verbatim
    #[default]
    Raw,
    /// Whitespace-separated integer literals, one byte each
    #[serde(alias = "numeric")]
    NumericTokens,
}

impl SendEncoding {
    /// Encoding for the "send as numbers" toggle
    pub fn from_numeric_flag(numeric: bool) -> Self {
        if numeric {
            SendEncoding::NumericTokens
        } else {
            SendEncoding::Raw
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, SendEncoding::NumericTokens)
    }
}

/// Bytes delivered by one successful read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedFrame {
    /// IN endpoint the read was issued for
    pub endpoint: u8,
    /// True when the control-transfer fallback produced the data
    pub via_control: bool,
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

/// USB-level error conditions
///
/// Mirrors the libusb error taxonomy. At the transfer layer every variant
/// collapses into the same non-positive status code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UsbError {
    /// Transfer timed out
    Timeout,
    /// Pipe error (endpoint stalled)
    Pipe,
    /// Device not found or disconnected
    NoDevice,
    /// Entity not found
    NotFound,
    /// Resource busy
    Busy,
    /// Overflow
    Overflow,
    /// Input/output error
    Io,
    /// Invalid parameter
    InvalidParam,
    /// Access denied
    Access,
    /// Other error
    Other { message: String },
}

impl fmt::Display for UsbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UsbError::Timeout => write!(f, "operation timed out"),
            UsbError::Pipe => write!(f, "pipe error"),
            UsbError::NoDevice => write!(f, "no such device (it may have been disconnected)"),
            UsbError::NotFound => write!(f, "entity not found"),
            UsbError::Busy => write!(f, "resource busy"),
            UsbError::Overflow => write!(f, "overflow"),
            UsbError::Io => write!(f, "input/output error"),
            UsbError::InvalidParam => write!(f, "invalid parameter"),
            UsbError::Access => write!(f, "access denied (insufficient permissions)"),
            UsbError::Other { message } => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for UsbError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn hid_device() -> DeviceInfo {
        DeviceInfo {
            id: DeviceId::from_location(1, 5),
            vendor_id: 0x04d8,
            product_id: 0x003f,
            bus_number: 1,
            device_address: 5,
            manufacturer: Some("Microchip".to_string()),
            product: Some("Simple HID".to_string()),
            serial_number: None,
            class: 0,
            interfaces: Vec::new(),
        }
    }

    #[test]
    fn test_device_id_location() {
        let id = DeviceId::from_location(3, 17);
        assert_eq!(id.bus_number(), 3);
        assert_eq!(id.device_address(), 17);
        assert_eq!(id.to_string(), "003:017");
        assert_ne!(id, DeviceId::from_location(17, 3));
    }

    #[test]
    fn test_direction_from_address() {
        assert_eq!(Direction::from_address(0x81), Direction::In);
        assert_eq!(Direction::from_address(0x01), Direction::Out);
    }

    #[test]
    fn test_device_label() {
        let label = hid_device().to_string();
        assert_eq!(label, "04d8:003f Microchip Simple HID (bus 1 addr 5)");

        let mut anonymous = hid_device();
        anonymous.manufacturer = None;
        anonymous.product = None;
        assert_eq!(anonymous.to_string(), "04d8:003f (bus 1 addr 5)");
    }

    #[test]
    fn test_device_list_lookup() {
        let list = DeviceList::new(vec![hid_device()]);
        assert_eq!(list.len(), 1);
        assert!(list.get(0).is_some());
        assert!(list.get(1).is_none());
        assert_eq!(list.labels().len(), 1);
    }

    #[test]
    fn test_encoding_flag() {
        assert_eq!(SendEncoding::from_numeric_flag(true), SendEncoding::NumericTokens);
        assert_eq!(SendEncoding::from_numeric_flag(false), SendEncoding::Raw);
        assert_eq!(SendEncoding::default(), SendEncoding::Raw);
    }
}
