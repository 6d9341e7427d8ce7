//! HID class request constants
//!
//! The control-transfer parameters used by the read fallback and the
//! dual-path write. These are fixed; the target class of HID devices
//! expects exactly these values.

use std::time::Duration;

/// HID GET_REPORT request
pub const REQUEST_GET_REPORT: u8 = 0x01;
/// HID SET_REPORT request
pub const REQUEST_SET_REPORT: u8 = 0x09;

/// wValue high byte: report type input
pub const REPORT_TYPE_INPUT: u16 = 0x0100;
/// wValue high byte: report type output
pub const REPORT_TYPE_OUTPUT: u16 = 0x0200;
/// wValue high byte: report type feature
pub const REPORT_TYPE_FEATURE: u16 = 0x0300;

/// Timeout for each read attempt in the polling loop
pub const READ_TIMEOUT: Duration = Duration::from_millis(100);
/// Timeout for each write attempt
pub const WRITE_TIMEOUT: Duration = Duration::from_millis(250);

/// Setup fields of a control transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlSetup {
    /// bmRequestType
    pub request_type: u8,
    /// bRequest
    pub request: u8,
    /// wValue
    pub value: u16,
    /// wIndex
    pub index: u16,
}

impl ControlSetup {
    /// Device-to-host read used when a bulk read yields nothing
    pub const READ_REPORT: ControlSetup = ControlSetup {
        request_type: 0xA0,
        request: REQUEST_GET_REPORT,
        value: REPORT_TYPE_OUTPUT,
        index: 0x00,
    };

    /// Host-to-device class/interface write issued after every bulk write
    pub const WRITE_REPORT: ControlSetup = ControlSetup {
        request_type: 0x21,
        request: REQUEST_SET_REPORT,
        value: REPORT_TYPE_OUTPUT,
        index: 0x02,
    };

    /// Bit 7 of bmRequestType set means device-to-host
    pub fn is_in(&self) -> bool {
        self.request_type & 0x80 != 0
    }
}
