//! Protocol library for usb-hid-terminal
//!
//! This crate defines the types shared between the terminal core and its
//! collaborators: device snapshots and endpoint references, the HID
//! control-request constants, the payload codec, and the error taxonomy.
//!
//! # Example
//!
//! ```
//! use protocol::{encode, format_numeric, SendEncoding};
//!
//! let encoded = encode("0x41 66 0103", SendEncoding::NumericTokens);
//! assert_eq!(encoded.bytes, b"ABC");
//! assert_eq!(format_numeric(&encoded.bytes), "65 66 67");
//! ```

pub mod codec;
pub mod error;
pub mod report;
pub mod types;

pub use codec::{
    EncodedPayload, decode, encode, format_hex, format_numeric, parse_integer_literal,
};
pub use error::{BindError, EncodingError, Result, SelectError, TerminalError};
pub use report::{
    ControlSetup, READ_TIMEOUT, REPORT_TYPE_FEATURE, REPORT_TYPE_INPUT, REPORT_TYPE_OUTPUT,
    REQUEST_GET_REPORT, REQUEST_SET_REPORT, WRITE_TIMEOUT,
};
pub use types::{
    DeviceId, DeviceInfo, DeviceList, Direction, EndpointInfo, EndpointKind, EndpointRef,
    InterfaceInfo, ReceivedFrame, SendEncoding, UsbError,
};
