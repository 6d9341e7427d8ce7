//! Terminal error types

use crate::types::{DeviceId, UsbError};
use thiserror::Error;

/// Device selection errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectError {
    /// Index does not address the current device list snapshot
    #[error("Device index {index} out of range (list has {len} devices)")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Errors binding a session to a device
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    /// The OS refused to open the device, or it vanished
    #[error("Failed to open device {device}: {source}")]
    OpenFailed { device: DeviceId, source: UsbError },

    /// An interface claim was rejected
    #[error("Failed to claim interface {interface} on device {device}")]
    ClaimFailed { device: DeviceId, interface: u8 },

    /// The device exposes no interfaces to claim
    #[error("Device {device} has no interfaces")]
    NoInterfaces { device: DeviceId },

    /// Interfaces were claimed but the reader thread could not be started
    #[error("Failed to start reader for device {device}: {message}")]
    ReaderSpawn { device: DeviceId, message: String },
}

/// Numeric payload encoding errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    /// A token could not be read as an integer literal
    #[error("Invalid numeric token '{token}' at position {position}: {reason}")]
    InvalidToken {
        token: String,
        position: usize,
        reason: String,
    },
}

/// Errors surfaced by terminal commands
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TerminalError {
    #[error(transparent)]
    Select(#[from] SelectError),

    #[error(transparent)]
    Bind(#[from] BindError),

    #[error(transparent)]
    Encoding(#[from] EncodingError),

    /// Enumeration failed at the USB layer
    #[error("USB error: {0}")]
    Usb(#[from] UsbError),
}

/// Type alias for terminal results
pub type Result<T> = std::result::Result<T, TerminalError>;
