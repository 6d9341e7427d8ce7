//! Common utilities for usb-hid-terminal
//!
//! This crate provides shared functionality for the terminal core and its
//! front ends: the collaborator traits for the USB subsystem and permission
//! broker, error handling, logging setup, and the async channel bridge
//! between the front end and the controller thread.

pub mod channel;
pub mod error;
pub mod logging;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod usb_types;

pub use channel::{
    CommandSender, EventSink, TerminalBridge, TerminalCommand, TerminalEvent, TerminalWorker,
    create_terminal_bridge,
};
pub use error::{Error, Result};
pub use logging::setup_logging;
pub use usb_types::{PermissionBroker, TransferResult, UsbBackend, UsbConnection, transfer_status};
