//! USB HID terminal
//!
//! Lets a user pick an attached USB device, claims its interfaces once
//! access is granted, streams whatever its IN endpoints produce and writes
//! typed payloads to its OUT endpoints.
//!
//! The [`controller::TerminalController`] owns all state and runs on its own
//! thread; the console front end talks to it through
//! [`common::create_terminal_bridge`].

pub mod config;
pub mod console;
pub mod controller;
pub mod usb;

pub use config::TerminalConfig;
pub use controller::{ControllerOptions, TerminalController, spawn_terminal_controller};
