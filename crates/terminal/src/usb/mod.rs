//! USB subsystem
//!
//! Everything between the controller and libusb:
//! - device enumeration, opening and hot-plug ([`manager`], [`device`])
//! - permission negotiation ([`permission`])
//! - the bound session with its reader and writer ([`session`],
//!   [`reader`], [`writer`])

pub mod device;
pub mod filter;
pub mod manager;
pub mod permission;
pub mod reader;
pub mod scanner;
pub mod session;
pub mod transfers;
pub mod writer;

pub use manager::RusbBackend;
pub use permission::{FilterPermissionBroker, PermissionNegotiator};
pub use reader::{PollingReader, ReaderState};
pub use session::DeviceSession;
pub use writer::Writer;
