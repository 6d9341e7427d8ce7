//! Device session
//!
//! The single active binding between the terminal and a USB device. The
//! session exclusively owns the open connection and the claimed interfaces;
//! the reader only borrows the connection for reads.
//!
//! Invariants:
//! - a connection is held iff at least one interface is claimed
//! - the reader runs iff a connection is held
//! - binding always tears down the previous session first

use super::reader::{PollingReader, ReaderState};
use super::scanner;
use common::{EventSink, TerminalEvent, UsbBackend, UsbConnection};
use protocol::{BindError, DeviceInfo, EndpointRef, READ_TIMEOUT};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The active device binding
pub struct DeviceSession {
    device: Option<DeviceInfo>,
    connection: Option<Arc<dyn UsbConnection>>,
    claimed_interfaces: Vec<u8>,
    endpoints: Vec<EndpointRef>,
    reader: Option<PollingReader>,
    events: EventSink,
    force_claim: bool,
}

impl DeviceSession {
    /// Create an empty session
    ///
    /// `force_claim` detaches kernel drivers from interfaces before claiming.
    pub fn new(events: EventSink, force_claim: bool) -> Self {
        Self {
            device: None,
            connection: None,
            claimed_interfaces: Vec::new(),
            endpoints: Vec::new(),
            reader: None,
            events,
            force_claim,
        }
    }

    /// Open `device`, claim all of its interfaces and start reading
    pub fn bind(&mut self, backend: &dyn UsbBackend, device: DeviceInfo) -> Result<(), BindError> {
        self.unbind();

        if device.interfaces.is_empty() {
            return Err(BindError::NoInterfaces { device: device.id });
        }

        let connection = backend
            .open_device(&device)
            .map_err(|source| BindError::OpenFailed {
                device: device.id,
                source,
            })?;
        debug!("Opened device {}", device.id);

        let mut claimed = Vec::with_capacity(device.interfaces.len());
        for interface in &device.interfaces {
            if !connection.claim_interface(interface.number, self.force_claim) {
                // Claims made so far go away with the connection, which also
                // hands detached interfaces back to their kernel drivers
                warn!(
                    "Failed to claim interface {} on device {}",
                    interface.number, device.id
                );
                return Err(BindError::ClaimFailed {
                    device: device.id,
                    interface: interface.number,
                });
            }
            debug!("Claimed interface {} on device {}", interface.number, device.id);
            claimed.push(interface.number);
        }

        let endpoints = scanner::scan(&device);
        let mut reader = PollingReader::new(READ_TIMEOUT);
        if let Err(e) = reader.start(
            connection.clone(),
            scanner::inputs(&endpoints),
            self.events.clone(),
        ) {
            warn!("Failed to spawn reader for device {}: {}", device.id, e);
            for interface in &claimed {
                connection.release_interface(*interface);
            }
            return Err(BindError::ReaderSpawn {
                device: device.id,
                message: e.to_string(),
            });
        }

        info!(
            "Bound device {} ({} interface(s), {} endpoint(s))",
            device,
            claimed.len(),
            endpoints.len()
        );

        self.connection = Some(connection);
        self.claimed_interfaces = claimed;
        self.endpoints = endpoints;
        self.reader = Some(reader);
        self.device = Some(device.clone());

        self.events.emit(TerminalEvent::DeviceAttached { device });
        Ok(())
    }

    /// Stop the reader, release interfaces and close the connection
    ///
    /// The reader has exited before `DeviceDisconnected` is emitted.
    /// No-op on an empty session.
    pub fn unbind(&mut self) {
        let Some(device) = self.device.take() else {
            return;
        };

        if let Some(reader) = self.reader.as_mut() {
            reader.stop();
        }

        if let Some(connection) = self.connection.take() {
            for interface in self.claimed_interfaces.drain(..) {
                connection.release_interface(interface);
            }
        }
        self.claimed_interfaces.clear();
        self.endpoints.clear();

        info!("Unbound device {}", device.id);
        self.events.emit(TerminalEvent::DeviceDisconnected { device });
    }

    /// Tear down at shutdown
    pub fn stop(&mut self) {
        self.unbind();
    }

    pub fn device(&self) -> Option<&DeviceInfo> {
        self.device.as_ref()
    }

    pub fn connection(&self) -> Option<&Arc<dyn UsbConnection>> {
        self.connection.as_ref()
    }

    pub fn claimed_interfaces(&self) -> &[u8] {
        &self.claimed_interfaces
    }

    pub fn endpoints(&self) -> &[EndpointRef] {
        &self.endpoints
    }

    pub fn is_bound(&self) -> bool {
        self.connection.is_some()
    }

    /// State of the most recent reader (`Idle` before the first bind)
    pub fn reader_state(&self) -> ReaderState {
        self.reader
            .as_ref()
            .map(|r| r.state())
            .unwrap_or(ReaderState::Idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_utils::{
        MockBackend, TransferRecord, create_mock_device_info, create_mock_endpoint,
        create_mock_hid_device, drain_events,
    };
    use protocol::{EndpointKind, InterfaceInfo, UsbError};

    fn two_interface_device() -> DeviceInfo {
        create_mock_device_info(
            9,
            0x1234,
            0x0001,
            vec![
                InterfaceInfo {
                    number: 0,
                    class: 3,
                    endpoints: vec![create_mock_endpoint(0x81, EndpointKind::Interrupt, 8)],
                },
                InterfaceInfo {
                    number: 1,
                    class: 3,
                    endpoints: vec![create_mock_endpoint(0x02, EndpointKind::Interrupt, 8)],
                },
            ],
        )
    }

    #[test]
    fn test_bind_claims_every_interface() {
        let device = two_interface_device();
        let backend = MockBackend::with_devices(vec![device.clone()]);
        let (sink, rx) = EventSink::channel();
        let mut session = DeviceSession::new(sink, true);

        session.bind(&backend, device.clone()).unwrap();

        assert!(session.is_bound());
        assert_eq!(session.claimed_interfaces().len(), device.interface_count());
        assert_eq!(session.endpoints().len(), 2);
        assert_eq!(session.reader_state(), ReaderState::Running);

        let claims: Vec<TransferRecord> = backend
            .connection(device.id)
            .records()
            .into_iter()
            .filter(|r| matches!(r, TransferRecord::Claim { .. }))
            .collect();
        assert_eq!(
            claims,
            vec![
                TransferRecord::Claim {
                    interface: 0,
                    force: true
                },
                TransferRecord::Claim {
                    interface: 1,
                    force: true
                },
            ]
        );

        assert!(drain_events(&rx).contains(&TerminalEvent::DeviceAttached {
            device: device.clone()
        }));

        session.unbind();
    }

    #[test]
    fn test_unbind_releases_and_stops_reader() {
        let device = two_interface_device();
        let backend = MockBackend::with_devices(vec![device.clone()]);
        let (sink, rx) = EventSink::channel();
        let mut session = DeviceSession::new(sink, true);

        session.bind(&backend, device.clone()).unwrap();
        session.unbind();

        assert!(!session.is_bound());
        assert!(session.device().is_none());
        assert!(session.claimed_interfaces().is_empty());
        assert_eq!(session.reader_state(), ReaderState::Stopped);
        assert_eq!(backend.connection(device.id).released(), vec![0, 1]);

        let events = drain_events(&rx);
        assert_eq!(
            events.last(),
            Some(&TerminalEvent::DeviceDisconnected { device })
        );

        // Idempotent
        session.unbind();
        assert!(drain_events(&rx).is_empty());
    }

    #[test]
    fn test_open_failure_leaves_session_empty() {
        let device = create_mock_hid_device(3);
        let backend = MockBackend::with_devices(vec![device.clone()]);
        backend.fail_open(device.id, UsbError::Access);
        let (sink, rx) = EventSink::channel();
        let mut session = DeviceSession::new(sink, true);

        let err = session.bind(&backend, device.clone()).unwrap_err();
        assert_eq!(
            err,
            BindError::OpenFailed {
                device: device.id,
                source: UsbError::Access
            }
        );
        assert!(!session.is_bound());
        assert_eq!(session.reader_state(), ReaderState::Idle);
        assert!(drain_events(&rx).is_empty());
    }

    #[test]
    fn test_claim_failure_is_not_rolled_back() {
        let device = two_interface_device();
        let backend = MockBackend::with_devices(vec![device.clone()]);
        backend.connection(device.id).reject_claim(1);
        let (sink, _rx) = EventSink::channel();
        let mut session = DeviceSession::new(sink, false);

        let err = session.bind(&backend, device.clone()).unwrap_err();
        assert_eq!(
            err,
            BindError::ClaimFailed {
                device: device.id,
                interface: 1
            }
        );
        assert!(!session.is_bound());
        assert!(session.claimed_interfaces().is_empty());
        assert!(backend.connection(device.id).released().is_empty());
    }

    #[test]
    fn test_device_without_interfaces() {
        let device = create_mock_device_info(5, 1, 1, Vec::new());
        let backend = MockBackend::with_devices(vec![device.clone()]);
        let (sink, _rx) = EventSink::channel();
        let mut session = DeviceSession::new(sink, true);

        assert_eq!(
            session.bind(&backend, device.clone()),
            Err(BindError::NoInterfaces { device: device.id })
        );
        assert!(backend.opened().is_empty());
    }

    #[test]
    fn test_rebind_tears_down_previous_session() {
        let first = create_mock_hid_device(1);
        let second = create_mock_hid_device(2);
        let backend = MockBackend::with_devices(vec![first.clone(), second.clone()]);
        let (sink, rx) = EventSink::channel();
        let mut session = DeviceSession::new(sink, true);

        session.bind(&backend, first.clone()).unwrap();
        session.bind(&backend, second.clone()).unwrap();

        assert_eq!(backend.connection(first.id).released(), vec![0]);
        assert_eq!(session.device().map(|d| d.id), Some(second.id));

        let events = drain_events(&rx);
        let lifecycle: Vec<&TerminalEvent> = events
            .iter()
            .filter(|e| !matches!(e, TerminalEvent::DataReceived { .. }))
            .collect();
        assert_eq!(
            lifecycle,
            vec![
                &TerminalEvent::DeviceAttached {
                    device: first.clone()
                },
                &TerminalEvent::DeviceDisconnected { device: first },
                &TerminalEvent::DeviceAttached { device: second },
            ]
        );

        session.stop();
    }
}
