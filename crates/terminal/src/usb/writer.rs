//! Payload writer
//!
//! Every OUT endpoint of the session gets the payload twice: once as a bulk
//! (or interrupt) transfer and once as a HID SET_REPORT control transfer.
//! Each attempt reports its own `Sent` status.

use super::scanner;
use super::session::DeviceSession;
use common::{EventSink, PermissionBroker, TerminalEvent, transfer_status};
use protocol::{ControlSetup, EncodingError, SendEncoding, WRITE_TIMEOUT, encode};
use std::time::Duration;
use tracing::{debug, warn};

pub struct Writer {
    timeout: Duration,
    events: EventSink,
}

impl Writer {
    pub fn new(events: EventSink) -> Self {
        Self::with_timeout(events, WRITE_TIMEOUT)
    }

    pub fn with_timeout(events: EventSink, timeout: Duration) -> Self {
        Self { timeout, events }
    }

    /// Encode `payload` and write it to every OUT endpoint of `session`
    ///
    /// Silently does nothing unless a device is bound, the broker holds
    /// permission for it, the payload is non-empty and the session has at
    /// least one OUT endpoint. A numeric token that
    /// fails to decode emits `SendError`; the bytes decoded before it are
    /// still written and the error is returned afterwards.
    pub fn send(
        &self,
        session: &DeviceSession,
        broker: &dyn PermissionBroker,
        payload: &str,
        encoding: SendEncoding,
    ) -> Result<(), EncodingError> {
        let (Some(device), Some(connection)) = (session.device(), session.connection()) else {
            debug!("Send ignored: no device bound");
            return Ok(());
        };
        if !broker.has_permission(device.id) {
            debug!("Send ignored: no permission for {}", device.id);
            return Ok(());
        }
        if payload.is_empty() {
            return Ok(());
        }

        let outputs = scanner::outputs(session.endpoints());
        if outputs.is_empty() {
            debug!("Send ignored: {} has no OUT endpoints", device.id);
            return Ok(());
        }

        let encoded = encode(payload, encoding);
        if let Some(error) = &encoded.error {
            warn!("{}", error);
            self.events.emit(TerminalEvent::SendError {
                message: error.to_string(),
            });
        }

        for endpoint in outputs {
            self.events.emit(TerminalEvent::Sending {
                payload: payload.to_string(),
            });

            let bulk = connection.bulk_write(&endpoint, &encoded.bytes, self.timeout);
            let status = transfer_status(&bulk);
            debug!(
                "Write {} byte(s) to {:#04x}: status {}",
                encoded.bytes.len(),
                endpoint.address,
                status
            );
            self.events.emit(TerminalEvent::Sent {
                status,
                bytes: encoded.bytes.clone(),
            });

            let control =
                connection.control_write(ControlSetup::WRITE_REPORT, &encoded.bytes, self.timeout);
            let status = transfer_status(&control);
            debug!("SET_REPORT for {:#04x}: status {}", endpoint.address, status);
            self.events.emit(TerminalEvent::Sent {
                status,
                bytes: encoded.bytes.clone(),
            });
        }

        match encoded.error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
