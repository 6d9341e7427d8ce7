//! Polling reader
//!
//! Background thread that sweeps every IN endpoint of the bound device.
//! Each endpoint gets a bulk read first; when that yields nothing, a HID
//! GET_REPORT control read is tried into the same buffer. Failures and
//! "no data yet" look the same at this layer and are simply retried on the
//! next sweep.
//!
//! Stopping is cooperative. The stop flag is only checked between sweeps,
//! so a stop waits for the current sweep to finish: at most
//! `2 × endpoint_count × timeout`.

use common::{EventSink, TerminalEvent, UsbConnection, transfer_status};
use protocol::{ControlSetup, EndpointRef, ReceivedFrame};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, trace};

/// Lifecycle of a [`PollingReader`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// Background read loop over a session's IN endpoints
pub struct PollingReader {
    state: ReaderState,
    timeout: Duration,
    stop_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PollingReader {
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: ReaderState::Idle,
            timeout,
            stop_flag: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    /// Spawn the read loop
    ///
    /// Only valid from `Idle`; a reader is never restarted.
    pub fn start(
        &mut self,
        connection: Arc<dyn UsbConnection>,
        endpoints: Vec<EndpointRef>,
        events: EventSink,
    ) -> std::io::Result<()> {
        if self.state != ReaderState::Idle {
            return Err(std::io::Error::other(format!(
                "reader cannot start from {:?}",
                self.state
            )));
        }

        let stop_flag = self.stop_flag.clone();
        let timeout = self.timeout;

        let handle = std::thread::Builder::new()
            .name("hid-reader".to_string())
            .spawn(move || {
                read_loop(
                    connection.as_ref(),
                    &endpoints,
                    &events,
                    &stop_flag,
                    timeout,
                )
            })?;

        self.handle = Some(handle);
        self.state = ReaderState::Running;
        Ok(())
    }

    /// Request the loop to stop and wait for the thread to exit
    pub fn stop(&mut self) {
        if self.state != ReaderState::Running {
            return;
        }

        self.state = ReaderState::Stopping;
        self.stop_flag.store(true, Ordering::SeqCst);

        if let Some(handle) = self.handle.take()
            && let Err(e) = handle.join()
        {
            error!("Reader thread panicked: {:?}", e);
        }

        self.state = ReaderState::Stopped;
        debug!("Reader stopped");
    }
}

impl Drop for PollingReader {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read_loop(
    connection: &dyn UsbConnection,
    endpoints: &[EndpointRef],
    events: &EventSink,
    stop_flag: &AtomicBool,
    timeout: Duration,
) {
    debug!("Reader started on {} IN endpoint(s)", endpoints.len());

    while !stop_flag.load(Ordering::SeqCst) {
        if endpoints.is_empty() {
            std::thread::sleep(timeout);
            continue;
        }

        for frame in sweep(connection, endpoints, timeout) {
            events.emit(TerminalEvent::DataReceived { frame });
        }
    }
}

/// One pass over every IN endpoint, returning frames in the order read
pub fn sweep(
    connection: &dyn UsbConnection,
    endpoints: &[EndpointRef],
    timeout: Duration,
) -> Vec<ReceivedFrame> {
    endpoints
        .iter()
        .filter_map(|endpoint| read_endpoint(connection, endpoint, timeout))
        .collect()
}

/// Bulk read, falling back to a GET_REPORT control read into the same buffer
fn read_endpoint(
    connection: &dyn UsbConnection,
    endpoint: &EndpointRef,
    timeout: Duration,
) -> Option<ReceivedFrame> {
    let mut buffer = vec![0u8; endpoint.max_packet_size as usize];

    let bulk = connection.bulk_read(endpoint, &mut buffer, timeout);
    if let Ok(len) = bulk
        && len > 0
    {
        buffer.truncate(len);
        return Some(ReceivedFrame {
            endpoint: endpoint.address,
            via_control: false,
            data: buffer,
        });
    }
    trace!(
        "Bulk read on {:#04x}: status {}",
        endpoint.address,
        transfer_status(&bulk)
    );

    let control = connection.control_read(ControlSetup::READ_REPORT, &mut buffer, timeout);
    if let Ok(len) = control
        && len > 0
    {
        buffer.truncate(len);
        return Some(ReceivedFrame {
            endpoint: endpoint.address,
            via_control: true,
            data: buffer,
        });
    }
    trace!(
        "Control read for {:#04x}: status {}",
        endpoint.address,
        transfer_status(&control)
    );

    None
}
