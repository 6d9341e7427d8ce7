//! Test utilities for usb-hid-terminal
//!
//! Provides a scripted USB backend, connection and permission broker, plus
//! device builders and helpers for waiting on events.
//!
//! # Example
//!
//! ```
//! use common::test_utils::{create_mock_hid_device, MockBackend};
//! use common::UsbBackend;
//!
//! let backend = MockBackend::with_devices(vec![create_mock_hid_device(1)]);
//! let devices = backend.list_devices().unwrap();
//! assert_eq!(devices[0].vendor_id, 0x04d8);
//! ```

use crate::channel::{CommandSender, TerminalCommand, TerminalEvent};
use crate::usb_types::{PermissionBroker, TransferResult, UsbBackend, UsbConnection};
use async_channel::Receiver;
use protocol::{
    ControlSetup, DeviceId, DeviceInfo, Direction, EndpointInfo, EndpointKind, EndpointRef,
    InterfaceInfo, UsbError,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// How long an unscripted mock read blocks before timing out
pub const DEFAULT_IDLE_DELAY: Duration = Duration::from_millis(1);

/// Create a mock endpoint descriptor
pub fn create_mock_endpoint(address: u8, kind: EndpointKind, max_packet_size: u16) -> EndpointInfo {
    EndpointInfo {
        address,
        direction: Direction::from_address(address),
        kind,
        max_packet_size,
    }
}

/// Create a mock device with the given interfaces
///
/// # Arguments
/// * `address` - Device address on bus 1 (also determines the DeviceId)
/// * `vendor_id` - USB Vendor ID
/// * `product_id` - USB Product ID
/// * `interfaces` - Interface descriptors in order
pub fn create_mock_device_info(
    address: u8,
    vendor_id: u16,
    product_id: u16,
    interfaces: Vec<InterfaceInfo>,
) -> DeviceInfo {
    DeviceInfo {
        id: DeviceId::from_location(1, address),
        vendor_id,
        product_id,
        bus_number: 1,
        device_address: address,
        manufacturer: Some(format!("Test Manufacturer {}", address)),
        product: Some(format!("Test Product {}", address)),
        serial_number: Some(format!("SN{:06}", address)),
        class: 0x00,
        interfaces,
    }
}

/// Create a mock HID device
///
/// One HID interface with an interrupt IN endpoint (0x81) and an interrupt
/// OUT endpoint (0x01), both 64 bytes.
pub fn create_mock_hid_device(address: u8) -> DeviceInfo {
    create_mock_device_info(
        address,
        0x04d8,
        0x003f,
        vec![InterfaceInfo {
            number: 0,
            class: 0x03,
            endpoints: vec![
                create_mock_endpoint(0x81, EndpointKind::Interrupt, 64),
                create_mock_endpoint(0x01, EndpointKind::Interrupt, 64),
            ],
        }],
    )
}

/// Create a list of mock HID devices at addresses 1..=count
pub fn create_mock_device_list(count: u8) -> Vec<DeviceInfo> {
    (1..=count).map(create_mock_hid_device).collect()
}

/// Scripted outcome of one read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockRead {
    /// The read returns these bytes
    Data(Vec<u8>),
    /// The read succeeds with zero bytes
    Empty,
    /// The read fails
    Fail(UsbError),
}

/// One operation observed by a [`MockConnection`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferRecord {
    Claim { interface: u8, force: bool },
    Release { interface: u8 },
    BulkRead { endpoint: u8, len: usize },
    BulkWrite { endpoint: u8, data: Vec<u8> },
    ControlRead { setup: ControlSetup, len: usize },
    ControlWrite { setup: ControlSetup, data: Vec<u8> },
}

/// Scripted USB connection that records every operation
#[derive(Debug)]
pub struct MockConnection {
    log: Mutex<Vec<TransferRecord>>,
    bulk_reads: Mutex<HashMap<u8, VecDeque<MockRead>>>,
    control_reads: Mutex<VecDeque<MockRead>>,
    rejected_claims: Mutex<HashSet<u8>>,
    write_failure: Mutex<Option<UsbError>>,
    idle_delay: Mutex<Duration>,
}

impl Default for MockConnection {
    fn default() -> Self {
        Self {
            log: Mutex::new(Vec::new()),
            bulk_reads: Mutex::new(HashMap::new()),
            control_reads: Mutex::new(VecDeque::new()),
            rejected_claims: Mutex::new(HashSet::new()),
            write_failure: Mutex::new(None),
            idle_delay: Mutex::new(DEFAULT_IDLE_DELAY),
        }
    }
}

impl MockConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome of the next bulk read on `endpoint`
    pub fn script_bulk_read(&self, endpoint: u8, read: MockRead) {
        self.bulk_reads
            .lock()
            .unwrap()
            .entry(endpoint)
            .or_default()
            .push_back(read);
    }

    /// Queue the outcome of the next control read
    pub fn script_control_read(&self, read: MockRead) {
        self.control_reads.lock().unwrap().push_back(read);
    }

    /// Make claims of `interface` fail
    pub fn reject_claim(&self, interface: u8) {
        self.rejected_claims.lock().unwrap().insert(interface);
    }

    /// Make every write fail with `error`
    pub fn fail_writes(&self, error: UsbError) {
        *self.write_failure.lock().unwrap() = Some(error);
    }

    /// How long unscripted reads block before timing out
    pub fn set_idle_delay(&self, delay: Duration) {
        *self.idle_delay.lock().unwrap() = delay;
    }

    /// Every operation observed so far
    pub fn records(&self) -> Vec<TransferRecord> {
        self.log.lock().unwrap().clone()
    }

    /// Write operations only, in order
    pub fn writes(&self) -> Vec<TransferRecord> {
        self.records()
            .into_iter()
            .filter(|r| {
                matches!(
                    r,
                    TransferRecord::BulkWrite { .. } | TransferRecord::ControlWrite { .. }
                )
            })
            .collect()
    }

    /// Interfaces released so far
    pub fn released(&self) -> Vec<u8> {
        self.records()
            .into_iter()
            .filter_map(|r| match r {
                TransferRecord::Release { interface } => Some(interface),
                _ => None,
            })
            .collect()
    }

    fn record(&self, record: TransferRecord) {
        self.log.lock().unwrap().push(record);
    }

    fn play(
        &self,
        scripted: Option<MockRead>,
        buf: &mut [u8],
        timeout: Duration,
    ) -> TransferResult {
        match scripted {
            Some(MockRead::Data(data)) => {
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                Ok(len)
            }
            Some(MockRead::Empty) => Ok(0),
            Some(MockRead::Fail(e)) => Err(e),
            None => {
                let delay = *self.idle_delay.lock().unwrap();
                std::thread::sleep(delay.min(timeout));
                Err(UsbError::Timeout)
            }
        }
    }

    fn write_result(&self, len: usize) -> TransferResult {
        match self.write_failure.lock().unwrap().clone() {
            Some(e) => Err(e),
            None => Ok(len),
        }
    }
}

impl UsbConnection for MockConnection {
    fn claim_interface(&self, interface: u8, force: bool) -> bool {
        self.record(TransferRecord::Claim { interface, force });
        !self.rejected_claims.lock().unwrap().contains(&interface)
    }

    fn release_interface(&self, interface: u8) {
        self.record(TransferRecord::Release { interface });
    }

    fn bulk_read(
        &self,
        endpoint: &EndpointRef,
        buf: &mut [u8],
        timeout: Duration,
    ) -> TransferResult {
        self.record(TransferRecord::BulkRead {
            endpoint: endpoint.address,
            len: buf.len(),
        });
        let scripted = self
            .bulk_reads
            .lock()
            .unwrap()
            .get_mut(&endpoint.address)
            .and_then(|queue| queue.pop_front());
        self.play(scripted, buf, timeout)
    }

    fn bulk_write(
        &self,
        endpoint: &EndpointRef,
        data: &[u8],
        _timeout: Duration,
    ) -> TransferResult {
        self.record(TransferRecord::BulkWrite {
            endpoint: endpoint.address,
            data: data.to_vec(),
        });
        self.write_result(data.len())
    }

    fn control_read(
        &self,
        setup: ControlSetup,
        buf: &mut [u8],
        timeout: Duration,
    ) -> TransferResult {
        self.record(TransferRecord::ControlRead {
            setup,
            len: buf.len(),
        });
        let scripted = self.control_reads.lock().unwrap().pop_front();
        self.play(scripted, buf, timeout)
    }

    fn control_write(
        &self,
        setup: ControlSetup,
        data: &[u8],
        _timeout: Duration,
    ) -> TransferResult {
        self.record(TransferRecord::ControlWrite {
            setup,
            data: data.to_vec(),
        });
        self.write_result(data.len())
    }
}

#[derive(Debug, Default)]
struct MockUsbState {
    devices: Mutex<Vec<DeviceInfo>>,
    connections: Mutex<HashMap<DeviceId, Arc<MockConnection>>>,
    open_failures: Mutex<HashMap<DeviceId, UsbError>>,
    opened: Mutex<Vec<DeviceId>>,
    hotplug_unregistered: AtomicBool,
}

/// Scripted USB backend
///
/// Clones share state, so a test can keep one handle while the controller
/// owns another.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    state: Arc<MockUsbState>,
}

impl MockBackend {
    pub fn with_devices(devices: Vec<DeviceInfo>) -> Self {
        let backend = Self::default();
        *backend.state.devices.lock().unwrap() = devices;
        backend
    }

    /// Replace the attached device set
    pub fn set_devices(&self, devices: Vec<DeviceInfo>) {
        *self.state.devices.lock().unwrap() = devices;
    }

    /// Connection that `open_device` will hand out for `device`
    pub fn connection(&self, device: DeviceId) -> Arc<MockConnection> {
        self.state
            .connections
            .lock()
            .unwrap()
            .entry(device)
            .or_insert_with(|| Arc::new(MockConnection::new()))
            .clone()
    }

    /// Make opening `device` fail with `error`
    pub fn fail_open(&self, device: DeviceId, error: UsbError) {
        self.state.open_failures.lock().unwrap().insert(device, error);
    }

    /// Devices opened so far, in order
    pub fn opened(&self) -> Vec<DeviceId> {
        self.state.opened.lock().unwrap().clone()
    }

    pub fn hotplug_unregistered(&self) -> bool {
        self.state.hotplug_unregistered.load(Ordering::SeqCst)
    }
}

impl UsbBackend for MockBackend {
    fn list_devices(&self) -> Result<Vec<DeviceInfo>, UsbError> {
        Ok(self.state.devices.lock().unwrap().clone())
    }

    fn open_device(&self, device: &DeviceInfo) -> Result<Arc<dyn UsbConnection>, UsbError> {
        if let Some(e) = self.state.open_failures.lock().unwrap().get(&device.id) {
            return Err(e.clone());
        }
        self.state.opened.lock().unwrap().push(device.id);
        let connection: Arc<dyn UsbConnection> = self.connection(device.id);
        Ok(connection)
    }

    fn handle_events(&self, timeout: Duration) -> Result<(), UsbError> {
        std::thread::sleep(timeout.min(DEFAULT_IDLE_DELAY));
        Ok(())
    }

    fn unregister_hotplug(&mut self) {
        self.state.hotplug_unregistered.store(true, Ordering::SeqCst);
    }
}

/// Recording permission broker
///
/// Without a reply channel it only records requests; tests deliver the
/// verdict themselves. With [`MockPermissionBroker::auto_reply`] it answers
/// every request on the command queue.
#[derive(Debug, Clone, Default)]
pub struct MockPermissionBroker {
    requests: Arc<Mutex<Vec<DeviceId>>>,
    granted: Arc<Mutex<HashSet<DeviceId>>>,
    reply: Option<(CommandSender, bool)>,
}

impl MockPermissionBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every request with `granted` on the command queue
    pub fn auto_reply(commands: CommandSender, granted: bool) -> Self {
        Self {
            reply: Some((commands, granted)),
            ..Self::default()
        }
    }

    /// Record access to `device` and return the matching result command
    pub fn grant(&self, device: DeviceId) -> TerminalCommand {
        self.granted.lock().unwrap().insert(device);
        TerminalCommand::PermissionResult {
            device,
            granted: true,
        }
    }

    /// Revoke access to `device`
    pub fn revoke(&self, device: DeviceId) {
        self.granted.lock().unwrap().remove(&device);
    }

    /// Devices permission was requested for, in order
    pub fn requests(&self) -> Vec<DeviceId> {
        self.requests.lock().unwrap().clone()
    }
}

impl PermissionBroker for MockPermissionBroker {
    fn request_permission(&self, device: &DeviceInfo) {
        self.requests.lock().unwrap().push(device.id);

        if let Some((commands, granted)) = &self.reply {
            if *granted {
                self.granted.lock().unwrap().insert(device.id);
            }
            let _ = commands.post(TerminalCommand::PermissionResult {
                device: device.id,
                granted: *granted,
            });
        }
    }

    fn has_permission(&self, device: DeviceId) -> bool {
        self.granted.lock().unwrap().contains(&device)
    }
}

/// Take every event currently queued
pub fn drain_events(events: &Receiver<TerminalEvent>) -> Vec<TerminalEvent> {
    std::iter::from_fn(|| events.try_recv().ok()).collect()
}

/// Collect events until one matches `done` or `timeout` elapses
///
/// The matching event is included. Returns `None` on timeout.
pub fn wait_for_event<F>(
    events: &Receiver<TerminalEvent>,
    timeout: Duration,
    mut done: F,
) -> Option<Vec<TerminalEvent>>
where
    F: FnMut(&TerminalEvent) -> bool,
{
    let deadline = Instant::now() + timeout;
    let mut seen = Vec::new();

    while Instant::now() < deadline {
        match events.try_recv() {
            Ok(event) => {
                let matched = done(&event);
                seen.push(event);
                if matched {
                    return Some(seen);
                }
            }
            Err(_) => std::thread::sleep(Duration::from_millis(1)),
        }
    }

    None
}

/// Timeout wrapper for async tests
///
/// Wraps an async operation with a timeout to prevent tests from hanging.
pub async fn with_timeout<T, F>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| TimeoutError { duration })
}

/// Error returned when a test times out
#[derive(Debug)]
pub struct TimeoutError {
    /// The timeout duration that was exceeded
    pub duration: Duration,
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Test timed out after {:?}", self.duration)
    }
}

impl std::error::Error for TimeoutError {}
