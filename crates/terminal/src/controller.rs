//! Terminal controller
//!
//! Single-threaded owner of the terminal state. Commands from the front
//! end, the permission broker and hot-plug callbacks all arrive on one queue
//! and are executed in order; between commands the backend's event loop is
//! pumped so hot-plug callbacks can fire.

use crate::config::TerminalConfig;
use crate::usb::{
    DeviceSession, FilterPermissionBroker, PermissionNegotiator, ReaderState, RusbBackend, Writer,
};
use common::{
    EventSink, PermissionBroker, TerminalCommand, TerminalEvent, TerminalWorker, UsbBackend,
};
use protocol::{DeviceInfo, DeviceList, SendEncoding, TerminalError};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// How long one backend event pump may block
const EVENT_TIMEOUT: Duration = Duration::from_millis(100);

/// Behaviour switches taken from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerOptions {
    pub encoding: SendEncoding,
    pub auto_attach: bool,
    pub detach_kernel_driver: bool,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            encoding: SendEncoding::Raw,
            auto_attach: true,
            detach_kernel_driver: true,
        }
    }
}

impl From<&TerminalConfig> for ControllerOptions {
    fn from(config: &TerminalConfig) -> Self {
        Self {
            encoding: config.terminal.default_encoding,
            auto_attach: config.terminal.auto_attach,
            detach_kernel_driver: config.usb.detach_kernel_driver,
        }
    }
}

pub struct TerminalController {
    backend: Box<dyn UsbBackend>,
    negotiator: PermissionNegotiator,
    session: DeviceSession,
    writer: Writer,
    encoding: SendEncoding,
    devices: DeviceList,
    events: EventSink,
    auto_attach: bool,
}

impl TerminalController {
    pub fn new(
        backend: Box<dyn UsbBackend>,
        broker: Box<dyn PermissionBroker>,
        events: EventSink,
        options: ControllerOptions,
    ) -> Self {
        Self {
            backend,
            negotiator: PermissionNegotiator::new(broker),
            session: DeviceSession::new(events.clone(), options.detach_kernel_driver),
            writer: Writer::new(events.clone()),
            encoding: options.encoding,
            devices: DeviceList::default(),
            events,
            auto_attach: options.auto_attach,
        }
    }

    /// Execute one command
    pub fn handle_command(&mut self, cmd: TerminalCommand) -> Result<(), TerminalError> {
        match cmd {
            TerminalCommand::EnumerateDevices => {
                let devices = DeviceList::new(self.backend.list_devices()?);
                debug!("Listing {} devices", devices.len());
                self.devices = devices.clone();
                self.events.emit(TerminalEvent::DevicesListed { devices });
            }

            TerminalCommand::SelectDevice { index } => {
                self.negotiator.request_permission(index, &self.devices)?;
            }

            TerminalCommand::SendData { payload } => {
                self.writer.send(
                    &self.session,
                    self.negotiator.broker(),
                    &payload,
                    self.encoding,
                )?;
            }

            TerminalCommand::SetEncoding { encoding } => {
                info!("Send encoding set to {:?}", encoding);
                self.encoding = encoding;
            }

            TerminalCommand::PermissionResult { device, granted } => {
                if let Some(device) = self.negotiator.on_permission_result(device, granted) {
                    self.attach(device)?;
                }
            }

            TerminalCommand::DeviceArrived { device } => {
                info!("Device connected: {}", device);
                self.events.emit(TerminalEvent::DeviceConnected {
                    device: device.clone(),
                });
                if self.auto_attach && !self.session.is_bound() {
                    self.negotiator.request_for(device);
                }
            }

            TerminalCommand::DeviceLeft { device } => {
                self.negotiator.forget(device);
                if self.session.device().is_some_and(|d| d.id == device) {
                    info!("Bound device {} was unplugged", device);
                    self.session.unbind();
                } else {
                    debug!("Device {} left", device);
                }
            }

            TerminalCommand::Disconnect => {
                self.session.unbind();
            }

            TerminalCommand::Shutdown => {
                self.stop();
            }
        }

        Ok(())
    }

    fn attach(&mut self, device: DeviceInfo) -> Result<(), TerminalError> {
        self.events.emit(TerminalEvent::DeviceSelected {
            device: device.clone(),
        });

        if let Err(e) = self.session.bind(self.backend.as_ref(), device.clone()) {
            warn!("Failed to bind {}: {}", device, e);
            self.events.emit(TerminalEvent::BindFailed {
                device,
                message: e.to_string(),
            });
            return Err(e.into());
        }

        Ok(())
    }

    /// Tear down the session, pending permission and hot-plug listener
    pub fn stop(&mut self) {
        self.session.stop();
        self.negotiator.clear();
        self.backend.unregister_hotplug();
    }

    /// Run the command loop until `Shutdown`
    pub fn run(mut self, worker: TerminalWorker) {
        info!("Terminal controller started");

        'outer: loop {
            while let Some(cmd) = worker.try_recv_command() {
                let shutdown = cmd == TerminalCommand::Shutdown;
                self.dispatch(cmd);
                if shutdown {
                    info!("Terminal controller shutting down");
                    break 'outer;
                }
            }

            if let Err(e) = self.backend.handle_events(EVENT_TIMEOUT) {
                warn!("Error handling USB events: {}", e);
                std::thread::sleep(EVENT_TIMEOUT);
            }
        }

        info!("Terminal controller stopped");
    }

    /// Execute a command, surfacing rejections that have no dedicated event
    fn dispatch(&mut self, cmd: TerminalCommand) {
        debug!("Handling {:?}", cmd);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.handle_command(cmd)
        }));

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e @ (TerminalError::Select(_) | TerminalError::Usb(_)))) => {
                warn!("Command failed: {}", e);
                self.events.emit(TerminalEvent::CommandFailed {
                    message: e.to_string(),
                });
            }
            // Bind and encoding failures already emitted their own events
            Ok(Err(e)) => debug!("Command failed: {}", e),
            Err(e) => error!("Panic in terminal command handler: {:?}", e),
        }
    }

    pub fn session(&self) -> &DeviceSession {
        &self.session
    }

    pub fn devices(&self) -> &DeviceList {
        &self.devices
    }

    pub fn encoding(&self) -> SendEncoding {
        self.encoding
    }

    pub fn pending_device(&self) -> Option<&DeviceInfo> {
        self.negotiator.pending()
    }

    pub fn reader_state(&self) -> ReaderState {
        self.session.reader_state()
    }
}

/// Spawn the controller thread over libusb
///
/// The backend is created on the controller thread itself, since libusb
/// events and hot-plug callbacks are pumped from there.
pub fn spawn_terminal_controller(
    worker: TerminalWorker,
    config: &TerminalConfig,
) -> std::io::Result<std::thread::JoinHandle<anyhow::Result<()>>> {
    let filters = config.usb.filters.clone();
    let skip_root_hubs = config.usb.skip_root_hubs;
    let options = ControllerOptions::from(config);

    std::thread::Builder::new()
        .name("terminal-controller".to_string())
        .spawn(move || {
            let mut backend = RusbBackend::new(filters.clone(), skip_root_hubs)?;
            if let Err(e) = backend.register_hotplug(worker.command_sender()) {
                warn!("Failed to register hot-plug callbacks: {}", e);
            }

            let broker = FilterPermissionBroker::new(filters, worker.command_sender());
            let controller = TerminalController::new(
                Box::new(backend),
                Box::new(broker),
                worker.events.clone(),
                options,
            );
            controller.run(worker);
            Ok(())
        })
}
