//! Async channel bridge between the front end and the controller thread
//!
//! Commands flow from the front end (Tokio) to the controller thread over a
//! bounded queue and are executed one at a time. Collaborators running on the
//! controller thread (hot-plug callbacks, the permission broker) post into a
//! separate unbounded queue that is drained first, so a full front-end queue
//! can never swallow a permission result or a removal. Events flow back over
//! an unbounded queue so the reader thread never blocks on a slow consumer.

use async_channel::{Receiver, Sender, bounded, unbounded};
use protocol::{DeviceId, DeviceInfo, DeviceList, ReceivedFrame, SendEncoding};

/// Capacity of the command queue
pub const COMMAND_QUEUE_CAPACITY: usize = 256;

/// Commands executed by the controller thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalCommand {
    /// Snapshot the attached devices
    EnumerateDevices,

    /// Request permission for a device of the last snapshot
    SelectDevice {
        /// Position in the last listed snapshot
        index: usize,
    },

    /// Encode and write a payload to every OUT endpoint
    SendData { payload: String },

    /// Change how `SendData` payloads are encoded
    SetEncoding { encoding: SendEncoding },

    /// Permission broker verdict for a requested device
    PermissionResult { device: DeviceId, granted: bool },

    /// A device was plugged in
    DeviceArrived { device: DeviceInfo },

    /// A device was unplugged
    DeviceLeft { device: DeviceId },

    /// Tear down the active session, if any
    Disconnect,

    /// Tear everything down and stop the controller loop
    Shutdown,
}

/// Events emitted to the front end
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalEvent {
    /// Result of `EnumerateDevices`, in selection order
    DevicesListed { devices: DeviceList },

    /// A device was plugged in
    DeviceConnected { device: DeviceInfo },

    /// Permission was granted and binding is about to start
    DeviceSelected { device: DeviceInfo },

    /// Session bound: interfaces claimed, reader running
    DeviceAttached { device: DeviceInfo },

    /// Session torn down; the reader has already stopped
    DeviceDisconnected { device: DeviceInfo },

    /// Bytes read from the device
    DataReceived { frame: ReceivedFrame },

    /// About to write `payload` to one OUT endpoint
    Sending { payload: String },

    /// One write attempt finished; `status` is a byte count or `-1`
    Sent { status: isize, bytes: Vec<u8> },

    /// A numeric payload could not be fully encoded
    SendError { message: String },

    /// Binding to a granted device failed; the list stays selectable
    BindFailed { device: DeviceInfo, message: String },

    /// A command was rejected
    CommandFailed { message: String },
}

/// Cloneable event emitter shared by the controller and the reader
#[derive(Clone, Debug)]
pub struct EventSink {
    event_tx: Sender<TerminalEvent>,
}

impl EventSink {
    /// Emit an event; dropped silently once the front end has gone away
    pub fn emit(&self, event: TerminalEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            tracing::debug!("Event dropped: {}", e);
        }
    }

    /// Create a sink and its receiving end
    pub fn channel() -> (Self, Receiver<TerminalEvent>) {
        let (event_tx, event_rx) = unbounded();
        (Self { event_tx }, event_rx)
    }
}

/// Cloneable command poster for collaborators living next to the controller
///
/// Posts go to the controller's internal queue, which is unbounded and
/// takes priority over front-end commands.
#[derive(Clone, Debug)]
pub struct CommandSender {
    internal_tx: Sender<TerminalCommand>,
}

impl CommandSender {
    /// Queue a command without blocking
    ///
    /// Fails only once the controller side has been dropped.
    pub fn post(&self, cmd: TerminalCommand) -> crate::Result<()> {
        self.internal_tx
            .try_send(cmd)
            .map_err(|_| crate::Error::Channel("command queue closed".to_string()))
    }
}

/// Handle for the front end (async)
#[derive(Clone)]
pub struct TerminalBridge {
    cmd_tx: Sender<TerminalCommand>,
    event_rx: Receiver<TerminalEvent>,
}

impl TerminalBridge {
    /// Send a command to the controller thread
    pub async fn send_command(&self, cmd: TerminalCommand) -> crate::Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Send a command from synchronous code
    pub fn send_command_blocking(&self, cmd: TerminalCommand) -> crate::Result<()> {
        self.cmd_tx
            .send_blocking(cmd)
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Receive the next event
    pub async fn recv_event(&self) -> crate::Result<TerminalEvent> {
        self.event_rx
            .recv()
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Receive the next event from synchronous code
    pub fn recv_event_blocking(&self) -> crate::Result<TerminalEvent> {
        self.event_rx
            .recv_blocking()
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Take an event if one is queued
    pub fn try_recv_event(&self) -> Option<TerminalEvent> {
        self.event_rx.try_recv().ok()
    }
}

/// Handle for the controller thread (blocking)
pub struct TerminalWorker {
    cmd_rx: Receiver<TerminalCommand>,
    internal_rx: Receiver<TerminalCommand>,
    internal_tx: Sender<TerminalCommand>,
    /// Event emitter (public so the controller can hand clones to the reader)
    pub events: EventSink,
}

impl TerminalWorker {
    /// Receive a command (blocking)
    ///
    /// Internal commands are returned first. Only the front-end queue is
    /// waited on, since internal posters run on the calling thread.
    pub fn recv_command(&self) -> crate::Result<TerminalCommand> {
        if let Ok(cmd) = self.internal_rx.try_recv() {
            return Ok(cmd);
        }
        self.cmd_rx
            .recv_blocking()
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Try to receive a command without blocking, internal commands first
    pub fn try_recv_command(&self) -> Option<TerminalCommand> {
        self.internal_rx
            .try_recv()
            .or_else(|_| self.cmd_rx.try_recv())
            .ok()
    }

    /// Poster for collaborators that feed commands back to the controller
    pub fn command_sender(&self) -> CommandSender {
        CommandSender {
            internal_tx: self.internal_tx.clone(),
        }
    }
}

/// Create the channel bridge between the front end and the controller
///
/// Returns (TerminalBridge for the front end, TerminalWorker for the controller)
pub fn create_terminal_bridge() -> (TerminalBridge, TerminalWorker) {
    let (cmd_tx, cmd_rx) = bounded(COMMAND_QUEUE_CAPACITY);
    let (internal_tx, internal_rx) = unbounded();
    let (events, event_rx) = EventSink::channel();

    (
        TerminalBridge { cmd_tx, event_rx },
        TerminalWorker {
            cmd_rx,
            internal_rx,
            internal_tx,
            events,
        },
    )
}
