//! Device access permission
//!
//! [`PermissionNegotiator`] tracks the single outstanding permission
//! request. [`FilterPermissionBroker`] is the broker used on hosts where
//! access is decided by configuration rather than by a user prompt.

use super::filter::check_filter;
use common::{CommandSender, PermissionBroker, TerminalCommand};
use protocol::{DeviceId, DeviceInfo, DeviceList, SelectError};
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Resolves selections and matches broker verdicts to the pending request
pub struct PermissionNegotiator {
    broker: Box<dyn PermissionBroker>,
    pending: Option<DeviceInfo>,
}

impl PermissionNegotiator {
    pub fn new(broker: Box<dyn PermissionBroker>) -> Self {
        Self {
            broker,
            pending: None,
        }
    }

    /// Ask for access to the device at `index` of `devices`
    ///
    /// Exactly one request is issued on success, none on error. A newer
    /// request supersedes an unresolved one.
    pub fn request_permission(
        &mut self,
        index: usize,
        devices: &DeviceList,
    ) -> Result<DeviceInfo, SelectError> {
        let device = devices
            .get(index)
            .cloned()
            .ok_or(SelectError::IndexOutOfRange {
                index,
                len: devices.len(),
            })?;

        self.request_for(device.clone());
        Ok(device)
    }

    /// Ask for access to a device supplied directly
    pub fn request_for(&mut self, device: DeviceInfo) {
        if let Some(previous) = &self.pending
            && previous.id != device.id
        {
            debug!(
                "Permission request for {} supersedes {}",
                device.id, previous.id
            );
        }

        info!("Requesting permission for {}", device);
        self.broker.request_permission(&device);
        self.pending = Some(device);
    }

    /// Match a broker verdict to the pending request
    ///
    /// Returns the device to bind when `granted` answers the pending request.
    /// Verdicts for superseded requests are ignored.
    pub fn on_permission_result(&mut self, device: DeviceId, granted: bool) -> Option<DeviceInfo> {
        match &self.pending {
            Some(pending) if pending.id == device => {}
            _ => {
                debug!("Ignoring permission result for {} (not pending)", device);
                return None;
            }
        }

        let pending = self.pending.take();
        if granted {
            info!("Permission granted for {}", device);
            pending
        } else {
            warn!("Permission denied for {}", device);
            None
        }
    }

    /// Drop the pending request if it is for `device`
    pub fn forget(&mut self, device: DeviceId) {
        if self.pending.as_ref().is_some_and(|p| p.id == device) {
            self.pending = None;
        }
    }

    pub fn clear(&mut self) {
        self.pending = None;
    }

    pub fn pending(&self) -> Option<&DeviceInfo> {
        self.pending.as_ref()
    }

    pub fn broker(&self) -> &dyn PermissionBroker {
        self.broker.as_ref()
    }
}

/// Grants access to devices matching the configured VID:PID filters
///
/// With no filters every device is granted. The verdict is posted back on
/// the command queue.
pub struct FilterPermissionBroker {
    filters: Vec<String>,
    granted: Mutex<HashSet<DeviceId>>,
    commands: CommandSender,
}

impl FilterPermissionBroker {
    pub fn new(filters: Vec<String>, commands: CommandSender) -> Self {
        Self {
            filters,
            granted: Mutex::new(HashSet::new()),
            commands,
        }
    }
}

impl PermissionBroker for FilterPermissionBroker {
    fn request_permission(&self, device: &DeviceInfo) {
        let granted = check_filter(device.vendor_id, device.product_id, &self.filters);
        if granted && let Ok(mut set) = self.granted.lock() {
            set.insert(device.id);
        }

        if let Err(e) = self.commands.post(TerminalCommand::PermissionResult {
            device: device.id,
            granted,
        }) {
            warn!("Failed to post permission result for {}: {}", device.id, e);
        }
    }

    fn has_permission(&self, device: DeviceId) -> bool {
        self.granted
            .lock()
            .map(|set| set.contains(&device))
            .unwrap_or(false)
    }
}
