//! Device Connection Discovery
//!
//! Listener armed for one bootstrap attempt: it latches the first device that
//! connects to the bridge and flags it online once the bridge reports a state
//! change to online for that same device.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use droid_container_core::{Device, DeviceChange, DeviceChangeListener};

/// First-connected-device discovery
///
/// Only emulators are considered. A second emulator connecting before the
/// first one is read is ignored.
#[derive(Debug, Default)]
pub struct DeviceConnectDiscovery {
    discovered: Mutex<Option<Device>>,
    online: AtomicBool,
}

impl DeviceConnectDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the discovered device has been reported online
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    /// The latched device, if any device has connected yet
    pub fn discovered_device(&self) -> Option<Device> {
        self.discovered.lock().clone()
    }
}

impl DeviceChangeListener for DeviceConnectDiscovery {
    fn device_connected(&self, device: &Device) {
        if !device.is_emulator() {
            debug!("Ignoring non-emulator device {}", device.serial);
            return;
        }

        let mut discovered = self.discovered.lock();
        match discovered.as_ref() {
            None => {
                info!(
                    "Discovered an emulator device id={} connected to the bridge",
                    device.serial
                );
                *discovered = Some(device.clone());
            }
            Some(current) if current.is_same(device) => {
                debug!("Device {} reconnected", device.serial);
            }
            Some(current) => {
                warn!(
                    "Ignoring device {} connected while waiting for {}",
                    device.serial, current.serial
                );
            }
        }
    }

    fn device_disconnected(&self, _device: &Device) {}

    fn device_changed(&self, device: &Device, change: DeviceChange) {
        let mut discovered = self.discovered.lock();
        let Some(current) = discovered.as_mut() else {
            return;
        };

        if !current.is_same(device) {
            return;
        }

        // Keep the freshest snapshot (state, AVD name) of the latched device.
        let avd_name = device.avd_name.clone().or_else(|| current.avd_name.take());
        *current = Device {
            avd_name,
            ..device.clone()
        };

        if change.contains(DeviceChange::STATE) && device.is_online() {
            debug!("Device {} is online", device.serial);
            self.online.store(true, Ordering::Release);
        }
    }
}
