//! ADB (Android Debug Bridge) Client
//!
//! [`AndroidBridge`] implementation backed by the `adb` executable. Connecting
//! starts the adb server and a monitor task that turns `adb devices` snapshots
//! into connect/change/disconnect notifications.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use droid_container_core::{
    AndroidBridge, ContainerError, Device, DeviceChange, DeviceChangeListener, DeviceState,
    DeviceType, ListenerHandle, ListenerRegistry, Result,
};

/// Upper bound for starting the adb server
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// How often the device list is refreshed
pub const DEVICE_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Upper bound for a single adb client command
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Run an adb command and return its stdout
async fn run(adb_path: &Path, args: &[&str]) -> Result<String> {
    run_with_timeout(adb_path, args, COMMAND_TIMEOUT).await
}

async fn run_with_timeout(adb_path: &Path, args: &[&str], limit: Duration) -> Result<String> {
    debug!("adb {:?}", args);
    let command = format!("{} {}", adb_path.display(), args.join(" "));

    let running = Command::new(adb_path)
        .args(args)
        .kill_on_drop(true)
        .output();

    let output = tokio::time::timeout(limit, running)
        .await
        .map_err(|_| ContainerError::Execution {
            command: command.clone(),
            message: format!("timed out after {} ms", limit.as_millis()),
        })?
        .map_err(|source| ContainerError::ProcessLaunch {
            command: command.clone(),
            source,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ContainerError::Execution {
            command,
            message: format!("exited with {}: {}", output.status, stderr.trim()),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Parse the output of `adb devices -l`
pub fn parse_devices(output: &str) -> Vec<Device> {
    let mut devices = Vec::new();

    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('*') || line.starts_with("List of devices") {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 2 {
            continue;
        }

        let mut device = Device::new(parts[0], DeviceState::from_adb(parts[1]));

        for part in parts.iter().skip(2) {
            if let Some(value) = part.strip_prefix("model:") {
                device.model = Some(value.to_string());
            } else if let Some(value) = part.strip_prefix("product:") {
                device.product = Some(value.to_string());
            } else if let Some(value) = part.strip_prefix("transport_id:") {
                device.transport_id = value.parse().ok();
            }
        }

        devices.push(device);
    }

    devices
}

/// Parse the output of `adb -s <serial> emu avd name`
pub fn parse_avd_name(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && *line != "OK")
        .map(str::to_string)
}

/// Notification derived from two consecutive device snapshots
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    Connected(Device),
    Changed(Device, DeviceChange),
    Disconnected(Device),
}

/// Compare the known devices with a fresh snapshot
pub fn diff_devices(known: &HashMap<String, Device>, current: &[Device]) -> Vec<DeviceEvent> {
    let mut events = Vec::new();

    for device in current {
        match known.get(&device.serial) {
            None => {
                events.push(DeviceEvent::Connected(device.clone()));
                if device.is_online() {
                    events.push(DeviceEvent::Changed(device.clone(), DeviceChange::STATE));
                }
            }
            Some(previous) if previous.state != device.state => {
                events.push(DeviceEvent::Changed(device.clone(), DeviceChange::STATE));
            }
            Some(_) => {}
        }
    }

    for (serial, previous) in known {
        if !current.iter().any(|d| &d.serial == serial) {
            events.push(DeviceEvent::Disconnected(previous.clone()));
        }
    }

    events
}

#[derive(Debug)]
struct DeviceMonitor {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Bridge to the adb server
#[derive(Debug)]
pub struct AdbBridge {
    adb_path: PathBuf,
    force: bool,
    poll_interval: Duration,
    connected: AtomicBool,
    listeners: Arc<ListenerRegistry>,
    monitor: Mutex<Option<DeviceMonitor>>,
}

impl AdbBridge {
    /// Create a bridge for the given adb executable
    ///
    /// With `force` the adb server is restarted on connect.
    pub fn new(adb_path: PathBuf, force: bool) -> Self {
        Self {
            adb_path,
            force,
            poll_interval: DEVICE_POLL_INTERVAL,
            connected: AtomicBool::new(false),
            listeners: Arc::new(ListenerRegistry::new()),
            monitor: Mutex::new(None),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// List connected devices
    pub async fn list_devices(&self) -> Result<Vec<Device>> {
        let output = run(&self.adb_path, &["devices", "-l"]).await?;
        Ok(parse_devices(&output))
    }
}

#[async_trait]
impl AndroidBridge for AdbBridge {
    fn adb_path(&self) -> &Path {
        &self.adb_path
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn connect(&self) -> Result<()> {
        if self.is_connected() {
            debug!("Bridge already connected");
            return Ok(());
        }

        if self.force {
            info!("Restarting adb server");
            if let Err(e) = run(&self.adb_path, &["kill-server"]).await {
                warn!("Unable to stop adb server: {}", e);
            }
        }

        run_with_timeout(&self.adb_path, &["start-server"], CONNECT_TIMEOUT)
            .await
            .map_err(|e| {
                ContainerError::BridgeConnection(format!(
                    "unable to start adb server using {}: {}",
                    self.adb_path.display(),
                    e
                ))
            })?;

        // Devices attached before the bridge came up are not news to listeners.
        let baseline: HashMap<String, Device> = self
            .list_devices()
            .await
            .map_err(|e| ContainerError::BridgeConnection(format!("unable to list devices: {}", e)))?
            .into_iter()
            .map(|d| (d.serial.clone(), d))
            .collect();
        debug!("{} devices attached before connect", baseline.len());

        let cancel = CancellationToken::new();
        let task = tokio::spawn(monitor_devices(
            self.adb_path.clone(),
            baseline,
            Arc::clone(&self.listeners),
            self.poll_interval,
            cancel.clone(),
        ));
        *self.monitor.lock() = Some(DeviceMonitor { cancel, task });
        self.connected.store(true, Ordering::Release);

        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let monitor = self.monitor.lock().take();
        self.connected.store(false, Ordering::Release);

        if let Some(monitor) = monitor {
            monitor.cancel.cancel();
            monitor.task.await.map_err(|e| {
                ContainerError::BridgeConnection(format!("device monitor failed: {}", e))
            })?;
        }

        Ok(())
    }

    fn add_device_listener(&self, listener: Arc<dyn DeviceChangeListener>) -> ListenerHandle {
        self.listeners.add(listener)
    }

    fn remove_device_listener(&self, handle: ListenerHandle) -> bool {
        self.listeners.remove(handle)
    }
}

async fn monitor_devices(
    adb_path: PathBuf,
    mut known: HashMap<String, Device>,
    listeners: Arc<ListenerRegistry>,
    interval: Duration,
    cancel: CancellationToken,
) {
    loop {
        let listed = tokio::select! {
            _ = cancel.cancelled() => break,
            listed = run(&adb_path, &["devices", "-l"]) => listed,
        };

        match listed {
            Ok(output) => {
                let mut current = parse_devices(&output);
                for device in current.iter_mut() {
                    device.avd_name = match known.get(&device.serial) {
                        Some(previous) => previous.avd_name.clone(),
                        None if device.device_type == DeviceType::Emulator => {
                            query_avd_name(&adb_path, &device.serial).await
                        }
                        None => None,
                    };
                }

                for event in diff_devices(&known, &current) {
                    match event {
                        DeviceEvent::Connected(device) => listeners.notify_connected(&device),
                        DeviceEvent::Changed(device, change) => {
                            listeners.notify_changed(&device, change)
                        }
                        DeviceEvent::Disconnected(device) => listeners.notify_disconnected(&device),
                    }
                }

                known = current.into_iter().map(|d| (d.serial.clone(), d)).collect();
            }
            Err(e) => warn!("Unable to list devices: {}", e),
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    debug!("Device monitor stopped");
}

async fn query_avd_name(adb_path: &Path, serial: &str) -> Option<String> {
    match run(adb_path, &["-s", serial, "emu", "avd", "name"]).await {
        Ok(output) => parse_avd_name(&output),
        Err(e) => {
            debug!("No AVD name for {}: {}", serial, e);
            None
        }
    }
}
