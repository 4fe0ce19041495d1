//! Test doubles shared by the unit tests of this crate.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use droid_container_core::{
    AndroidBridge, ContainerError, Device, DeviceChange, DeviceChangeListener, ListenerHandle,
    ListenerRegistry, Result,
};

/// In-memory bridge whose device notifications are fired by the test
#[derive(Debug)]
pub struct FakeBridge {
    adb_path: PathBuf,
    connected: AtomicBool,
    fail_connect: bool,
    connect_delay: Duration,
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
    pub listeners: ListenerRegistry,
}

impl FakeBridge {
    pub fn new(adb_path: impl Into<PathBuf>) -> Self {
        Self {
            adb_path: adb_path.into(),
            connected: AtomicBool::new(false),
            fail_connect: false,
            connect_delay: Duration::ZERO,
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
            listeners: ListenerRegistry::new(),
        }
    }

    pub fn connected(adb_path: impl Into<PathBuf>) -> Arc<Self> {
        let bridge = Self::new(adb_path);
        bridge.connected.store(true, Ordering::SeqCst);
        Arc::new(bridge)
    }

    pub fn failing(adb_path: impl Into<PathBuf>) -> Self {
        Self {
            fail_connect: true,
            ..Self::new(adb_path)
        }
    }

    /// Make `connect` take `delay` before it completes
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    /// Wait until some listener subscribed, then announce `device` online
    pub async fn bring_online(&self, device: &Device) {
        while self.listeners.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.listeners.notify_connected(device);
        let mut online = device.clone();
        online.state = droid_container_core::DeviceState::Online;
        self.listeners.notify_changed(&online, DeviceChange::STATE);
    }
}

#[async_trait]
impl AndroidBridge for FakeBridge {
    fn adb_path(&self) -> &Path {
        &self.adb_path
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }
        if self.fail_connect {
            return Err(ContainerError::BridgeConnection("daemon refused connection".into()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn add_device_listener(&self, listener: Arc<dyn DeviceChangeListener>) -> ListenerHandle {
        self.listeners.add(listener)
    }

    fn remove_device_listener(&self, handle: ListenerHandle) -> bool {
        self.listeners.remove(handle)
    }
}

/// Write an executable shell script into `dir`
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
