//! Bridge Abstraction
//!
//! The device-management bridge as seen by the container: a connection that
//! can be opened and closed, and a notification stream of device
//! connect/disconnect/change events that listeners subscribe to with an
//! explicit handle.

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::device::{Device, DeviceChange};
use crate::error::Result;

/// Receives device notifications from a bridge
///
/// Callbacks are invoked from the bridge's own task, concurrently with
/// whoever reads the listener's state.
pub trait DeviceChangeListener: Send + Sync {
    fn device_connected(&self, device: &Device);

    fn device_disconnected(&self, device: &Device);

    fn device_changed(&self, device: &Device, change: DeviceChange);
}

/// Subscription returned by [`AndroidBridge::add_device_listener`]
///
/// Not clonable: the one handle is what removes the listener again.
#[derive(Debug, PartialEq, Eq, Hash)]
#[must_use = "a listener handle is needed to unsubscribe"]
pub struct ListenerHandle(u64);

/// Live connection to the device-management daemon
#[async_trait]
pub trait AndroidBridge: fmt::Debug + Send + Sync {
    /// Path of the bridge executable
    fn adb_path(&self) -> &Path;

    /// Whether the bridge is currently connected
    fn is_connected(&self) -> bool;

    /// Open the connection
    async fn connect(&self) -> Result<()>;

    /// Close the connection
    async fn disconnect(&self) -> Result<()>;

    /// Subscribe to device notifications
    fn add_device_listener(&self, listener: Arc<dyn DeviceChangeListener>) -> ListenerHandle;

    /// Unsubscribe; returns false if the handle was not registered
    fn remove_device_listener(&self, handle: ListenerHandle) -> bool;
}

/// Bridge handle shared across the container
pub type SharedBridge = Arc<dyn AndroidBridge>;

/// Slot holding the bridge published for the session
pub type BridgeSlot = Arc<RwLock<Option<SharedBridge>>>;

/// Thread-safe set of device listeners
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(u64, Arc<dyn DeviceChangeListener>)>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener
    pub fn add(&self, listener: Arc<dyn DeviceChangeListener>) -> ListenerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.write().push((id, listener));
        debug!("Registered device listener #{}", id);
        ListenerHandle(id)
    }

    /// Remove a listener
    pub fn remove(&self, handle: ListenerHandle) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(id, _)| *id != handle.0);
        let removed = listeners.len() != before;
        debug!("Removed device listener #{}: {}", handle.0, removed);
        removed
    }

    /// Get the number of registered listeners
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    pub fn notify_connected(&self, device: &Device) {
        for listener in self.snapshot() {
            listener.device_connected(device);
        }
    }

    pub fn notify_disconnected(&self, device: &Device) {
        for listener in self.snapshot() {
            listener.device_disconnected(device);
        }
    }

    pub fn notify_changed(&self, device: &Device, change: DeviceChange) {
        for listener in self.snapshot() {
            listener.device_changed(device, change);
        }
    }

    // Callbacks run without the lock held so a listener may unsubscribe itself.
    fn snapshot(&self) -> Vec<Arc<dyn DeviceChangeListener>> {
        self.listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}
