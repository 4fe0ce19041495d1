//! Bridge Connector
//!
//! Creates the bridge when the container is configured, publishes it for the
//! rest of the session and tears it down on device shutdown.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::info;

use droid_container_core::{BridgeSlot, ContainerError, Event, EventBus, Result, SharedBridge};

use crate::adb::AdbBridge;

/// Builds a bridge for an adb executable and force flag
pub type BridgeFactory = Arc<dyn Fn(PathBuf, bool) -> SharedBridge + Send + Sync>;

/// Owner of the session's bridge
pub struct BridgeConnector {
    bridge: BridgeSlot,
    events: Arc<EventBus>,
    factory: BridgeFactory,
    // Serializes initialize so check and publish happen as one step.
    initializing: Mutex<()>,
}

impl BridgeConnector {
    /// Connector creating [`AdbBridge`]s
    pub fn new(events: Arc<EventBus>) -> Self {
        Self::with_factory(
            events,
            Arc::new(|adb_path: PathBuf, force: bool| {
                Arc::new(AdbBridge::new(adb_path, force)) as SharedBridge
            }),
        )
    }

    pub fn with_factory(events: Arc<EventBus>, factory: BridgeFactory) -> Self {
        Self {
            bridge: Arc::new(RwLock::new(None)),
            events,
            factory,
            initializing: Mutex::new(()),
        }
    }

    /// Slot other components read the published bridge from
    pub fn bridge_slot(&self) -> BridgeSlot {
        Arc::clone(&self.bridge)
    }

    /// The published bridge, if any
    pub fn bridge(&self) -> Option<SharedBridge> {
        self.bridge.read().clone()
    }

    /// Connect a new bridge and publish it
    pub async fn initialize(&self, adb_path: &Path, force: bool) -> Result<SharedBridge> {
        let _initializing = self.initializing.lock().await;

        let published = self.bridge.read().is_some();
        if published {
            return Err(ContainerError::IllegalState(
                "Android debug bridge is already initialized".into(),
            ));
        }

        let start = Instant::now();
        info!("Initializing Android Debug Bridge");

        let bridge = (self.factory)(adb_path.to_path_buf(), force);
        bridge.connect().await.map_err(bridge_failure)?;

        info!(
            "Android Debug Bridge was initialized in {}ms",
            start.elapsed().as_millis()
        );

        *self.bridge.write() = Some(Arc::clone(&bridge));
        self.events.emit(Event::BridgeInitialized(Arc::clone(&bridge)));

        Ok(bridge)
    }

    /// Disconnect and withdraw the published bridge
    pub async fn shutdown(&self) -> Result<()> {
        let bridge = self.bridge.write().take().ok_or_else(|| {
            ContainerError::BridgeConnection(
                "Android debug bridge was not initialized, nothing to disconnect".into(),
            )
        })?;

        info!("Disconnecting Android Debug Bridge");
        bridge.disconnect().await.map_err(bridge_failure)?;
        self.events.emit(Event::BridgeTerminated);

        Ok(())
    }
}

fn bridge_failure(err: ContainerError) -> ContainerError {
    match err {
        ContainerError::BridgeConnection(_) => err,
        other => ContainerError::BridgeConnection(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBridge;
    use droid_container_core::AndroidBridge;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    fn connector_with(bridge: Arc<FakeBridge>) -> (BridgeConnector, Arc<EventBus>) {
        let events = Arc::new(EventBus::new());
        let connector = BridgeConnector::with_factory(
            Arc::clone(&events),
            Arc::new(move |_: PathBuf, _: bool| Arc::clone(&bridge) as SharedBridge),
        );
        (connector, events)
    }

    #[tokio::test]
    async fn test_initialize_publishes_connected_bridge() {
        let fake = Arc::new(FakeBridge::new("/sdk/platform-tools/adb"));
        let (connector, events) = connector_with(Arc::clone(&fake));
        let subscription = events.subscribe();

        let bridge = connector
            .initialize(Path::new("/sdk/platform-tools/adb"), false)
            .await
            .unwrap();

        assert!(bridge.is_connected());
        assert!(connector.bridge_slot().read().is_some());
        assert_eq!(fake.connects.load(Ordering::SeqCst), 1);
        assert!(matches!(subscription.try_recv(), Ok(Event::BridgeInitialized(_))));
    }

    #[tokio::test]
    async fn test_failed_connect_publishes_nothing() {
        let fake = Arc::new(FakeBridge::failing("/sdk/platform-tools/adb"));
        let (connector, events) = connector_with(fake);
        let subscription = events.subscribe();

        let result = connector.initialize(Path::new("/sdk/platform-tools/adb"), true).await;

        assert!(matches!(result, Err(ContainerError::BridgeConnection(_))));
        assert!(connector.bridge().is_none());
        assert!(subscription.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_second_initialize_is_rejected() {
        let fake = Arc::new(FakeBridge::new("/sdk/platform-tools/adb"));
        let (connector, _events) = connector_with(fake);
        let adb = Path::new("/sdk/platform-tools/adb");

        assert_ok!(connector.initialize(adb, false).await);
        assert!(matches!(
            connector.initialize(adb, false).await,
            Err(ContainerError::IllegalState(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_initialize_connects_once() {
        let fake = Arc::new(
            FakeBridge::new("/sdk/platform-tools/adb").with_connect_delay(Duration::from_millis(50)),
        );
        let (connector, events) = connector_with(Arc::clone(&fake));
        let subscription = events.subscribe();
        let adb = Path::new("/sdk/platform-tools/adb");

        let (first, second) = tokio::join!(
            connector.initialize(adb, false),
            connector.initialize(adb, false)
        );

        assert_eq!(first.is_ok() as u8 + second.is_ok() as u8, 1);
        assert!(matches!(
            (first, second),
            (Ok(_), Err(ContainerError::IllegalState(_))) | (Err(ContainerError::IllegalState(_)), Ok(_))
        ));
        assert_eq!(fake.connects.load(Ordering::SeqCst), 1);
        assert_eq!(subscription.drain().len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_twice_fails_second_time() {
        let fake = Arc::new(FakeBridge::new("/sdk/platform-tools/adb"));
        let (connector, events) = connector_with(Arc::clone(&fake));
        connector
            .initialize(Path::new("/sdk/platform-tools/adb"), false)
            .await
            .unwrap();
        let subscription = events.subscribe();

        assert_ok!(connector.shutdown().await);
        assert!(!fake.is_connected());
        assert!(matches!(subscription.try_recv(), Ok(Event::BridgeTerminated)));

        let second = connector.shutdown().await;
        assert!(matches!(second, Err(ContainerError::BridgeConnection(_))));
        assert_eq!(fake.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_without_initialize_fails() {
        let events = Arc::new(EventBus::new());
        let connector = BridgeConnector::new(events);
        assert_err!(connector.shutdown().await);
    }
}
