//! Managed Container
//!
//! Wires the bridge connector and the emulator startup to the container's
//! lifecycle events.

use std::sync::Arc;

use tracing::{debug, info};

use droid_container_core::{
    AndroidSdk, ContainerConfig, ContainerError, Device, Event, EventBus, Result,
};

use crate::connector::{BridgeConnector, BridgeFactory};
use crate::startup::EmulatorStartup;

/// Container session for one AVD
pub struct ManagedContainer {
    config: ContainerConfig,
    sdk: AndroidSdk,
    events: Arc<EventBus>,
    connector: BridgeConnector,
    startup: EmulatorStartup,
}

impl ManagedContainer {
    pub fn new(config: ContainerConfig, sdk: AndroidSdk) -> Self {
        let events = Arc::new(EventBus::new());
        let connector = BridgeConnector::new(Arc::clone(&events));
        Self::assemble(config, sdk, events, connector)
    }

    /// Container whose bridges are built by `factory`
    pub fn with_bridge_factory(
        config: ContainerConfig,
        sdk: AndroidSdk,
        factory: BridgeFactory,
    ) -> Self {
        let events = Arc::new(EventBus::new());
        let connector = BridgeConnector::with_factory(Arc::clone(&events), factory);
        Self::assemble(config, sdk, events, connector)
    }

    fn assemble(
        config: ContainerConfig,
        sdk: AndroidSdk,
        events: Arc<EventBus>,
        connector: BridgeConnector,
    ) -> Self {
        let startup = EmulatorStartup::new(
            config.clone(),
            sdk.clone(),
            connector.bridge_slot(),
            Arc::clone(&events),
        );

        Self {
            config,
            sdk,
            events,
            connector,
            startup,
        }
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn connector(&self) -> &BridgeConnector {
        &self.connector
    }

    pub fn startup(&self) -> &EmulatorStartup {
        &self.startup
    }

    /// Replace the startup, e.g. to tune its poll interval
    pub fn map_startup(mut self, f: impl FnOnce(EmulatorStartup) -> EmulatorStartup) -> Self {
        self.startup = f(self.startup);
        self
    }

    /// React to a lifecycle event
    ///
    /// Events produced by the container itself are ignored.
    pub async fn handle(&self, event: &Event) -> Result<()> {
        match event {
            Event::ContainerConfigured { sdk, force } => {
                self.connector.initialize(sdk.adb_path(), *force).await?;
            }
            Event::VirtualDeviceAvailable => {
                self.startup.create_emulator().await?;
            }
            Event::DeviceShutdown => {
                self.connector.shutdown().await?;
            }
            other => debug!("Ignoring {} event", other.name()),
        }
        Ok(())
    }

    /// Publish `event` to subscribers, then handle it
    pub async fn fire(&self, event: Event) -> Result<()> {
        self.events.emit(event.clone());
        self.handle(&event).await
    }

    /// Abort a running [`start`](Self::start), including a pending bridge connect
    pub fn interrupt(&self) {
        self.startup.interrupt();
    }

    /// Connect the bridge and bring the emulator up
    pub async fn start(&self) -> Result<Device> {
        let cancel = self.startup.cancellation_token();
        let configured = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Startup interrupted while connecting the bridge");
                self.startup.clear_interrupt();
                Err(ContainerError::android_execution(
                    "Emulator device startup failed.",
                    ContainerError::InterruptedWait,
                ))
            }
            configured = self.fire(Event::ContainerConfigured {
                sdk: self.sdk.clone(),
                force: self.config.force,
            }) => configured,
        };
        configured?;

        self.fire(Event::VirtualDeviceAvailable).await?;

        self.startup.device().ok_or_else(|| {
            ContainerError::IllegalState(
                "Emulator startup finished without a device".into(),
            )
        })
    }

    /// Kill the emulator and release the bridge
    pub async fn stop(&self) -> Result<()> {
        if let Some(mut emulator) = self.startup.take_emulator().await {
            info!("Stopping emulator {}", emulator);
            emulator.kill().await?;
        }
        self.fire(Event::DeviceShutdown).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::testing::{write_script, FakeBridge};
    use droid_container_core::{AndroidBridge, DeviceState, SharedBridge};
    use std::path::PathBuf;
    use std::time::Duration;
    use tokio_test::assert_ok;

    fn container(dir: &std::path::Path, bridge: Arc<FakeBridge>) -> ManagedContainer {
        let adb = write_script(dir, "adb", "echo '[ro.runtime.firstboot]: [1]'");
        let emulator = write_script(dir, "emulator", "exec sleep 30");

        let mut config = ContainerConfig::for_avd("test1");
        config.emulator_bootup_timeout_in_seconds = 10;
        let sdk = AndroidSdk::new(dir.to_path_buf())
            .with_adb_path(adb)
            .with_emulator_path(emulator);

        ManagedContainer::with_bridge_factory(
            config,
            sdk,
            Arc::new(move |_: PathBuf, _: bool| Arc::clone(&bridge) as SharedBridge),
        )
        .map_startup(|startup| startup.with_poll_interval(Duration::from_millis(100)))
    }

    #[tokio::test]
    async fn test_lifecycle_events_drive_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = Arc::new(FakeBridge::new(dir.path().join("adb")));
        let container = container(dir.path(), Arc::clone(&bridge));
        let subscription = container.events().subscribe();

        let notifier = Arc::clone(&bridge);
        tokio::spawn(async move {
            notifier
                .bring_online(&Device::new("emulator-5556", DeviceState::Offline))
                .await;
        });

        let device = container.start().await.unwrap();
        assert_eq!(device.serial, "emulator-5556");
        assert!(bridge.is_connected());

        assert_ok!(container.stop().await);
        assert!(container.connector().bridge().is_none());

        let names: Vec<_> = subscription.drain().iter().map(Event::name).collect();
        assert_eq!(
            names,
            vec![
                "ContainerConfigured",
                "BridgeInitialized",
                "VirtualDeviceAvailable",
                "SdCardCreate",
                "DeviceReady",
                "DeviceShutdown",
                "BridgeTerminated",
            ]
        );
    }

    #[tokio::test]
    async fn test_interrupt_stops_pending_bridge_connect() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = Arc::new(
            FakeBridge::new(dir.path().join("adb")).with_connect_delay(Duration::from_secs(3600)),
        );
        let container = container(dir.path(), Arc::clone(&bridge));

        let started = std::time::Instant::now();
        let (result, _) = tokio::join!(container.start(), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            container.interrupt();
        });

        let err = result.unwrap_err();
        assert!(matches!(err.root_cause(), ContainerError::InterruptedWait));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(container.connector().bridge().is_none());
        assert!(!container.startup().cancellation_token().is_cancelled());
    }

    #[tokio::test]
    async fn test_device_available_before_configuration_fails() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = Arc::new(FakeBridge::new(dir.path().join("adb")));
        let container = container(dir.path(), bridge);

        let result = container.handle(&Event::VirtualDeviceAvailable).await;
        assert!(matches!(result, Err(ContainerError::IllegalState(_))));
    }

    #[tokio::test]
    async fn test_produced_events_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = Arc::new(FakeBridge::new(dir.path().join("adb")));
        let container = container(dir.path(), Arc::clone(&bridge));

        assert_ok!(container.handle(&Event::BridgeTerminated).await);
        assert_ok!(container.handle(&Event::SdCardCreate { spec: None }).await);
        assert_eq!(bridge.connects.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}
