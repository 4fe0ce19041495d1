//! Emulator Startup
//!
//! Starts the emulator for the configured AVD and waits, within one overall
//! timeout, until the device it registers with the bridge is online and has
//! finished booting.
//!
//! State machine per attempt:
//! `Start -> BridgeChecked -> AuxStorageRequested -> ProcessSpawned ->
//! WaitingOnline -> Online -> WaitingBooted -> Ready`, with `Failed`
//! reachable from every non-terminal state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex as SyncMutex, RwLock};
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use droid_container_core::{
    AndroidSdk, BridgeSlot, ContainerConfig, ContainerError, Device, Event, EventBus, Result,
    SharedBridge,
};

use crate::countdown::Countdown;
use crate::discovery::DeviceConnectDiscovery;
use crate::emulator::{EmulatorCommand, EmulatorProcess};
use crate::process::{command_line, ProcessExecutor};

/// Property listed by `getprop` once the first boot has completed
pub const BOOT_COMPLETED_MARKER: &str = "[ro.runtime.firstboot]";

/// Granularity of both waits
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Progress of a bootstrap attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupState {
    Start,
    BridgeChecked,
    AuxStorageRequested,
    ProcessSpawned,
    WaitingOnline,
    Online,
    WaitingBooted,
    Ready,
    Failed,
}

/// Emulator bootstrap orchestrator
pub struct EmulatorStartup {
    config: ContainerConfig,
    sdk: AndroidSdk,
    bridge: BridgeSlot,
    events: Arc<EventBus>,
    cancel: SyncMutex<CancellationToken>,
    poll_interval: Duration,
    state: RwLock<StartupState>,
    emulator: Mutex<Option<EmulatorProcess>>,
    device: RwLock<Option<Device>>,
}

impl EmulatorStartup {
    pub fn new(
        config: ContainerConfig,
        sdk: AndroidSdk,
        bridge: BridgeSlot,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            config,
            sdk,
            bridge,
            events,
            cancel: SyncMutex::new(CancellationToken::new()),
            poll_interval: DEFAULT_POLL_INTERVAL,
            state: RwLock::new(StartupState::Start),
            emulator: Mutex::new(None),
            device: RwLock::new(None),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Current state of the last attempt
    pub fn state(&self) -> StartupState {
        *self.state.read()
    }

    /// Device published by the last successful attempt
    pub fn device(&self) -> Option<Device> {
        self.device.read().clone()
    }

    /// Whether the spawned emulator process is still alive
    pub async fn is_emulator_running(&self) -> bool {
        match self.emulator.lock().await.as_mut() {
            Some(emulator) => emulator.is_running(),
            None => false,
        }
    }

    /// The emulator process published by the last attempt
    pub async fn emulator(&self) -> MutexGuard<'_, Option<EmulatorProcess>> {
        self.emulator.lock().await
    }

    /// Hand over the emulator process, e.g. to terminate it
    pub async fn take_emulator(&self) -> Option<EmulatorProcess> {
        self.emulator.lock().await.take()
    }

    /// Abort the running or the next attempt
    ///
    /// An attempt that is running fails with an interruption and leaves the
    /// emulator running. If no wait has started yet, the next
    /// [`create_emulator`](Self::create_emulator) fails before spawning.
    pub fn interrupt(&self) {
        info!("Interrupting emulator startup for {}", self.config.avd_name);
        self.cancel.lock().cancel();
    }

    /// Token fired by [`interrupt`](Self::interrupt)
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.lock().clone()
    }

    /// Forget a consumed interruption so later attempts run normally
    pub fn clear_interrupt(&self) {
        let mut cancel = self.cancel.lock();
        if cancel.is_cancelled() {
            *cancel = CancellationToken::new();
        }
    }

    fn set_state(&self, state: StartupState) {
        let mut current = self.state.write();
        debug!("State transition: {:?} -> {:?}", *current, state);
        *current = state;
    }

    /// Start the emulator and wait for it to be online and booted
    pub async fn create_emulator(&self) -> Result<Device> {
        self.set_state(StartupState::Start);

        let result = self.bootstrap().await;
        self.clear_interrupt();

        match result {
            Ok(device) => Ok(device),
            Err(e) => {
                self.set_state(StartupState::Failed);
                error!("Emulator startup for {} failed: {}", self.config.avd_name, e);
                Err(e)
            }
        }
    }

    async fn bootstrap(&self) -> Result<Device> {
        let executor = ProcessExecutor::with_cancellation(self.cancellation_token());

        let bridge = self.connected_bridge()?;
        self.set_state(StartupState::BridgeChecked);

        if executor.cancellation_token().is_cancelled() {
            return Err(startup_failure(ContainerError::InterruptedWait));
        }

        debug!("Requesting storage image for {}", self.config.avd_name);
        self.events.emit(Event::SdCardCreate {
            spec: self.config.sd_card.clone(),
        });
        self.set_state(StartupState::AuxStorageRequested);

        let countdown = Countdown::from_secs(self.config.emulator_bootup_timeout_in_seconds);
        info!(
            "Waiting {} seconds for emulator {} to be started and connected",
            countdown.timeout().as_secs(),
            self.config.avd_name
        );

        // Armed before the spawn so the device's connect event cannot be missed.
        let discovery = Arc::new(DeviceConnectDiscovery::new());
        let handle = bridge.add_device_listener(discovery.clone());

        let result = self
            .spawn_and_wait(&executor, &bridge, &discovery, &countdown)
            .await;

        if !bridge.remove_device_listener(handle) {
            warn!("Device listener was already removed from the bridge");
        }
        let device = result?;

        *self.device.write() = Some(device.clone());
        self.set_state(StartupState::Ready);
        self.events.emit(Event::DeviceReady(device.clone()));

        Ok(device)
    }

    fn connected_bridge(&self) -> Result<SharedBridge> {
        let bridge = self.bridge.read().clone();
        match bridge {
            Some(bridge) if bridge.is_connected() => Ok(bridge),
            _ => Err(ContainerError::IllegalState(
                "Android debug bridge must be connected in order to spawn the emulator".into(),
            )),
        }
    }

    async fn spawn_and_wait(
        &self,
        executor: &ProcessExecutor,
        bridge: &SharedBridge,
        discovery: &DeviceConnectDiscovery,
        countdown: &Countdown,
    ) -> Result<Device> {
        self.start_emulator(executor).await?;

        info!(
            "Emulator process started, {} seconds remaining to start the device {}",
            countdown.time_left().as_secs(),
            self.config.avd_name
        );

        self.wait_until_boot_is_complete(executor, bridge, discovery, countdown)
            .await
            .map_err(startup_failure)
    }

    async fn start_emulator(&self, executor: &ProcessExecutor) -> Result<()> {
        let command = EmulatorCommand::from_config(self.sdk.emulator_path(), &self.config).to_args();
        info!("Emulator command -> {}", command_line(&command));

        let child = executor
            .spawn(&command)
            .map_err(|e| ContainerError::EmulatorLaunch {
                avd_name: self.config.avd_name.clone(),
                options: self.config.emulator_options.clone(),
                command: command_line(&command),
                source: Box::new(e),
            })?;

        let mut emulator = self.emulator.lock().await;
        if emulator.is_some() {
            warn!("Replacing the handle of a previously started emulator");
        }
        *emulator = Some(EmulatorProcess::new(
            self.config.avd_name.clone(),
            command,
            child,
        ));
        drop(emulator);

        self.set_state(StartupState::ProcessSpawned);
        Ok(())
    }

    async fn wait_until_boot_is_complete(
        &self,
        executor: &ProcessExecutor,
        bridge: &SharedBridge,
        discovery: &DeviceConnectDiscovery,
        countdown: &Countdown,
    ) -> Result<Device> {
        self.set_state(StartupState::WaitingOnline);

        let online = executor
            .schedule_until_true(
                || {
                    let online = discovery.is_online();
                    async move { Ok::<_, ContainerError>(online) }
                },
                countdown.time_left(),
                self.poll_interval,
            )
            .await?;

        if !online {
            return Err(ContainerError::IllegalState(format!(
                "No emulator device was brought online during {} seconds to Android Debug Bridge. \
                 Please increase the time limit in order to get emulator connected.",
                countdown.timeout().as_secs()
            )));
        }
        self.set_state(StartupState::Online);

        let mut device = discovery.discovered_device().ok_or_else(|| {
            ContainerError::IllegalState("Emulator device came online without connecting".into())
        })?;
        if device.avd_name.is_none() {
            device.avd_name = Some(self.config.avd_name.clone());
        }

        let adb_path = bridge.adb_path().to_string_lossy().into_owned();
        info!("Serial number: {}, adb path: {}", device.serial, adb_path);

        self.set_state(StartupState::WaitingBooted);

        let env = HashMap::new();
        let env = &env;
        let getprop = vec![
            adb_path,
            "-s".to_string(),
            device.serial.clone(),
            "shell".to_string(),
            "getprop".to_string(),
        ];
        let getprop = &getprop;

        let booted = executor
            .schedule_until_true(
                move || async move {
                    let props = executor.execute(env, getprop).await?;
                    Ok::<_, ContainerError>(
                        props.iter().any(|line| line.contains(BOOT_COMPLETED_MARKER)),
                    )
                },
                countdown.time_left(),
                self.poll_interval,
            )
            .await?;

        if !booted {
            return Err(ContainerError::AndroidExecution {
                message: format!(
                    "Emulator device hasn't started properly in {} seconds. \
                     Please increase the time limit in order to get emulator booted.",
                    countdown.timeout().as_secs()
                ),
                source: None,
            });
        }

        info!(
            "Android emulator {} was started within {:.1} seconds",
            device.display_name(),
            countdown.time_elapsed().as_secs_f64()
        );

        Ok(device)
    }
}

fn startup_failure(err: ContainerError) -> ContainerError {
    match err {
        ContainerError::InterruptedWait => {
            ContainerError::android_execution("Emulator device startup failed.", err)
        }
        ContainerError::Probe(_) => {
            info!("Emulator startup probe failed: {}", err.root_cause());
            ContainerError::android_execution("Emulator device startup failed.", err)
        }
        other => other,
    }
}
