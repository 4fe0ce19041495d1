//! Android Emulator Bridge
//!
//! Connects the Android Debug Bridge, starts emulator instances and waits
//! until they are online and booted.

pub mod adb;
pub mod connector;
pub mod container;
pub mod countdown;
pub mod discovery;
pub mod emulator;
pub mod process;
pub mod startup;

#[cfg(test)]
pub(crate) mod testing;

pub use adb::{AdbBridge, DeviceEvent};
pub use connector::{BridgeConnector, BridgeFactory};
pub use container::ManagedContainer;
pub use countdown::Countdown;
pub use discovery::DeviceConnectDiscovery;
pub use emulator::{EmulatorCommand, EmulatorProcess};
pub use process::{command_line, ProcessExecutor};
pub use startup::{EmulatorStartup, StartupState, BOOT_COMPLETED_MARKER, DEFAULT_POLL_INTERVAL};
