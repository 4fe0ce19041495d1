//! droid-container - managed Android emulator containers
//!
//! Brings an Android emulator up for a configured AVD, waits until it is
//! online and booted, and tears it down again when the session ends.
//!
//! ## Architecture
//!
//! - `droid-container-core`: configuration, devices, errors, the event bus and
//!   the debug bridge abstraction
//! - `droid-container-emulator-bridge`: adb bridge, bridge connector and the
//!   emulator startup orchestrator

#![warn(clippy::all)]

pub mod commands;

pub use droid_container_core as core;
pub use droid_container_emulator_bridge as emulator;

/// Prelude module for convenient imports
pub mod prelude {
    pub use droid_container_core::{AndroidSdk, ContainerConfig, Device, Event};
    pub use droid_container_emulator_bridge::{EmulatorStartup, ManagedContainer};
}
