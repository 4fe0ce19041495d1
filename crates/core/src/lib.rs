//! Droid Container Core - Shared types
//!
//! This crate provides the types shared between the container pieces:
//! configuration and SDK resolution, the lifecycle event bus, the device
//! model and the bridge abstraction the emulator bootstrap runs against.

pub mod bridge;
pub mod config;
pub mod device;
pub mod error;
pub mod events;

pub use bridge::{
    AndroidBridge, BridgeSlot, DeviceChangeListener, ListenerHandle, ListenerRegistry,
    SharedBridge,
};
pub use config::{AndroidSdk, ContainerConfig};
pub use device::{Device, DeviceChange, DeviceState, DeviceType};
pub use error::{ContainerError, Result};
pub use events::{Event, EventBus, EventSubscription};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
