//! Device Types and State
//!
//! Represents Android devices (physical and emulated) as seen by the bridge.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Device state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceState {
    /// Device is online and ready
    Online,
    /// Device is offline
    Offline,
    /// Device is not authorized (need to accept on device)
    Unauthorized,
    /// Device is in bootloader mode
    Bootloader,
    /// Device is in recovery mode
    Recovery,
    /// Device is in sideload mode
    Sideload,
    /// Unknown state
    Unknown,
}

impl DeviceState {
    /// Parse the state column of `adb devices`
    pub fn from_adb(state: &str) -> Self {
        match state {
            "device" => DeviceState::Online,
            "offline" => DeviceState::Offline,
            "unauthorized" => DeviceState::Unauthorized,
            "bootloader" => DeviceState::Bootloader,
            "recovery" => DeviceState::Recovery,
            "sideload" => DeviceState::Sideload,
            _ => DeviceState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceState::Online => "device",
            DeviceState::Offline => "offline",
            DeviceState::Unauthorized => "unauthorized",
            DeviceState::Bootloader => "bootloader",
            DeviceState::Recovery => "recovery",
            DeviceState::Sideload => "sideload",
            DeviceState::Unknown => "unknown",
        }
    }
}

/// Device type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceType {
    /// Physical device connected via USB/WiFi
    Physical,
    /// Android emulator
    Emulator,
}

impl DeviceType {
    /// Classify a device from its serial number
    pub fn from_serial(serial: &str) -> Self {
        if serial.starts_with("emulator-") {
            DeviceType::Emulator
        } else {
            DeviceType::Physical
        }
    }
}

bitflags! {
    /// What changed in a `device_changed` notification
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DeviceChange: u32 {
        /// The bridge-level state (online/offline/...) changed
        const STATE = 0x0001;
        /// The list of debuggable clients changed
        const CLIENT_LIST = 0x0002;
        /// Build information (properties, AVD name) became available
        const BUILD_INFO = 0x0004;
    }
}

/// Device information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    /// Device serial number
    pub serial: String,
    /// Virtual device name, for emulators
    pub avd_name: Option<String>,
    /// Device state
    pub state: DeviceState,
    /// Device type
    pub device_type: DeviceType,
    /// Device model (e.g., "Pixel 4")
    pub model: Option<String>,
    /// Device product name
    pub product: Option<String>,
    /// Transport ID
    pub transport_id: Option<u32>,
}

impl Device {
    /// Create a device known only by serial and state
    pub fn new(serial: impl Into<String>, state: DeviceState) -> Self {
        let serial = serial.into();
        Self {
            device_type: DeviceType::from_serial(&serial),
            serial,
            avd_name: None,
            state,
            model: None,
            product: None,
            transport_id: None,
        }
    }

    /// Attach the virtual device name
    pub fn with_avd_name(mut self, avd_name: impl Into<String>) -> Self {
        self.avd_name = Some(avd_name.into());
        self
    }

    /// Device serial number
    pub fn serial_number(&self) -> &str {
        &self.serial
    }

    /// Check if device is online at the bridge level
    pub fn is_online(&self) -> bool {
        self.state == DeviceState::Online
    }

    /// Check if this is an emulator
    pub fn is_emulator(&self) -> bool {
        self.device_type == DeviceType::Emulator
    }

    /// Whether both snapshots describe the same device
    pub fn is_same(&self, other: &Device) -> bool {
        self.serial == other.serial
    }

    /// Get display name
    pub fn display_name(&self) -> String {
        match (&self.avd_name, &self.model) {
            (Some(avd), _) => format!("{} ({})", avd, self.serial),
            (None, Some(model)) => format!("{} ({})", model.replace('_', " "), self.serial),
            (None, None) => self.serial.clone(),
        }
    }
}
