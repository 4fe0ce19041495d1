//! Container Configuration
//!
//! Manages the settings the emulator bootstrap consumes:
//! - Android SDK location
//! - AVD name, storage image and free-form emulator options
//! - Boot timeout and bridge reconnect behavior

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ContainerError, Result};

/// Default boot timeout in seconds
pub const DEFAULT_BOOTUP_TIMEOUT_SECS: u64 = 120;

/// Emulator container configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContainerConfig {
    /// Path to Android SDK
    pub sdk_path: Option<PathBuf>,
    /// Name of the virtual device profile to launch
    pub avd_name: String,
    /// Storage image passed to `-sdcard`
    pub sd_card: Option<String>,
    /// Whitespace separated extra emulator arguments
    pub emulator_options: Option<String>,
    /// Budget for the emulator to come online and boot
    pub emulator_bootup_timeout_in_seconds: u64,
    /// Restart the bridge server before connecting
    pub force: bool,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            sdk_path: None,
            avd_name: String::new(),
            sd_card: None,
            emulator_options: None,
            emulator_bootup_timeout_in_seconds: DEFAULT_BOOTUP_TIMEOUT_SECS,
            force: false,
        }
    }
}

impl ContainerConfig {
    /// Create a configuration for the given AVD with defaults elsewhere
    pub fn for_avd(avd_name: impl Into<String>) -> Self {
        Self {
            avd_name: avd_name.into(),
            ..Default::default()
        }
    }

    /// Load configuration from a TOML file
    pub async fn load(path: &Path) -> Result<Self> {
        debug!("Loading container config from {:?}", path);
        let contents = tokio::fs::read_to_string(path).await?;
        let config = Self::from_toml_str(&contents)?;
        info!("Loaded configuration for AVD {}", config.avd_name);
        Ok(config)
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: ContainerConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the values the bootstrap relies on
    pub fn validate(&self) -> Result<()> {
        if self.avd_name.trim().is_empty() {
            return Err(ContainerError::Config("avdName must not be empty".into()));
        }
        if self.avd_name.chars().any(char::is_whitespace) {
            return Err(ContainerError::Config(format!(
                "avdName must not contain whitespace: {:?}",
                self.avd_name
            )));
        }
        if let Some(sd_card) = &self.sd_card {
            if sd_card.trim().is_empty() {
                return Err(ContainerError::Config("sdCard must not be blank when set".into()));
            }
        }
        Ok(())
    }
}

/// Resolved Android SDK executables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AndroidSdk {
    home: PathBuf,
    adb_path: PathBuf,
    emulator_path: PathBuf,
}

impl AndroidSdk {
    /// SDK rooted at `home` with the standard tool layout
    pub fn new(home: PathBuf) -> Self {
        let (adb, emulator) = if cfg!(windows) {
            ("adb.exe", "emulator.exe")
        } else {
            ("adb", "emulator")
        };

        Self {
            adb_path: home.join("platform-tools").join(adb),
            emulator_path: home.join("emulator").join(emulator),
            home,
        }
    }

    /// Locate the SDK from the configuration or the environment
    pub fn resolve(config: &ContainerConfig) -> Result<Self> {
        if let Some(path) = &config.sdk_path {
            return Ok(Self::new(path.clone()));
        }

        for var in ["ANDROID_SDK_ROOT", "ANDROID_HOME"] {
            if let Ok(path) = std::env::var(var) {
                if !path.is_empty() {
                    debug!("Using Android SDK from {}", var);
                    return Ok(Self::new(PathBuf::from(path)));
                }
            }
        }

        let candidates = if cfg!(windows) {
            vec![
                dirs::config_local_dir().map(|d| d.join("Android").join("Sdk")),
                Some(PathBuf::from("C:\\Android\\sdk")),
            ]
        } else {
            vec![
                dirs::home_dir().map(|h| h.join("Android").join("Sdk")),
                Some(PathBuf::from("/usr/local/android-sdk")),
            ]
        };

        candidates
            .into_iter()
            .flatten()
            .find(|p| p.exists())
            .map(Self::new)
            .ok_or_else(|| {
                ContainerError::Config(
                    "Android SDK not found (set sdkPath, ANDROID_SDK_ROOT or ANDROID_HOME)".into(),
                )
            })
    }

    /// Override the bridge executable
    pub fn with_adb_path(mut self, path: PathBuf) -> Self {
        self.adb_path = path;
        self
    }

    /// Override the emulator executable
    pub fn with_emulator_path(mut self, path: PathBuf) -> Self {
        self.emulator_path = path;
        self
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn adb_path(&self) -> &Path {
        &self.adb_path
    }

    pub fn emulator_path(&self) -> &Path {
        &self.emulator_path
    }
}
