//! CLI commands for droid-container
//!
//! Provides command-line entry points for bringing a managed emulator up
//! from a container configuration file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use droid_container_core::{AndroidSdk, ContainerConfig};
use droid_container_emulator_bridge::ManagedContainer;

/// Load a configuration file and apply command-line overrides
pub async fn load_config(
    path: &Path,
    avd: Option<&str>,
    timeout: Option<u64>,
) -> Result<ContainerConfig> {
    let mut config = ContainerConfig::load(path)
        .await
        .with_context(|| format!("Failed to load configuration from {:?}", path))?;

    if let Some(avd) = avd {
        config.avd_name = avd.to_string();
    }
    if let Some(timeout) = timeout {
        config.emulator_bootup_timeout_in_seconds = timeout;
    }

    config.validate()?;
    Ok(config)
}

/// Start command options
pub struct StartCommand {
    pub config_path: PathBuf,
    pub avd: Option<String>,
    pub timeout: Option<u64>,
    pub json: bool,
}

impl StartCommand {
    /// Start the emulator and keep it running until Ctrl-C
    pub async fn execute(&self) -> Result<()> {
        let config = load_config(&self.config_path, self.avd.as_deref(), self.timeout).await?;
        let sdk = AndroidSdk::resolve(&config)?;
        info!("Using Android SDK at {:?}", sdk.home());

        let container = ManagedContainer::new(config, sdk);

        let start = container.start();
        tokio::pin!(start);

        let started = tokio::select! {
            result = &mut start => result,
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, aborting emulator startup");
                container.interrupt();
                start.await
            }
        };

        let device = match started {
            Ok(device) => device,
            Err(e) => {
                if let Err(stop) = container.stop().await {
                    warn!("Cleanup after failed startup: {}", stop);
                }
                return Err(e.into());
            }
        };

        if self.json {
            println!("{}", serde_json::to_string_pretty(&device)?);
        } else {
            println!("{} is ready", device.display_name());
        }

        info!("Press Ctrl-C to stop the emulator");
        tokio::signal::ctrl_c().await?;

        container.stop().await?;
        info!("Container stopped");
        Ok(())
    }
}

/// Configuration check options
pub struct CheckConfigCommand {
    pub config_path: PathBuf,
}

impl CheckConfigCommand {
    /// Validate the configuration and print the resolved SDK tools
    pub async fn execute(&self) -> Result<()> {
        let config = load_config(&self.config_path, None, None).await?;
        let sdk = AndroidSdk::resolve(&config)?;

        println!("AVD:             {}", config.avd_name);
        println!("Boot timeout:    {}s", config.emulator_bootup_timeout_in_seconds);
        println!("SD card:         {}", config.sd_card.as_deref().unwrap_or("-"));
        println!("Options:         {}", config.emulator_options.as_deref().unwrap_or("-"));
        println!("Force restart:   {}", config.force);
        println!("SDK:             {}", sdk.home().display());
        println!("adb:             {}", sdk.adb_path().display());
        println!("emulator:        {}", sdk.emulator_path().display());

        for (name, path) in [("adb", sdk.adb_path()), ("emulator", sdk.emulator_path())] {
            if !path.exists() {
                warn!("{} executable not found at {:?}", name, path);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_overrides_replace_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("container.toml");
        std::fs::write(
            &path,
            "avdName = \"pixel\"\nemulatorBootupTimeoutInSeconds = 300\n",
        )
        .unwrap();

        let config = load_config(&path, Some("tablet"), Some(45)).await.unwrap();
        assert_eq!(config.avd_name, "tablet");
        assert_eq!(config.emulator_bootup_timeout_in_seconds, 45);

        let config = load_config(&path, None, None).await.unwrap();
        assert_eq!(config.avd_name, "pixel");
        assert_eq!(config.emulator_bootup_timeout_in_seconds, 300);
    }

    #[tokio::test]
    async fn test_invalid_override_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("container.toml");
        std::fs::write(&path, "avdName = \"pixel\"\n").unwrap();

        assert!(load_config(&path, Some("two words"), None).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_file_names_path() {
        let err = load_config(Path::new("/nonexistent/container.toml"), None, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/container.toml"));
    }
}
