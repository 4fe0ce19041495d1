//! Emulator Launcher
//!
//! Builds the emulator command line and holds the spawned emulator process.

use std::path::Path;

use tokio::process::Child;
use tracing::info;

use droid_container_core::{ContainerConfig, Result};

use crate::process::command_line;

/// Emulator command line builder
#[derive(Debug, Clone)]
pub struct EmulatorCommand {
    emulator_path: String,
    avd_name: String,
    sd_card: Option<String>,
    options: Option<String>,
}

impl EmulatorCommand {
    pub fn new(emulator_path: &Path, avd_name: impl Into<String>) -> Self {
        Self {
            emulator_path: emulator_path.to_string_lossy().into_owned(),
            avd_name: avd_name.into(),
            sd_card: None,
            options: None,
        }
    }

    /// Command for the AVD, storage and options of `config`
    pub fn from_config(emulator_path: &Path, config: &ContainerConfig) -> Self {
        Self {
            sd_card: config.sd_card.clone(),
            options: config.emulator_options.clone(),
            ..Self::new(emulator_path, config.avd_name.clone())
        }
    }

    pub fn sd_card(mut self, spec: impl Into<String>) -> Self {
        self.sd_card = Some(spec.into());
        self
    }

    pub fn options(mut self, options: impl Into<String>) -> Self {
        self.options = Some(options.into());
        self
    }

    /// Convert to the argument list, executable first
    ///
    /// Options are split on whitespace only; quoting is not interpreted.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            self.emulator_path.clone(),
            "-avd".to_string(),
            self.avd_name.clone(),
        ];

        if let Some(ref sd_card) = self.sd_card {
            args.push("-sdcard".to_string());
            args.push(sd_card.clone());
        }

        if let Some(ref options) = self.options {
            args.extend(options.split_whitespace().map(str::to_string));
        }

        args
    }
}

/// Running emulator process
#[derive(Debug)]
pub struct EmulatorProcess {
    pub avd_name: String,
    command: Vec<String>,
    process: Child,
}

impl EmulatorProcess {
    pub fn new(avd_name: impl Into<String>, command: Vec<String>, process: Child) -> Self {
        Self {
            avd_name: avd_name.into(),
            command,
            process,
        }
    }

    /// OS process id, while the process has not been reaped
    pub fn id(&self) -> Option<u32> {
        self.process.id()
    }

    /// Command line used to launch the emulator
    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// Check if the emulator process is still running
    pub fn is_running(&mut self) -> bool {
        matches!(self.process.try_wait(), Ok(None))
    }

    /// Kill the emulator
    pub async fn kill(&mut self) -> Result<()> {
        if self.is_running() {
            self.process.kill().await?;
            info!("Killed emulator: {}", self.avd_name);
        }
        Ok(())
    }

    /// Wait for emulator to exit
    pub async fn wait(&mut self) -> Result<i32> {
        let status = self.process.wait().await?;
        Ok(status.code().unwrap_or(-1))
    }
}

impl std::fmt::Display for EmulatorProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]", self.avd_name, command_line(&self.command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn emulator_path() -> PathBuf {
        PathBuf::from("/sdk/emulator/emulator")
    }

    #[test]
    fn test_options_are_tokenized_in_order() {
        let command = EmulatorCommand::new(&emulator_path(), "test1").options("-no-window  -wipe-data");

        assert_eq!(
            command.to_args(),
            vec!["/sdk/emulator/emulator", "-avd", "test1", "-no-window", "-wipe-data"]
        );
    }

    #[test]
    fn test_sd_card_precedes_options() {
        let command = EmulatorCommand::new(&emulator_path(), "test1")
            .sd_card("512M")
            .options(" -gpu swiftshader_indirect\t-no-audio ");

        assert_eq!(
            command.to_args(),
            vec![
                "/sdk/emulator/emulator",
                "-avd",
                "test1",
                "-sdcard",
                "512M",
                "-gpu",
                "swiftshader_indirect",
                "-no-audio",
            ]
        );
    }

    #[test]
    fn test_quotes_are_not_interpreted() {
        let command = EmulatorCommand::new(&emulator_path(), "test1").options("-prop \"a b\"");
        assert_eq!(&command.to_args()[3..], ["-prop", "\"a", "b\""]);
    }

    #[test]
    fn test_from_config() {
        let mut config = ContainerConfig::for_avd("pixel");
        config.emulator_options = Some("   ".into());

        let args = EmulatorCommand::from_config(&emulator_path(), &config).to_args();
        assert_eq!(args, vec!["/sdk/emulator/emulator", "-avd", "pixel"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_handle_lifecycle() {
        let child = tokio::process::Command::new("sleep").arg("5").spawn().unwrap();
        let mut emulator = EmulatorProcess::new(
            "test1",
            vec!["sleep".to_string(), "5".to_string()],
            child,
        );

        assert!(emulator.id().is_some());
        assert!(emulator.is_running());
        assert_eq!(emulator.to_string(), "test1 [sleep 5]");

        emulator.kill().await.unwrap();
        assert!(!emulator.is_running());
    }
}
