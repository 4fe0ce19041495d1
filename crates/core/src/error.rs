//! Error types for the managed container
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// Main error type for the container lifecycle
#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Unable to start emulator for {avd_name} with options {options:?} (command: {command})")]
    EmulatorLaunch {
        avd_name: String,
        options: Option<String>,
        command: String,
        #[source]
        source: Box<ContainerError>,
    },

    #[error("Unable to launch process: {command}")]
    ProcessLaunch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Execution of {command} failed: {message}")]
    Execution { command: String, message: String },

    #[error("Probe failed")]
    Probe(#[source] Box<ContainerError>),

    #[error("Wait was interrupted")]
    InterruptedWait,

    #[error("Bridge connection error: {0}")]
    BridgeConnection(String),

    #[error("{message}")]
    AndroidExecution {
        message: String,
        #[source]
        source: Option<Box<ContainerError>>,
    },
}

/// Result type alias for container operations
pub type Result<T> = std::result::Result<T, ContainerError>;

impl ContainerError {
    /// Wrap an error with a bootstrap failure message
    pub fn android_execution(message: impl Into<String>, source: ContainerError) -> Self {
        ContainerError::AndroidExecution {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Check if this error ends the bootstrap attempt for good
    ///
    /// Interruptions are the only non-fatal kind: the caller asked for them
    /// and may fire the bootstrap again.
    pub fn is_fatal(&self) -> bool {
        match self {
            ContainerError::InterruptedWait => false,
            ContainerError::AndroidExecution { source: Some(source), .. } => source.is_fatal(),
            _ => true,
        }
    }

    /// Innermost error of a chain of boxed causes
    pub fn root_cause(&self) -> &ContainerError {
        match self {
            ContainerError::EmulatorLaunch { source, .. } => source.root_cause(),
            ContainerError::Probe(source) => source.root_cause(),
            ContainerError::AndroidExecution { source: Some(source), .. } => source.root_cause(),
            _ => self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_cause_unwraps_probe_chain() {
        let err = ContainerError::android_execution(
            "Emulator device startup failed",
            ContainerError::Probe(Box::new(ContainerError::Execution {
                command: "adb -s emulator-5554 shell getprop".into(),
                message: "broken pipe".into(),
            })),
        );

        match err.root_cause() {
            ContainerError::Execution { command, .. } => assert!(command.contains("getprop")),
            other => panic!("unexpected root cause: {other:?}"),
        }
        assert!(err.is_fatal());
    }

    #[test]
    fn test_interruption_is_not_fatal() {
        let err = ContainerError::android_execution("startup failed", ContainerError::InterruptedWait);
        assert!(!err.is_fatal());
        assert!(ContainerError::IllegalState("bridge".into()).is_fatal());
    }
}
