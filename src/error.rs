//! Error types for firmloop
//!
//! All modules use `FirmloopResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for firmloop operations
pub type FirmloopResult<T> = Result<T, FirmloopError>;

/// All errors that can occur in firmloop
#[derive(Error, Debug)]
pub enum FirmloopError {
    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Invalid configuration value {key}: {reason}")]
    ConfigValue { key: String, reason: String },

    #[error("{devices} devices configured but {locations} location ids given")]
    ConfigMismatch { devices: usize, locations: usize },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No build servers configured")]
    PoolEmpty,

    // Cancellation is checked at every step boundary and never retried
    #[error("Operation cancelled")]
    Cancelled,

    // Remote build errors
    #[error("Remote step '{step}' failed: {reason}")]
    Remote { step: String, reason: String },

    #[error("Compile of {package} failed:\n{output}")]
    Compile { package: String, output: String },

    #[error("Transfer of {path} failed: {reason}")]
    Transfer { path: String, reason: String },

    // Flashing errors
    #[error("Flash tool step '{step}' failed: {reason}")]
    ToolInvocation { step: String, reason: String },

    #[error("Flashing {device} failed at '{step}': {source}")]
    FlashFailed {
        device: String,
        step: String,
        #[source]
        source: Box<FirmloopError>,
    },

    #[error("Flashed {device} but it did not reconnect after reboot")]
    BootVerificationFailed { device: String },

    // Package resolution errors
    #[error("Package resolution failed: {0}")]
    Resolution(String),

    #[error("Archive error for {path}: {reason}")]
    Archive { path: PathBuf, reason: String },

    // Test runner errors
    #[error("Test runner error: {0}")]
    Tester(String),

    // CI errors
    #[error("HTTP request to {url} failed: {reason}")]
    Http { url: String, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command exited unsuccessfully: {command}, output: {output}")]
    CommandExecution { command: String, output: String },

    #[error("Required tool not found: {name}. {hint}")]
    ToolNotFound { name: String, hint: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl FirmloopError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, output: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            output: output.into(),
        }
    }

    /// Create a remote step error
    pub fn remote(step: impl Into<String>, reason: impl ToString) -> Self {
        Self::Remote {
            step: step.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an HTTP error
    pub fn http(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Http {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Wrap an error as a flashing failure of `device` at `step`.
    ///
    /// Cancellation passes through unchanged so callers can still match on it.
    pub fn flash_failed(device: impl Into<String>, step: impl Into<String>, source: Self) -> Self {
        if source.is_cancelled() {
            return source;
        }
        Self::FlashFailed {
            device: device.into(),
            step: step.into(),
            source: Box::new(source),
        }
    }

    /// Check if the error was caused by cancellation
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::FlashFailed { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Check if a retry at a higher layer may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Remote { .. }
                | Self::Transfer { .. }
                | Self::Compile { .. }
                | Self::ToolInvocation { .. }
                | Self::Http { .. }
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::ConfigMismatch { .. } => {
                Some("board.location_ids must list one id per entry in devices.list, or be empty")
            }
            Self::PoolEmpty => Some("Add at least one [[build_servers]] entry to the config"),
            Self::BootVerificationFailed { .. } => {
                Some("Images were written; check the board console or power-cycle the device")
            }
            _ => None,
        }
    }
}
