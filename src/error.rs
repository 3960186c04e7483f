use std::io;
use std::fmt::{Display, Formatter};
use std::str::Utf8Error;
use thiserror::Error;
use btleplug;
use serde_json;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to determine path to config file")]
    NoConfigPath,

    #[error("Failed to acquire file lock on config file: {source}")]
    CanNotLock { source: io::Error },

    #[error("Failed to encode/decode config as utf-8: {source}")]
    Utf8Error { #[from] source: Utf8Error },

    #[error("Failed to read/write config file: {source}")]
    IOError { #[from] source: io::Error },

    #[error("Failed to parse/build config file: {source}")]
    JsonError { #[from] source: serde_json::Error },
}

impl ConfigError {
    pub fn is_file_not_found_error(&self) -> bool {
        match self {
            ConfigError::IOError { source } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum AppRunError {
    #[error("Failed to start application (config): {source}")]
    ConfigError { #[from] source: ConfigError },

    #[error("{source}")]
    Link { #[from] source: LinkError },

    #[error("Invalid characteristic uuid: {source}")]
    Uuid { #[from] source: uuid::Error },

    #[error("Invalid hex payload: {source}")]
    Hex { #[from] source: hex::FromHexError },

    #[error("Failed to write output: {source}")]
    Json { #[from] source: serde_json::Error },

    #[error("Failed to wait for shutdown signal: {source}")]
    Signal { source: io::Error },

    #[error("No device was picked")]
    NothingDiscovered,
}

/// Failure categories reported by the Bluetooth platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BluetoothErrorKind {
    NotSupported,
    NotFound,
    PermissionDenied,
    InvalidState,
    Security,
    Network,
    Unknown,
}

impl BluetoothErrorKind {
    /// The low-level platform error name, as a browser would report it.
    pub fn name(&self) -> &'static str {
        match self {
            BluetoothErrorKind::NotSupported => "NotSupportedError",
            BluetoothErrorKind::NotFound => "NotFoundError",
            BluetoothErrorKind::PermissionDenied => "NotAllowedError",
            BluetoothErrorKind::InvalidState => "InvalidStateError",
            BluetoothErrorKind::Security => "SecurityError",
            BluetoothErrorKind::Network => "NetworkError",
            BluetoothErrorKind::Unknown => "UnknownError",
        }
    }
}

impl Display for BluetoothErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct PlatformError {
    pub kind: BluetoothErrorKind,
    pub message: String,
}

impl PlatformError {
    pub fn new<M: Into<String>>(kind: BluetoothErrorKind, message: M) -> Self {
        PlatformError { kind, message: message.into() }
    }

    pub fn not_supported() -> Self {
        PlatformError::new(BluetoothErrorKind::NotSupported, "Bluetooth is not available")
    }

    /// The single human-readable line shown in the status banner.
    pub fn readable_message(&self) -> String {
        let detail = match self.kind {
            BluetoothErrorKind::NotFound => "No Bluetooth device found.".to_string(),
            BluetoothErrorKind::PermissionDenied => "Bluetooth permission denied. Please allow Bluetooth access.".to_string(),
            BluetoothErrorKind::NotSupported => "Bluetooth is not supported on this device.".to_string(),
            BluetoothErrorKind::Network => "Network error occurred during connection.".to_string(),
            BluetoothErrorKind::InvalidState => "Device is already connected or in an invalid state.".to_string(),
            BluetoothErrorKind::Security => "Security error occurred. Please check your Bluetooth settings.".to_string(),
            BluetoothErrorKind::Unknown => {
                if self.message.is_empty() {
                    "Unknown error occurred.".to_string()
                } else {
                    self.message.clone()
                }
            },
        };

        format!("Bluetooth connection failed. {}", detail)
    }
}

impl From<btleplug::Error> for PlatformError {
    fn from(err: btleplug::Error) -> Self {
        let kind = match &err {
            btleplug::Error::PermissionDenied => BluetoothErrorKind::PermissionDenied,
            btleplug::Error::DeviceNotFound => BluetoothErrorKind::NotFound,
            btleplug::Error::NotConnected => BluetoothErrorKind::InvalidState,
            btleplug::Error::NotSupported(_) => BluetoothErrorKind::NotSupported,
            btleplug::Error::TimedOut(_) => BluetoothErrorKind::Network,
            btleplug::Error::RuntimeError(_) => BluetoothErrorKind::Network,
            _ => BluetoothErrorKind::Unknown,
        };

        PlatformError::new(kind, err.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinkError {
    #[error("{message}")]
    Bluetooth { message: String, source: PlatformError },

    #[error("Device not found or not properly initialized: {id}")]
    UnknownDevice { id: String },
}

impl LinkError {
    pub fn kind(&self) -> Option<BluetoothErrorKind> {
        match self {
            LinkError::Bluetooth { source, .. } => Some(source.kind),
            LinkError::UnknownDevice { .. } => None,
        }
    }
}

impl From<PlatformError> for LinkError {
    fn from(source: PlatformError) -> Self {
        LinkError::Bluetooth { message: source.readable_message(), source }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Characteristic value too short: needed {needed} bytes, got {actual}")]
    TooShort { needed: usize, actual: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readable_message_per_kind() {
        let err = PlatformError::new(BluetoothErrorKind::NotFound, "User cancelled the requestDevice() chooser.");
        assert_eq!(err.readable_message(), "Bluetooth connection failed. No Bluetooth device found.");

        let err = PlatformError::new(BluetoothErrorKind::Unknown, "adapter exploded");
        assert_eq!(err.readable_message(), "Bluetooth connection failed. adapter exploded");

        let err = PlatformError::new(BluetoothErrorKind::Unknown, "");
        assert_eq!(err.readable_message(), "Bluetooth connection failed. Unknown error occurred.");
    }

    #[test]
    fn link_error_keeps_platform_name() {
        let err: LinkError = PlatformError::new(BluetoothErrorKind::PermissionDenied, "denied").into();
        assert_eq!(err.kind(), Some(BluetoothErrorKind::PermissionDenied));
        assert_eq!(err.to_string(), "Bluetooth connection failed. Bluetooth permission denied. Please allow Bluetooth access.");

        match err {
            LinkError::Bluetooth { source, .. } => assert_eq!(source.kind.name(), "NotAllowedError"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn btleplug_errors_are_classified() {
        let err: PlatformError = btleplug::Error::PermissionDenied.into();
        assert_eq!(err.kind, BluetoothErrorKind::PermissionDenied);

        let err: PlatformError = btleplug::Error::DeviceNotFound.into();
        assert_eq!(err.kind, BluetoothErrorKind::NotFound);

        let err: PlatformError = btleplug::Error::NotConnected.into();
        assert_eq!(err.kind, BluetoothErrorKind::InvalidState);
    }
}
