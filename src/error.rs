//! # Error Types
//!
//! Custom error types for WiFi Bridge using `thiserror`.

use thiserror::Error;

/// Main error type for WiFi Bridge
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Outbound payload exceeds the link's maximum data length
    #[error("Payload size {len} exceeds maximum {max}")]
    PayloadTooLarge { len: usize, max: usize },

    /// Peer has not signalled readiness for the next frame
    #[error("Peer is not ready to receive")]
    NotReady,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port errors
    #[error("Serial error: {0}")]
    Serial(String),

    /// None of the candidate serial devices could be opened
    #[error("No serial device found (tried: {0})")]
    SerialPortNotFound(String),
}

/// Result type alias for WiFi Bridge
pub type Result<T> = std::result::Result<T, BridgeError>;
