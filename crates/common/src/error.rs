//! Common error types for the APC election components.

use std::fmt;
use std::net::Ipv4Addr;

/// A specialized Result type for APC operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for APC operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Packet error: {0}")]
    Packet(String),

    #[error("No usable local address on {0}")]
    AddressUnavailable(String),

    /// The local address moved after startup. The router ID is derived from it,
    /// so the process has to restart.
    #[error("Local address changed from {old} to {new}")]
    AddressChanged { old: Ipv4Addr, new: Ipv4Addr },

    #[error("Auth proxy error: {0}")]
    AuthProxy(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown error: {0}")]
    Other(String),
}

impl Error {
    /// Create a new configuration error.
    pub fn config(msg: impl fmt::Display) -> Self {
        Error::Config(msg.to_string())
    }

    /// Create a new transport error.
    pub fn transport(msg: impl fmt::Display) -> Self {
        Error::Transport(msg.to_string())
    }

    /// Create a new packet error.
    pub fn packet(msg: impl fmt::Display) -> Self {
        Error::Packet(msg.to_string())
    }

    /// Create a new auth proxy error.
    pub fn auth_proxy(msg: impl fmt::Display) -> Self {
        Error::AuthProxy(msg.to_string())
    }

    /// Create a new other error.
    pub fn other(msg: impl fmt::Display) -> Self {
        Error::Other(msg.to_string())
    }

    /// Whether this error should take the whole process down so the
    /// supervisor can restart it.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::AddressChanged { .. } | Error::AddressUnavailable(_))
    }
}
