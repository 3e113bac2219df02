//! Portkeeper - UPnP port mapping lifecycle management for dedicated servers
//!
//! This library opens a configured set of TCP/UDP ports on the local gateway
//! when a server starts, periodically re-asserts the mappings (consumer
//! routers silently expire UPnP leases), and tears them down on shutdown.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod mapping;

/// Result type alias for Portkeeper operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Portkeeper operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Lifecycle operation invoked in the wrong state
    #[error("Invalid lifecycle state: {0}")]
    InvalidState(&'static str),

    /// General I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Initialize the Portkeeper library with logging
pub fn init() {
    tracing_subscriber::fmt::init();
}

#[cfg(test)]
mod tests;
