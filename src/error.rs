//! Error types for the BOOTP server.
//!
//! All fallible operations in this crate return [`Result<T>`], which uses
//! the [`Error`] enum for error variants.

/// Errors that can occur during BOOTP server operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File system or network I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (config files and `show-config`).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Datagram too short to hold a BOOTP header.
    #[error("Malformed BOOTP packet: {0}")]
    MalformedPacket(String),

    /// No static reservation exists for the client and no subnet declares
    /// a dynamic range it could be served from.
    #[error("No configuration for client {0}")]
    UnknownClient(String),

    /// Every configured dynamic range is fully occupied.
    ///
    /// Surfaces to the wire exactly like [`Error::UnknownClient`] (no reply),
    /// kept separate so operators can tell the two apart in logs.
    #[error("No free address in any dynamic range for client {0}")]
    PoolExhausted(String),

    /// Invalid server configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Socket creation or configuration error.
    ///
    /// Typically occurs when binding to port 67 without elevated privileges.
    #[error("Socket error: {0}")]
    Socket(String),
}

/// A specialized Result type for BOOTP operations.
pub type Result<T> = std::result::Result<T, Error>;
