//! Error types for Prasaran

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Prasaran error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error (sockets, files, thread spawn)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration could not be written
    #[error("Config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// Configuration values are inconsistent
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Datagram shorter than the 4-byte header
    #[error("Malformed header: need 4 bytes, got {available}")]
    MalformedHeader {
        /// Bytes actually received
        available: usize,
    },

    /// Declared payload length does not fit the received datagram
    #[error("Length out of range: header declares {length} bytes, {available} available")]
    LengthOutOfRange {
        /// Length field from the header
        length: i16,
        /// Payload bytes actually received
        available: usize,
    },

    /// Pushing a message to a viewer failed
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// Viewer asked for a stream that does not exist
    #[error("Unknown stream: {0}")]
    UnknownStream(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
