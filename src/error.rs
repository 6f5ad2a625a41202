//! Error types for the file vault.

use thiserror::Error;

/// Result type alias for vault operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in vault operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The encryption secret is missing or unusable.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No stored file with this name.
    #[error("File not found: {0}")]
    NotFound(String),

    /// The client-supplied name cannot be used as a storage key.
    #[error("Invalid file name: {0}")]
    InvalidName(String),

    /// Envelope too short to contain an IV.
    #[error("Malformed envelope: {len} bytes is shorter than the IV")]
    MalformedEnvelope { len: usize },

    /// Decryption error (wrong key, corrupted or truncated data).
    #[error("Decryption failed: wrong key or corrupted data")]
    Decryption,

    /// The system random source could not supply an IV.
    #[error("Entropy unavailable: {0}")]
    EntropyUnavailable(String),

    /// Encryption error.
    #[error("Encryption error: {0}")]
    Encryption(String),
}

impl From<walkdir::Error> for Error {
    fn from(e: walkdir::Error) -> Self {
        Error::Io(e.into())
    }
}
