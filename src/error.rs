// src/error.rs

use thiserror::Error;

/// Core error types for SetupDB
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O errors with context about the operation that failed
    #[error("I/O error: {0}")]
    IoError(String),

    /// No registry document exists for the requested product
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// A component, option, file or script lookup came up empty
    #[error("Not found: {0}")]
    NotFound(String),

    /// The registry document could not be parsed or is missing required data
    #[error("Malformed registry document: {0}")]
    MalformedDocument(String),

    /// A version probe produced output that is not `major.minor.release`
    #[error("Invalid version string: {0}")]
    VersionParse(String),

    /// A digest string is not 32 hex characters
    #[error("Invalid MD5 digest: {0}")]
    InvalidDigest(String),

    /// The filesystem entry is of a kind the registry cannot track
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    /// Bundled package metadata could not be read
    #[error("Package error: {0}")]
    Package(String),

    /// A lifecycle script could not be written or executed
    #[error("Script error: {0}")]
    ScriptError(String),
}

/// Result type alias using SetupDB's Error type
pub type Result<T> = std::result::Result<T, Error>;
