// src/error.rs

use thiserror::Error;

/// Core error types for lilith
#[derive(Error, Debug)]
pub enum Error {
    /// Host ABI could not be determined
    #[error("could not determine host ABI: {0}")]
    EnvProbe(String),

    /// Package catalogue has not been downloaded yet
    #[error("package catalogue not present; run `lilith update-metadata` first")]
    MetadataMissing,

    /// Download failure
    #[error("download failed: {0}")]
    Network(String),

    /// Archive decompression or extraction failure
    #[error("archive error: {0}")]
    Archive(String),

    /// Package is not in the catalogue
    #[error("package '{0}' not found in the catalogue")]
    NotFound(String),

    /// Package is not installed
    #[error("package '{0}' is not installed")]
    NotInstalled(String),

    /// Removal blocked by installed dependents
    #[error("cannot remove '{name}': required by {dependents}")]
    RequiredBy { name: String, dependents: String },

    /// Malformed installed-store record or manifest
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// Malformed search pattern
    #[error("invalid search pattern: {0}")]
    Pattern(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using lilith's Error type
pub type Result<T> = std::result::Result<T, Error>;
