//! Error types for strata

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for strata operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for strata
#[derive(Error, Debug)]
pub enum Error {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("Failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create directory '{path}': {source}")]
    DirectoryCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read directory '{path}': {source}")]
    DirectoryRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Failed to serialize data: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to parse settings: {0}")]
    Parse(String),

    // -------------------------------------------------------------------------
    // Settings Errors
    // -------------------------------------------------------------------------
    #[error("Invalid setting key '{0}': keys are non-empty, slash-separated paths")]
    InvalidKey(String),

    #[error("Malformed value for {key}: expected {expected}")]
    MalformedValue { key: String, expected: String },

    // -------------------------------------------------------------------------
    // Initialization Errors
    // -------------------------------------------------------------------------
    #[error("Invalid deployment descriptor '{path}': {reason}")]
    Descriptor { path: PathBuf, reason: String },

    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("User settings '{path}' could not be loaded, using defaults: {reason}")]
    UserSettings { path: PathBuf, reason: String },

    #[error("Configuration store not initialized")]
    NotInitialized,

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Deployment descriptor or identity problems; recorded, never fatal
    Initialization,
    /// Reading or writing settings, defaults or MRU files
    Persistence,
    /// A value did not have the shape its key expects
    MalformedValue,
    /// Bad arguments or builder configuration
    Usage,
}

impl Error {
    /// Classify this error
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Descriptor { .. } | Error::Initialization(_) | Error::NotInitialized => {
                ErrorCategory::Initialization
            }
            Error::FileRead { .. }
            | Error::FileWrite { .. }
            | Error::DirectoryCreate { .. }
            | Error::DirectoryRead { .. }
            | Error::Serialize(_)
            | Error::Parse(_)
            | Error::UserSettings { .. } => ErrorCategory::Persistence,
            Error::MalformedValue { .. } => ErrorCategory::MalformedValue,
            Error::InvalidKey(_) | Error::Config(_) => ErrorCategory::Usage,
        }
    }

    /// Check if this error means a file was simply not there
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::FileRead { source, .. } | Error::DirectoryRead { source, .. } => {
                source.kind() == std::io::ErrorKind::NotFound
            }
            _ => false,
        }
    }
}
