//! Error types for keyscope operations.

use common::StorageError;

/// Error type for keyscope operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// An operation needed an open store but none is open.
    NotOpen,

    /// `open` was called while a store is already open.
    AlreadyOpen,

    /// The directory passed to `open` does not exist.
    PathNotFound(String),

    /// The requested key does not exist (or has expired).
    NotFound(String),

    /// Storage-related errors from the underlying engine.
    Storage(String),

    /// A regex search pattern failed to compile.
    InvalidPattern(String),

    /// Append or commit on an unknown or already committed upload session.
    SessionNotFound(String),

    /// Malformed request parameters or transport-encoded payload.
    Decode(String),

    /// Invalid input or parameter errors.
    InvalidInput(String),

    /// Backing up a value before a write failed.
    Backup(String),

    /// Internal errors indicating bugs or invariant violations.
    Internal(String),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::NotOpen => write!(f, "database not open"),
            Error::AlreadyOpen => write!(f, "database is already open"),
            Error::PathNotFound(path) => write!(f, "directory does not exist: {}", path),
            Error::NotFound(key) => write!(f, "key not found: {}", key),
            Error::Storage(msg) => write!(f, "Storage error: {}", msg),
            Error::InvalidPattern(msg) => write!(f, "invalid regex: {}", msg),
            Error::SessionNotFound(id) => write!(f, "unknown upload session: {}", id),
            Error::Decode(msg) => write!(f, "Decode error: {}", msg),
            Error::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            Error::Backup(msg) => write!(f, "Backup error: {}", msg),
            Error::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Storage(msg) => Error::Storage(msg),
            StorageError::Internal(msg) => Error::Internal(msg),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Decode(err.to_string())
    }
}

impl From<base64::DecodeError> for Error {
    fn from(err: base64::DecodeError) -> Self {
        Error::Decode(format!("invalid base64 payload: {}", err))
    }
}

/// Result type alias for keyscope operations.
pub type Result<T> = std::result::Result<T, Error>;
