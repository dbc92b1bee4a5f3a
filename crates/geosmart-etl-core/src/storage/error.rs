//! Storage error types.
use std::{error::Error, fmt, io};

use snafu::{Backtrace, prelude::*};

/// Errors produced by a storage backend implementation.
///
/// Backend-specific failures are wrapped here so higher layers can map them
/// into [`StorageError`] variants with the key attached.
#[derive(Debug)]
pub enum BackendError {
    /// A local filesystem I/O error.
    Local(io::Error),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Local(e) => write!(f, "local I/O error: {e}"),
        }
    }
}

impl Error for BackendError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BackendError::Local(e) => Some(e),
        }
    }
}

/// Errors that can occur during object storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    /// No object is stored under the key.
    #[snafu(display("Object not found: {key}"))]
    NotFound {
        /// The key that was looked up.
        key: String,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// The key is empty, absolute or escapes the store root.
    #[snafu(display("Invalid object key {key:?}: {reason}"))]
    InvalidKey {
        /// The rejected key.
        key: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An I/O error occurred in the backend.
    #[snafu(display("Storage I/O error at {path}: {source}"))]
    OtherIo {
        /// The path where the error occurred.
        path: String,
        /// Underlying backend error.
        source: BackendError,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },
}

/// General result type used by storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
