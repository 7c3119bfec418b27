//! Storage Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::{Path, PathBuf};

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// File does not exist
    #[display("file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// Access denied
    #[display("permission denied: {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    /// A directory below the root could not be enumerated; nothing under it
    /// was listed.
    #[display("directory could not be listed: {}", _0.display())]
    UnlistableDirectory(#[error(not(source))] PathBuf),
    /// The library root itself could not be enumerated. Nothing below it can
    /// be trusted, so listing stops here.
    #[display("library root unavailable: {}", _0.display())]
    RootUnavailable(#[error(not(source))] PathBuf),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// Path contains invalid characters or escapes root
    #[display("invalid path: {}", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
    /// Backend-specific error
    #[display("backend error: {_0}")]
    BackendError(#[error(not(source))] String),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::BackendError(_))
    }

    /// Returns `true` if the error affects the whole backend rather than a
    /// single file.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::RootUnavailable(_))
    }

    /// Path the error is about, relative to the storage root where the
    /// backend knows it.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::NotFound(path)
            | Self::PermissionDenied(path)
            | Self::UnlistableDirectory(path)
            | Self::RootUnavailable(path)
            | Self::InvalidPath(path) => Some(path),
            Self::Io(_) | Self::BackendError(_) => None,
        }
    }
}
